//! Constant integer expressions for `#if` conditions and array lengths.
use thiserror::Error;

use crate::tokens::{is_ident_char, is_ident_start};

pub const VERSION_IDENT: &str = "__VERSION__";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExprError {
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected token {0:?}")]
    UnexpectedToken(String),

    #[error("identifier {0:?} is not a constant")]
    UnknownIdentifier(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Int(i64),
    Ident(String),
    Op(&'static str),
}

const OPS: &[&str] = &[
    "&&", "||", "==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "%", "!", "(", ")",
];

fn lex(expr: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut rest = expr.trim_start();
    while let Some(c) = rest.chars().next() {
        if c.is_ascii_digit() {
            let end = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
            let digits = rest[..end].trim_end_matches(['u', 'U']);
            let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
                Some(hex) => i64::from_str_radix(hex, 16),
                None => digits.parse(),
            }
            .map_err(|_| ExprError::UnexpectedToken(rest[..end].to_string()))?;
            tokens.push(Token::Int(value));
            rest = &rest[end..];
        } else if is_ident_start(c) {
            let end = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
            tokens.push(Token::Ident(rest[..end].to_string()));
            rest = &rest[end..];
        } else {
            let op = OPS
                .iter()
                .find(|op| rest.starts_with(**op))
                .ok_or(ExprError::UnexpectedChar(c))?;
            tokens.push(Token::Op(op));
            rest = &rest[op.len()..];
        }
        rest = rest.trim_start();
    }
    Ok(tokens)
}

/// Evaluate `expr` as a C style integer expression.
///
/// The only identifier allowed is `__VERSION__` and only if `version` is set.
/// Comparisons and logical operators evaluate to `0` or `1`.
pub fn evaluate(expr: &str, version: Option<i64>) -> Result<i64, ExprError> {
    let tokens = lex(expr)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        version,
    };
    let value = parser.logical_or()?;
    match parser.tokens.get(parser.pos) {
        Some(t) => Err(ExprError::UnexpectedToken(format!("{t:?}"))),
        None => Ok(value),
    }
}

/// Returns `true` if `condition` only uses numbers, operators, and `__VERSION__`.
///
/// Conditions with other identifiers depend on runtime defines and can't be resolved early.
pub fn is_version_condition(condition: &str) -> bool {
    match lex(condition) {
        Ok(tokens) => {
            !tokens.is_empty()
                && tokens.iter().all(|t| match t {
                    Token::Ident(i) => i == VERSION_IDENT,
                    _ => true,
                })
        }
        Err(_) => false,
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    version: Option<i64>,
}

impl Parser<'_> {
    fn eat(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        let op = match self.tokens.get(self.pos) {
            Some(Token::Op(op)) if ops.contains(op) => *op,
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn logical_or(&mut self) -> Result<i64, ExprError> {
        let mut value = self.logical_and()?;
        while self.eat(&["||"]).is_some() {
            let rhs = self.logical_and()?;
            value = i64::from(value != 0 || rhs != 0);
        }
        Ok(value)
    }

    fn logical_and(&mut self) -> Result<i64, ExprError> {
        let mut value = self.equality()?;
        while self.eat(&["&&"]).is_some() {
            let rhs = self.equality()?;
            value = i64::from(value != 0 && rhs != 0);
        }
        Ok(value)
    }

    fn equality(&mut self) -> Result<i64, ExprError> {
        let mut value = self.relational()?;
        while let Some(op) = self.eat(&["==", "!="]) {
            let rhs = self.relational()?;
            value = i64::from(match op {
                "==" => value == rhs,
                _ => value != rhs,
            });
        }
        Ok(value)
    }

    fn relational(&mut self) -> Result<i64, ExprError> {
        let mut value = self.additive()?;
        while let Some(op) = self.eat(&["<=", ">=", "<", ">"]) {
            let rhs = self.additive()?;
            value = i64::from(match op {
                "<=" => value <= rhs,
                ">=" => value >= rhs,
                "<" => value < rhs,
                _ => value > rhs,
            });
        }
        Ok(value)
    }

    fn additive(&mut self) -> Result<i64, ExprError> {
        let mut value = self.multiplicative()?;
        while let Some(op) = self.eat(&["+", "-"]) {
            let rhs = self.multiplicative()?;
            value = match op {
                "+" => value.checked_add(rhs),
                _ => value.checked_sub(rhs),
            }
            .ok_or(ExprError::Overflow)?;
        }
        Ok(value)
    }

    fn multiplicative(&mut self) -> Result<i64, ExprError> {
        let mut value = self.unary()?;
        while let Some(op) = self.eat(&["*", "/", "%"]) {
            let rhs = self.unary()?;
            value = match op {
                "*" => value.checked_mul(rhs),
                _ if rhs == 0 => return Err(ExprError::DivisionByZero),
                "/" => value.checked_div(rhs),
                _ => value.checked_rem(rhs),
            }
            .ok_or(ExprError::Overflow)?;
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<i64, ExprError> {
        match self.eat(&["!", "-", "+"]) {
            Some("!") => Ok(i64::from(self.unary()? == 0)),
            Some("-") => self.unary()?.checked_neg().ok_or(ExprError::Overflow),
            Some(_) => self.unary(),
            None => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<i64, ExprError> {
        let tokens = self.tokens;
        let token = tokens.get(self.pos).ok_or(ExprError::UnexpectedEnd)?;
        self.pos += 1;
        match token {
            Token::Int(i) => Ok(*i),
            Token::Ident(name) if name == VERSION_IDENT => self
                .version
                .ok_or_else(|| ExprError::UnknownIdentifier(name.clone())),
            Token::Ident(name) => Err(ExprError::UnknownIdentifier(name.clone())),
            Token::Op("(") => {
                let value = self.logical_or()?;
                match self.eat(&[")"]) {
                    Some(_) => Ok(value),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Token::Op(op) => Err(ExprError::UnexpectedToken(op.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_arithmetic() {
        assert_eq!(Ok(7), evaluate("1 + 2 * 3", None));
        assert_eq!(Ok(9), evaluate("(1 + 2) * 3", None));
        assert_eq!(Ok(1), evaluate("10 % 3", None));
        assert_eq!(Ok(-2), evaluate("-4 / 2", None));
        assert_eq!(Ok(16), evaluate("0x10", None));
        assert_eq!(Ok(4), evaluate("4u", None));
    }

    #[test]
    fn evaluate_logic() {
        assert_eq!(Ok(1), evaluate("1 && (0 || 1)", None));
        assert_eq!(Ok(0), evaluate("!1", None));
        assert_eq!(Ok(1), evaluate("1 < 2 == 1", None));
        assert_eq!(Ok(1), evaluate("0 && 0 || 1", None));
    }

    #[test]
    fn evaluate_version() {
        assert_eq!(Ok(1), evaluate("__VERSION__ >= 300", Some(300)));
        assert_eq!(Ok(0), evaluate("__VERSION__ >= 300", Some(100)));
        assert_eq!(Ok(1), evaluate("__VERSION__ > 100 && __VERSION__ < 450", Some(300)));
        assert_eq!(
            Err(ExprError::UnknownIdentifier("__VERSION__".to_string())),
            evaluate("__VERSION__", None)
        );
    }

    #[test]
    fn evaluate_errors() {
        assert_eq!(
            Err(ExprError::UnknownIdentifier("CC_FOO".to_string())),
            evaluate("CC_FOO + 1", None)
        );
        assert_eq!(Err(ExprError::DivisionByZero), evaluate("1 / 0", None));
        assert_eq!(Err(ExprError::UnexpectedEnd), evaluate("(1 + 2", None));
        assert_eq!(Err(ExprError::UnexpectedChar('?')), evaluate("1 ? 2 : 3", None));
    }

    #[test]
    fn evaluate_overflow() {
        let min = "(-9223372036854775807 - 1)";
        assert_eq!(Err(ExprError::Overflow), evaluate(&format!("{min} / -1"), None));
        assert_eq!(Err(ExprError::Overflow), evaluate(&format!("{min} % -1"), None));
        assert_eq!(Err(ExprError::Overflow), evaluate(&format!("-{min}"), None));
        assert_eq!(Err(ExprError::Overflow), evaluate("9223372036854775807 + 1", None));
        assert_eq!(Err(ExprError::Overflow), evaluate("4294967296 * 4294967296", None));
    }

    #[test]
    fn version_conditions() {
        assert!(is_version_condition("__VERSION__ >= 300"));
        assert!(is_version_condition("(__VERSION__ < 300) || 0"));
        assert!(!is_version_condition("USE_TEXTURE"));
        assert!(!is_version_condition("defined(GL_EXT_foo)"));
        assert!(!is_version_condition(""));
    }
}
