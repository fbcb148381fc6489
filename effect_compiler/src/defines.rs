//! Preprocessor defines used by a shader.
//!
//! Every identifier tested by `#if`, `#ifdef`, `#ifndef`, or `#elif` becomes a [Define].
//! Additional metadata comes from `#pragma define-meta`.
use serde::Serialize;
use smol_str::SmolStr;

use crate::tokens::{directive, is_ident_char, is_ident_start, pragma, split_args, word_offsets};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DefineType {
    Boolean,
    Number,
    String,
    /// Runtime constants that aren't part of the material variants.
    Constant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Define {
    pub name: SmolStr,
    #[serde(rename = "type")]
    pub ty: DefineType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<SmolStr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<SmolStr>,
    /// Identifiers of the enclosing conditions that must hold for this define to matter.
    pub defines: Vec<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub editor: Option<String>,
}

impl Define {
    fn new(name: &str, ty: DefineType, defines: Vec<SmolStr>) -> Self {
        Self {
            name: name.into(),
            ty,
            range: None,
            options: None,
            default: None,
            defines,
            editor: None,
        }
    }
}

const IGNORED_IDENTIFIERS: &[&str] = &["defined", "__VERSION__", "true", "false"];

/// Identifiers in a preprocessor condition that refer to user defines.
pub fn condition_identifiers(condition: &str) -> Vec<SmolStr> {
    let mut identifiers = Vec::new();
    let mut rest = condition;
    while let Some(start) = rest.find(is_ident_start) {
        // Skip the tails of numbers like 1u or 0x10.
        let preceded_by_digit = rest[..start]
            .chars()
            .next_back()
            .is_some_and(|c| is_ident_char(c));
        let end = rest[start..]
            .find(|c: char| !is_ident_char(c))
            .map(|e| start + e)
            .unwrap_or(rest.len());
        let word = &rest[start..end];
        if !preceded_by_digit
            && !IGNORED_IDENTIFIERS.contains(&word)
            && !word.starts_with("GL_")
            && !identifiers.iter().any(|i: &SmolStr| i == word)
        {
            identifiers.push(word.into());
        }
        rest = &rest[end..];
    }
    identifiers
}

/// The identifiers of the conditional directives enclosing the current line.
#[derive(Debug, Default, Clone)]
pub struct ConditionStack {
    frames: Vec<Vec<SmolStr>>,
}

impl ConditionStack {
    /// Update the stack for a preprocessor `line`.
    pub fn update(&mut self, line: &str) {
        match directive(line) {
            Some(("if" | "ifdef" | "ifndef", condition)) => {
                self.frames.push(condition_identifiers(condition))
            }
            Some(("elif", condition)) => {
                let identifiers = condition_identifiers(condition);
                match self.frames.last_mut() {
                    Some(frame) => {
                        for i in identifiers {
                            if !frame.contains(&i) {
                                frame.push(i);
                            }
                        }
                    }
                    None => self.frames.push(identifiers),
                }
            }
            Some(("endif", _)) => {
                self.frames.pop();
            }
            _ => (),
        }
    }

    pub fn identifiers(&self) -> Vec<SmolStr> {
        let mut identifiers: Vec<SmolStr> = Vec::new();
        for i in self.frames.iter().flatten() {
            if !identifiers.contains(i) {
                identifiers.push(i.clone());
            }
        }
        identifiers
    }
}

const COMPARISONS: &[&str] = &["==", "!=", "<=", ">=", "<", ">"];

/// Returns `true` if `name` is compared against a number in `condition`.
fn is_compared_to_number(condition: &str, name: &str) -> bool {
    word_offsets(condition, name).any(|i| {
        let after = condition[i + name.len()..].trim_start();
        let before = condition[..i].trim_end();
        let number_after = COMPARISONS
            .iter()
            .find_map(|op| after.strip_prefix(op))
            .is_some_and(|rest| rest.trim_start().starts_with(|c: char| c.is_ascii_digit()));
        let number_before = COMPARISONS
            .iter()
            .find_map(|op| before.strip_suffix(op))
            .is_some_and(|rest| rest.trim_end().ends_with(|c: char| c.is_ascii_digit()));
        number_after || number_before
    })
}

/// Find the defines used by conditional directives in `text`.
pub fn scan_defines(text: &str) -> Vec<Define> {
    let mut defines: Vec<Define> = Vec::new();
    let mut conditions = ConditionStack::default();

    for line in text.lines() {
        if let Some((name @ ("if" | "ifdef" | "ifndef" | "elif"), condition)) = directive(line) {
            let enclosing = if name == "elif" {
                // Exclude the frame this branch belongs to.
                let mut outer = conditions.clone();
                outer.frames.pop();
                outer.identifiers()
            } else {
                conditions.identifiers()
            };

            for identifier in condition_identifiers(condition) {
                let ty = if is_compared_to_number(condition, &identifier) {
                    DefineType::Number
                } else {
                    DefineType::Boolean
                };
                match defines.iter_mut().find(|d| d.name == identifier) {
                    Some(define) => {
                        if ty == DefineType::Number && define.ty == DefineType::Boolean {
                            define.ty = ty;
                        }
                    }
                    None => {
                        let dependencies = enclosing
                            .iter()
                            .filter(|e| **e != identifier)
                            .cloned()
                            .collect();
                        defines.push(Define::new(&identifier, ty, dependencies));
                    }
                }
            }
        }
        conditions.update(line);

        if let Some(("define-meta", args)) = pragma(line) {
            apply_define_meta(&mut defines, args);
        }
    }

    defines
}

fn apply_define_meta(defines: &mut Vec<Define>, args: &str) {
    let name_end = args.find(|c: char| !is_ident_char(c)).unwrap_or(args.len());
    let name = &args[..name_end];
    if name.is_empty() {
        return;
    }

    let index = match defines.iter().position(|d| d.name == name) {
        Some(index) => index,
        None => {
            defines.push(Define::new(name, DefineType::Boolean, Vec::new()));
            defines.len() - 1
        }
    };
    let define = &mut defines[index];

    for (key, value) in meta_properties(&args[name_end..]) {
        match (key, value) {
            ("range", Some(value)) => {
                define.range = Some(
                    list_items(value)
                        .iter()
                        .filter_map(|v| v.parse().ok())
                        .collect(),
                );
                define.ty = DefineType::Number;
            }
            ("options", Some(value)) => {
                define.options = Some(
                    list_items(value)
                        .iter()
                        .map(|v| SmolStr::from(*v))
                        .collect(),
                );
                define.ty = DefineType::String;
            }
            ("default", Some(value)) => define.default = Some(value.trim().into()),
            ("editor", Some(value)) => define.editor = Some(value.trim().to_string()),
            ("constant", None) => define.ty = DefineType::Constant,
            _ => (),
        }
    }
}

/// Properties like `range([0, 3])` or flags like `constant`.
fn meta_properties(text: &str) -> Vec<(&str, Option<&str>)> {
    let mut properties = Vec::new();
    let mut rest = text.trim_start();
    while let Some(start) = rest.find(is_ident_start) {
        rest = &rest[start..];
        let end = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
        let key = &rest[..end];
        rest = &rest[end..];

        if rest.trim_start().starts_with('(') {
            let open = rest.find('(').unwrap_or_default();
            let mut depth = 0;
            let mut close = rest.len();
            for (i, c) in rest.char_indices().skip(open) {
                match c {
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            close = i;
                            break;
                        }
                    }
                    _ => (),
                }
            }
            properties.push((key, Some(&rest[open + 1..close])));
            rest = rest.get(close + 1..).unwrap_or_default();
        } else {
            properties.push((key, None));
        }
    }
    properties
}

fn list_items(value: &str) -> Vec<&str> {
    let value = value.trim();
    let value = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value);
    split_args(value)
}

/// Merge `defines` from another stage into `target` by name.
pub fn merge_defines(target: &mut Vec<Define>, defines: Vec<Define>) {
    for define in defines {
        match target.iter_mut().find(|d| d.name == define.name) {
            Some(existing) => {
                if existing.ty == DefineType::Boolean {
                    existing.ty = define.ty;
                }
                existing.range = existing.range.take().or(define.range);
                existing.options = existing.options.take().or(define.options);
                existing.default = existing.default.take().or(define.default);
                existing.editor = existing.editor.take().or(define.editor);
            }
            None => target.push(define),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn identifiers_in_conditions() {
        assert_eq!(
            vec![SmolStr::from("USE_FOG"), SmolStr::from("CC_LIGHTS")],
            condition_identifiers(
                "defined(USE_FOG) && CC_LIGHTS > 0x1u || GL_EXT_foo || __VERSION__ >= 300"
            )
        );
    }

    #[test]
    fn scan_nested_defines() {
        let text = indoc! {"
            #if USE_TEXTURE
              #ifdef USE_ALPHA_TEST
              #endif
              #if LIGHT_COUNT > 2
              #elif MODE == 1
              #endif
            #endif
            #if __VERSION__ >= 300
            #endif
        "};
        assert_eq!(
            vec![
                Define::new("USE_TEXTURE", DefineType::Boolean, Vec::new()),
                Define::new("USE_ALPHA_TEST", DefineType::Boolean, vec!["USE_TEXTURE".into()]),
                Define::new("LIGHT_COUNT", DefineType::Number, vec!["USE_TEXTURE".into()]),
                Define::new("MODE", DefineType::Number, vec!["USE_TEXTURE".into()]),
            ],
            scan_defines(text)
        );
    }

    #[test]
    fn define_meta() {
        let text = indoc! {"
            #pragma define-meta LAYERS range([1, 4]) default(2)
            #pragma define-meta QUALITY options([LOW, HIGH]) editor({ tooltip: 'quality' })
            #pragma define-meta CC_DEVICE_SCALE constant
            #if LAYERS
            #endif
        "};
        let defines = scan_defines(text);
        assert_eq!(
            vec![
                Define {
                    range: Some(vec![1, 4]),
                    default: Some("2".into()),
                    ..Define::new("LAYERS", DefineType::Number, Vec::new())
                },
                Define {
                    options: Some(vec!["LOW".into(), "HIGH".into()]),
                    editor: Some("{ tooltip: 'quality' }".into()),
                    ..Define::new("QUALITY", DefineType::String, Vec::new())
                },
                Define::new("CC_DEVICE_SCALE", DefineType::Constant, Vec::new()),
            ],
            defines
        );
    }

    #[test]
    fn condition_stack() {
        let mut stack = ConditionStack::default();
        stack.update("#if A && B");
        stack.update("#ifndef C");
        assert_eq!(vec!["A", "B", "C"], stack.identifiers());
        stack.update("#endif");
        stack.update("#elif D");
        assert_eq!(vec!["A", "B", "D"], stack.identifiers());
        stack.update("#endif");
        assert!(stack.identifiers().is_empty());
    }
}
