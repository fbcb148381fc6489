//! Expansion for `#pragma define` macros.
//!
//! Literal macros like `#pragma define NAME value` and functional macros like
//! `#pragma define NAME(a, b) body` are resolved at compile time.
//! Plain `#define` directives are left for the GLSL preprocessor.
use crate::{
    diagnostics::{Diagnostics, ErrorCode},
    tokens::{
        contains_word, is_ident_char, line_indent, pragma, replace_word, split_args, word_offsets,
    },
};

/// Placeholder for line continuations in functional macro bodies.
const NEWLINE_PLACEHOLDER: &str = "@@";

#[derive(Debug, PartialEq, Clone)]
struct LiteralMacro {
    name: String,
    value: String,
}

#[derive(Debug, PartialEq, Clone)]
struct FunctionalMacro {
    name: String,
    params: Vec<String>,
    body: String,
}

/// The name and remaining text for `#pragma define` lines.
fn define_pragma(line: &str) -> Option<(&str, &str)> {
    let (name, rest) = pragma(line)?;
    if name != "define" {
        return None;
    }
    let end = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
    (end > 0).then(|| (&rest[..end], &rest[end..]))
}

/// Expand all literal and functional macros in `text`.
pub fn expand_macros(text: &str, diagnostics: &mut Diagnostics) -> String {
    let text = expand_literal_macros(text);
    expand_functional_macros(&text, diagnostics)
}

/// Remove `#pragma define NAME value` lines and substitute their values.
///
/// Each value is expanded using only the macros declared before it,
/// so redefining a macro later does not change earlier values.
pub fn expand_literal_macros(text: &str) -> String {
    let mut macros: Vec<LiteralMacro> = Vec::new();
    let mut lines = Vec::new();

    let mut source_lines = text.split('\n');
    while let Some(line) = source_lines.next() {
        match define_pragma(line) {
            Some((name, rest)) if !rest.starts_with('(') => {
                // Join any continuation lines into a single value.
                let mut value = rest.trim().to_string();
                lines.push(String::new());
                while value.ends_with('\\') {
                    value.pop();
                    match source_lines.next() {
                        Some(next) => {
                            value = format!("{} {}", value.trim_end(), next.trim());
                            lines.push(String::new());
                        }
                        None => break,
                    }
                }

                let value = macros
                    .iter()
                    .fold(value.trim().to_string(), |v, m| replace_word(&v, &m.name, &m.value));
                macros.push(LiteralMacro {
                    name: name.to_string(),
                    value,
                });
            }
            _ => lines.push(line.to_string()),
        }
    }

    macros
        .iter()
        .fold(lines.join("\n"), |text, m| replace_word(&text, &m.name, &m.value))
}

/// Expand `#pragma define NAME(params) body` macros at their call sites.
pub fn expand_functional_macros(text: &str, diagnostics: &mut Diagnostics) -> String {
    let mut text = join_continuations(text);

    let names: Vec<String> = text
        .split('\n')
        .filter_map(define_pragma)
        .filter(|(_, rest)| rest.starts_with('('))
        .map(|(name, _)| name.to_string())
        .collect();

    for name in names {
        // Definitions can change as earlier macros are expanded inside their bodies.
        let Some(definition) = find_definition(&text, &name) else {
            continue;
        };
        if contains_word(&definition.body, &definition.name) {
            diagnostics.warn(
                ErrorCode::RecursiveMacro,
                format!("macro {name} references itself and will not be expanded"),
            );
            continue;
        }
        text = expand_calls(&text, &definition, diagnostics);
    }

    text.split('\n')
        .map(|line| match define_pragma(line) {
            Some((_, rest)) if rest.starts_with('(') => "",
            _ => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// Continuations only matter for functional macros at this point.
fn join_continuations(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut continuing = false;
    for line in text.split_inclusive('\n') {
        // Continuation lines are trimmed so call sites can apply their own indentation.
        let content = line.trim_end_matches(['\n', '\r']).trim_end();
        let content = if continuing { content.trim_start() } else { content };
        let in_definition = continuing
            || define_pragma(content).is_some_and(|(_, rest)| rest.starts_with('('));

        if in_definition && content.ends_with('\\') {
            output += content.trim_end_matches('\\').trim_end();
            output += NEWLINE_PLACEHOLDER;
            continuing = true;
        } else {
            output += if continuing { line.trim_start() } else { line };
            continuing = false;
        }
    }
    output
}

fn find_definition(text: &str, name: &str) -> Option<FunctionalMacro> {
    text.split('\n').find_map(|line| {
        let (macro_name, rest) = define_pragma(line)?;
        if macro_name != name || !rest.starts_with('(') {
            return None;
        }
        let close = rest.find(')')?;
        Some(FunctionalMacro {
            name: name.to_string(),
            params: split_args(&rest[1..close])
                .into_iter()
                .map(|p| p.to_string())
                .collect(),
            body: rest[close + 1..]
                .trim()
                .trim_start_matches(NEWLINE_PLACEHOLDER)
                .to_string(),
        })
    })
}

fn expand_calls(text: &str, definition: &FunctionalMacro, diagnostics: &mut Diagnostics) -> String {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;

    for start in word_offsets(text, &definition.name).collect::<Vec<_>>() {
        if start < last {
            continue;
        }

        let line_start = text[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = text[start..].find('\n').map(|i| start + i).unwrap_or(text.len());
        let line = &text[line_start..line_end];
        let in_definition = define_pragma(line).is_some_and(|(_, rest)| rest.starts_with('('));
        if define_pragma(line).is_some_and(|(name, _)| name == definition.name) {
            continue;
        }

        let after_name = start + definition.name.len();
        let open = after_name + text[after_name..].len() - text[after_name..].trim_start().len();
        if !text[open..].starts_with('(') {
            continue;
        }
        let Some(close) = matching_paren(text, open) else {
            continue;
        };

        let args = split_args(&text[open + 1..close]);
        if args.len() != definition.params.len() {
            diagnostics.warn(
                ErrorCode::MacroArgumentCount,
                format!(
                    "macro {} expects {} arguments but received {}",
                    definition.name,
                    definition.params.len(),
                    args.len()
                ),
            );
        }

        let mut expansion = substitute_params(&definition.body, &definition.params, &args);
        if !in_definition {
            let indent = line_indent(text, start);
            expansion = expansion.replace(NEWLINE_PLACEHOLDER, &format!("\n{indent}"));
        }

        output += &text[last..start];
        output += &expansion;
        last = close + 1;
    }

    output += &text[last..];
    output
}

fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => (),
        }
    }
    None
}

// Substitute all parameters in a single pass so arguments are never rescanned.
fn substitute_params(body: &str, params: &[String], args: &[&str]) -> String {
    let mut output = String::with_capacity(body.len());
    let mut chars = body.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if is_ident_char(c) {
            let mut end = i + c.len_utf8();
            while let Some((j, n)) = chars.peek() {
                if is_ident_char(*n) {
                    end = j + n.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let word = &body[i..end];
            match params.iter().position(|p| p == word) {
                Some(index) => output += args.get(index).copied().unwrap_or_default(),
                None => output += word,
            }
        } else {
            output.push(c);
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn literal_macros_use_prior_values() {
        let text = indoc! {"
            #pragma define A 1
            #pragma define B A+1
            #pragma define A 2
            float b = B;
            float a = A;
        "};
        assert_eq!("\n\n\nfloat b = 1+1;\nfloat a = 1;\n", expand_literal_macros(text));
    }

    #[test]
    fn literal_macro_continuation() {
        let text = "#pragma define SUM 1 + \\\n  2\nint x = SUM;";
        assert_eq!("\n\nint x = 1 + 2;", expand_literal_macros(text));
    }

    #[test]
    fn literal_macros_ignore_define_meta() {
        let text = "#pragma define-meta USE_FOG\n#define X 1";
        assert_eq!(text, expand_literal_macros(text));
    }

    #[test]
    fn functional_macro_call() {
        let mut diagnostics = Diagnostics::new("test", true);
        let text = indoc! {"
            #pragma define MUL(a, b) ((a) * (b))
            float x = MUL(f(1.0, 2.0), y);
        "};
        assert_eq!(
            "\nfloat x = ((f(1.0, 2.0)) * (y));\n",
            expand_functional_macros(text, &mut diagnostics)
        );
        assert!(diagnostics.messages().is_empty());
    }

    #[test]
    fn functional_macro_multiline_body() {
        let mut diagnostics = Diagnostics::new("test", true);
        let text = indoc! {"
            #pragma define DECLARE(name) \\
                float name##_a; \\
                float name;
            void main() {
                DECLARE(x)
            }
        "};
        assert_eq!(
            indoc! {"

                void main() {
                    float x##_a;
                    float x;
                }
            "},
            expand_functional_macros(text, &mut diagnostics)
        );
    }

    #[test]
    fn functional_macro_inside_definition() {
        let mut diagnostics = Diagnostics::new("test", true);
        let text = indoc! {"
            #pragma define INNER(v) a = v; \\
                b = v;
            #pragma define OUTER(v) INNER(v) \\
                c = v;
            void main() {
              OUTER(1)
            }
        "};
        assert_eq!(
            indoc! {"


                void main() {
                  a = 1;
                  b = 1;
                  c = 1;
                }
            "},
            expand_functional_macros(text, &mut diagnostics)
        );
    }

    #[test]
    fn functional_macro_recursive() {
        let mut diagnostics = Diagnostics::new("test", true);
        let text = "#pragma define F(x) F(x) + 1\nfloat y = F(2);";
        assert_eq!("\nfloat y = F(2);", expand_functional_macros(text, &mut diagnostics));
        assert!(diagnostics.has_code(ErrorCode::RecursiveMacro));
    }

    #[test]
    fn functional_macro_argument_count() {
        let mut diagnostics = Diagnostics::new("test", true);
        let text = "#pragma define ADD(a, b) a + b\nfloat y = ADD(1);";
        assert_eq!("\nfloat y = 1 + ;", expand_functional_macros(text, &mut diagnostics));
        assert!(diagnostics.has_code(ErrorCode::MacroArgumentCount));
    }
}
