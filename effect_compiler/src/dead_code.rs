//! Remove functions that can't be reached from the entry point.
//!
//! Dependencies are conservative. Any whole word use of a function name
//! inside another function counts as a call even if it isn't one.
use smol_str::SmolStr;

use crate::{
    diagnostics::{Diagnostics, ErrorCode},
    tokens::{contains_word, Cursor, TokenKind},
};

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FunctionRecord {
    pub name: SmolStr,
    pub return_type: SmolStr,
    /// The start of the definition including any precision qualifier.
    pub beg: usize,
    /// The end of the closing brace.
    pub end: usize,
    /// The end of the closing parenthesis of the parameter list.
    pub param_list_end: usize,
    /// Indices of other functions referenced in the definition.
    pub deps: Vec<usize>,
}

impl FunctionRecord {
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.beg && offset < self.end
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct EliminatedCode {
    pub text: String,
    /// The remaining functions with offsets into `text`.
    pub functions: Vec<FunctionRecord>,
}

/// Find top level function definitions in `text` in source order.
pub fn find_functions(text: &str) -> Vec<FunctionRecord> {
    let cursor = Cursor::new(text);
    let tokens = cursor.tokens();

    let mut functions = Vec::new();
    let mut statement_start = 0;
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        if token.kind == TokenKind::Preprocessor || token.is_punct(text, ';') {
            statement_start = i + 1;
            i += 1;
        } else if token.is_punct(text, '{') {
            // Skip bodies of blocks and structs as well as functions.
            let close = cursor.matching_close(i).unwrap_or(tokens.len() - 1);
            if let Some((name, return_type)) = function_header(&cursor, statement_start, i) {
                functions.push(FunctionRecord {
                    name: name.into(),
                    return_type: return_type.into(),
                    beg: tokens[statement_start].beg,
                    end: tokens[close].end,
                    param_list_end: tokens[i - 1].end,
                    deps: Vec::new(),
                });
                statement_start = close + 1;
            }
            i = close + 1;
        } else {
            i += 1;
        }
    }

    let deps: Vec<Vec<usize>> = functions
        .iter()
        .map(|f| {
            let definition = &text[f.beg..f.end];
            functions
                .iter()
                .enumerate()
                .filter(|(_, other)| other.name != f.name && contains_word(definition, &other.name))
                .map(|(j, _)| j)
                .collect()
        })
        .collect();
    for (f, deps) in functions.iter_mut().zip(deps) {
        f.deps = deps;
    }

    functions
}

/// The name and return type if the tokens in `start..brace` are `type name(...)`.
fn function_header<'a>(
    cursor: &Cursor<'a>,
    start: usize,
    brace: usize,
) -> Option<(&'a str, &'a str)> {
    let tokens = cursor.tokens();
    let source = cursor.source();

    let close = brace.checked_sub(1)?;
    if close < start || !tokens[close].is_punct(source, ')') {
        return None;
    }

    let mut depth = 0usize;
    let mut open = None;
    for j in (start..=close).rev() {
        if tokens[j].is_punct(source, ')') {
            depth += 1;
        } else if tokens[j].is_punct(source, '(') {
            depth -= 1;
            if depth == 0 {
                open = Some(j);
                break;
            }
        }
    }

    let open = open?;
    let name_index = open.checked_sub(1)?;
    let type_index = open.checked_sub(2)?;
    if type_index < start {
        return None;
    }
    let name = tokens[name_index];
    let return_type = tokens[type_index];
    (name.kind == TokenKind::Identifier && return_type.kind == TokenKind::Identifier)
        .then(|| (cursor.text(name), cursor.text(return_type)))
}

/// Remove functions not reachable from `entry` or `main`.
///
/// Overloads share liveness since references are only tracked by name.
pub fn eliminate_dead_code(
    text: &str,
    entry: &str,
    diagnostics: &mut Diagnostics,
) -> EliminatedCode {
    let functions = find_functions(text);

    let mut roots: Vec<_> = functions
        .iter()
        .enumerate()
        .filter(|(_, f)| f.name == entry)
        .map(|(i, _)| i)
        .collect();
    if roots.is_empty() {
        diagnostics.warn(
            ErrorCode::MissingEntry,
            format!("entry function {entry:?} not found"),
        );
        if !functions.is_empty() {
            roots.push(0);
        }
    }
    roots.extend(
        functions
            .iter()
            .enumerate()
            .filter(|(_, f)| f.name == "main")
            .map(|(i, _)| i),
    );

    let mut live = vec![false; functions.len()];
    while let Some(i) = roots.pop() {
        if live[i] {
            continue;
        }
        live[i] = true;
        roots.extend_from_slice(&functions[i].deps);
        roots.extend(
            functions
                .iter()
                .enumerate()
                .filter(|(j, f)| !live[*j] && f.name == functions[i].name)
                .map(|(j, _)| j),
        );
    }

    let mut output = String::with_capacity(text.len());
    let mut retained = Vec::new();
    let mut new_indices = vec![None; functions.len()];
    let mut last = 0;
    let mut removed = 0;
    for (i, f) in functions.iter().enumerate() {
        if live[i] {
            new_indices[i] = Some(retained.len());
            retained.push(FunctionRecord {
                beg: f.beg - removed,
                end: f.end - removed,
                param_list_end: f.param_list_end - removed,
                ..f.clone()
            });
        } else {
            let end = removal_end(text, f.end);
            output += &text[last..f.beg];
            last = end;
            removed += end - f.beg;
        }
    }
    output += &text[last..];

    for f in &mut retained {
        f.deps = f.deps.iter().filter_map(|d| new_indices[*d]).collect();
    }

    EliminatedCode {
        text: output,
        functions: retained,
    }
}

// Include trailing whitespace up to and including the line break.
fn removal_end(text: &str, end: usize) -> usize {
    let rest = &text[end..];
    let end = end + rest.len() - rest.trim_start_matches([' ', '\t', '\r']).len();
    if text[end..].starts_with('\n') {
        end + 1
    } else {
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = indoc! {"
        precision highp float;
        uniform sampler2D tex;
        float unused() { return 1.0; }
        highp float helper(float x) { return x * 2.0; }
        struct Light { vec3 color; };
        vec4 frag() {
          return vec4(helper(1.0));
        }
        float alsoUnused(float x) { return unused() + x; }
        void main() { gl_FragColor = frag(); }
    "};

    #[test]
    fn find_function_records() {
        let functions = find_functions(SOURCE);
        let names: Vec<_> = functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(vec!["unused", "helper", "frag", "alsoUnused", "main"], names);

        let helper = &functions[1];
        assert_eq!("float", helper.return_type);
        assert_eq!(
            "highp float helper(float x) { return x * 2.0; }",
            &SOURCE[helper.beg..helper.end]
        );
        assert_eq!("highp float helper(float x)", &SOURCE[helper.beg..helper.param_list_end]);
        assert_eq!(vec![1], functions[2].deps);
        assert_eq!(vec![0], functions[3].deps);
        assert_eq!(vec![2], functions[4].deps);
    }

    #[test]
    fn eliminate_unreachable() {
        let mut diagnostics = Diagnostics::new("test", true);
        let result = eliminate_dead_code(SOURCE, "frag", &mut diagnostics);
        assert_eq!(
            indoc! {"
                precision highp float;
                uniform sampler2D tex;
                highp float helper(float x) { return x * 2.0; }
                struct Light { vec3 color; };
                vec4 frag() {
                  return vec4(helper(1.0));
                }
                void main() { gl_FragColor = frag(); }
            "},
            result.text
        );
        assert_eq!(find_functions(&result.text), result.functions);
        assert!(diagnostics.messages().is_empty());
    }

    #[test]
    fn eliminate_is_idempotent() {
        let mut diagnostics = Diagnostics::new("test", true);
        let once = eliminate_dead_code(SOURCE, "frag", &mut diagnostics);
        let twice = eliminate_dead_code(&once.text, "frag", &mut diagnostics);
        assert_eq!(once, twice);
    }

    #[test]
    fn missing_entry_uses_first_function() {
        let mut diagnostics = Diagnostics::new("test", false);
        let result = eliminate_dead_code(SOURCE, "vert", &mut diagnostics);
        assert!(diagnostics.has_code(ErrorCode::MissingEntry));
        let names: Vec<_> = result.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(vec!["unused", "helper", "frag", "main"], names);
    }

    #[test]
    fn overloads_are_kept_together() {
        let mut diagnostics = Diagnostics::new("test", true);
        let text = indoc! {"
            float f(float x) { return x; }
            vec2 f(vec2 x) { return x; }
            void main() { f(1.0); }
        "};
        let result = eliminate_dead_code(text, "main", &mut diagnostics);
        assert_eq!(text, result.text);
    }
}
