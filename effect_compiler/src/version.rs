//! Resolve `__VERSION__` conditionals and extension requests for a target version.
use smol_str::SmolStr;

use crate::{
    diagnostics::{Diagnostics, ErrorCode},
    expr::{evaluate, is_version_condition},
    tokens::{directive, line_of, pragma, split_args},
};

/// Keep only the branches of `#if` chains that apply to `version`.
///
/// Chains are only resolved if every condition depends on nothing but `__VERSION__`.
/// Other chains are kept as is, but nested chains in their branches are still resolved.
pub fn downlevel(text: &str, version: u32) -> String {
    let lines: Vec<_> = text.split('\n').collect();
    let mut output = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        process_lines(&lines, &mut i, version.into(), &mut output);
        // Keep any unmatched #else or #endif.
        if let Some(line) = lines.get(i) {
            output.push(*line);
            i += 1;
        }
    }
    output.join("\n")
}

// Stop before the next branch directive belonging to an enclosing chain.
fn process_lines<'a>(lines: &[&'a str], i: &mut usize, version: i64, output: &mut Vec<&'a str>) {
    while let Some(line) = lines.get(*i) {
        match directive(line) {
            Some(("if" | "ifdef" | "ifndef", _)) => process_chain(lines, i, version, output),
            Some(("elif" | "else" | "endif", _)) => return,
            _ => {
                output.push(*line);
                *i += 1;
            }
        }
    }
}

fn process_chain<'a>(lines: &[&'a str], i: &mut usize, version: i64, output: &mut Vec<&'a str>) {
    let mut branches = Vec::new();
    let mut endif = None;
    loop {
        let header = lines[*i];
        *i += 1;
        let mut body = Vec::new();
        process_lines(lines, i, version, &mut body);
        branches.push((header, body));

        match lines.get(*i).and_then(|l| directive(l)) {
            Some(("elif" | "else", _)) => (),
            Some(("endif", _)) => {
                endif = Some(lines[*i]);
                *i += 1;
                break;
            }
            _ => break,
        }
    }

    let conditions: Option<Vec<Option<&str>>> = branches
        .iter()
        .map(|(header, _)| match directive(header) {
            Some(("if" | "elif", condition)) if is_version_condition(condition) => {
                Some(Some(condition))
            }
            Some(("else", _)) => Some(None),
            _ => None,
        })
        .collect();

    match conditions {
        Some(conditions) => {
            let selected = conditions.iter().position(|c| match c {
                Some(condition) => evaluate(condition, Some(version)).is_ok_and(|v| v != 0),
                None => true,
            });
            if let Some(index) = selected {
                output.extend_from_slice(&branches[index].1);
            }
        }
        None => {
            for (header, body) in branches {
                output.push(header);
                output.extend(body);
            }
            output.extend(endif);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRequest {
    pub name: SmolStr,
    /// Emit `require` instead of guarding with `#ifdef`.
    pub require: bool,
}

impl ExtensionRequest {
    pub fn require(name: &str) -> Self {
        Self {
            name: name.into(),
            require: true,
        }
    }

    pub fn enable(name: &str) -> Self {
        Self {
            name: name.into(),
            require: false,
        }
    }
}

/// Find `#pragma extension([NAME, CONDITION])` requests that apply to `version`.
///
/// An optional third item `require` requests the extension unconditionally.
pub fn collect_extension_pragmas(
    text: &str,
    version: u32,
    diagnostics: &mut Diagnostics,
) -> Vec<ExtensionRequest> {
    let mut extensions = Vec::new();
    let mut offset = 0;
    for line in text.split('\n') {
        if let Some(("extension", args)) = pragma(line) {
            let items = args
                .trim()
                .strip_prefix('(')
                .and_then(|a| a.strip_suffix(')'))
                .map(|a| a.trim())
                .and_then(|a| a.strip_prefix('['))
                .and_then(|a| a.strip_suffix(']'))
                .map(split_args)
                .unwrap_or_default();

            match items[..] {
                [name, condition, ref rest @ ..] if !name.is_empty() => {
                    match evaluate(condition, Some(version.into())) {
                        Ok(value) => {
                            if value != 0 {
                                extensions.push(ExtensionRequest {
                                    name: name.into(),
                                    require: rest.first() == Some(&"require"),
                                });
                            }
                        }
                        Err(e) => diagnostics.warn_at(
                            ErrorCode::InvalidExtensionCondition,
                            format!("invalid condition {condition:?} for extension {name}: {e}"),
                            Some(line_of(text, offset)),
                        ),
                    }
                }
                _ => diagnostics.warn_at(
                    ErrorCode::InvalidExtensionCondition,
                    format!("invalid extension pragma {:?}", line.trim()),
                    Some(line_of(text, offset)),
                ),
            }
        }
        offset += line.len() + 1;
    }
    extensions
}

/// Prepend `#extension` directives for `extensions` to `text`.
///
/// Duplicate requests are merged and `require` takes precedence.
pub fn prepend_extensions(text: &str, extensions: &[ExtensionRequest]) -> String {
    let mut merged: Vec<ExtensionRequest> = Vec::new();
    for extension in extensions {
        match merged.iter_mut().find(|e| e.name == extension.name) {
            Some(existing) => existing.require |= extension.require,
            None => merged.push(extension.clone()),
        }
    }

    let mut output = String::new();
    for e in merged {
        if e.require {
            output += &format!("#extension {}: require\n", e.name);
        } else {
            output += &format!("#ifdef {0}\n#extension {0}: enable\n#endif\n", e.name);
        }
    }
    output + text
}

#[cfg(test)]
mod tests {
    use super::*;

    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = indoc! {"
        #if __VERSION__ >= 300
        out vec4 color;
        #else
        #define color gl_FragColor
        #endif
        void main() {}
    "};

    #[test]
    fn select_version_branches() {
        assert_eq!("out vec4 color;\nvoid main() {}\n", downlevel(SOURCE, 460));
        assert_eq!("out vec4 color;\nvoid main() {}\n", downlevel(SOURCE, 300));
        assert_eq!("#define color gl_FragColor\nvoid main() {}\n", downlevel(SOURCE, 100));
    }

    #[test]
    fn keep_define_conditions() {
        let text = indoc! {"
            #if USE_FOG
              #if __VERSION__ < 300
                float fog;
              #elif __VERSION__ < 450
                highp float fog;
              #else
                layout(location = 0) float fog;
              #endif
            #else
              float noFog;
            #endif
        "};
        assert_eq!(
            indoc! {"
                #if USE_FOG
                    highp float fog;
                #else
                  float noFog;
                #endif
            "},
            downlevel(text, 300)
        );
    }

    #[test]
    fn no_branch_selected() {
        let text = "#if __VERSION__ > 460\nfloat x;\n#endif\nfloat y;";
        assert_eq!("float y;", downlevel(text, 100));
    }

    #[test]
    fn mixed_conditions_are_kept() {
        let text = "#if __VERSION__ >= 300 && USE_FOG\nfloat x;\n#endif";
        assert_eq!(text, downlevel(text, 300));
    }

    #[test]
    fn extension_pragmas() {
        let text = indoc! {"
            #pragma extension([GL_OES_standard_derivatives, __VERSION__ < 300])
            #pragma extension([GL_EXT_draw_buffers, __VERSION__ < 300, require])
            #pragma extension([GL_EXT_frag_depth, USE_DEPTH])
        "};
        let mut diagnostics = Diagnostics::new("test", true);
        assert_eq!(
            vec![
                ExtensionRequest::enable("GL_OES_standard_derivatives"),
                ExtensionRequest::require("GL_EXT_draw_buffers"),
            ],
            collect_extension_pragmas(text, 100, &mut diagnostics)
        );
        assert_eq!(1, diagnostics.messages().len());
        assert!(diagnostics.has_code(ErrorCode::InvalidExtensionCondition));

        let mut diagnostics = Diagnostics::new("test", true);
        assert!(collect_extension_pragmas(text, 300, &mut diagnostics).is_empty());
    }

    #[test]
    fn prepend_merged_extensions() {
        let extensions = [
            ExtensionRequest::enable("GL_EXT_shader_texture_lod"),
            ExtensionRequest::enable("GL_EXT_draw_buffers"),
            ExtensionRequest::require("GL_EXT_draw_buffers"),
        ];
        assert_eq!(
            indoc! {"
                #ifdef GL_EXT_shader_texture_lod
                #extension GL_EXT_shader_texture_lod: enable
                #endif
                #extension GL_EXT_draw_buffers: require
                void main() {}
            "},
            prepend_extensions("void main() {}\n", &extensions)
        );
    }
}
