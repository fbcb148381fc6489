//! Rewrite GLSL ES 3.00 style vertex and fragment shaders for GLSL ES 1.00.
use std::ops::Range;

use crate::{
    dead_code::find_functions,
    defines::Define,
    diagnostics::{CompileError, Diagnostics, ErrorCode},
    params::{extract_params, Category, ParamInfo, Stage},
    tokens::{count_word, line_of, replace_ranges, replace_word, Cursor, TokenKind},
    version::ExtensionRequest,
};

pub const DRAW_BUFFERS: &str = "GL_EXT_draw_buffers";
pub const TEXTURE_LOD: &str = "GL_EXT_shader_texture_lod";

/// Texture functions in GLSL ES 3.00 without the sampler dimension.
const TEXTURE_FUNCTIONS: &[&str] = &[
    "texture",
    "textureProj",
    "textureLod",
    "textureProjLod",
    "textureGrad",
    "textureProjGrad",
];

#[derive(Debug, PartialEq, Eq)]
pub struct Transcoded {
    pub text: String,
    /// Extensions required by the rewritten code.
    pub extensions: Vec<ExtensionRequest>,
}

/// Convert declarations and texture calls in `text` to GLSL ES 1.00.
///
/// `defines` are used to find sampler types when the sampler is a define.
pub fn transcode_gles1(
    text: &str,
    stage: Stage,
    defines: &[Define],
    diagnostics: &mut Diagnostics,
) -> Result<Transcoded, CompileError> {
    let mut extensions = Vec::new();

    let functions = find_functions(text);
    let params = extract_params(text, stage, &functions, &mut Diagnostics::silent())?;

    let mut frag_outputs = Vec::new();
    let mut edits = Vec::new();
    for p in &params {
        let replacement = match p.category {
            Category::Block => Some(flatten_block(text, p)),
            Category::Attribute => Some(declaration("attribute", p)),
            Category::Varying => Some(declaration("varying", p)),
            Category::FragColor => {
                match p.param.location {
                    Some(location) => frag_outputs.push((p.param.name.clone(), location)),
                    None => diagnostics.error_at(
                        ErrorCode::MissingOutputLocation,
                        format!("fragment output {} has no location", p.param.name),
                        Some(p.line),
                    )?,
                }
                Some(String::new())
            }
            Category::SamplerTexture
            | Category::Sampler
            | Category::Texture
            | Category::Image
            | Category::SubpassInput => p.layout_range.map(|_| declaration("uniform", p)),
            Category::Buffer => None,
        };
        if let Some(replacement) = replacement {
            edits.push((p.beg..p.end, replacement));
        }
    }
    let mut text = replace_ranges(text, edits);

    match frag_outputs.as_slice() {
        [] => (),
        [(name, _)] => text = replace_word(&text, name, "gl_FragColor"),
        outputs => {
            for (name, location) in outputs {
                text = replace_word(&text, name, &format!("gl_FragData[{location}]"));
            }
            extensions.push(ExtensionRequest::require(DRAW_BUFFERS));
        }
    }

    let (text, uses_lod) = remap_texture_functions(&text, stage, defines, diagnostics)?;
    if uses_lod {
        extensions.push(ExtensionRequest::enable(TEXTURE_LOD));
    }

    Ok(Transcoded { text, extensions })
}

fn declaration(storage: &str, p: &ParamInfo) -> String {
    let precision = p
        .param
        .precision
        .as_ref()
        .map(|p| format!("{p} "))
        .unwrap_or_default();
    let array = if p.param.count != 1 {
        format!("[{}]", p.param.count)
    } else {
        String::new()
    };
    format!("{storage} {precision}{} {}{array};", p.param.ty, p.param.name)
}

/// Declare used block members as individual uniforms.
fn flatten_block(text: &str, p: &ParamInfo) -> String {
    p.param
        .members
        .iter()
        // The declaration itself is one occurrence.
        .filter(|m| count_word(text, &m.name) > 1)
        .map(|m| {
            let precision = m.precision.as_ref().map(|p| format!("{p} ")).unwrap_or_default();
            let array = m
                .array_size
                .as_ref()
                .map(|s| format!("[{s}]"))
                .unwrap_or_default();
            format!("uniform {precision}{} {}{array};", m.ty, m.name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rename calls like `texture(tex, uv)` to `texture2D(tex, uv)` based on the sampler type.
/// Returns `true` if the lod extension is needed.
fn remap_texture_functions(
    text: &str,
    stage: Stage,
    defines: &[Define],
    diagnostics: &mut Diagnostics,
) -> Result<(String, bool), CompileError> {
    let cursor = Cursor::new(text);
    let tokens = cursor.tokens();
    let functions = find_functions(text);

    let mut uses_lod = false;
    let mut edits = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        let name = cursor.text(*token);
        if token.kind != TokenKind::Identifier
            || !TEXTURE_FUNCTIONS.contains(&name)
            || !tokens.get(i + 1).is_some_and(|t| t.is_punct(text, '('))
        {
            continue;
        }
        let Some(sampler) = tokens
            .get(i + 2)
            .filter(|t| t.kind == TokenKind::Identifier)
            .map(|t| cursor.text(*t))
        else {
            continue;
        };

        let scope = functions
            .iter()
            .find(|f| f.contains(token.beg))
            .map(|f| f.beg..f.end);
        let dimension = scope
            .and_then(|scope| sampler_type(&cursor, scope, sampler))
            .or_else(|| sampler_type(&cursor, 0..text.len(), sampler))
            .or_else(|| {
                // The sampler may be a define selecting one of several samplers.
                defines
                    .iter()
                    .filter(|d| d.name == sampler)
                    .flat_map(|d| d.options.iter().flatten())
                    .find_map(|option| sampler_type(&cursor, 0..text.len(), option))
            })
            .and_then(sampler_dimension);

        let Some(dimension) = dimension else {
            diagnostics.error_at(
                ErrorCode::UnresolvedSampler,
                format!("unable to determine the sampler type of {sampler} for {name}"),
                Some(line_of(text, token.beg)),
            )?;
            continue;
        };

        let suffix = &name["texture".len()..];
        let needs_ext =
            stage == Stage::Fragment && (suffix.ends_with("Lod") || suffix.ends_with("Grad"));
        uses_lod |= needs_ext;
        let ext = if needs_ext { "EXT" } else { "" };
        edits.push((token.beg..token.end, format!("texture{dimension}{suffix}{ext}")));
    }

    Ok((replace_ranges(text, edits), uses_lod))
}

/// The type of the sampler `name` declared in `range`.
fn sampler_type<'a>(cursor: &Cursor<'a>, range: Range<usize>, name: &str) -> Option<&'a str> {
    cursor.tokens().windows(2).find_map(|w| {
        let ty = cursor.text(w[0]);
        (range.contains(&w[0].beg)
            && w[0].kind == TokenKind::Identifier
            && ty.starts_with("sampler")
            && w[1].is_ident(cursor.source(), name))
        .then_some(ty)
    })
}

fn sampler_dimension(ty: &str) -> Option<&'static str> {
    let dims = ty.strip_prefix("sampler")?;
    ["2D", "Cube", "3D"]
        .into_iter()
        .find(|d| dims == *d || dims == format!("{d}Shadow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::defines::DefineType;

    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn transcode(text: &str, stage: Stage) -> Result<Transcoded, ErrorCode> {
        let mut diagnostics = Diagnostics::new("test", true);
        transcode_gles1(text, stage, &[], &mut diagnostics).map_err(|e| e.code)
    }

    #[test]
    fn transcode_vertex() {
        let text = indoc! {"
            precision highp float;
            layout(location = 0) in vec3 a_position;
            in vec2 a_uv;
            flat out highp vec2 v_uv;
            layout(std140) uniform Constants {
              mat4 cc_matWorld;
              vec4 unusedTint;
            };
            layout(binding = 1) uniform sampler2D heightMap;
            void main() {
              v_uv = a_uv;
              float h = textureLod(heightMap, a_uv, 0.0).r;
              gl_Position = cc_matWorld * vec4(a_position + h, 1.0);
            }
        "};
        assert_eq!(
            Ok(Transcoded {
                text: indoc! {"
                    precision highp float;
                    attribute vec3 a_position;
                    attribute vec2 a_uv;
                    varying highp vec2 v_uv;
                    uniform mat4 cc_matWorld;
                    uniform sampler2D heightMap;
                    void main() {
                      v_uv = a_uv;
                      float h = texture2DLod(heightMap, a_uv, 0.0).r;
                      gl_Position = cc_matWorld * vec4(a_position + h, 1.0);
                    }
                "}
                .to_string(),
                extensions: Vec::new()
            }),
            transcode(text, Stage::Vertex)
        );
    }

    #[test]
    fn single_fragment_output() {
        let text = indoc! {"
            in vec2 v_uv;
            uniform sampler2D mainTexture;
            layout(location = 0) out vec4 o_color;
            void frag(vec2 uv) {
              o_color = texture(mainTexture, uv);
            }
        "};
        let result = transcode(text, Stage::Fragment).unwrap();
        assert_eq!(
            indoc! {"
                varying vec2 v_uv;
                uniform sampler2D mainTexture;

                void frag(vec2 uv) {
                  gl_FragColor = texture2D(mainTexture, uv);
                }
            "},
            result.text
        );
        assert!(result.extensions.is_empty());
    }

    #[test]
    fn multiple_fragment_outputs() {
        let text = indoc! {"
            uniform samplerCube env;
            layout(location = 0) out vec4 albedo;
            layout(location = 1) out vec4 normal;
            void main() {
              albedo = textureLod(env, vec3(1.0), 2.0);
              normal = vec4(0.0);
            }
        "};
        let result = transcode(text, Stage::Fragment).unwrap();
        assert_eq!(
            indoc! {"
                uniform samplerCube env;


                void main() {
                  gl_FragData[0] = textureCubeLodEXT(env, vec3(1.0), 2.0);
                  gl_FragData[1] = vec4(0.0);
                }
            "},
            result.text
        );
        assert_eq!(
            vec![
                ExtensionRequest::require(DRAW_BUFFERS),
                ExtensionRequest::enable(TEXTURE_LOD)
            ],
            result.extensions
        );
    }

    #[test]
    fn output_without_location() {
        assert_eq!(
            Err(ErrorCode::MissingOutputLocation),
            transcode("out vec4 color;\nvoid main() { color = vec4(1.0); }", Stage::Fragment)
        );
    }

    #[test]
    fn sampler_from_function_scope() {
        let text = indoc! {"
            vec4 sampleCube(samplerCube tex, vec3 dir) {
              return texture(tex, dir);
            }
            vec4 sample2D(sampler2D tex, vec2 uv) {
              return texture(tex, uv);
            }
        "};
        let result = transcode(text, Stage::Fragment).unwrap();
        assert_eq!(
            indoc! {"
                vec4 sampleCube(samplerCube tex, vec3 dir) {
                  return textureCube(tex, dir);
                }
                vec4 sample2D(sampler2D tex, vec2 uv) {
                  return texture2D(tex, uv);
                }
            "},
            result.text
        );
    }

    #[test]
    fn sampler_from_define_options() {
        let text = indoc! {"
            uniform sampler2D albedoMap;
            uniform sampler2D normalMap;
            vec4 f(vec2 uv) { return texture(SAMPLE_MAP, uv); }
        "};
        let defines = [Define {
            name: "SAMPLE_MAP".into(),
            ty: DefineType::String,
            range: None,
            options: Some(vec!["albedoMap".into(), "normalMap".into()]),
            default: None,
            defines: Vec::new(),
            editor: None,
        }];
        let mut diagnostics = Diagnostics::new("test", true);
        let result = transcode_gles1(text, Stage::Fragment, &defines, &mut diagnostics).unwrap();
        assert!(result.text.contains("texture2D(SAMPLE_MAP, uv)"));
    }

    #[test]
    fn unresolved_sampler() {
        assert_eq!(
            Err(ErrorCode::UnresolvedSampler),
            transcode("vec4 f(vec2 uv) { return texture(missing, uv); }", Stage::Fragment)
        );
    }

    #[test]
    fn flatten_only_used_members() {
        let text = indoc! {"
            uniform Constants {
              vec4 used;
              vec4 unused;
            };
            void main() { gl_FragColor = used; }
        "};
        let result = transcode(text, Stage::Fragment).unwrap();
        assert_eq!(
            "uniform vec4 used;\nvoid main() { gl_FragColor = used; }\n",
            result.text
        );
    }
}
