//! Compile the shader stages of a pass for every supported GLSL dialect.
//!
//! Each stage is reduced to a base text with includes, macros, and unused functions resolved.
//! Reflection runs once on the GLSL 4.60 rendition of the base text,
//! so all dialects share the same bindings and locations.
//! Each dialect then renders its own declarations from the same base text.
use indexmap::{IndexMap, IndexSet};
use log::{debug, info};
use serde::Serialize;
use smol_str::SmolStr;
use strum::IntoEnumIterator;

use crate::{
    bindings::{allocate_bindings, decorate_bindings, decorate_block_memory_layouts},
    chunks::{resolve_includes, ChunkLibrary, ChunkProvider},
    dead_code::{eliminate_dead_code, find_functions},
    defines::{merge_defines, scan_defines, Define, DefineType},
    diagnostics::{CompileError, Diagnostic, Diagnostics, ErrorCode},
    hash::hash_sources,
    layout::uniform_vectors,
    macros::expand_macros,
    params::{extract_params, Category, Descriptor, Rate, ShaderInfo, Stage, StageFlags},
    subpass::expand_subpass,
    tags::{apply_tags, strip_effect_pragmas},
    tokens::{is_ident_char, strip_comments},
    transcode::transcode_gles1,
    validate::{check_backend, check_static, check_syntax, numbered_source, ShaderBackend},
    version::{collect_extension_pragmas, downlevel, prepend_extensions},
};

/// The GLSL versions generated for each pass from highest to lowest.
pub const DIALECTS: [u32; 3] = [460, 300, 100];

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderSource {
    /// The name used in diagnostics like `standard-vs`.
    pub name: String,
    pub source: String,
    /// The function called by the generated `main` if not `main` itself.
    pub entry: String,
}

impl ShaderSource {
    pub fn new(name: &str, source: &str) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            entry: "main".to_string(),
        }
    }

    pub fn with_entry(self, entry: &str) -> Self {
        Self {
            entry: entry.to_string(),
            ..self
        }
    }
}

/// The shaders of a graphics or compute pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PassSource {
    pub name: String,
    pub vert: Option<ShaderSource>,
    pub frag: Option<ShaderSource>,
    pub compute: Option<ShaderSource>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    /// The name used in diagnostics like `<effect>.effect`.
    pub effect_name: String,
    /// Abort on the first error instead of only reporting it.
    /// Fatal errors always abort.
    pub throw_on_error: bool,
    pub skip_ast_check: bool,
    pub skip_backend_check: bool,
    /// Log the generated GLSL ES 1.00 sources with line numbers.
    pub dump_source: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            effect_name: "unnamed".to_string(),
            throw_on_error: true,
            skip_ast_check: false,
            skip_backend_check: false,
            dump_source: false,
        }
    }
}

/// The generated source for each stage of one dialect.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct StageSources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute: Option<String>,
}

impl StageSources {
    pub fn get(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::Vertex => self.vert.as_deref(),
            Stage::Fragment => self.frag.as_deref(),
            Stage::Compute => self.compute.as_deref(),
        }
    }

    fn set(&mut self, stage: Stage, source: String) {
        match stage {
            Stage::Vertex => self.vert = Some(source),
            Stage::Fragment => self.frag = Some(source),
            Stage::Compute => self.compute = Some(source),
        }
    }
}

/// Names of engine provided resources.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltinNames {
    pub blocks: Vec<SmolStr>,
    pub sampler_textures: Vec<SmolStr>,
    pub buffers: Vec<SmolStr>,
    pub images: Vec<SmolStr>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Builtins {
    /// Resources updated once per pass.
    pub globals: BuiltinNames,
    /// Resources updated per draw or instance.
    pub locals: BuiltinNames,
    /// Uniform vector usage per stage.
    pub statistics: IndexMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledPass {
    pub name: String,
    pub hash: u32,
    pub glsl4: StageSources,
    pub glsl3: StageSources,
    pub glsl1: StageSources,
    pub builtins: Builtins,
    /// Defines used by conditional compilation excluding runtime constants.
    pub defines: Vec<Define>,
    /// Resources indexed by [Rate].
    /// The pass bucket is supplied by the render pass and not by materials.
    pub descriptors: [ShaderInfo; 4],
    pub attributes: Vec<Descriptor>,
    pub varyings: Vec<Descriptor>,
    pub frag_colors: Vec<Descriptor>,
    /// The names of all included chunks.
    pub record: IndexSet<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Compile every stage of `pass` for each of the [DIALECTS].
pub fn compile_pass(
    library: &ChunkLibrary,
    provider: &mut dyn ChunkProvider,
    backend: &mut dyn ShaderBackend,
    options: &CompileOptions,
    pass: &PassSource,
) -> Result<CompiledPass, CompileError> {
    let mut diagnostics = Diagnostics::new(&options.effect_name, options.throw_on_error);
    diagnostics.set_shader(&pass.name);

    let shaders = pass_stages(pass, &mut diagnostics)?;

    let mut record = IndexSet::new();
    let mut defines = Vec::new();
    let mut info = ShaderInfo::default();
    let mut bases = Vec::new();
    for (stage, shader) in shaders {
        diagnostics.set_shader(&shader.name);
        let base = base_source(library, provider, stage, shader, &mut record, &mut diagnostics)?;
        merge_defines(&mut defines, scan_defines(&base));
        reflect(&base, stage, &mut info, &mut diagnostics)?;
        bases.push((stage, shader, base));
    }

    diagnostics.set_shader(&pass.name);
    allocate_bindings(&mut info, &mut diagnostics)?;
    assign_rates(&mut info);

    let mut outputs: [StageSources; 3] = Default::default();
    for (stage, shader, base) in &bases {
        diagnostics.set_shader(&shader.name);
        for (version, output) in DIALECTS.iter().zip(&mut outputs) {
            // GLSL ES 1.00 has no compute shaders.
            if *version < 300 && *stage == Stage::Compute {
                continue;
            }
            let text = render_dialect(base, *stage, *version, &info, &defines, &mut diagnostics)?;
            output.set(*stage, text);
        }
    }
    let [glsl4, glsl3, glsl1] = outputs;

    for (stage, shader, _) in &bases {
        diagnostics.set_shader(&shader.name);
        if let Some(source) = glsl1.get(*stage) {
            if options.dump_source {
                info!("{}:\n{}", shader.name, numbered_source(source));
            }
            check_static(source, *stage, &mut diagnostics)?;
            if !options.skip_ast_check {
                check_syntax(source, &mut diagnostics)?;
            }
        }
    }
    if !options.skip_backend_check {
        if let (Some(vert), Some(frag)) = (&glsl1.vert, &glsl1.frag) {
            diagnostics.set_shader(&pass.name);
            check_backend(backend, vert, frag, &mut diagnostics)?;
        }
    }

    let hash = hash_sources(
        [&glsl4, &glsl3, &glsl1]
            .into_iter()
            .flat_map(|s| [s.vert.as_deref(), s.frag.as_deref(), s.compute.as_deref()])
            .flatten(),
    );

    // Constants are still available to the generated code.
    defines.retain(|d| d.ty != DefineType::Constant);

    Ok(CompiledPass {
        name: pass.name.clone(),
        hash,
        glsl4,
        glsl3,
        glsl1,
        builtins: builtins(&info),
        defines,
        descriptors: partition_by_rate(&info),
        attributes: info.attributes,
        varyings: info.varyings,
        frag_colors: info.frag_colors,
        record,
        diagnostics: diagnostics.into_messages(),
    })
}

fn pass_stages<'a>(
    pass: &'a PassSource,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<(Stage, &'a ShaderSource)>, CompileError> {
    let graphics: Vec<_> = [(Stage::Vertex, &pass.vert), (Stage::Fragment, &pass.frag)]
        .into_iter()
        .filter_map(|(stage, shader)| shader.as_ref().map(|s| (stage, s)))
        .collect();

    match (graphics.is_empty(), &pass.compute) {
        (false, Some(_)) => Err(diagnostics.fatal(
            ErrorCode::MixedStages,
            "graphics and compute shaders can't be combined in one pass",
        )),
        (true, Some(compute)) => Ok(vec![(Stage::Compute, compute)]),
        (false, None) => Ok(graphics),
        (true, None) => Err(diagnostics.fatal(ErrorCode::MixedStages, "pass has no shaders")),
    }
}

/// Resolve includes, macros, and unused functions.
fn base_source(
    library: &ChunkLibrary,
    provider: &mut dyn ChunkProvider,
    stage: Stage,
    shader: &ShaderSource,
    record: &mut IndexSet<String>,
    diagnostics: &mut Diagnostics,
) -> Result<String, CompileError> {
    let resolved = resolve_includes(&shader.source, library, provider, diagnostics)?;
    record.extend(resolved.record);

    let text = strip_comments(&resolved.text);
    let text = expand_macros(&text, diagnostics);
    let text = wrap_entry(&text, stage, &shader.entry);
    let eliminated = eliminate_dead_code(&text, &shader.entry, diagnostics);
    debug!(
        "{}: {} functions after dead code elimination",
        shader.name,
        eliminated.functions.len()
    );
    Ok(eliminated.text)
}

/// Append a `main` that calls `entry` and writes its result.
fn wrap_entry(text: &str, stage: Stage, entry: &str) -> String {
    if entry == "main" {
        return text.to_string();
    }
    let functions = find_functions(text);
    let Some(function) = functions.iter().find(|f| f.name == entry) else {
        // Dead code elimination reports the missing entry.
        return text.to_string();
    };

    let main = match (stage, function.return_type.as_str()) {
        (Stage::Vertex, "vec4") => format!("void main() {{ gl_Position = {entry}(); }}"),
        (Stage::Fragment, "vec4") => format!(
            "layout(location = 0) out vec4 cc_FragColor;\n\
             void main() {{ cc_FragColor = {entry}(); }}"
        ),
        _ => format!("void main() {{ {entry}(); }}"),
    };
    format!("{}\n{main}\n", text.trim_end())
}

/// Add the declarations of `base` to `info`.
fn reflect(
    base: &str,
    stage: Stage,
    info: &mut ShaderInfo,
    diagnostics: &mut Diagnostics,
) -> Result<(), CompileError> {
    let text = expand_subpass(base, 460, diagnostics)?;
    let text = downlevel(&text, 460);
    let functions = find_functions(&text);
    let params = extract_params(&text, stage, &functions, diagnostics)?;
    info.add_params(&params, diagnostics)?;
    apply_tags(&text, info, diagnostics);
    Ok(())
}

fn render_dialect(
    base: &str,
    stage: Stage,
    version: u32,
    info: &ShaderInfo,
    defines: &[Define],
    diagnostics: &mut Diagnostics,
) -> Result<String, CompileError> {
    // Statements were already validated during reflection.
    let text = expand_subpass(base, version, &mut Diagnostics::silent())?;
    let text = downlevel(&text, version);

    let mut extensions = if version == DIALECTS[0] {
        collect_extension_pragmas(&text, version, diagnostics)
    } else {
        collect_extension_pragmas(&text, version, &mut Diagnostics::silent())
    };

    let text = if version < 300 {
        let transcoded = transcode_gles1(&text, stage, defines, diagnostics)?;
        extensions.extend(transcoded.extensions);
        transcoded.text
    } else {
        let text = decorate_block_memory_layouts(&text, stage, info, version)?;
        decorate_bindings(&text, stage, info, version)?
    };

    let text = strip_effect_pragmas(&text);
    Ok(tidy_blank_lines(&prepend_extensions(&text, &extensions)))
}

/// Collapse runs of blank lines left behind by removed declarations.
fn tidy_blank_lines(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() && lines.last().is_none_or(|l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    let mut output = lines.join("\n");
    output.push('\n');
    output
}

/// Names like `cc_time` or `CCGlobal` provided by the engine.
fn is_builtin(name: &str) -> bool {
    name.len() > 2
        && name[..2].eq_ignore_ascii_case("cc")
        && name[2..].chars().all(is_ident_char)
}

fn default_rate(descriptor: &Descriptor) -> Rate {
    if is_builtin(&descriptor.name) {
        match descriptor.tags.get("builtin").map(|t| t.as_str()) {
            Some("local") => Rate::Instance,
            _ => Rate::Pass,
        }
    } else {
        Rate::Batch
    }
}

fn assign_rates(info: &mut ShaderInfo) {
    for category in Category::iter().filter(|c| !c.uses_location()) {
        for descriptor in info.list_mut(category) {
            descriptor.rate = Some(descriptor.rate.unwrap_or_else(|| default_rate(descriptor)));
        }
    }
}

fn partition_by_rate(info: &ShaderInfo) -> [ShaderInfo; 4] {
    let mut buckets: [ShaderInfo; 4] = Default::default();
    for (category, descriptor) in info.iter().filter(|(c, _)| !c.uses_location()) {
        let rate = descriptor.rate.unwrap_or(Rate::Batch);
        buckets[rate as usize]
            .list_mut(category)
            .push(descriptor.clone());
    }
    buckets
}

fn builtins(info: &ShaderInfo) -> Builtins {
    let mut builtins = Builtins::default();
    for (category, descriptor) in info.iter().filter(|(_, d)| is_builtin(&d.name)) {
        let names = if descriptor.rate == Some(Rate::Pass) {
            &mut builtins.globals
        } else {
            &mut builtins.locals
        };
        let list = match category {
            Category::Block => &mut names.blocks,
            Category::SamplerTexture => &mut names.sampler_textures,
            Category::Buffer => &mut names.buffers,
            Category::Image => &mut names.images,
            _ => continue,
        };
        list.push(descriptor.name.clone());
    }

    for (name, stage) in [
        ("CC_EFFECT_USED_VERTEX_UNIFORM_VECTORS", StageFlags::VERTEX),
        ("CC_EFFECT_USED_FRAGMENT_UNIFORM_VECTORS", StageFlags::FRAGMENT),
        ("CC_EFFECT_USED_COMPUTE_UNIFORM_VECTORS", StageFlags::COMPUTE),
    ] {
        let vectors = info
            .blocks
            .iter()
            .filter(|b| b.stage_flags.contains(stage))
            .flat_map(|b| &b.members)
            .map(uniform_vectors)
            .sum();
        builtins.statistics.insert(name.to_string(), vectors);
    }
    builtins
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{chunks::NoChunkProvider, validate::NullBackend};

    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn options() -> CompileOptions {
        CompileOptions {
            effect_name: "test".to_string(),
            skip_ast_check: true,
            ..Default::default()
        }
    }

    fn compile(library: &ChunkLibrary, pass: &PassSource) -> Result<CompiledPass, CompileError> {
        compile_pass(library, &mut NoChunkProvider, &mut NullBackend, &options(), pass)
    }

    fn fragment_pass(frag: &str) -> PassSource {
        PassSource {
            name: "unlit".to_string(),
            frag: Some(ShaderSource::new("unlit-fs", frag)),
            ..Default::default()
        }
    }

    const UNLIT_FRAG: &str = indoc! {"
        precision highp float;
        in vec2 v_uv;
        uniform sampler2D mainTexture;
        layout(location = 0) out vec4 o_color;
        vec4 unused() { return vec4(0.0); }
        void main() {
          o_color = texture(mainTexture, v_uv);
        }
    "};

    #[test]
    fn single_fragment_output() {
        let pass = compile(&ChunkLibrary::new(), &fragment_pass(UNLIT_FRAG)).unwrap();

        assert_eq!(
            indoc! {"
                precision highp float;
                varying vec2 v_uv;
                uniform sampler2D mainTexture;

                void main() {
                  gl_FragColor = texture2D(mainTexture, v_uv);
                }
            "},
            pass.glsl1.frag.as_deref().unwrap()
        );
        assert_eq!(
            indoc! {"
                precision highp float;
                layout(location = 0) in vec2 v_uv;
                layout(binding = 0) uniform sampler2D mainTexture;
                layout(location = 0) out vec4 o_color;
                void main() {
                  o_color = texture(mainTexture, v_uv);
                }
            "},
            pass.glsl4.frag.as_deref().unwrap()
        );
        assert_eq!(
            indoc! {"
                precision highp float;
                in vec2 v_uv;
                uniform sampler2D mainTexture;
                layout(location = 0) out vec4 o_color;
                void main() {
                  o_color = texture(mainTexture, v_uv);
                }
            "},
            pass.glsl3.frag.as_deref().unwrap()
        );
        assert!(pass.glsl1.vert.is_none());

        let textures = &pass.descriptors[Rate::Batch as usize].sampler_textures;
        assert_eq!(1, textures.len());
        assert_eq!("mainTexture", textures[0].name);
        assert_eq!(Some(0), textures[0].binding);
        assert_eq!("o_color", pass.frag_colors[0].name);
        assert!(pass.diagnostics.is_empty());
    }

    #[test]
    fn hash_stability() {
        let library = ChunkLibrary::new();
        let first = compile(&library, &fragment_pass(UNLIT_FRAG)).unwrap();
        let second = compile(&library, &fragment_pass(UNLIT_FRAG)).unwrap();
        assert_eq!(first.hash, second.hash);

        let modified = UNLIT_FRAG.replace("v_uv);", "v_uv );");
        let third = compile(&library, &fragment_pass(&modified)).unwrap();
        assert_ne!(first.hash, third.hash);
    }

    #[test]
    fn mixed_stages() {
        let pass = PassSource {
            name: "mixed".to_string(),
            frag: Some(ShaderSource::new("fs", "void main() {}")),
            compute: Some(ShaderSource::new("cs", "void main() {}")),
            ..Default::default()
        };
        let error = compile(&ChunkLibrary::new(), &pass).unwrap_err();
        assert_eq!(ErrorCode::MixedStages, error.code);
    }

    #[test]
    fn rates_and_builtins() {
        let vert = indoc! {"
            precision highp float;
            in vec3 a_position;
            #pragma builtin(global)
            uniform CCGlobal { mat4 cc_matViewProj; };
            #pragma builtin(local)
            uniform CCLocal { mat4 cc_matWorld; };
            uniform Constants { vec4 tint; float scale; };
            #pragma rate Constants instance
            out vec4 v_color;
            void main() {
              v_color = tint * scale;
              gl_Position = cc_matViewProj * cc_matWorld * vec4(a_position, 1.0);
            }
        "};
        let frag = indoc! {"
            precision highp float;
            in vec4 v_color;
            uniform Material { vec4 albedo; };
            layout(location = 0) out vec4 o_color;
            void main() { o_color = v_color * albedo; }
        "};
        let pass = PassSource {
            name: "lit".to_string(),
            vert: Some(ShaderSource::new("lit-vs", vert)),
            frag: Some(ShaderSource::new("lit-fs", frag)),
            compute: None,
        };
        let pass = compile(&ChunkLibrary::new(), &pass).unwrap();

        let names = |rate: Rate| -> Vec<_> {
            pass.descriptors[rate as usize]
                .blocks
                .iter()
                .map(|b| (b.name.as_str(), b.binding))
                .collect()
        };
        assert_eq!(vec![("CCLocal", Some(1)), ("Constants", Some(2))], names(Rate::Instance));
        assert_eq!(vec![("Material", Some(3))], names(Rate::Batch));
        assert!(names(Rate::Phase).is_empty());
        assert_eq!(vec![("CCGlobal", Some(0))], names(Rate::Pass));

        assert_eq!(vec![SmolStr::from("CCGlobal")], pass.builtins.globals.blocks);
        assert_eq!(vec![SmolStr::from("CCLocal")], pass.builtins.locals.blocks);
        assert_eq!(
            IndexMap::from([
                ("CC_EFFECT_USED_VERTEX_UNIFORM_VECTORS".to_string(), 10),
                ("CC_EFFECT_USED_FRAGMENT_UNIFORM_VECTORS".to_string(), 1),
                ("CC_EFFECT_USED_COMPUTE_UNIFORM_VECTORS".to_string(), 0),
            ]),
            pass.builtins.statistics
        );

        assert_eq!("v_color", pass.varyings[0].name);
        assert_eq!(StageFlags::VERTEX | StageFlags::FRAGMENT, pass.varyings[0].stage_flags);

        let glsl1 = pass.glsl1.vert.as_deref().unwrap();
        assert!(glsl1.contains("uniform mat4 cc_matViewProj;"));
        assert!(glsl1.contains("attribute vec3 a_position;"));
        assert!(!glsl1.contains("#pragma"));
    }

    #[test]
    fn wrap_entry_functions() {
        let vert = indoc! {"
            precision highp float;
            in vec3 a_position;
            vec4 vert() { return vec4(a_position, 1.0); }
        "};
        let frag = "precision highp float;\nvec4 frag() { return vec4(1.0); }\n";
        let pass = PassSource {
            name: "entry".to_string(),
            vert: Some(ShaderSource::new("entry-vs", vert).with_entry("vert")),
            frag: Some(ShaderSource::new("entry-fs", frag).with_entry("frag")),
            compute: None,
        };
        let pass = compile(&ChunkLibrary::new(), &pass).unwrap();

        assert!(pass
            .glsl4
            .vert
            .as_deref()
            .unwrap()
            .contains("void main() { gl_Position = vert(); }"));
        assert_eq!(
            indoc! {"
                precision highp float;
                vec4 frag() { return vec4(1.0); }

                void main() { gl_FragColor = frag(); }
            "},
            pass.glsl1.frag.as_deref().unwrap()
        );
        assert_eq!("cc_FragColor", pass.frag_colors[0].name);
    }

    #[test]
    fn includes_and_defines() {
        let mut library = ChunkLibrary::new();
        library.add_chunk("common/color", "vec4 tint(vec4 c) { return c * 0.5; }\n");
        let frag = indoc! {"
            precision highp float;
            #include <common/color>
            #pragma define-meta CC_USE_HDR constant
            layout(location = 0) out vec4 o_color;
            void main() {
            #if USE_TINT
              o_color = tint(vec4(1.0));
            #else
              o_color = vec4(1.0);
            #endif
            #if CC_USE_HDR
              o_color *= 2.0;
            #endif
            }
        "};
        let pass = compile(&library, &fragment_pass(frag)).unwrap();

        assert_eq!(IndexSet::from(["common/color".to_string()]), pass.record);
        let defines: Vec<_> = pass.defines.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(vec!["USE_TINT"], defines);
        assert!(pass.glsl4.frag.as_deref().unwrap().contains("vec4 tint(vec4 c)"));
        assert!(pass.glsl1.frag.as_deref().unwrap().contains("#if CC_USE_HDR"));
    }

    #[test]
    fn compute_pass() {
        let compute = indoc! {"
            layout(local_size_x = 8) in;
            layout(std430) buffer Particles { vec4 positions[]; };
            void main() { positions[gl_GlobalInvocationID.x] = vec4(0.0); }
        "};
        let pass = PassSource {
            name: "particles".to_string(),
            compute: Some(ShaderSource::new("particles-cs", compute)),
            ..Default::default()
        };
        let pass = compile(&ChunkLibrary::new(), &pass).unwrap();

        assert!(pass
            .glsl4
            .compute
            .as_deref()
            .unwrap()
            .contains("layout(std430, binding = 0) buffer Particles"));
        assert!(pass.glsl1.compute.is_none());
        let buffers = &pass.descriptors[Rate::Batch as usize].buffers;
        assert_eq!(StageFlags::COMPUTE, buffers[0].stage_flags);
    }
}
