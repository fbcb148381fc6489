//! Checks for the generated GLSL ES 1.00 sources.
//!
//! Static checks catch the common portability issues.
//! Parsing and compiling with a [ShaderBackend] catch everything else.
use log::debug;

use crate::{
    diagnostics::{CompileError, Diagnostics, ErrorCode},
    params::Stage,
    tokens::{directive, line_of, Cursor, TokenKind},
};

/// Reserved for future use in GLSL ES 1.00 or unsupported by some drivers.
const RESERVED_KEYWORDS: &[&str] = &[
    "asm",
    "class",
    "union",
    "enum",
    "typedef",
    "template",
    "this",
    "packed",
    "goto",
    "switch",
    "default",
    "inline",
    "noinline",
    "volatile",
    "public",
    "static",
    "extern",
    "external",
    "interface",
    "flat",
    "long",
    "short",
    "double",
    "half",
    "fixed",
    "unsigned",
    "superp",
    "input",
    "output",
    "hvec2",
    "hvec3",
    "hvec4",
    "dvec2",
    "dvec3",
    "dvec4",
    "fvec2",
    "fvec3",
    "fvec4",
    "sampler1D",
    "sampler1DShadow",
    "sampler2DRect",
    "sampler3DRect",
    "sampler2DRectShadow",
    "sizeof",
    "cast",
    "namespace",
    "using",
    "texture",
];

/// Check keywords and precision declarations.
pub fn check_static(
    source: &str,
    stage: Stage,
    diagnostics: &mut Diagnostics,
) -> Result<(), CompileError> {
    let cursor = Cursor::new(source);

    let mut precision = None;
    let mut last_extension = None;
    for token in cursor.tokens() {
        match token.kind {
            TokenKind::Preprocessor => {
                if let Some(("extension", _)) = directive(cursor.text(*token)) {
                    last_extension = Some(token.beg);
                }
            }
            TokenKind::Identifier => {
                let word = cursor.text(*token);
                if word == "precision" && precision.is_none() {
                    precision = Some(token.beg);
                } else if RESERVED_KEYWORDS.contains(&word) {
                    diagnostics.error_at(
                        ErrorCode::ReservedKeyword,
                        format!("{word} is a reserved keyword"),
                        Some(line_of(source, token.beg)),
                    )?;
                }
            }
            _ => (),
        }
    }

    match (precision, last_extension) {
        (Some(precision), Some(extension)) if extension > precision => diagnostics.warn_at(
            ErrorCode::ExtensionAfterPrecision,
            "#extension directives should come before precision declarations",
            Some(line_of(source, extension)),
        ),
        (None, _) => diagnostics.warn(
            ErrorCode::MissingPrecision,
            format!("no precision declaration found in {stage} shader"),
        ),
        _ => (),
    }

    Ok(())
}

/// Parse `source` with preprocessor lines removed.
#[cfg(feature = "glsl")]
pub fn check_syntax(source: &str, diagnostics: &mut Diagnostics) -> Result<(), CompileError> {
    use glsl_lang::{ast::TranslationUnit, parse::DefaultParse};

    let source = source
        .split('\n')
        .map(|line| if line.trim_start().starts_with('#') { "" } else { line })
        .collect::<Vec<_>>()
        .join("\n");

    match TranslationUnit::parse(&source) {
        Ok(_) => Ok(()),
        Err(e) => diagnostics.error(ErrorCode::ParseFailed, format!("failed to parse shader: {e}")),
    }
}

#[cfg(not(feature = "glsl"))]
pub fn check_syntax(_source: &str, _diagnostics: &mut Diagnostics) -> Result<(), CompileError> {
    debug!("skipping syntax check without the glsl feature");
    Ok(())
}

/// A driver capable of compiling and linking GLSL ES 1.00 programs.
///
/// Errors contain the driver's info log.
pub trait ShaderBackend {
    fn compile_shader(&mut self, stage: Stage, source: &str) -> Result<(), String>;

    fn link_program(&mut self, vertex: &str, fragment: &str) -> Result<(), String>;
}

/// A backend that accepts every program.
#[derive(Debug, Default)]
pub struct NullBackend;

impl ShaderBackend for NullBackend {
    fn compile_shader(&mut self, _stage: Stage, _source: &str) -> Result<(), String> {
        Ok(())
    }

    fn link_program(&mut self, _vertex: &str, _fragment: &str) -> Result<(), String> {
        Ok(())
    }
}

/// Prefix each line with its 1-based line number.
pub fn numbered_source(source: &str) -> String {
    source
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{}: {line}\n", i + 1))
        .collect()
}

pub fn check_backend(
    backend: &mut dyn ShaderBackend,
    vertex: &str,
    fragment: &str,
    diagnostics: &mut Diagnostics,
) -> Result<(), CompileError> {
    for (stage, source) in [(Stage::Vertex, vertex), (Stage::Fragment, fragment)] {
        if let Err(log) = backend.compile_shader(stage, source) {
            return Err(diagnostics.fatal(
                ErrorCode::CompileFailed,
                format!("failed to compile {stage} shader: {log}\n{}", numbered_source(source)),
            ));
        }
    }

    backend.link_program(vertex, fragment).map_err(|log| {
        diagnostics.fatal(ErrorCode::LinkFailed, format!("failed to link program: {log}"))
    })?;
    debug!("validated program with backend");
    Ok(())
}
