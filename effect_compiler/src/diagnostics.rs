use log::{error, warn};
use serde::Serialize;
use thiserror::Error;

/// Stable diagnostic codes displayed as `EFXnnnn`.
///
/// Each code identifies exactly one violated rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum ErrorCode {
    /// An `#include` could not be resolved.
    ChunkNotFound = 2001,
    /// A functional macro references itself.
    RecursiveMacro = 2002,
    DeprecatedChunk = 2003,
    DeprecatedIdentifier = 2004,
    /// A functional macro call has the wrong number of arguments.
    MacroArgumentCount = 2005,
    /// A non opaque uniform is declared outside of a uniform block.
    UniformOutsideBlock = 2201,
    /// Array lengths must be constant expressions.
    NonConstantArrayLength = 2202,
    /// Array elements in std140 blocks must be 16 byte aligned.
    ArrayAlignment = 2203,
    /// A vec3 member must be followed by a 4 byte scalar.
    Vec3Member = 2204,
    /// Members must not introduce implicit padding.
    ImplicitPadding = 2205,
    /// Preprocessor directives are not allowed in blocks.
    DirectiveInBlock = 2206,
    /// Declarations with the same name have different members.
    InconsistentDeclaration = 2207,
    /// Opaque types are not allowed in blocks.
    OpaqueTypeInBlock = 2208,
    /// Only 4x4 matrices are allowed in blocks.
    NonSquareMatrix = 2210,
    /// Struct members are not allowed in blocks.
    StructMember = 2211,
    UnknownRate = 2212,
    /// The sampler type for a texture call could not be determined.
    UnresolvedSampler = 2300,
    /// Fragment outputs need an explicit location.
    MissingOutputLocation = 2302,
    /// An `#extension` appears after a precision declaration.
    ExtensionAfterPrecision = 2400,
    MissingPrecision = 2401,
    ReservedKeyword = 2402,
    /// The entry function could not be found.
    MissingEntry = 2403,
    /// The final source failed to parse.
    ParseFailed = 2404,
    InvalidExtensionCondition = 2405,
    CompileFailed = 2406,
    LinkFailed = 2407,
    InvalidSubpassStatement = 2410,
    /// A subpass attachment type does not support the requested inout.
    SubpassInOutMismatch = 2411,
    BlockBinding = 2601,
    SamplerTextureBinding = 2602,
    SamplerBinding = 2603,
    TextureBinding = 2604,
    BufferBinding = 2605,
    ImageBinding = 2606,
    SubpassInputBinding = 2607,
    /// Graphics and compute stages can't be combined in one pass.
    MixedStages = 2700,
}

impl ErrorCode {
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EFX{}", self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Warning,
    Error,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Warning => write!(f, "warning"),
            Level::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub level: Level,
    pub code: ErrorCode,
    pub message: String,
    pub line: Option<usize>,
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct CompileError {
    pub code: ErrorCode,
    /// The fully formatted message including the effect and shader names.
    pub message: String,
}

/// Collects warnings and errors for a single compile.
///
/// Messages are formatted like `<effect>.effect - <shader> - <line>: <level> <code>: <message>`
/// and also forwarded to the [log] macros.
#[derive(Debug)]
pub struct Diagnostics {
    effect_name: String,
    shader_name: String,
    throw_on_error: bool,
    quiet: bool,
    messages: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new(effect_name: &str, throw_on_error: bool) -> Self {
        Self {
            effect_name: effect_name.to_string(),
            shader_name: String::new(),
            throw_on_error,
            quiet: false,
            messages: Vec::new(),
        }
    }

    /// A sink that never aborts or logs.
    /// Rewrite passes use this when rescanning text that was already validated.
    pub fn silent() -> Self {
        Self {
            quiet: true,
            ..Self::new("", false)
        }
    }

    pub fn set_shader(&mut self, shader_name: &str) {
        self.shader_name = shader_name.to_string();
    }

    pub fn messages(&self) -> &[Diagnostic] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Diagnostic> {
        self.messages
    }

    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.messages.iter().any(|m| m.code == code)
    }

    pub fn warn(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.warn_at(code, message, None);
    }

    pub fn warn_at(&mut self, code: ErrorCode, message: impl Into<String>, line: Option<usize>) {
        let text = self.record(Level::Warning, code, message.into(), line);
        if !self.quiet {
            warn!("{text}");
        }
    }

    /// Report an error that aborts compilation unless errors were configured to only print.
    pub fn error(
        &mut self,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Result<(), CompileError> {
        self.error_at(code, message, None)
    }

    pub fn error_at(
        &mut self,
        code: ErrorCode,
        message: impl Into<String>,
        line: Option<usize>,
    ) -> Result<(), CompileError> {
        let text = self.record(Level::Error, code, message.into(), line);
        if !self.quiet {
            error!("{text}");
        }
        if self.throw_on_error {
            Err(CompileError {
                code,
                message: text,
            })
        } else {
            Ok(())
        }
    }

    /// Report an error that always aborts compilation.
    pub fn fatal(&mut self, code: ErrorCode, message: impl Into<String>) -> CompileError {
        self.fatal_at(code, message, None)
    }

    pub fn fatal_at(
        &mut self,
        code: ErrorCode,
        message: impl Into<String>,
        line: Option<usize>,
    ) -> CompileError {
        let text = self.record(Level::Error, code, message.into(), line);
        if !self.quiet {
            error!("{text}");
        }
        CompileError {
            code,
            message: text,
        }
    }

    fn record(
        &mut self,
        level: Level,
        code: ErrorCode,
        message: String,
        line: Option<usize>,
    ) -> String {
        let line_text = line.map(|l| l.to_string()).unwrap_or_default();
        let text = format!(
            "{}.effect - {} - {line_text}: {level} {code}: {message}",
            self.effect_name, self.shader_name
        );
        self.messages.push(Diagnostic {
            level,
            code,
            message,
            line,
        });
        text
    }
}
