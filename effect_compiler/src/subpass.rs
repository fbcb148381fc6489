//! Framebuffer fetch and input attachment declarations.
//!
//! Statements like `#pragma subpassColor inout highp color` are replaced with
//! declarations appropriate for the target version at the `#pragma subpass` anchor.
use std::cmp::Ordering;

use log::debug;
use smol_str::SmolStr;
use strum::{Display, EnumString};

use crate::{
    diagnostics::{CompileError, Diagnostics, ErrorCode},
    tokens::pragma,
};

pub const FRAMEBUFFER_FETCH: &str = "GL_EXT_shader_framebuffer_fetch";
pub const DEPTH_STENCIL_FETCH: &str = "GL_ARM_shader_framebuffer_fetch_depth_stencil";

/// Attachment types in sorting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, EnumString, Display)]
pub enum AttachmentType {
    Color,
    Depth,
    Stencil,
}

/// Access modes in sorting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Access {
    In,
    InOut,
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubpassStatement {
    /// The `i` or `u` prefix for integer attachments.
    pub prefix: Option<char>,
    pub attachment: AttachmentType,
    pub access: Access,
    pub precision: Option<SmolStr>,
    pub name: SmolStr,
    /// The attachment index in declaration order.
    pub index: usize,
}

impl SubpassStatement {
    fn prefix(&self) -> String {
        self.prefix.map(String::from).unwrap_or_default()
    }

    fn precision(&self) -> String {
        self.precision
            .as_ref()
            .map(|p| format!("{p} "))
            .unwrap_or_default()
    }
}

fn is_anchor(line: &str) -> bool {
    pragma(line).is_some_and(|(name, args)| name == "subpass" && args.is_empty())
}

/// The attachment prefix and type for pragma names like `usubpassStencil`.
fn statement_kind(name: &str) -> Option<(Option<char>, &str)> {
    match name.strip_prefix("subpass") {
        Some(kind) => Some((None, kind)),
        None => {
            let prefix = name.chars().next().filter(|c| matches!(c, 'i' | 'u'))?;
            Some((Some(prefix), name[1..].strip_prefix("subpass")?))
        }
    }
}

/// Parse a single statement, returning `Ok(None)` for unrelated lines.
fn parse_statement(
    line: &str,
    index: usize,
    line_number: usize,
    diagnostics: &mut Diagnostics,
) -> Result<Option<SubpassStatement>, CompileError> {
    let Some((name, args)) = pragma(line) else {
        return Ok(None);
    };
    let Some((prefix, kind)) = statement_kind(name) else {
        return Ok(None);
    };
    if kind.is_empty() {
        return Ok(None);
    }

    let parts: Vec<_> = args.split_whitespace().collect();
    let (access, precision, variable) = match parts[..] {
        [access, precision, variable] => (access, Some(SmolStr::from(precision)), variable),
        [access, variable] => (access, None, variable),
        _ => ("", None, ""),
    };
    let attachment = kind.parse::<AttachmentType>().ok();
    let (Some(attachment), Ok(access)) = (attachment, access.parse::<Access>()) else {
        diagnostics.error_at(
            ErrorCode::InvalidSubpassStatement,
            format!("invalid subpass statement {:?}", line.trim()),
            Some(line_number),
        )?;
        return Ok(None);
    };

    let compatible = match attachment {
        AttachmentType::Color => true,
        AttachmentType::Depth => access == Access::In && prefix.is_none(),
        AttachmentType::Stencil => access == Access::In && matches!(prefix, None | Some('u')),
    };
    if !compatible {
        diagnostics.error_at(
            ErrorCode::SubpassInOutMismatch,
            format!("{name} does not support {access}"),
            Some(line_number),
        )?;
        return Ok(None);
    }

    Ok(Some(SubpassStatement {
        prefix,
        attachment,
        access,
        precision,
        name: variable.into(),
        index,
    }))
}

fn compare_statements(a: &SubpassStatement, b: &SubpassStatement) -> Ordering {
    match (a.access == Access::Out, b.access == Access::Out) {
        (true, true) => a.index.cmp(&b.index),
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        (false, false) => (a.attachment, a.access, &a.name).cmp(&(b.attachment, b.access, &b.name)),
    }
}

/// Collect the subpass statements in `text` in declaration order.
pub fn collect_statements(
    text: &str,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<SubpassStatement>, CompileError> {
    let mut statements = Vec::new();
    for (i, line) in text.split('\n').enumerate() {
        if let Some(statement) = parse_statement(line, statements.len(), i + 1, diagnostics)? {
            statements.push(statement);
        }
    }
    Ok(statements)
}

/// Replace subpass statements with declarations for `version`.
///
/// Declarations are only emitted at the `#pragma subpass` anchor.
/// Statements without an anchor are removed and produce nothing.
pub fn expand_subpass(
    text: &str,
    version: u32,
    diagnostics: &mut Diagnostics,
) -> Result<String, CompileError> {
    let mut statements = collect_statements(text, diagnostics)?;
    if statements.is_empty() {
        return Ok(text.to_string());
    }
    statements.sort_by(compare_statements);

    let declarations = render_statements(&statements, version);
    let lines: Vec<_> = text
        .split('\n')
        .map(|line| {
            if is_anchor(line) {
                declarations.clone()
            } else if is_statement(line) {
                String::new()
            } else {
                line.to_string()
            }
        })
        .collect();

    if !text.split('\n').any(is_anchor) {
        debug!("ignoring {} subpass statements without an anchor", statements.len());
    }
    Ok(lines.join("\n"))
}

fn is_statement(line: &str) -> bool {
    pragma(line)
        .and_then(|(name, _)| statement_kind(name))
        .is_some_and(|(_, kind)| !kind.is_empty())
}

/// Render declarations for statements in their final order.
pub fn render_statements(statements: &[SubpassStatement], version: u32) -> String {
    let mut lines = Vec::new();

    let has_input = statements.iter().any(|s| s.access != Access::Out);
    let has_color_fetch = statements
        .iter()
        .any(|s| s.attachment == AttachmentType::Color && s.access != Access::Out);
    let has_depth_stencil = statements.iter().any(|s| s.attachment != AttachmentType::Color);

    if version < 450 {
        if has_color_fetch {
            lines.push(format!(
                "#pragma extension([{FRAMEBUFFER_FETCH}, __VERSION__ < 450, require])"
            ));
        }
        if has_depth_stencil {
            lines.push(format!(
                "#pragma extension([{DEPTH_STENCIL_FETCH}, __VERSION__ < 450, require])"
            ));
        }
        if has_input {
            lines.push("#define subpassLoad(x) x".to_string());
        }
    }

    for s in statements {
        match version {
            450.. => render_vulkan(s, &mut lines),
            300..=449 => render_gles3(s, &mut lines),
            _ => render_gles1(s, &mut lines),
        }
    }

    lines.join("\n")
}

fn output_declaration(s: &SubpassStatement, qualifier: &str) -> String {
    format!(
        "layout(location = {}) {qualifier} {}{}vec4 {};",
        s.index,
        s.precision(),
        s.prefix(),
        s.name
    )
}

fn input_attachment(s: &SubpassStatement, name: &str) -> String {
    format!(
        "layout(input_attachment_index = {}) uniform {}{}subpassInput {name};",
        s.index,
        s.precision(),
        s.prefix()
    )
}

fn depth_stencil_define(s: &SubpassStatement) -> String {
    match s.attachment {
        AttachmentType::Depth => format!("#define {} gl_LastFragDepthARM", s.name),
        _ => format!("#define {} gl_LastFragStencilARM", s.name),
    }
}

fn render_vulkan(s: &SubpassStatement, lines: &mut Vec<String>) {
    match s.access {
        Access::In => lines.push(input_attachment(s, &s.name)),
        Access::Out => lines.push(output_declaration(s, "out")),
        Access::InOut => {
            lines.push(input_attachment(s, &format!("{}_input", s.name)));
            lines.push(output_declaration(s, "out"));
        }
    }
}

fn render_gles3(s: &SubpassStatement, lines: &mut Vec<String>) {
    match (s.attachment, s.access) {
        (AttachmentType::Color, Access::Out) => lines.push(output_declaration(s, "out")),
        (AttachmentType::Color, Access::In) => lines.push(output_declaration(s, "inout")),
        (AttachmentType::Color, Access::InOut) => {
            lines.push(output_declaration(s, "inout"));
            lines.push(format!("#define {0}_input {0}", s.name));
        }
        _ => lines.push(depth_stencil_define(s)),
    }
}

fn render_gles1(s: &SubpassStatement, lines: &mut Vec<String>) {
    match (s.attachment, s.access) {
        (AttachmentType::Color, Access::Out) => lines.push(output_declaration(s, "out")),
        (AttachmentType::Color, Access::In) => {
            lines.push(format!("#define {} gl_LastFragData[{}]", s.name, s.index))
        }
        (AttachmentType::Color, Access::InOut) => {
            lines.push(output_declaration(s, "out"));
            lines.push(format!("#define {}_input gl_LastFragData[{}]", s.name, s.index));
        }
        _ => lines.push(depth_stencil_define(s)),
    }
}
