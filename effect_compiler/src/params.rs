//! Reflection data for resources declared at global scope.
//!
//! Declarations are found by scanning for `uniform`, `in`, `out`, and `buffer`
//! at the start of top level statements.
//! Each declaration keeps its byte range so later passes can rewrite it in place.
use indexmap::IndexMap;
use serde::Serialize;
use smol_str::SmolStr;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::{
    dead_code::FunctionRecord,
    defines::ConditionStack,
    diagnostics::{CompileError, Diagnostics, ErrorCode},
    expr::evaluate,
    layout::{classify, validate_std140, OpaqueType, TypeClass},
    tokens::{line_of, pragma, split_args, Cursor, TokenKind},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[strum(serialize = "vert")]
    Vertex,
    #[strum(serialize = "frag")]
    Fragment,
    #[strum(serialize = "compute")]
    Compute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct StageFlags(pub u32);

impl StageFlags {
    pub const VERTEX: Self = Self(0x1);
    pub const FRAGMENT: Self = Self(0x10);
    pub const COMPUTE: Self = Self(0x20);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for StageFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for StageFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl From<Stage> for StageFlags {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Vertex => Self::VERTEX,
            Stage::Fragment => Self::FRAGMENT,
            Stage::Compute => Self::COMPUTE,
        }
    }
}

/// How often a resource is updated during rendering.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    EnumString,
    EnumIter,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Rate {
    Instance = 0,
    Batch = 1,
    Phase = 2,
    Pass = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SampleType {
    #[default]
    Float,
    UnfilterableFloat,
    Depth,
    Sint,
    Uint,
}

impl SampleType {
    fn from_type(ty: &str) -> Self {
        if ty.contains("Shadow") {
            Self::Depth
        } else if ty.starts_with("isampler") || ty.starts_with("itexture") {
            Self::Sint
        } else if ty.starts_with("usampler") || ty.starts_with("utexture") {
            Self::Uint
        } else {
            Self::Float
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemoryAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// A member of a uniform or storage block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Member {
    pub name: SmolStr,
    #[serde(rename = "type")]
    pub ty: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<SmolStr>,
    /// The array length as written in the source.
    #[serde(skip)]
    pub array_size: Option<SmolStr>,
    pub count: u32,
}

/// A resource, attribute, varying, or fragment output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub name: SmolStr,
    #[serde(rename = "type")]
    pub ty: SmolStr,
    pub count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<SmolStr>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<Member>,
    pub defines: Vec<SmolStr>,
    pub stage_flags: StageFlags,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_attachment_index: Option<u32>,
    pub sample_type: SampleType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_access: Option<MemoryAccess>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub tags: IndexMap<SmolStr, SmolStr>,
}

impl Descriptor {
    pub fn new(name: &str, ty: &str, stage: Stage) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            count: 1,
            precision: None,
            members: Vec::new(),
            defines: Vec::new(),
            stage_flags: stage.into(),
            rate: None,
            binding: None,
            location: None,
            input_attachment_index: None,
            sample_type: SampleType::from_type(ty),
            memory_access: None,
            tags: IndexMap::new(),
        }
    }
}

/// Descriptor categories in binding allocation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display)]
pub enum Category {
    Block,
    SamplerTexture,
    Sampler,
    Texture,
    Buffer,
    Image,
    SubpassInput,
    Attribute,
    Varying,
    FragColor,
}

impl Category {
    /// Categories assigned a `location` instead of a `binding`.
    pub fn uses_location(self) -> bool {
        matches!(self, Self::Attribute | Self::Varying | Self::FragColor)
    }

    pub fn binding_error(self) -> Option<ErrorCode> {
        match self {
            Self::Block => Some(ErrorCode::BlockBinding),
            Self::SamplerTexture => Some(ErrorCode::SamplerTextureBinding),
            Self::Sampler => Some(ErrorCode::SamplerBinding),
            Self::Texture => Some(ErrorCode::TextureBinding),
            Self::Buffer => Some(ErrorCode::BufferBinding),
            Self::Image => Some(ErrorCode::ImageBinding),
            Self::SubpassInput => Some(ErrorCode::SubpassInputBinding),
            _ => None,
        }
    }
}

impl From<OpaqueType> for Category {
    fn from(value: OpaqueType) -> Self {
        match value {
            OpaqueType::SamplerTexture => Self::SamplerTexture,
            OpaqueType::Sampler => Self::Sampler,
            OpaqueType::Texture => Self::Texture,
            OpaqueType::Image => Self::Image,
            OpaqueType::SubpassInput => Self::SubpassInput,
        }
    }
}

/// A declaration and its location in the text it was extracted from.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    pub beg: usize,
    pub end: usize,
    pub param: Descriptor,
    pub category: Category,
    /// The `layout(...)` qualifiers as key and optional value.
    pub layout: Vec<(SmolStr, Option<SmolStr>)>,
    /// The byte range of `layout(...)` if present.
    pub layout_range: Option<(usize, usize)>,
    /// The byte range of the storage qualifier like `uniform`.
    pub storage_range: (usize, usize),
    pub line: usize,
}

impl ParamInfo {
    pub fn layout_value(&self, key: &str) -> Option<&str> {
        self.layout
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }
}

/// Descriptors for all stages of a pass grouped by category.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShaderInfo {
    pub blocks: Vec<Descriptor>,
    pub sampler_textures: Vec<Descriptor>,
    pub samplers: Vec<Descriptor>,
    pub textures: Vec<Descriptor>,
    pub buffers: Vec<Descriptor>,
    pub images: Vec<Descriptor>,
    pub subpass_inputs: Vec<Descriptor>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Descriptor>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub varyings: Vec<Descriptor>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub frag_colors: Vec<Descriptor>,
}

impl ShaderInfo {
    pub fn list(&self, category: Category) -> &Vec<Descriptor> {
        match category {
            Category::Block => &self.blocks,
            Category::SamplerTexture => &self.sampler_textures,
            Category::Sampler => &self.samplers,
            Category::Texture => &self.textures,
            Category::Buffer => &self.buffers,
            Category::Image => &self.images,
            Category::SubpassInput => &self.subpass_inputs,
            Category::Attribute => &self.attributes,
            Category::Varying => &self.varyings,
            Category::FragColor => &self.frag_colors,
        }
    }

    pub fn list_mut(&mut self, category: Category) -> &mut Vec<Descriptor> {
        match category {
            Category::Block => &mut self.blocks,
            Category::SamplerTexture => &mut self.sampler_textures,
            Category::Sampler => &mut self.samplers,
            Category::Texture => &mut self.textures,
            Category::Buffer => &mut self.buffers,
            Category::Image => &mut self.images,
            Category::SubpassInput => &mut self.subpass_inputs,
            Category::Attribute => &mut self.attributes,
            Category::Varying => &mut self.varyings,
            Category::FragColor => &mut self.frag_colors,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &Descriptor)> {
        Category::iter().flat_map(move |c| self.list(c).iter().map(move |d| (c, d)))
    }

    pub fn find(&self, category: Category, name: &str) -> Option<&Descriptor> {
        self.list(category).iter().find(|d| d.name == name)
    }

    /// All descriptors named `name` in any category.
    pub fn find_all_mut(&mut self, name: &str) -> Vec<&mut Descriptor> {
        let Self {
            blocks,
            sampler_textures,
            samplers,
            textures,
            buffers,
            images,
            subpass_inputs,
            attributes,
            varyings,
            frag_colors,
        } = self;
        [
            blocks,
            sampler_textures,
            samplers,
            textures,
            buffers,
            images,
            subpass_inputs,
            attributes,
            varyings,
            frag_colors,
        ]
        .into_iter()
        .flatten()
        .filter(|d| d.name == name)
        .collect()
    }

    /// Add a descriptor or merge it with an existing declaration with the same name.
    pub fn insert(
        &mut self,
        category: Category,
        descriptor: Descriptor,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), CompileError> {
        let list = self.list_mut(category);
        match list.iter_mut().find(|d| d.name == descriptor.name) {
            Some(existing) => {
                if existing.members != descriptor.members {
                    diagnostics.error(
                        ErrorCode::InconsistentDeclaration,
                        format!(
                            "{} {} is declared with different members",
                            category, descriptor.name
                        ),
                    )?;
                }
                existing.stage_flags |= descriptor.stage_flags;
                existing.binding = existing.binding.or(descriptor.binding);
                existing.location = existing.location.or(descriptor.location);
                for (key, value) in descriptor.tags {
                    existing.tags.entry(key).or_insert(value);
                }
            }
            None => list.push(descriptor),
        }
        Ok(())
    }

    /// Add the declarations for a single stage.
    pub fn add_params(
        &mut self,
        params: &[ParamInfo],
        diagnostics: &mut Diagnostics,
    ) -> Result<(), CompileError> {
        for p in params {
            self.insert(p.category, p.param.clone(), diagnostics)?;
        }
        Ok(())
    }
}

const PRECISIONS: &[&str] = &["highp", "mediump", "lowp"];
const IGNORED_QUALIFIERS: &[&str] = &[
    "flat",
    "smooth",
    "noperspective",
    "centroid",
    "invariant",
    "coherent",
    "volatile",
    "restrict",
];

/// The value of `#pragma builtin(local)` or `#pragma builtin(global)`.
fn builtin_tag(line: &str) -> Option<SmolStr> {
    let (name, args) = pragma(line)?;
    if name != "builtin" {
        return None;
    }
    let value = args.trim().strip_prefix('(')?.strip_suffix(')')?.trim();
    Some(value.into())
}

/// Find the declarations in `text` outside of the function bodies in `functions`.
pub fn extract_params(
    text: &str,
    stage: Stage,
    functions: &[FunctionRecord],
    diagnostics: &mut Diagnostics,
) -> Result<Vec<ParamInfo>, CompileError> {
    let cursor = Cursor::new(text);
    let tokens = cursor.tokens();

    let mut params = Vec::new();
    let mut conditions = ConditionStack::default();
    let mut tags = IndexMap::new();

    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        if let Some(f) = functions.iter().find(|f| f.contains(token.beg)) {
            while i < tokens.len() && tokens[i].beg < f.end {
                i += 1;
            }
            continue;
        }

        match token.kind {
            TokenKind::Preprocessor => {
                let line = cursor.text(token);
                conditions.update(line);
                if let Some(tag) = builtin_tag(line) {
                    tags.insert(SmolStr::from("builtin"), tag);
                }
                i += 1;
            }
            TokenKind::Identifier => {
                let end = statement_end(&cursor, i);
                let mut parser = DeclarationParser {
                    cursor: &cursor,
                    end,
                    stage,
                    diagnostics: &mut *diagnostics,
                };
                if let Some(mut param) = parser.parse(i)? {
                    param.param.defines = conditions.identifiers();
                    param.param.tags.extend(std::mem::take(&mut tags));
                    params.push(param);
                }
                i = if tokens.get(end).is_some_and(|t| t.is_punct(text, ';')) {
                    end + 1
                } else {
                    end
                };
            }
            _ => i += 1,
        }
    }

    Ok(params)
}

/// The index of the `;` ending the statement at `start` or the next top level directive.
fn statement_end(cursor: &Cursor, start: usize) -> usize {
    let tokens = cursor.tokens();
    let mut i = start;
    while i < tokens.len() {
        let token = tokens[i];
        if token.kind == TokenKind::Preprocessor || token.is_punct(cursor.source(), ';') {
            return i;
        }
        if token.is_punct(cursor.source(), '{') {
            i = cursor.matching_close(i).unwrap_or(tokens.len());
        }
        i += 1;
    }
    tokens.len()
}

struct DeclarationParser<'a, 'b> {
    cursor: &'b Cursor<'a>,
    /// The index of the token ending the statement.
    end: usize,
    stage: Stage,
    diagnostics: &'b mut Diagnostics,
}

impl<'a> DeclarationParser<'a, '_> {
    fn text(&self, i: usize) -> Option<&'a str> {
        (i < self.end).then(|| self.cursor.text(self.cursor.tokens()[i]))
    }

    fn is_punct(&self, i: usize, c: char) -> bool {
        i < self.end && self.cursor.tokens()[i].is_punct(self.cursor.source(), c)
    }

    fn is_ident(&self, i: usize) -> bool {
        i < self.end && self.cursor.tokens()[i].kind == TokenKind::Identifier
    }

    fn line(&self, i: usize) -> usize {
        let tokens = self.cursor.tokens();
        let offset = tokens.get(i).map(|t| t.beg).unwrap_or(self.cursor.source().len());
        line_of(self.cursor.source(), offset)
    }

    fn parse(&mut self, start: usize) -> Result<Option<ParamInfo>, CompileError> {
        let cursor = self.cursor;
        let tokens = cursor.tokens();
        let source = cursor.source();

        let mut layout = Vec::new();
        let mut layout_range = None;
        let mut storage = None;
        let mut precision = None;
        let mut memory_access = None;

        let mut i = start;
        while let Some(word) = self.text(i) {
            match word {
                "layout" if self.is_punct(i + 1, '(') => {
                    let Some(close) = self
                        .cursor
                        .matching_close(i + 1)
                        .filter(|c| *c < self.end)
                    else {
                        return Ok(None);
                    };
                    layout = parse_layout(&source[tokens[i + 1].end..tokens[close].beg]);
                    layout_range = Some((tokens[i].beg, tokens[close].end));
                    i = close + 1;
                    continue;
                }
                "uniform" | "in" | "out" | "buffer" => {
                    storage = Some((word, (tokens[i].beg, tokens[i].end)))
                }
                "readonly" => memory_access = Some(MemoryAccess::ReadOnly),
                "writeonly" => memory_access = Some(MemoryAccess::WriteOnly),
                p if PRECISIONS.contains(&p) => precision = Some(SmolStr::from(p)),
                q if IGNORED_QUALIFIERS.contains(&q) => (),
                _ => break,
            }
            i += 1;
        }

        let Some((storage, storage_range)) = storage else {
            return Ok(None);
        };
        if !self.is_ident(i) {
            return Ok(None);
        }
        let ty = self.text(i).unwrap_or_default();
        let line = self.line(start);

        let (category, mut descriptor) = if self.is_punct(i + 1, '{') {
            let category = match storage {
                "uniform" => Category::Block,
                "buffer" => Category::Buffer,
                _ => return Ok(None),
            };
            let Some(close) = self.cursor.matching_close(i + 1) else {
                return Ok(None);
            };
            let mut descriptor = Descriptor::new(ty, ty, self.stage);
            descriptor.members = self.parse_members(i + 2, close, category == Category::Buffer)?;
            if category == Category::Block {
                validate_std140(ty, &descriptor.members, line, self.diagnostics)?;
            }
            (category, descriptor)
        } else {
            if !self.is_ident(i + 1) {
                return Ok(None);
            }
            let name = self.text(i + 1).unwrap_or_default();
            let category = match (storage, classify(ty), self.stage) {
                ("uniform", TypeClass::Opaque(opaque), _) => Category::from(opaque),
                ("uniform", _, _) => {
                    self.diagnostics.error_at(
                        ErrorCode::UniformOutsideBlock,
                        format!("uniform {name} must be declared in a uniform block"),
                        Some(line),
                    )?;
                    return Ok(None);
                }
                ("in", _, Stage::Vertex) => Category::Attribute,
                ("in", _, Stage::Fragment) | ("out", _, Stage::Vertex) => Category::Varying,
                ("out", _, Stage::Fragment) => Category::FragColor,
                _ => return Ok(None),
            };

            let mut descriptor = Descriptor::new(name, ty, self.stage);
            descriptor.precision = precision;
            if self.is_punct(i + 2, '[') {
                let (_, count) = self.parse_array(i + 2, false)?;
                descriptor.count = count;
            }
            (category, descriptor)
        };

        let layout_value = |key: &str| -> Option<u32> {
            layout
                .iter()
                .find(|(k, _)| k == key)
                .and_then(|(_, v)| v.as_ref()?.parse().ok())
        };
        descriptor.binding = layout_value("binding");
        descriptor.location = layout_value("location");
        descriptor.input_attachment_index = layout_value("input_attachment_index");
        if matches!(category, Category::Buffer | Category::Image) {
            descriptor.memory_access = Some(memory_access.unwrap_or(MemoryAccess::ReadWrite));
        }

        let end = tokens
            .get(self.end)
            .map(|t| t.end)
            .unwrap_or(source.len());
        Ok(Some(ParamInfo {
            beg: tokens[start].beg,
            end,
            param: descriptor,
            category,
            layout,
            layout_range,
            storage_range,
            line,
        }))
    }

    /// Parse the members between `start` and the closing brace at `close`.
    fn parse_members(
        &mut self,
        start: usize,
        close: usize,
        allow_unsized: bool,
    ) -> Result<Vec<Member>, CompileError> {
        let cursor = self.cursor;
        let tokens = cursor.tokens();
        let source = cursor.source();

        let mut members = Vec::new();
        let mut words = Vec::new();
        let mut i = start;
        while i < close {
            let token = tokens[i];
            match token.kind {
                TokenKind::Preprocessor => {
                    return Err(self.diagnostics.fatal_at(
                        ErrorCode::DirectiveInBlock,
                        format!("preprocessor directive {:?} in block", token.text(source)),
                        Some(self.line(i)),
                    ));
                }
                TokenKind::Identifier => words.push(token.text(source)),
                _ if token.is_punct(source, '[') => {
                    let (array_size, count) = self.parse_array(i, allow_unsized)?;
                    if let Some(member) = block_member(&words, array_size, count) {
                        members.push(member);
                    }
                    words.clear();
                    i = self.cursor.matching_close(i).unwrap_or(close);
                }
                _ if token.is_punct(source, ';') => {
                    if let Some(member) = block_member(&words, None, 1) {
                        members.push(member);
                    }
                    words.clear();
                }
                _ => (),
            }
            i += 1;
        }
        Ok(members)
    }

    /// Evaluate the array length for the `[` at `open`.
    fn parse_array(
        &mut self,
        open: usize,
        allow_unsized: bool,
    ) -> Result<(Option<SmolStr>, u32), CompileError> {
        let cursor = self.cursor;
        let tokens = cursor.tokens();
        let source = cursor.source();
        let Some(close) = cursor.matching_close(open) else {
            return Ok((None, 1));
        };

        let expression = source[tokens[open].end..tokens[close].beg].trim();
        if expression.is_empty() && allow_unsized {
            return Ok((Some(SmolStr::default()), 0));
        }
        if is_builtin_capacity(expression) {
            // Filled in by the engine at runtime.
            return Ok((Some(expression.into()), 0));
        }
        let count = evaluate(expression, None)
            .ok()
            .and_then(|count| u32::try_from(count).ok());
        match count {
            Some(count) => Ok((Some(expression.into()), count)),
            None => {
                self.diagnostics.error_at(
                    ErrorCode::NonConstantArrayLength,
                    format!("array length {expression:?} is not a constant expression"),
                    Some(self.line(open)),
                )?;
                Ok((Some(expression.into()), 1))
            }
        }
    }
}

fn block_member(words: &[&str], array_size: Option<SmolStr>, count: u32) -> Option<Member> {
    let precision = words.iter().find(|w| PRECISIONS.contains(w)).map(|p| SmolStr::from(*p));
    let words: Vec<_> = words.iter().filter(|w| !PRECISIONS.contains(w)).collect();
    match words[..] {
        [.., ty, name] => Some(Member {
            name: (*name).into(),
            ty: (*ty).into(),
            precision,
            array_size,
            count,
        }),
        _ => None,
    }
}

fn is_builtin_capacity(expression: &str) -> bool {
    expression
        .strip_prefix("CC_")
        .is_some_and(|rest| {
            !rest.is_empty()
                && rest
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        })
}

fn parse_layout(text: &str) -> Vec<(SmolStr, Option<SmolStr>)> {
    split_args(text)
        .into_iter()
        .map(|item| match item.split_once('=') {
            Some((key, value)) => (key.trim().into(), Some(value.trim().into())),
            None => (item.into(), None),
        })
        .collect()
}
