//! GLSL type classification and std140 block validation.
use crate::{
    diagnostics::{CompileError, Diagnostics, ErrorCode},
    params::Member,
};

/// The std140 size and base alignment of a non opaque type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericType {
    pub size: u32,
    pub alignment: u32,
    pub columns: u32,
    pub rows: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpaqueType {
    /// Combined image samplers like `sampler2D` or `usampler3D`.
    SamplerTexture,
    /// Separate `sampler` or `samplerShadow`.
    Sampler,
    Texture,
    Image,
    SubpassInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    Numeric(NumericType),
    Opaque(OpaqueType),
    /// Any other type name like a user defined struct.
    Struct,
}

const SCALARS: &[&str] = &["float", "int", "uint", "bool"];
const VECTOR_PREFIXES: &[&str] = &["", "i", "u", "b"];

pub fn classify(ty: &str) -> TypeClass {
    if SCALARS.contains(&ty) {
        return TypeClass::Numeric(vector(1));
    }

    for prefix in VECTOR_PREFIXES {
        if let Some(n) = ty
            .strip_prefix(prefix)
            .and_then(|t| t.strip_prefix("vec"))
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| (2..=4).contains(n))
        {
            return TypeClass::Numeric(vector(n));
        }
    }

    if let Some(dims) = ty.strip_prefix("mat") {
        let (columns, rows) = match dims.split_once('x') {
            Some((c, r)) => (c.parse().ok(), r.parse().ok()),
            None => (dims.parse().ok(), dims.parse().ok()),
        };
        if let (Some(columns), Some(rows)) = (columns, rows) {
            if (2..=4).contains(&columns) && (2..=4).contains(&rows) {
                // Each column is aligned like a vec4 in std140.
                return TypeClass::Numeric(NumericType {
                    size: columns * 16,
                    alignment: 16,
                    columns,
                    rows,
                });
            }
        }
    }

    if ty == "sampler" || ty == "samplerShadow" {
        TypeClass::Opaque(OpaqueType::Sampler)
    } else if has_base_type(ty, "sampler") {
        TypeClass::Opaque(OpaqueType::SamplerTexture)
    } else if has_base_type(ty, "texture") {
        TypeClass::Opaque(OpaqueType::Texture)
    } else if has_base_type(ty, "image") {
        TypeClass::Opaque(OpaqueType::Image)
    } else if has_base_type(ty, "subpassInput") {
        TypeClass::Opaque(OpaqueType::SubpassInput)
    } else {
        TypeClass::Struct
    }
}

// Opaque types have optional integer prefixes like isampler2D or uimage2D.
fn has_base_type(ty: &str, base: &str) -> bool {
    VECTOR_PREFIXES[..3]
        .iter()
        .any(|p| ty.strip_prefix(p).is_some_and(|t| t.starts_with(base)))
}

fn vector(n: u32) -> NumericType {
    NumericType {
        size: n * 4,
        alignment: match n {
            1 => 4,
            2 => 8,
            _ => 16,
        },
        columns: 1,
        rows: n,
    }
}

fn align(offset: u32, alignment: u32) -> u32 {
    offset.div_ceil(alignment) * alignment
}

/// The number of vec4 registers used by a block member.
pub fn uniform_vectors(member: &Member) -> u32 {
    match classify(&member.ty) {
        TypeClass::Numeric(t) => t.size.div_ceil(16) * member.count.max(1),
        _ => 0,
    }
}

/// Check that the members of uniform block `block` have a std140 layout
/// without implicit padding and return the total size in bytes.
pub fn validate_std140(
    block: &str,
    members: &[Member],
    line: usize,
    diagnostics: &mut Diagnostics,
) -> Result<u32, CompileError> {
    let mut offset = 0;
    // The gap after a vec3 is already reported.
    let mut after_vec3 = false;

    for (i, member) in members.iter().enumerate() {
        let numeric = match classify(&member.ty) {
            TypeClass::Numeric(numeric) => numeric,
            TypeClass::Opaque(_) => {
                return Err(diagnostics.fatal_at(
                    ErrorCode::OpaqueTypeInBlock,
                    format!("opaque type {} in block {block} is not allowed", member.ty),
                    Some(line),
                ));
            }
            TypeClass::Struct => {
                return Err(diagnostics.fatal_at(
                    ErrorCode::StructMember,
                    format!("struct member {} in block {block} is not allowed", member.name),
                    Some(line),
                ));
            }
        };

        if numeric.columns > 1 && !(numeric.columns == 4 && numeric.rows == 4) {
            return Err(diagnostics.fatal_at(
                ErrorCode::NonSquareMatrix,
                format!("member {} in block {block} must be a mat4", member.name),
                Some(line),
            ));
        }

        let (alignment, size) = if member.array_size.is_some() {
            if numeric.size % 16 != 0 {
                return Err(diagnostics.fatal_at(
                    ErrorCode::ArrayAlignment,
                    format!(
                        "array member {} in block {block} must have a 16 byte aligned element type",
                        member.name
                    ),
                    Some(line),
                ));
            }
            (16, numeric.size * member.count.max(1))
        } else {
            (numeric.alignment, numeric.size)
        };

        let aligned = align(offset, alignment);
        if aligned != offset && !after_vec3 {
            return Err(diagnostics.fatal_at(
                ErrorCode::ImplicitPadding,
                format!(
                    "member {} in block {block} has {} bytes of implicit padding before it",
                    member.name,
                    aligned - offset
                ),
                Some(line),
            ));
        }

        after_vec3 = false;
        if member.array_size.is_none() && numeric.size == 12 {
            let followed_by_scalar = members.get(i + 1).is_some_and(|next| {
                next.array_size.is_none()
                    && matches!(classify(&next.ty), TypeClass::Numeric(n) if n.size == 4)
            });
            if !followed_by_scalar {
                return Err(diagnostics.fatal_at(
                    ErrorCode::Vec3Member,
                    format!(
                        "vec3 member {} in block {block} must be followed by a 4 byte scalar",
                        member.name
                    ),
                    Some(line),
                ));
            }
            after_vec3 = true;
        }

        offset = aligned + size;
    }

    Ok(offset)
}
