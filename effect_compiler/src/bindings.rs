//! Binding and location assignment shared by every dialect of a pass.
use log::debug;
use smol_str::SmolStr;

use crate::{
    dead_code::find_functions,
    diagnostics::{CompileError, Diagnostics, ErrorCode},
    params::{extract_params, Category, ParamInfo, ShaderInfo, Stage},
    tokens::replace_ranges,
};

const BINDING_CATEGORIES: [Category; 6] = [
    Category::Block,
    Category::SamplerTexture,
    Category::Sampler,
    Category::Texture,
    Category::Buffer,
    Category::Image,
];

const LOCATION_CATEGORIES: [Category; 3] =
    [Category::Attribute, Category::Varying, Category::FragColor];

/// Assign a binding or location to every descriptor in `info`.
///
/// Bindings are assigned in declaration order per category.
/// Explicit bindings must continue the sequence of assigned bindings.
pub fn allocate_bindings(
    info: &mut ShaderInfo,
    diagnostics: &mut Diagnostics,
) -> Result<(), CompileError> {
    // Sampled fallbacks for subpass inputs are bound through the input.
    let subpass_names: Vec<_> = info.subpass_inputs.iter().map(|s| s.name.clone()).collect();
    info.sampler_textures.retain(|s| !subpass_names.contains(&s.name));

    for category in BINDING_CATEGORIES {
        let mut next = 0;
        for descriptor in info.list_mut(category) {
            match descriptor.binding {
                Some(binding) if binding != next => {
                    let code = category.binding_error().unwrap_or(ErrorCode::BlockBinding);
                    let message = if binding > next {
                        format!(
                            "{category} {} has binding {binding} but the next binding is {next}",
                            descriptor.name
                        )
                    } else {
                        format!(
                            "{category} {} has binding {binding} which is already assigned",
                            descriptor.name
                        )
                    };
                    return Err(diagnostics.fatal(code, message));
                }
                Some(_) => next += 1,
                None => {
                    descriptor.binding = Some(next);
                    next += 1;
                }
            }
        }
    }

    allocate_subpass_inputs(info, diagnostics)?;

    for category in LOCATION_CATEGORIES {
        let list = info.list_mut(category);
        let mut used: Vec<u32> = list.iter().filter_map(|d| d.location).collect();
        for descriptor in list.iter_mut().filter(|d| d.location.is_none()) {
            let location = (0..).find(|l| !used.contains(l)).unwrap_or_default();
            descriptor.location = Some(location);
            used.push(location);
        }
    }

    Ok(())
}

/// Bind subpass inputs to their input attachment index.
///
/// Attachment indices are shared with subpass outputs and don't need to be contiguous.
fn allocate_subpass_inputs(
    info: &mut ShaderInfo,
    diagnostics: &mut Diagnostics,
) -> Result<(), CompileError> {
    let mut used = Vec::new();
    for descriptor in &mut info.subpass_inputs {
        let Some(index) = descriptor.input_attachment_index.or(descriptor.binding) else {
            return Err(diagnostics.fatal(
                ErrorCode::SubpassInputBinding,
                format!("subpass input {} has no input attachment index", descriptor.name),
            ));
        };
        if used.contains(&index) {
            return Err(diagnostics.fatal(
                ErrorCode::SubpassInputBinding,
                format!(
                    "subpass input {} uses input attachment {index} which is already assigned",
                    descriptor.name
                ),
            ));
        }
        used.push(index);
        descriptor.binding = Some(index);
    }
    Ok(())
}

type Layout = Vec<(SmolStr, Option<SmolStr>)>;

fn set_entry(layout: &mut Layout, key: &str, value: Option<String>) {
    let value = value.map(SmolStr::from);
    match layout.iter_mut().find(|(k, _)| k == key) {
        Some(entry) => entry.1 = value,
        None => layout.push((key.into(), value)),
    }
}

fn remove_entry(layout: &mut Layout, key: &str) {
    layout.retain(|(k, _)| k != key);
}

/// Rewrite the `layout(...)` qualifier of each declaration in `text`.
/// `update` returns `None` to leave a declaration unchanged.
fn update_layouts(
    text: &str,
    stage: Stage,
    mut update: impl FnMut(&ParamInfo) -> Option<Layout>,
) -> Result<String, CompileError> {
    let functions = find_functions(text);
    let params = extract_params(text, stage, &functions, &mut Diagnostics::silent())?;

    let mut edits = Vec::new();
    for p in &params {
        let Some(layout) = update(p) else {
            continue;
        };
        if layout == p.layout {
            continue;
        }

        let qualifier = if layout.is_empty() {
            String::new()
        } else {
            let entries: Vec<_> = layout
                .iter()
                .map(|(k, v)| match v {
                    Some(v) => format!("{k} = {v}"),
                    None => k.to_string(),
                })
                .collect();
            format!("layout({})", entries.join(", "))
        };

        match p.layout_range {
            Some((beg, end)) => {
                // Avoid leaving a leading space when removing the qualifier.
                let end = if qualifier.is_empty() && text[end..].starts_with(' ') {
                    end + 1
                } else {
                    end
                };
                edits.push((beg..end, qualifier));
            }
            None => edits.push((p.beg..p.beg, qualifier + " ")),
        }
    }
    Ok(replace_ranges(text, edits))
}

/// Add `std140` to uniform blocks and `std430` to storage buffers.
pub fn decorate_block_memory_layouts(
    text: &str,
    stage: Stage,
    info: &ShaderInfo,
    version: u32,
) -> Result<String, CompileError> {
    update_layouts(text, stage, |p| {
        let mut layout = p.layout.clone();
        match p.category {
            Category::Block => {
                if !layout.iter().any(|(k, _)| k == "std140") {
                    remove_entry(&mut layout, "shared");
                    remove_entry(&mut layout, "packed");
                    layout.insert(0, ("std140".into(), None));
                }
                Some(layout)
            }
            Category::Buffer => {
                if !layout.iter().any(|(k, _)| k == "std430") {
                    layout.insert(0, ("std430".into(), None));
                }
                if version >= 450 {
                    let binding = info
                        .find(Category::Buffer, &p.param.name)
                        .and_then(|d| d.binding);
                    if let Some(binding) = binding {
                        set_entry(&mut layout, "binding", Some(binding.to_string()));
                    }
                }
                Some(layout)
            }
            _ => None,
        }
    })
}

/// Write the allocated bindings and locations from `info` into `text`.
///
/// Version 460 receives bindings and locations.
/// Version 300 only supports locations for attributes and fragment outputs.
/// Version 100 has no layout qualifiers.
pub fn decorate_bindings(
    text: &str,
    stage: Stage,
    info: &ShaderInfo,
    version: u32,
) -> Result<String, CompileError> {
    if version < 300 {
        return Ok(text.to_string());
    }

    update_layouts(text, stage, |p| {
        let mut layout = p.layout.clone();
        let Some(descriptor) = info.find(p.category, &p.param.name) else {
            debug!("no allocated descriptor for {} {}", p.category, p.param.name);
            return None;
        };

        if version >= 450 {
            if p.category.uses_location() {
                set_entry(&mut layout, "location", descriptor.location.map(|l| l.to_string()));
            } else {
                set_entry(&mut layout, "binding", descriptor.binding.map(|b| b.to_string()));
            }
        } else {
            remove_entry(&mut layout, "binding");
            match p.category {
                Category::Attribute | Category::FragColor => {
                    set_entry(&mut layout, "location", descriptor.location.map(|l| l.to_string()))
                }
                Category::Varying => remove_entry(&mut layout, "location"),
                _ => (),
            }
        }
        Some(layout)
    })
}
