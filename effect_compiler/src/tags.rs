//! Apply `#pragma rate` and `#pragma unfilterable-float` to extracted descriptors.
use crate::{
    diagnostics::{Diagnostics, ErrorCode},
    params::{Rate, SampleType, ShaderInfo},
    tokens::{line_of, pragma},
};

/// Pragmas that only carry metadata and are removed from the generated code.
const EFFECT_PRAGMAS: &[&str] = &[
    "rate",
    "unfilterable-float",
    "builtin",
    "define-meta",
    "extension",
    "subpass",
];

/// Tag descriptors in `info` by name.
/// Pragmas for names without a descriptor are ignored.
pub fn apply_tags(text: &str, info: &mut ShaderInfo, diagnostics: &mut Diagnostics) {
    let mut offset = 0;
    for line in text.split('\n') {
        match pragma(line) {
            Some(("rate", args)) => {
                let mut parts = args.split_whitespace();
                if let (Some(name), Some(rate)) = (parts.next(), parts.next()) {
                    match rate.parse::<Rate>() {
                        Ok(rate) => {
                            for descriptor in info.find_all_mut(name) {
                                descriptor.rate = Some(rate);
                            }
                        }
                        Err(_) => diagnostics.warn_at(
                            ErrorCode::UnknownRate,
                            format!("unknown rate {rate:?} for {name}"),
                            Some(line_of(text, offset)),
                        ),
                    }
                }
            }
            Some(("unfilterable-float", args)) => {
                for name in args.split_whitespace() {
                    for descriptor in info.find_all_mut(name) {
                        descriptor.sample_type = SampleType::UnfilterableFloat;
                    }
                }
            }
            _ => (),
        }
        offset += line.len() + 1;
    }
}

/// Blank out metadata pragmas while keeping line numbers intact.
pub fn strip_effect_pragmas(text: &str) -> String {
    text.split('\n')
        .map(|line| match pragma(line) {
            Some((name, _)) if EFFECT_PRAGMAS.contains(&name) => "",
            _ => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
