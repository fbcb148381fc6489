//! A compiler for GLSL effects annotated with `#pragma` metadata.
//!
//! Each pass is compiled to GLSL 4.60, GLSL ES 3.00, and GLSL ES 1.00
//! along with reflection data for the resources it declares.
//! Start with [pass::compile_pass].
//!
//! The compiler works on text rather than a syntax tree.
//! Each stage rewrites the output of the previous stage,
//! so declarations keep their original formatting in the generated code.

pub mod bindings;
pub mod chunks;
pub mod dead_code;
pub mod defines;
pub mod diagnostics;
pub mod expr;
pub mod hash;
pub mod layout;
pub mod macros;
pub mod params;
pub mod pass;
pub mod subpass;
pub mod tags;
pub mod tokens;
pub mod transcode;
pub mod validate;
pub mod version;
