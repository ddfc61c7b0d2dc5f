//! WGSL sources
//!
//! The base modules are concatenated, in this order, ahead of every stage
//! entry. They are fixed text and never generated at runtime.

pub const U256_WGSL: &str = include_str!("../shaders/u256.wgsl");
pub const FIELD_MODULUS_WGSL: &str = include_str!("../shaders/field_modulus.wgsl");
pub const CURVE_WGSL: &str = include_str!("../shaders/curve.wgsl");

pub const BASE_MODULES: [&str; 3] = [U256_WGSL, FIELD_MODULUS_WGSL, CURVE_WGSL];

pub const ELEVATE_WGSL: &str = include_str!("../shaders/elevate.wgsl");
pub const MUL_FIRST_WGSL: &str = include_str!("../shaders/mul_first.wgsl");
pub const MUL_INTERMEDIATE_WGSL: &str = include_str!("../shaders/mul_intermediate.wgsl");
pub const MUL_FINAL_WGSL: &str = include_str!("../shaders/mul_final.wgsl");
pub const PASSTHROUGH_WGSL: &str = include_str!("../shaders/passthrough.wgsl");

/// Entry point name shared by all stage kernels
pub const ENTRY_POINT: &str = "main";

/// Pipeline-overridable constant names
pub const WORKGROUP_SIZE_CONSTANT: &str = "WORKGROUP_SIZE";
pub const CHUNK_BITS_CONSTANT: &str = "CHUNK_BITS";
