// SPDX-License-Identifier: GPL-3.0-only
//! Shader filter programs
//!
//! `effects` is the single source of truth for which program, kernel and bias
//! each user-visible filter uses. `filter_program` runs it on the GPU and
//! `reference` runs the same math on the CPU.

pub mod effects;
mod filter_program;
mod gpu_processor;
pub mod reference;

pub use effects::{
    EffectProgram, FilterEffect, IDENTITY_MATRIX, KERNEL_SIZE, Kernel, ProgramKind, TexMatrix,
    center_crop_matrix, texel_offsets,
};
pub use filter_program::{FILTER_SHADER, FilterProgram, FilterUniforms, Viewport};
pub use gpu_processor::{
    CachedDimensions, copy_texture_to_buffer, create_readback_buffer, padded_bytes_per_row,
    read_buffer_async, unpad_rows,
};
