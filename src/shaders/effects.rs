// SPDX-License-Identifier: GPL-3.0-only

//! Filter effect table
//!
//! Maps a user-facing [`FilterEffect`] onto the program variant that renders
//! it, plus the kernel and color bias for convolution variants. Also holds the
//! pure geometry helpers shared by the GPU program and the CPU reference:
//! texel offsets and texture transforms.

use crate::errors::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of taps in a 3x3 kernel
pub const KERNEL_SIZE: usize = 9;

/// 3x3 convolution kernel, row-major, top row first
pub type Kernel = [f32; KERNEL_SIZE];

/// Luma weights used by the grayscale variant
pub const LUMA_WEIGHTS: [f32; 3] = [0.30, 0.59, 0.11];

/// Column-major 4x4 matrix applied to texture coordinates
pub type TexMatrix = [f32; 16];

pub const IDENTITY_MATRIX: TexMatrix = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Shader program variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    /// Copy the source unchanged
    Passthrough,
    /// Weighted luma, alpha forced to 1
    Grayscale,
    /// 3x3 kernel plus color bias
    Convolution,
    /// Plain 2D blit used for display and encoder copies
    Blit,
}

impl ProgramKind {
    /// Fragment entry point implementing this variant
    pub fn fragment_entry(&self) -> &'static str {
        match self {
            ProgramKind::Passthrough => "fs_passthrough",
            ProgramKind::Grayscale => "fs_grayscale",
            ProgramKind::Convolution => "fs_convolution",
            ProgramKind::Blit => "fs_blit",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProgramKind::Passthrough => "passthrough",
            ProgramKind::Grayscale => "grayscale",
            ProgramKind::Convolution => "convolution",
            ProgramKind::Blit => "blit",
        }
    }
}

/// Program, kernel and bias for one effect
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectProgram {
    pub kind: ProgramKind,
    pub kernel: Option<Kernel>,
    pub color_bias: f32,
}

/// User-selectable filter effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FilterEffect {
    #[default]
    None,
    BlackWhite,
    Blur,
    Sharpen,
    EdgeDetect,
    Emboss,
}

impl FilterEffect {
    /// All effects in selection order
    pub const ALL: [FilterEffect; 6] = [
        FilterEffect::None,
        FilterEffect::BlackWhite,
        FilterEffect::Blur,
        FilterEffect::Sharpen,
        FilterEffect::EdgeDetect,
        FilterEffect::Emboss,
    ];

    /// Effect at a selection index; out-of-range indices are rejected
    pub fn from_index(index: usize) -> PipelineResult<Self> {
        Self::ALL.get(index).copied().ok_or_else(|| {
            PipelineError::ContractViolation(format!(
                "unknown filter index {} (expected 0..{})",
                index,
                Self::ALL.len()
            ))
        })
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Stable lowercase name used on the command line and in config
    pub fn name(&self) -> &'static str {
        match self {
            FilterEffect::None => "none",
            FilterEffect::BlackWhite => "black-white",
            FilterEffect::Blur => "blur",
            FilterEffect::Sharpen => "sharpen",
            FilterEffect::EdgeDetect => "edge-detect",
            FilterEffect::Emboss => "emboss",
        }
    }

    pub fn program(&self) -> EffectProgram {
        let (kind, kernel, color_bias) = match self {
            FilterEffect::None => (ProgramKind::Passthrough, None, 0.0),
            FilterEffect::BlackWhite => (ProgramKind::Grayscale, None, 0.0),
            FilterEffect::Blur => (
                ProgramKind::Convolution,
                Some([
                    1.0 / 16.0,
                    2.0 / 16.0,
                    1.0 / 16.0,
                    2.0 / 16.0,
                    4.0 / 16.0,
                    2.0 / 16.0,
                    1.0 / 16.0,
                    2.0 / 16.0,
                    1.0 / 16.0,
                ]),
                0.0,
            ),
            FilterEffect::Sharpen => (
                ProgramKind::Convolution,
                Some([0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0]),
                0.0,
            ),
            FilterEffect::EdgeDetect => (
                ProgramKind::Convolution,
                Some([-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0]),
                0.0,
            ),
            FilterEffect::Emboss => (
                ProgramKind::Convolution,
                Some([2.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, -1.0]),
                0.5,
            ),
        };
        EffectProgram {
            kind,
            kernel,
            color_bias,
        }
    }
}

impl fmt::Display for FilterEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterEffect {
    type Err = PipelineError;

    /// Accepts either the effect name or its selection index
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(index) = s.parse::<usize>() {
            return Self::from_index(index);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|e| e.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| PipelineError::ContractViolation(format!("unknown filter '{}'", s)))
    }
}

/// Texel offsets for a 3x3 neighborhood, in kernel order
///
/// Computed from the source texture size only; the output size never
/// influences them.
pub fn texel_offsets(width: u32, height: u32) -> [[f32; 2]; KERNEL_SIZE] {
    let rw = 1.0 / width.max(1) as f32;
    let rh = 1.0 / height.max(1) as f32;
    [
        [-rw, -rh],
        [0.0, -rh],
        [rw, -rh],
        [-rw, 0.0],
        [0.0, 0.0],
        [rw, 0.0],
        [-rw, rh],
        [0.0, rh],
        [rw, rh],
    ]
}

/// Texture transform mapping a square output onto the centered square crop
/// of a `width` x `height` source, optionally mirrored horizontally
pub fn center_crop_matrix(width: u32, height: u32, mirror: bool) -> TexMatrix {
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    let (sx, sy) = if w > h { (h / w, 1.0) } else { (1.0, w / h) };
    let (sx, tx) = if mirror {
        (-sx, 0.5 + sx * 0.5)
    } else {
        (sx, 0.5 - sx * 0.5)
    };
    let ty = 0.5 - sy * 0.5;
    [
        sx, 0.0, 0.0, 0.0, //
        0.0, sy, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        tx, ty, 0.0, 1.0,
    ]
}

/// Apply a texture transform to a 2D coordinate
pub fn transform_uv(m: &TexMatrix, uv: [f32; 2]) -> [f32; 2] {
    [
        m[0] * uv[0] + m[4] * uv[1] + m[12],
        m[1] * uv[0] + m[5] * uv[1] + m[13],
    ]
}

/// Side of the square offscreen target for a surface of `width` x `height`
pub fn target_side(width: u32, height: u32) -> u32 {
    width
        .min(height)
        .max(crate::constants::render::MIN_TARGET_SIDE)
}

/// Centered square viewport `(x, y, side)` inside a `width` x `height` surface
pub fn centered_viewport(width: u32, height: u32) -> (u32, u32, u32) {
    let side = width.min(height);
    ((width - side) / 2, (height - side) / 2, side)
}
