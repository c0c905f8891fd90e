// SPDX-License-Identifier: MPL-2.0

//! CPU implementations of the filter variants
//!
//! These mirror `filter.wgsl` texel for texel (clamp-to-edge sampling, the same
//! kernel order and bias, RGB convolved with alpha taken from the center tap).
//! They are used to verify GPU output and to produce filtered stills when no
//! adapter is available.

use super::effects::{EffectProgram, FilterEffect, Kernel, LUMA_WEIGHTS, ProgramKind};
use image::{Rgba, RgbaImage};

/// Apply an effect to a whole image
pub fn apply_effect(src: &RgbaImage, effect: FilterEffect) -> RgbaImage {
    apply_program(src, &effect.program())
}

/// Apply a program variant to a whole image
pub fn apply_program(src: &RgbaImage, program: &EffectProgram) -> RgbaImage {
    match (program.kind, program.kernel) {
        (ProgramKind::Passthrough | ProgramKind::Blit, _) => src.clone(),
        (ProgramKind::Grayscale, _) => grayscale(src),
        (ProgramKind::Convolution, Some(kernel)) => convolve(src, &kernel, program.color_bias),
        // A convolution without a kernel renders like the identity kernel
        (ProgramKind::Convolution, None) => {
            let mut identity = [0.0; 9];
            identity[4] = 1.0;
            convolve(src, &identity, program.color_bias)
        }
    }
}

/// Weighted luma, alpha forced to opaque
pub fn grayscale(src: &RgbaImage) -> RgbaImage {
    let mut out = RgbaImage::new(src.width(), src.height());
    for (x, y, px) in src.enumerate_pixels() {
        let [r, g, b, _] = to_unit(px);
        let l = r * LUMA_WEIGHTS[0] + g * LUMA_WEIGHTS[1] + b * LUMA_WEIGHTS[2];
        out.put_pixel(x, y, from_unit([l, l, l, 1.0]));
    }
    out
}

/// 3x3 convolution of the color channels plus `bias`
///
/// Sums are not normalized. Taps outside the image clamp to the edge.
pub fn convolve(src: &RgbaImage, kernel: &Kernel, bias: f32) -> RgbaImage {
    let (width, height) = src.dimensions();
    let mut out = RgbaImage::new(width, height);
    if width == 0 || height == 0 {
        return out;
    }

    for y in 0..height {
        for x in 0..width {
            let mut sum = [0.0f32; 3];
            for (i, weight) in kernel.iter().enumerate() {
                let dx = (i % 3) as i64 - 1;
                let dy = (i / 3) as i64 - 1;
                let sx = (x as i64 + dx).clamp(0, width as i64 - 1) as u32;
                let sy = (y as i64 + dy).clamp(0, height as i64 - 1) as u32;
                let tap = to_unit(src.get_pixel(sx, sy));
                for c in 0..3 {
                    sum[c] += tap[c] * weight;
                }
            }
            let alpha = to_unit(src.get_pixel(x, y))[3];
            out.put_pixel(
                x,
                y,
                from_unit([sum[0] + bias, sum[1] + bias, sum[2] + bias, alpha]),
            );
        }
    }
    out
}

/// Centered square crop of `src`, optionally mirrored horizontally
pub fn center_crop(src: &RgbaImage, mirror: bool) -> RgbaImage {
    let (width, height) = src.dimensions();
    let side = width.min(height);
    let x0 = (width - side) / 2;
    let y0 = (height - side) / 2;
    let mut out = image::imageops::crop_imm(src, x0, y0, side, side).to_image();
    if mirror {
        image::imageops::flip_horizontal_in_place(&mut out);
    }
    out
}

fn to_unit(px: &Rgba<u8>) -> [f32; 4] {
    let Rgba([r, g, b, a]) = *px;
    [
        r as f32 / 255.0,
        g as f32 / 255.0,
        b as f32 / 255.0,
        a as f32 / 255.0,
    ]
}

fn from_unit(c: [f32; 4]) -> Rgba<u8> {
    Rgba(c.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(width: u32, height: u32, value: u8) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([value, value, value, 255]))
    }

    #[test]
    fn test_passthrough_is_identity() {
        let mut src = uniform(4, 4, 10);
        src.put_pixel(1, 2, Rgba([200, 30, 40, 128]));
        assert_eq!(apply_effect(&src, FilterEffect::None), src);
    }

    #[test]
    fn test_blur_preserves_uniform_input() {
        let src = uniform(8, 8, 77);
        let out = apply_effect(&src, FilterEffect::Blur);
        assert!(out.pixels().all(|p| *p == Rgba([77, 77, 77, 255])));
    }

    #[test]
    fn test_edge_detect_on_uniform_input_is_black() {
        let src = uniform(8, 8, 200);
        let out = apply_effect(&src, FilterEffect::EdgeDetect);
        assert!(out.pixels().all(|p| p.0[..3] == [0, 0, 0]));
    }

    #[test]
    fn test_emboss_on_uniform_input_is_mid_gray() {
        // Kernel sums to zero so only the bias remains
        let src = uniform(8, 8, 180);
        let out = apply_effect(&src, FilterEffect::Emboss);
        assert!(out.pixels().all(|p| p.0[..3] == [128, 128, 128]));
    }

    #[test]
    fn test_grayscale_luma() {
        let src = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 10]));
        let out = grayscale(&src);
        let expected = (0.30f32 * 255.0).round() as u8;
        assert_eq!(*out.get_pixel(0, 0), Rgba([expected, expected, expected, 255]));
    }

    #[test]
    fn test_sharpen_amplifies_single_bright_pixel() {
        let mut src = uniform(5, 5, 0);
        src.put_pixel(2, 2, Rgba([50, 50, 50, 255]));
        let out = apply_effect(&src, FilterEffect::Sharpen);
        assert_eq!(out.get_pixel(2, 2).0[0], 250);
        assert_eq!(out.get_pixel(2, 1).0[0], 0);
    }

    #[test]
    fn test_center_crop() {
        let mut src = uniform(6, 4, 0);
        src.put_pixel(1, 0, Rgba([255, 0, 0, 255]));
        let out = center_crop(&src, false);
        assert_eq!(out.dimensions(), (4, 4));
        assert_eq!(out.get_pixel(0, 0).0[0], 255);

        let mirrored = center_crop(&src, true);
        assert_eq!(mirrored.get_pixel(3, 0).0[0], 255);
    }
}
