// SPDX-License-Identifier: GPL-3.0-only

//! Offscreen presentation surface
//!
//! Frames are drawn into a plain texture that can be read back as an image.
//! Used by the demo binary and by tests that need to inspect what would have
//! been displayed.

use super::{DisplaySurface, PresentFrame, interval_from_hz};
use crate::errors::{PipelineError, PipelineResult, SetupError};
use crate::gpu::{self, GpuContext, TARGET_FORMAT, wgpu};
use crate::shaders::{copy_texture_to_buffer, create_readback_buffer, padded_bytes_per_row, read_buffer_async, unpad_rows};
use image::RgbaImage;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub struct HeadlessSurface {
    instance: wgpu::Instance,
    width: u32,
    height: u32,
    refresh_hz: u32,
    texture: Option<wgpu::Texture>,
    frames_presented: u64,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32, refresh_hz: u32) -> Self {
        Self {
            instance: gpu::create_instance(),
            width,
            height,
            refresh_hz,
            texture: None,
            frames_presented: 0,
        }
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    fn ensure_texture(&mut self, ctx: &GpuContext) -> PipelineResult<&wgpu::Texture> {
        let stale = self
            .texture
            .as_ref()
            .map(|t| t.width() != self.width || t.height() != self.height)
            .unwrap_or(true);
        if stale {
            debug!(width = self.width, height = self.height, "Allocating headless surface texture");
            let (width, height) = (self.width, self.height);
            let texture = gpu::with_validation(&ctx.device, || {
                ctx.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("shadercam headless surface"),
                    size: wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: TARGET_FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                })
            })
            .map_err(SetupError::Allocation)?;
            self.texture = Some(texture);
        }
        self.texture
            .as_ref()
            .ok_or_else(|| PipelineError::from(SetupError::Allocation("headless surface texture".to_string())))
    }
}

impl DisplaySurface for HeadlessSurface {
    fn instance(&self) -> &wgpu::Instance {
        &self.instance
    }

    fn compatible_surface(&self) -> Option<&wgpu::Surface<'static>> {
        None
    }

    fn configure(&mut self, _ctx: &GpuContext, width: u32, height: u32) -> PipelineResult<()> {
        if width == 0 || height == 0 {
            return Err(PipelineError::ContractViolation(format!(
                "surface size {}x{} is empty",
                width, height
            )));
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn format(&self) -> wgpu::TextureFormat {
        TARGET_FORMAT
    }

    fn acquire(&mut self, ctx: &GpuContext) -> PipelineResult<Option<PresentFrame>> {
        let (width, height) = (self.width, self.height);
        let view = self
            .ensure_texture(ctx)?
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.frames_presented += 1;
        Ok(Some(PresentFrame::offscreen(view, width, height)))
    }

    fn refresh_interval(&self) -> Duration {
        interval_from_hz(self.refresh_hz)
    }

    fn release(&mut self) {
        self.texture = None;
    }

    fn read_back(&mut self, ctx: &GpuContext) -> PipelineResult<Option<RgbaImage>> {
        let Some(texture) = &self.texture else {
            return Ok(None);
        };
        let (width, height) = (texture.width(), texture.height());

        let buffer = create_readback_buffer(&ctx.device, width, height, "shadercam headless readback");
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("shadercam headless readback"),
            });
        copy_texture_to_buffer(&mut encoder, texture, &buffer, width, height);
        ctx.queue.submit(Some(encoder.finish()));

        let padded = pollster::block_on(read_buffer_async(&ctx.device, &buffer))
            .map_err(PipelineError::DeviceUnavailable)?;
        let pixels = unpad_rows(&padded, width, height, padded_bytes_per_row(width));
        Ok(RgbaImage::from_raw(width, height, pixels))
    }
}

/// Write an image as PNG, creating parent directories
pub fn save_png(image: &RgbaImage, path: &Path) -> PipelineResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| PipelineError::Io(format!("Failed to save {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_png_round_trips_pixels() {
        let dir = std::env::temp_dir().join(format!("shadercam-png-{}", std::process::id()));
        let path = dir.join("snap.png");
        let image = RgbaImage::from_pixel(3, 2, image::Rgba([9, 8, 7, 255]));
        save_png(&image, &path).unwrap();
        let loaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(loaded, image);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_refresh_interval_default() {
        let surface = HeadlessSurface::new(640, 480, 0);
        assert_eq!(surface.refresh_interval(), interval_from_hz(60));
        assert_eq!(surface.size(), (640, 480));
    }
}
