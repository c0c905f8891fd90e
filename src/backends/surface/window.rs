// SPDX-License-Identifier: GPL-3.0-only

//! Window-backed presentation surface
//!
//! Wraps a `wgpu::Surface` created by the host from its window handle. The
//! host keeps the window alive for as long as it reports the surface as
//! created.

use super::{DisplaySurface, PresentFrame, interval_from_hz};
use crate::errors::{PipelineError, PipelineResult, SetupError};
use crate::gpu::{self, GpuContext, wgpu};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct WindowSurface {
    instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    config: Option<wgpu::SurfaceConfiguration>,
    width: u32,
    height: u32,
    refresh_hz: u32,
}

impl WindowSurface {
    /// Create a surface for any window handle wgpu accepts
    pub fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        refresh_hz: u32,
    ) -> PipelineResult<Self> {
        let instance = gpu::create_instance();
        let surface = instance
            .create_surface(target)
            .map_err(|e| SetupError::Surface(e.to_string()))?;
        Ok(Self {
            instance,
            surface,
            config: None,
            width,
            height,
            refresh_hz,
        })
    }

    /// Prefer a linear format so filtered bytes reach the screen unchanged
    fn pick_format(caps: &wgpu::SurfaceCapabilities) -> Option<wgpu::TextureFormat> {
        caps.formats
            .iter()
            .copied()
            .find(|f| matches!(f, wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Bgra8Unorm))
            .or_else(|| caps.formats.first().copied())
    }
}

impl DisplaySurface for WindowSurface {
    fn instance(&self) -> &wgpu::Instance {
        &self.instance
    }

    fn compatible_surface(&self) -> Option<&wgpu::Surface<'static>> {
        Some(&self.surface)
    }

    fn configure(&mut self, ctx: &GpuContext, width: u32, height: u32) -> PipelineResult<()> {
        if width == 0 || height == 0 {
            return Err(PipelineError::ContractViolation(format!(
                "surface size {}x{} is empty",
                width, height
            )));
        }

        let caps = self.surface.get_capabilities(&ctx.adapter);
        let format = Self::pick_format(&caps)
            .ok_or_else(|| SetupError::Surface("surface reports no formats".to_string()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        gpu::with_validation(&ctx.device, || self.surface.configure(&ctx.device, &config))
            .map_err(SetupError::Surface)?;

        info!(width, height, ?format, "Window surface configured");
        self.config = Some(config);
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn format(&self) -> wgpu::TextureFormat {
        self.config
            .as_ref()
            .map(|c| c.format)
            .unwrap_or(gpu::TARGET_FORMAT)
    }

    fn acquire(&mut self, ctx: &GpuContext) -> PipelineResult<Option<PresentFrame>> {
        let Some(config) = &self.config else {
            return Err(PipelineError::ContractViolation(
                "acquire before configure".to_string(),
            ));
        };

        match self.surface.get_current_texture() {
            Ok(texture) => Ok(Some(PresentFrame::swapchain(texture))),
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                debug!("Surface outdated, reconfiguring");
                self.surface.configure(&ctx.device, config);
                match self.surface.get_current_texture() {
                    Ok(texture) => Ok(Some(PresentFrame::swapchain(texture))),
                    Err(e) => {
                        warn!(error = %e, "Skipping frame after reconfigure");
                        Ok(None)
                    }
                }
            }
            Err(wgpu::SurfaceError::Timeout) => Ok(None),
            Err(e) => Err(SetupError::Surface(e.to_string()).into()),
        }
    }

    fn refresh_interval(&self) -> Duration {
        interval_from_hz(self.refresh_hz)
    }

    fn release(&mut self) {
        self.config = None;
    }
}
