// SPDX-License-Identifier: GPL-3.0-only

//! Presentation surfaces
//!
//! The render thread draws the filtered frame into whatever the surface hands
//! out from [`DisplaySurface::acquire`] and then presents it. The host owns
//! the surface lifecycle; the render thread only sees it through
//! `SurfaceEvent`s.

pub mod headless;
pub mod window;

pub use headless::HeadlessSurface;
pub use window::WindowSurface;

use crate::errors::PipelineResult;
use crate::gpu::{GpuContext, wgpu};
use image::RgbaImage;
use std::time::Duration;

/// Lifecycle events a host reports for its presentation surface
pub enum SurfaceEvent {
    /// Surface created (or recreated); the render thread takes ownership
    Created(Box<dyn DisplaySurface>),
    /// Surface size changed
    SizeChanged { width: u32, height: u32 },
    /// Surface destroyed; GPU-bound resources must be released
    Destroyed,
}

impl std::fmt::Debug for SurfaceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceEvent::Created(surface) => f
                .debug_tuple("Created")
                .field(&surface.size())
                .finish(),
            SurfaceEvent::SizeChanged { width, height } => f
                .debug_struct("SizeChanged")
                .field("width", width)
                .field("height", height)
                .finish(),
            SurfaceEvent::Destroyed => write!(f, "Destroyed"),
        }
    }
}

/// A frame acquired from the surface, ready to be drawn into
pub struct PresentFrame {
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    surface_texture: Option<wgpu::SurfaceTexture>,
}

impl PresentFrame {
    pub(crate) fn offscreen(view: wgpu::TextureView, width: u32, height: u32) -> Self {
        Self {
            view,
            width,
            height,
            surface_texture: None,
        }
    }

    pub(crate) fn swapchain(texture: wgpu::SurfaceTexture) -> Self {
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let size = texture.texture.size();
        Self {
            view,
            width: size.width,
            height: size.height,
            surface_texture: Some(texture),
        }
    }

    /// Hand the frame to the compositor; a no-op for offscreen frames
    pub fn present(self) {
        if let Some(texture) = self.surface_texture {
            texture.present();
        }
    }
}

/// Presentation surface driven by the render thread
pub trait DisplaySurface: Send {
    /// Instance the surface was created from
    fn instance(&self) -> &wgpu::Instance;

    /// Surface the adapter must be compatible with, if any
    fn compatible_surface(&self) -> Option<&wgpu::Surface<'static>>;

    /// (Re)configure for the given context and size
    fn configure(&mut self, ctx: &GpuContext, width: u32, height: u32) -> PipelineResult<()>;

    /// Current size in pixels
    fn size(&self) -> (u32, u32);

    /// Texture format frames are presented in
    fn format(&self) -> wgpu::TextureFormat;

    /// Next frame to draw into; `None` when the surface skipped this refresh
    fn acquire(&mut self, ctx: &GpuContext) -> PipelineResult<Option<PresentFrame>>;

    /// Time between refresh opportunities
    fn refresh_interval(&self) -> Duration;

    /// Drop everything tied to the current GPU context
    fn release(&mut self);

    /// Pixels of the last presented frame, if the surface can read them back
    fn read_back(&mut self, _ctx: &GpuContext) -> PipelineResult<Option<RgbaImage>> {
        Ok(None)
    }
}

/// Refresh interval for a rate in Hz, falling back to the default rate for 0
pub fn interval_from_hz(hz: u32) -> Duration {
    let hz = if hz == 0 {
        crate::constants::render::DEFAULT_REFRESH_HZ
    } else {
        hz
    };
    Duration::from_secs(1) / hz
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_from_hz() {
        assert_eq!(interval_from_hz(50), Duration::from_millis(20));
        assert_eq!(interval_from_hz(0), interval_from_hz(60));
    }
}
