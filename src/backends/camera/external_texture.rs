// SPDX-License-Identifier: GPL-3.0-only

//! External frame texture
//!
//! The producer side holds an [`ExternalTextureBinding`] and delivers frames
//! into a single latest-wins slot. The render thread owns the matching
//! [`ExternalFrameTexture`] and latches the slot into a GPU texture with
//! [`ExternalFrameTexture::update_tex_image`]. One texture exists per render
//! context; dropping it closes the binding so late deliveries are discarded.

use super::types::CameraFrame;
use crate::errors::{PipelineResult, SetupError};
use crate::gpu::wgpu;
use crate::render::frame_signal::FrameSignal;
use crate::shaders::{CachedDimensions, TexMatrix, center_crop_matrix};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Callback invoked after every delivered frame
pub type FrameListener = Arc<dyn Fn() + Send + Sync>;

/// Producer-side handle to the render context's external texture
#[derive(Clone)]
pub struct ExternalTextureBinding {
    generation: u64,
    slot: Arc<Mutex<Option<CameraFrame>>>,
    listener: FrameListener,
    closed: Arc<AtomicBool>,
}

impl ExternalTextureBinding {
    /// Render-context generation this binding belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the texture behind this binding has been torn down
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Deliver a frame, replacing any frame not yet latched
    ///
    /// Returns `false` if the binding is closed and the frame was discarded.
    pub fn deliver(&self, frame: CameraFrame) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.slot.lock() {
            Ok(mut slot) => *slot = Some(frame),
            Err(poisoned) => *poisoned.into_inner() = Some(frame),
        }
        (self.listener)();
        true
    }
}

impl std::fmt::Debug for ExternalTextureBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalTextureBinding")
            .field("generation", &self.generation)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// GPU texture fed by the producer's most recent frame
pub struct ExternalFrameTexture {
    binding: ExternalTextureBinding,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    texture: Option<(wgpu::Texture, wgpu::TextureView)>,
    size: CachedDimensions,
    timestamp_ns: u64,
    transform: TexMatrix,
    mirror: bool,
}

impl ExternalFrameTexture {
    /// Create the texture for one render-context lifetime
    ///
    /// Every delivered frame notifies `signal`.
    pub fn new(
        device: &Arc<wgpu::Device>,
        queue: &Arc<wgpu::Queue>,
        generation: u64,
        signal: Arc<FrameSignal>,
        mirror: bool,
    ) -> Self {
        let listener: FrameListener = Arc::new(move || {
            signal.notify();
        });
        Self {
            binding: ExternalTextureBinding {
                generation,
                slot: Arc::new(Mutex::new(None)),
                listener,
                closed: Arc::new(AtomicBool::new(false)),
            },
            device: Arc::clone(device),
            queue: Arc::clone(queue),
            texture: None,
            size: CachedDimensions::default(),
            timestamp_ns: 0,
            transform: center_crop_matrix(1, 1, mirror),
            mirror,
        }
    }

    pub fn binding(&self) -> ExternalTextureBinding {
        self.binding.clone()
    }

    /// Latch the most recent delivered frame into the GPU texture
    ///
    /// Returns `Ok(false)` when no frame was waiting.
    pub fn update_tex_image(&mut self) -> PipelineResult<bool> {
        let frame = match self.binding.slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(frame) = frame else {
            return Ok(false);
        };

        if !frame.is_well_formed() {
            warn!(
                width = frame.width,
                height = frame.height,
                stride = frame.stride,
                len = frame.data.len(),
                "Dropping malformed producer frame"
            );
            return Ok(false);
        }

        if self.texture.is_none() || self.size.needs_update(frame.width, frame.height) {
            self.allocate(frame.width, frame.height)?;
        }
        let Some((texture, _)) = &self.texture else {
            return Ok(false);
        };

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(frame.stride),
                rows_per_image: Some(frame.height),
            },
            wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
        );

        self.timestamp_ns = frame.timestamp_ns;
        Ok(true)
    }

    fn allocate(&mut self, width: u32, height: u32) -> PipelineResult<()> {
        debug!(width, height, "Allocating external frame texture");

        let texture = crate::gpu::with_validation(&self.device, || {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("shadercam external frame texture"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        })
        .map_err(SetupError::Allocation)?;

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.texture = Some((texture, view));
        self.size.update(width, height);
        self.transform = center_crop_matrix(width, height, self.mirror);
        Ok(())
    }

    /// View of the latched frame; `None` until the first frame arrives
    pub fn view(&self) -> Option<&wgpu::TextureView> {
        self.texture.as_ref().map(|(_, view)| view)
    }

    /// Timestamp of the latched frame
    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    /// Texture transform mapping the square output onto the latched frame
    pub fn transform(&self) -> TexMatrix {
        self.transform
    }

    /// Size of the latched frame
    pub fn size(&self) -> CachedDimensions {
        self.size
    }
}

impl Drop for ExternalFrameTexture {
    fn drop(&mut self) {
        self.binding.closed.store(true, Ordering::Release);
    }
}

/// Binding not attached to any GPU texture, for producers under test
#[cfg(test)]
pub(crate) fn detached_binding(listener: FrameListener) -> (ExternalTextureBinding, Arc<Mutex<Option<CameraFrame>>>) {
    let slot = Arc::new(Mutex::new(None));
    (
        ExternalTextureBinding {
            generation: 0,
            slot: Arc::clone(&slot),
            listener,
            closed: Arc::new(AtomicBool::new(false)),
        },
        slot,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn frame(ts: u64) -> CameraFrame {
        CameraFrame {
            data: vec![0u8; 16].into(),
            width: 2,
            height: 2,
            stride: 8,
            timestamp_ns: ts,
            captured_at: Instant::now(),
        }
    }

    #[test]
    fn test_deliver_keeps_latest_frame() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let (binding, slot) = detached_binding(Arc::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }));

        assert!(binding.deliver(frame(1)));
        assert!(binding.deliver(frame(2)));

        assert_eq!(calls.load(Ordering::Relaxed), 2);
        let latched = slot.lock().unwrap().take().unwrap();
        assert_eq!(latched.timestamp_ns, 2);
    }

    #[test]
    fn test_closed_binding_discards_frames() {
        let (binding, slot) = detached_binding(Arc::new(|| {}));
        binding.closed.store(true, Ordering::Release);
        assert!(!binding.deliver(frame(1)));
        assert!(slot.lock().unwrap().is_none());
    }
}
