// SPDX-License-Identifier: GPL-3.0-only

//! GPU initialization utilities
//!
//! The render thread owns a [`GpuContext`]. The encoder thread never creates
//! its own device; it receives a [`ShareGroup`] handle instead, which lets it
//! create resources that can read the render context's textures.

use crate::errors::{PipelineResult, SetupError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

pub use ::wgpu;

/// Pixel format of every offscreen target and encoder input
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

static NEXT_SHARE_GROUP_ID: AtomicU64 = AtomicU64::new(1);

/// Information about the created GPU device
#[derive(Debug, Clone)]
pub struct GpuDeviceInfo {
    /// Name of the GPU adapter
    pub adapter_name: String,
    /// Backend being used (Vulkan, GL, ...)
    pub backend: wgpu::Backend,
}

/// Opaque handle granting another thread access to the render context's
/// device and queue
///
/// Every render-context recreation mints a new id, so a consumer can tell a
/// stale handle from the current one.
#[derive(Clone)]
pub struct ShareGroup {
    id: u64,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl ShareGroup {
    fn mint(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            id: NEXT_SHARE_GROUP_ID.fetch_add(1, Ordering::Relaxed),
            device,
            queue,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }
}

impl std::fmt::Debug for ShareGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareGroup").field("id", &self.id).finish()
    }
}

/// Device, queue and share-group owned by the render thread
pub struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub info: GpuDeviceInfo,
    share: ShareGroup,
}

impl GpuContext {
    /// Handle for the encoder thread
    pub fn share_group(&self) -> ShareGroup {
        self.share.clone()
    }
}

/// Create an instance restricted to the backends this crate is built with
pub fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::VULKAN | wgpu::Backends::GL,
        ..Default::default()
    })
}

/// Create the render context
///
/// When `compatible_surface` is given the adapter is required to be able to
/// present to it.
pub async fn create_render_context(
    instance: &wgpu::Instance,
    compatible_surface: Option<&wgpu::Surface<'_>>,
    label: &str,
) -> PipelineResult<GpuContext> {
    info!(label = label, "Creating GPU render context");

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|e| SetupError::NoAdapter(e.to_string()))?;

    let adapter_info = adapter.get_info();

    info!(
        adapter = %adapter_info.name,
        backend = ?adapter_info.backend,
        "GPU adapter selected"
    );

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        })
        .await
        .map_err(|e| SetupError::NoAdapter(format!("Failed to create GPU device: {}", e)))?;

    let device = Arc::new(device);
    let queue = Arc::new(queue);
    let share = ShareGroup::mint(Arc::clone(&device), Arc::clone(&queue));

    debug!(share_group = share.id(), "Minted share-group");

    Ok(GpuContext {
        adapter,
        device,
        queue,
        info: GpuDeviceInfo {
            adapter_name: adapter_info.name.clone(),
            backend: adapter_info.backend,
        },
        share,
    })
}

/// Create a headless render context (no presentation surface)
pub async fn create_headless_context(label: &str) -> PipelineResult<GpuContext> {
    let instance = create_instance();
    create_render_context(&instance, None, label).await
}

/// Run `f` inside a validation error scope and return the captured error
/// message, if any
///
/// Shader compilation, pipeline creation and resource allocation in wgpu
/// report failures through the device's error sink rather than return values.
pub fn with_validation<T>(device: &wgpu::Device, f: impl FnOnce() -> T) -> Result<T, String> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    match pollster::block_on(device.pop_error_scope()) {
        None => Ok(value),
        Some(err) => Err(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_headless_context() {
        // This test requires a GPU, so it may be skipped in CI
        match create_headless_context("test_device").await {
            Ok(ctx) => {
                println!("Created device: {:?}", ctx.info);
                assert!(!ctx.info.adapter_name.is_empty() || ctx.info.backend == wgpu::Backend::Gl);
                let share = ctx.share_group();
                assert!(Arc::ptr_eq(share.device(), &ctx.device));
            }
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
            }
        }
    }

    #[tokio::test]
    async fn test_share_group_ids_are_unique_per_context() {
        let Ok(first) = create_headless_context("first").await else {
            println!("Skipping test (no GPU)");
            return;
        };
        let Ok(second) = create_headless_context("second").await else {
            return;
        };
        assert_ne!(first.share_group().id(), second.share_group().id());
        // Clones carry the same id
        assert_eq!(first.share_group().id(), first.share_group().id());
    }
}
