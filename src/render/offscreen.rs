// SPDX-License-Identifier: GPL-3.0-only

//! Offscreen targets shared with the encoder
//!
//! The render thread filters every frame into a square offscreen target,
//! blits it to the display and, while recording, lends it to the encoder.
//! Targets live in a ring; a lent target is never drawn into again until the
//! encoder drops its [`TargetLease`], which it does right after submitting
//! its blit of that target. When every ring target is lent the render thread
//! draws into a private scratch target and skips the encoder handoff.

use crate::errors::{PipelineResult, SetupError};
use crate::gpu::{self, TARGET_FORMAT, wgpu};
use crate::constants::render::MIN_TARGET_RING_DEPTH;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Square render target
pub struct OffscreenTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    side: u32,
}

impl OffscreenTarget {
    pub fn new(device: &wgpu::Device, side: u32, label: &str) -> PipelineResult<Self> {
        let texture = gpu::with_validation(device, || {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: side,
                    height: side,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TARGET_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        })
        .map_err(SetupError::Allocation)?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Self { texture, view, side })
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn side(&self) -> u32 {
        self.side
    }
}

/// Read access to a ring target, held by the encoder
///
/// Dropping the lease returns the target to the render thread.
pub struct TargetLease {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    side: u32,
    flag: Arc<AtomicBool>,
}

impl TargetLease {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn side(&self) -> u32 {
        self.side
    }
}

impl Drop for TargetLease {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for TargetLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetLease").field("side", &self.side).finish()
    }
}

/// Where the next frame gets drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSlot {
    Ring(usize),
    Scratch,
}

/// Lease bookkeeping for a ring of `depth` slots
#[derive(Debug)]
pub struct LeaseFlags {
    flags: Vec<Arc<AtomicBool>>,
    next: usize,
}

impl LeaseFlags {
    pub fn new(depth: usize) -> Self {
        Self {
            flags: (0..depth.max(MIN_TARGET_RING_DEPTH))
                .map(|_| Arc::new(AtomicBool::new(false)))
                .collect(),
            next: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.flags.len()
    }

    /// Next slot not currently lent, round robin; `Scratch` when all are lent
    pub fn next_writable(&mut self) -> TargetSlot {
        let depth = self.flags.len();
        for step in 0..depth {
            let index = (self.next + step) % depth;
            if !self.flags[index].load(Ordering::Acquire) {
                self.next = (index + 1) % depth;
                return TargetSlot::Ring(index);
            }
        }
        TargetSlot::Scratch
    }

    /// Mark slot `index` as lent and return its flag
    pub fn lend(&self, index: usize) -> Arc<AtomicBool> {
        let flag = Arc::clone(&self.flags[index]);
        flag.store(true, Ordering::Release);
        flag
    }

    pub fn is_lent(&self, index: usize) -> bool {
        self.flags[index].load(Ordering::Acquire)
    }

    pub fn lent_count(&self) -> usize {
        self.flags
            .iter()
            .filter(|f| f.load(Ordering::Acquire))
            .count()
    }
}

/// Offscreen targets of one size, plus the scratch target
pub struct TargetRing {
    device: Arc<wgpu::Device>,
    targets: Vec<OffscreenTarget>,
    scratch: OffscreenTarget,
    leases: LeaseFlags,
}

impl TargetRing {
    pub fn new(device: &Arc<wgpu::Device>, side: u32, depth: usize) -> PipelineResult<Self> {
        let leases = LeaseFlags::new(depth);
        let targets = Self::allocate(device, side, leases.depth())?;
        let scratch = OffscreenTarget::new(device, side, "shadercam scratch target")?;
        info!(side, depth = leases.depth(), "Offscreen target ring created");
        Ok(Self {
            device: Arc::clone(device),
            targets,
            scratch,
            leases,
        })
    }

    fn allocate(device: &wgpu::Device, side: u32, depth: usize) -> PipelineResult<Vec<OffscreenTarget>> {
        (0..depth)
            .map(|i| OffscreenTarget::new(device, side, &format!("shadercam offscreen target {}", i)))
            .collect()
    }

    pub fn side(&self) -> u32 {
        self.scratch.side()
    }

    pub fn depth(&self) -> usize {
        self.targets.len()
    }

    /// Recreate every target at `side` if it differs from the current side
    ///
    /// Leases on the old targets stay valid; the encoder keeps reading the
    /// old textures until it drops them.
    pub fn resize(&mut self, side: u32) -> PipelineResult<()> {
        if side == self.side() {
            return Ok(());
        }
        debug!(old = self.side(), new = side, "Resizing offscreen targets");
        let depth = self.targets.len();
        self.targets = Self::allocate(&self.device, side, depth)?;
        self.scratch = OffscreenTarget::new(&self.device, side, "shadercam scratch target")?;
        self.leases = LeaseFlags::new(depth);
        Ok(())
    }

    pub fn next_writable(&mut self) -> TargetSlot {
        self.leases.next_writable()
    }

    pub fn target(&self, slot: TargetSlot) -> &OffscreenTarget {
        match slot {
            TargetSlot::Ring(index) => &self.targets[index],
            TargetSlot::Scratch => &self.scratch,
        }
    }

    /// Lend ring slot `index` to the encoder
    pub fn lease(&self, index: usize) -> TargetLease {
        let target = &self.targets[index];
        TargetLease {
            texture: target.texture.clone(),
            view: target.view.clone(),
            side: target.side,
            flag: self.leases.lend(index),
        }
    }

    pub fn lent_count(&self) -> usize {
        self.leases.lent_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_never_below_minimum() {
        assert_eq!(LeaseFlags::new(0).depth(), MIN_TARGET_RING_DEPTH);
        assert_eq!(LeaseFlags::new(4).depth(), 4);
    }

    #[test]
    fn test_round_robin_without_leases() {
        let mut flags = LeaseFlags::new(2);
        assert_eq!(flags.next_writable(), TargetSlot::Ring(0));
        assert_eq!(flags.next_writable(), TargetSlot::Ring(1));
        assert_eq!(flags.next_writable(), TargetSlot::Ring(0));
    }

    #[test]
    fn test_lent_slot_is_skipped_until_released() {
        let mut flags = LeaseFlags::new(2);
        assert_eq!(flags.next_writable(), TargetSlot::Ring(0));
        let lease = flags.lend(0);

        assert_eq!(flags.next_writable(), TargetSlot::Ring(1));
        assert_eq!(flags.next_writable(), TargetSlot::Ring(1));

        lease.store(false, Ordering::Release);
        assert_eq!(flags.next_writable(), TargetSlot::Ring(0));
    }

    #[test]
    fn test_scratch_when_all_lent() {
        let mut flags = LeaseFlags::new(2);
        let _a = flags.lend(0);
        let _b = flags.lend(1);
        assert_eq!(flags.lent_count(), 2);
        assert_eq!(flags.next_writable(), TargetSlot::Scratch);
    }
}
