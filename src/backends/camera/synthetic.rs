// SPDX-License-Identifier: MPL-2.0

//! Synthetic frame producer
//!
//! Generates RGBA test frames on a background thread at a fixed rate. Used by
//! the demo when no camera is present and by the pipeline tests.

use super::types::*;
use super::{ExternalTextureBinding, FrameProducer, choose_closest_size};
use crate::constants::capture;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Sizes the synthetic producer pretends to support
pub const SYNTHETIC_SIZES: [(u32, u32); 4] = [(320, 240), (640, 480), (1280, 720), (1920, 1080)];

/// What the synthetic producer draws
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticPattern {
    /// Diagonal gradient that scrolls one pixel per frame
    Gradient,
    /// Every pixel the same RGBA value
    Solid([u8; 4]),
}

impl SyntheticPattern {
    /// Render frame `index` as tightly packed RGBA
    pub fn render(&self, width: u32, height: u32, index: u64) -> Vec<u8> {
        match self {
            SyntheticPattern::Solid(rgba) => rgba.repeat((width * height) as usize),
            SyntheticPattern::Gradient => {
                let mut data = Vec::with_capacity((width * height * 4) as usize);
                for y in 0..height {
                    for x in 0..width {
                        let r = ((x as u64 + index) * 255 / width.max(1) as u64) as u8;
                        let g = (y * 255 / height.max(1)) as u8;
                        let b = ((x + y) as u64 + index * 2) as u8;
                        data.extend_from_slice(&[r, g, b, 255]);
                    }
                }
                data
            }
        }
    }
}

/// Test-pattern producer running on its own thread
pub struct SyntheticProducer {
    pattern: SyntheticPattern,
    facing: CameraFacing,
    supported: Vec<(u32, u32)>,
    size: (u32, u32),
    framerate: u32,
    binding: Arc<Mutex<Option<ExternalTextureBinding>>>,
    running: Arc<AtomicBool>,
    frames_delivered: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl SyntheticProducer {
    pub fn new(pattern: SyntheticPattern, framerate: u32) -> Self {
        Self {
            pattern,
            facing: CameraFacing::default(),
            supported: SYNTHETIC_SIZES.to_vec(),
            size: (capture::DESIRED_WIDTH, capture::DESIRED_HEIGHT),
            framerate: framerate.max(1),
            binding: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            frames_delivered: Arc::new(AtomicU64::new(0)),
            worker: None,
        }
    }

    /// Restrict the sizes reported to `negotiate_size`
    pub fn with_sizes(mut self, sizes: &[(u32, u32)]) -> Self {
        self.supported = sizes.to_vec();
        self
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Facing this producer was opened for
    pub fn facing(&self) -> CameraFacing {
        self.facing
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::Relaxed)
    }
}

impl FrameProducer for SyntheticProducer {
    fn open(facing: CameraFacing) -> BackendResult<Self> {
        let mut producer = Self::new(SyntheticPattern::Gradient, capture::FRAMERATE);
        producer.facing = facing;
        Ok(producer)
    }

    fn negotiate_size(&mut self, width: u32, height: u32) -> (u32, u32) {
        self.size = choose_closest_size(&self.supported, width, height).unwrap_or((width, height));
        self.size
    }

    fn bind_texture(&mut self, binding: ExternalTextureBinding) {
        match self.binding.lock() {
            Ok(mut slot) => *slot = Some(binding),
            Err(poisoned) => *poisoned.into_inner() = Some(binding),
        }
    }

    fn start(&mut self) -> BackendResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let (width, height) = self.size;
        let pattern = self.pattern;
        let period = Duration::from_secs(1) / self.framerate;
        let binding = Arc::clone(&self.binding);
        let running = Arc::clone(&self.running);
        let frames_delivered = Arc::clone(&self.frames_delivered);

        info!(width, height, fps = self.framerate, ?pattern, "Starting synthetic producer");

        let handle = std::thread::Builder::new()
            .name("synthetic-producer".to_string())
            .spawn(move || {
                let start = Instant::now();
                let stride = width * 4;
                let mut index = 0u64;
                while running.load(Ordering::Acquire) {
                    let frame = CameraFrame {
                        data: pattern.render(width, height, index).into(),
                        width,
                        height,
                        stride,
                        timestamp_ns: start.elapsed().as_nanos() as u64,
                        captured_at: Instant::now(),
                    };
                    let delivered = match binding.lock() {
                        Ok(guard) => guard.as_ref().map(|b| b.deliver(frame)).unwrap_or(false),
                        Err(_) => false,
                    };
                    if delivered {
                        frames_delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    index += 1;

                    let next = start + period * index as u32;
                    if let Some(wait) = next.checked_duration_since(Instant::now()) {
                        std::thread::sleep(wait);
                    }
                }
                debug!(frames = index, "Synthetic producer exiting");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                BackendError::InitializationFailed(format!("Failed to spawn producer thread: {}", e))
            })?;

        self.worker = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> BackendResult<()> {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            handle
                .join()
                .map_err(|_| BackendError::Other("Synthetic producer thread panicked".to_string()))?;
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn name(&self) -> &str {
        "Synthetic test pattern"
    }
}

impl Drop for SyntheticProducer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::external_texture::detached_binding;

    #[test]
    fn test_solid_pattern() {
        let data = SyntheticPattern::Solid([10, 20, 30, 255]).render(3, 2, 7);
        assert_eq!(data.len(), 3 * 2 * 4);
        assert!(data.chunks(4).all(|p| p == [10, 20, 30, 255]));
    }

    #[test]
    fn test_negotiate_uses_supported_sizes() {
        let mut producer = SyntheticProducer::new(SyntheticPattern::Gradient, 30).with_sizes(&[(640, 480), (1280, 720)]);
        assert_eq!(producer.negotiate_size(1000, 600), (1280, 720));
        assert_eq!(producer.size(), (1280, 720));
    }

    #[test]
    fn test_delivers_into_bound_texture() {
        let (binding, slot) = detached_binding(Arc::new(|| {}));
        let mut producer = SyntheticProducer::new(SyntheticPattern::Solid([1, 2, 3, 4]), 200).with_sizes(&[(8, 4)]);
        producer.negotiate_size(8, 4);
        producer.bind_texture(binding);
        producer.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while producer.frames_delivered() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        producer.stop().unwrap();
        assert!(!producer.is_running());

        let frame = slot.lock().unwrap().take().expect("a frame was delivered");
        assert_eq!((frame.width, frame.height, frame.stride), (8, 4, 32));
        assert!(frame.is_well_formed());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut producer = SyntheticProducer::new(SyntheticPattern::Gradient, 30);
        producer.stop().unwrap();
        producer.stop().unwrap();
    }
}
