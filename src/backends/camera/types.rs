// SPDX-License-Identifier: GPL-3.0-only
// Shared types for frame producers

//! Shared types for frame producers

use gstreamer::buffer::{MappedBuffer, Readable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Frame data storage - either pre-copied bytes or zero-copy GStreamer buffer
///
/// The `Mapped` variant keeps the GStreamer buffer mapped and alive until all
/// references are dropped, so appsink frames reach the render thread without
/// a copy.
#[derive(Clone)]
pub enum FrameData {
    /// Pre-copied bytes (synthetic producer, tests)
    Copied(Arc<[u8]>),
    /// Zero-copy mapped GStreamer buffer
    Mapped(Arc<MappedBuffer<Readable>>),
}

impl FrameData {
    /// Create FrameData from a mapped GStreamer buffer (zero-copy)
    pub fn from_mapped_buffer(buffer: MappedBuffer<Readable>) -> Self {
        FrameData::Mapped(Arc::new(buffer))
    }

    /// Get the length of the frame data in bytes
    pub fn len(&self) -> usize {
        match self {
            FrameData::Copied(data) => data.len(),
            FrameData::Mapped(buf) => buf.len(),
        }
    }

    /// Check if the frame data is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameData::Copied(data) => write!(f, "FrameData::Copied({} bytes)", data.len()),
            FrameData::Mapped(buf) => write!(f, "FrameData::Mapped({} bytes)", buf.len()),
        }
    }
}

impl AsRef<[u8]> for FrameData {
    fn as_ref(&self) -> &[u8] {
        match self {
            FrameData::Copied(data) => data.as_ref(),
            FrameData::Mapped(buf) => buf.as_slice(),
        }
    }
}

impl std::ops::Deref for FrameData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_ref()
    }
}

impl From<Vec<u8>> for FrameData {
    fn from(data: Vec<u8>) -> Self {
        FrameData::Copied(data.into())
    }
}

/// Which way the camera points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CameraFacing {
    /// User-facing camera
    Front,
    /// World-facing camera
    #[default]
    Back,
}

impl CameraFacing {
    /// The camera pointing the other way
    pub fn opposite(self) -> Self {
        match self {
            CameraFacing::Front => CameraFacing::Back,
            CameraFacing::Back => CameraFacing::Front,
        }
    }
}

impl std::fmt::Display for CameraFacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraFacing::Front => write!(f, "front"),
            CameraFacing::Back => write!(f, "back"),
        }
    }
}

impl std::str::FromStr for CameraFacing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "front" | "user" => Ok(CameraFacing::Front),
            "back" | "rear" | "environment" => Ok(CameraFacing::Back),
            other => Err(format!("unknown camera facing '{}'", other)),
        }
    }
}

/// A capture device as enumerated by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    /// Human readable name (V4L2 card)
    pub name: String,
    /// Device path (e.g., /dev/video0)
    pub path: String,
    /// Driver name (V4L2 driver)
    pub driver: String,
    /// Best guess at which way the device points
    pub facing: CameraFacing,
}

/// Frame rate as a fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Framerate {
    pub num: u32,
    pub denom: u32,
}

impl Framerate {
    /// Create a new framerate from numerator and denominator
    pub fn new(num: u32, denom: u32) -> Self {
        Self {
            num,
            denom: denom.max(1),
        }
    }

    /// Create from integer fps
    pub fn from_int(fps: u32) -> Self {
        Self::new(fps, 1)
    }

    /// Framerate as a floating point value
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.denom as f64
    }

    /// Framerate rounded to the nearest integer
    pub fn as_int(&self) -> u32 {
        self.as_f64().round() as u32
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.denom == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{:.2}", self.as_f64())
        }
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self::from_int(crate::constants::capture::FRAMERATE)
    }
}

/// A supported capture size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CameraFormat {
    pub width: u32,
    pub height: u32,
    pub framerate: Option<Framerate>,
}

impl std::fmt::Display for CameraFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.framerate {
            Some(fps) => write!(f, "{}x{} @ {} fps", self.width, self.height, fps),
            None => write!(f, "{}x{}", self.width, self.height),
        }
    }
}

/// One RGBA frame delivered by a producer
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub data: FrameData,
    pub width: u32,
    pub height: u32,
    /// Bytes per row
    pub stride: u32,
    /// Producer timestamp in nanoseconds, monotonic within one stream
    pub timestamp_ns: u64,
    pub captured_at: Instant,
}

impl CameraFrame {
    /// Whether `data` holds at least `stride * height` bytes with a stride
    /// that fits a full RGBA row
    pub fn is_well_formed(&self) -> bool {
        self.stride >= self.width * 4 && self.data.len() >= (self.stride * self.height) as usize
    }
}

/// Frame producer errors
#[derive(Debug, Clone)]
pub enum BackendError {
    /// Backend is not available on this system
    NotAvailable(String),
    /// Failed to initialize backend
    InitializationFailed(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// Format not supported
    FormatNotSupported(String),
    /// Operation issued in the wrong lifecycle state
    InvalidState(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::FormatNotSupported(msg) => write!(f, "Format not supported: {}", msg),
            BackendError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

/// Result type for producer operations
pub type BackendResult<T> = Result<T, BackendError>;

impl From<BackendError> for crate::errors::PipelineError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::InvalidState(msg) => crate::errors::PipelineError::ContractViolation(msg),
            other => crate::errors::PipelineError::DeviceUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framerate_display() {
        assert_eq!(Framerate::from_int(30).to_string(), "30");
        assert_eq!(Framerate::new(30000, 1001).to_string(), "29.97");
        assert_eq!(Framerate::new(30000, 1001).as_int(), 30);
    }

    #[test]
    fn test_frame_well_formed() {
        let frame = CameraFrame {
            data: vec![0u8; 4 * 4 * 2].into(),
            width: 4,
            height: 2,
            stride: 16,
            timestamp_ns: 0,
            captured_at: Instant::now(),
        };
        assert!(frame.is_well_formed());
        let short = CameraFrame {
            height: 3,
            ..frame
        };
        assert!(!short.is_well_formed());
    }

    #[test]
    fn test_parse_facing() {
        assert_eq!("front".parse::<CameraFacing>().unwrap(), CameraFacing::Front);
        assert_eq!("REAR".parse::<CameraFacing>().unwrap(), CameraFacing::Back);
        assert!("side".parse::<CameraFacing>().is_err());
    }
}
