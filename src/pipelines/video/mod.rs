// SPDX-License-Identifier: MPL-2.0

//! Recording pipeline
//!
//! - [`encoder`]: encoder thread, command coalescing and session lifecycle
//! - [`gpu_backend`]: shared-context blit into the recording pipeline
//! - [`recorder`]: GStreamer appsrc -> encoder -> muxer -> file
//! - [`encoder_selection`] and [`muxer`]: element selection and linking

pub mod encoder;
pub mod encoder_selection;
pub mod gpu_backend;
pub mod muxer;
pub mod recorder;

pub use encoder::{
    EncodeBackend, EncoderCommand, EncoderEvent, EncoderSender, EncoderThread, RecordingSession,
    SessionConfig, SharedContext,
};
pub use encoder_selection::EncoderConfig;
pub use gpu_backend::GpuEncodeBackend;
pub use recorder::{VideoRecorder, check_available_encoders};

use crate::gpu::ShareGroup;
use crate::render::offscreen::TargetLease;

/// Encoder thread fed by the render thread's target ring
pub type GpuEncoderThread = EncoderThread<ShareGroup, TargetLease>;

/// Render-side handle to [`GpuEncoderThread`]
pub type GpuEncoderSender = EncoderSender<ShareGroup, TargetLease>;
