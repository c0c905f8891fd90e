// SPDX-License-Identifier: MPL-2.0

//! shadercam - live camera capture through GPU shader filters
//!
//! Camera frames are filtered on the GPU, displayed, and the same
//! GPU-resident filtered frames are recorded to a video file. Neither the
//! display path nor the camera ever waits on file I/O.
//!
//! # Architecture
//!
//! ```text
//! producer ──▶ external texture ──▶ filter program ──▶ target ring ──┬──▶ display
//!                                  (render thread)                  └──▶ encoder thread ──▶ file
//! ```
//!
//! - [`backends`]: frame producers and presentation surfaces
//! - [`shaders`]: filter effects, the GPU filter program and a CPU reference
//! - [`render`]: render thread, offscreen targets and recording state
//! - [`pipelines`]: encoder thread and the GStreamer recording pipeline
//! - [`media`]: encoder detection and selection
//! - [`lifecycle`]: [`CaptureController`], the host-facing command surface
//! - [`config`]: user configuration
//!
//! # Example
//!
//! ```ignore
//! use shadercam::backends::camera::{SyntheticPattern, SyntheticProducer};
//! use shadercam::backends::surface::{HeadlessSurface, SurfaceEvent};
//! use shadercam::{CaptureController, Config, FilterEffect};
//!
//! let producer = SyntheticProducer::new(SyntheticPattern::Gradient, 30);
//! let mut controller = CaptureController::new(producer, &Config::default())?;
//! controller.notify_surface_lifecycle(SurfaceEvent::Created(Box::new(HeadlessSurface::new(720, 720, 60))))?;
//! controller.set_filter(FilterEffect::EdgeDetect)?;
//! controller.set_recording(true)?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod gpu;
pub mod lifecycle;
pub mod media;
pub mod pipelines;
pub mod render;
pub mod shaders;
pub mod stats;

// Re-export commonly used types
pub use config::Config;
pub use constants::BitratePreset;
pub use errors::{PipelineError, PipelineResult, SetupError};
pub use lifecycle::{CaptureController, ControllerEvent};
pub use render::RecordingState;
pub use shaders::FilterEffect;
pub use stats::{PipelineStats, StatsSnapshot};
