// SPDX-License-Identifier: GPL-3.0-only

//! Display-bound render stage
//!
//! The render thread owns the GPU context, the external frame texture and the
//! ring of offscreen targets it shares with the encoder.

pub mod coordinator;
pub mod frame_signal;
pub mod offscreen;
pub mod session;
pub mod thread;

pub use coordinator::{RenderCommand, RenderCoordinator, RenderEvent, RenderSettings};
pub use frame_signal::FrameSignal;
pub use offscreen::{OffscreenTarget, TargetLease, TargetRing, TargetSlot};
pub use session::{RecordingState, SessionAction, SessionTracker};
pub use thread::RenderThread;
