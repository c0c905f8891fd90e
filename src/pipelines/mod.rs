// SPDX-License-Identifier: MPL-2.0

//! Processing pipelines
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Render target│ ──▶ │  Encoder thread   │ ──▶ │  Video file  │
//! │   (leased)   │     │  - blit + readback│     │              │
//! │              │     │  - GStreamer      │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! - [`video`]: recording sessions fed from the render thread

pub mod video;
