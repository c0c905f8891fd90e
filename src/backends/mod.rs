// SPDX-License-Identifier: MPL-2.0

//! Collaborators at the edges of the pipeline
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │  camera producer │ ──▶ │ render thread│ ──▶ │ display surface  │
//! └──────────────────┘     └──────────────┘     └──────────────────┘
//! ```
//!
//! - [`camera`]: frame producers and the external texture they feed
//! - [`surface`]: presentation surfaces the render thread draws into

pub mod camera;
pub mod surface;
