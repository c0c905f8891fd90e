// SPDX-License-Identifier: MPL-2.0

//! Video encoder selection and configuration
//!
//! - Codec preference first, hardware before software within a codec
//! - Bitrate and keyframe interval applied per element type
//! - Automatic encoder detection

pub mod detection;
pub mod video;

// Re-export commonly used types
pub use video::{EncoderInfo, RateControl, VideoCodec};

pub use detection::log_available_encoders;
