// SPDX-License-Identifier: MPL-2.0

//! Media encoding utilities
//!
//! The [`encoders`] module handles encoder detection, selection and rate
//! control for the recording pipeline. Frames reach the encoder as RGBA read
//! back from the GPU; colorspace conversion to the codec's input format is
//! left to GStreamer's `videoconvert`.

pub mod encoders;

pub use encoders::{EncoderInfo, RateControl, VideoCodec};
