// SPDX-License-Identifier: MPL-2.0

//! Encoder selection for the recording pipeline

use crate::constants::{capture, encoder};
use crate::media::encoders::video::{
    EncoderInfo, RateControl, SelectedVideoEncoder, VideoCodec, create_encoder_from_info,
    select_video_encoder,
};

/// Configuration for encoder selection
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Preferred codec; other codecs are used only when it is unavailable
    pub codec: VideoCodec,
    /// Target bitrate in bits per second
    pub bitrate_bps: u32,
    /// Video width
    pub width: u32,
    /// Video height
    pub height: u32,
    /// Nominal framerate, used for caps and the keyframe interval
    pub framerate: u32,
    /// Seconds between keyframes
    pub keyframe_interval_secs: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            codec: VideoCodec::H264,
            bitrate_bps: encoder::DEFAULT_BITRATE_BPS,
            width: capture::DESIRED_HEIGHT,
            height: capture::DESIRED_HEIGHT,
            framerate: capture::FRAMERATE,
            keyframe_interval_secs: encoder::KEYFRAME_INTERVAL_SECS,
        }
    }
}

impl EncoderConfig {
    pub fn rate_control(&self) -> RateControl {
        RateControl {
            bitrate_bps: self.bitrate_bps,
            keyframe_interval: (self.framerate * self.keyframe_interval_secs).max(1),
        }
    }
}

/// Select the best available encoder for the configuration
///
/// # Returns
/// * `Ok(SelectedVideoEncoder)` - Encoder, parser and muxer elements
/// * `Err(String)` - Error message if encoder selection fails
pub fn select_encoders(config: &EncoderConfig) -> Result<SelectedVideoEncoder, String> {
    select_video_encoder(config.codec, config.rate_control())
}

/// Select a specific encoder
pub fn select_encoders_with_video(
    config: &EncoderConfig,
    encoder_info: &EncoderInfo,
) -> Result<SelectedVideoEncoder, String> {
    create_encoder_from_info(encoder_info, config.rate_control())
}
