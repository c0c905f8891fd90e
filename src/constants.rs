// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};

/// Video encoder bitrate presets
///
/// The recording output is square, so presets are expressed against the side
/// length of the encoded frame rather than a width/height pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitratePreset {
    /// Low bitrate - smaller files, reduced quality
    Low,
    /// Fixed 1 Mbit/s target regardless of size (default)
    #[default]
    Standard,
    /// High bitrate - larger files, better quality
    High,
}

impl BitratePreset {
    /// All presets, ordered from lowest to highest quality
    pub const ALL: [BitratePreset; 3] = [
        BitratePreset::Low,
        BitratePreset::Standard,
        BitratePreset::High,
    ];

    /// Get display name for the preset
    pub fn display_name(&self) -> &'static str {
        match self {
            BitratePreset::Low => "Low",
            BitratePreset::Standard => "Standard",
            BitratePreset::High => "High",
        }
    }

    /// Target bitrate in bits per second for a square frame of `side` pixels
    ///
    /// - Low: half of `Standard`, never below 250 kbit/s
    /// - Standard: [`encoder::DEFAULT_BITRATE_BPS`]
    /// - High: scales with pixel count, never below `Standard`
    pub fn bitrate_bps(&self, side: u32) -> u32 {
        match self {
            BitratePreset::Low => (encoder::DEFAULT_BITRATE_BPS / 2).max(250_000),
            BitratePreset::Standard => encoder::DEFAULT_BITRATE_BPS,
            BitratePreset::High => {
                let pixels = side as u64 * side as u64;
                // ~8 bits per pixel per second at 30fps is plenty for a preview stream
                let scaled = (pixels * 8).min(u32::MAX as u64) as u32;
                scaled.max(encoder::DEFAULT_BITRATE_BPS)
            }
        }
    }
}

/// Format bitrate for display (e.g., "1 Mbps" or "2.5 Mbps")
pub fn format_bitrate(bps: u32) -> String {
    let mbps = bps as f64 / 1_000_000.0;
    if mbps == mbps.floor() {
        format!("{} Mbps", mbps as u32)
    } else {
        format!("{:.1} Mbps", mbps)
    }
}

/// Capture device defaults
pub mod capture {
    /// Size requested from the capture device before negotiation
    pub const DESIRED_WIDTH: u32 = 1280;
    pub const DESIRED_HEIGHT: u32 = 720;

    /// Nominal producer framerate
    pub const FRAMERATE: u32 = 30;

    /// appsink buffer depth; older frames are dropped
    pub const MAX_BUFFERS: u32 = 2;
}

/// Render stage tunables
pub mod render {
    /// Minimum number of offscreen targets shared with the encoder
    pub const MIN_TARGET_RING_DEPTH: usize = 2;

    /// Default number of offscreen targets shared with the encoder
    pub const DEFAULT_TARGET_RING_DEPTH: usize = 3;

    /// Owner -> render command queue capacity
    pub const COMMAND_QUEUE_DEPTH: usize = 64;

    /// Render -> owner event queue capacity
    pub const EVENT_QUEUE_DEPTH: usize = 32;

    /// Commands applied back to back before an overdue draw must run
    pub const MAX_COMMANDS_PER_DRAW: usize = 16;

    /// Refresh rate used when the surface does not report one
    pub const DEFAULT_REFRESH_HZ: u32 = 60;

    /// Offscreen targets are never smaller than this
    pub const MIN_TARGET_SIDE: u32 = 2;
}

/// Encoder stage tunables
pub mod encoder {
    use std::time::Duration;

    /// Default recording bitrate (bits per second)
    pub const DEFAULT_BITRATE_BPS: u32 = 1_000_000;

    /// Render -> encoder queue capacity; frames beyond this are dropped
    pub const COMMAND_QUEUE_DEPTH: usize = 4;

    /// Seconds between keyframes in the recorded stream
    pub const KEYFRAME_INTERVAL_SECS: u32 = 5;

    /// Upper bound on waiting for the muxer to flush after end-of-stream
    pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

    /// Encoder -> owner event queue capacity
    pub const EVENT_QUEUE_DEPTH: usize = 16;
}

/// Timing constants
pub mod timing {
    /// Log frame statistics every N frames
    pub const FRAME_LOG_INTERVAL: u64 = 120;

    /// Timeout for pipeline state changes (seconds)
    pub const STOP_TIMEOUT_SECS: u64 = 2;

    /// Timeout for pipeline start (seconds)
    pub const START_TIMEOUT_SECS: u64 = 5;
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_bitrate_is_fixed() {
        assert_eq!(BitratePreset::Standard.bitrate_bps(240), 1_000_000);
        assert_eq!(BitratePreset::Standard.bitrate_bps(1080), 1_000_000);
    }

    #[test]
    fn test_format_bitrate() {
        assert_eq!(format_bitrate(1_000_000), "1 Mbps");
        assert_eq!(format_bitrate(2_500_000), "2.5 Mbps");
    }
}
