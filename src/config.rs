// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::CameraFacing;
use crate::constants::{BitratePreset, capture, render};
use crate::errors::{PipelineError, PipelineResult};
use crate::media::encoders::video::VideoCodec;
use crate::shaders::FilterEffect;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory name under the platform config and video directories
pub const APP_DIR: &str = "shadercam";

const CONFIG_FILE: &str = "config.json";

/// Requested capture size, before negotiation with the device
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct CaptureSize {
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureSize {
    fn default() -> Self {
        Self {
            width: capture::DESIRED_WIDTH,
            height: capture::DESIRED_HEIGHT,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera to open when no device path is given
    pub facing: CameraFacing,
    /// Last used camera device path
    pub last_camera_path: Option<String>,
    pub capture_size: CaptureSize,
    /// Filter applied when the pipeline starts
    pub initial_filter: FilterEffect,
    /// Round mask on the displayed image
    pub circle_mask: bool,
    /// Mirror the camera image horizontally (selfie mode)
    pub mirror: bool,
    /// Used when the surface does not report a refresh rate
    pub refresh_hz: u32,
    /// Offscreen targets shared with the encoder
    pub target_ring_depth: usize,
    /// Preferred recording codec; others are fallbacks
    pub codec: VideoCodec,
    pub bitrate_preset: BitratePreset,
    /// Where recordings and snapshots go
    pub output_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            facing: CameraFacing::default(),
            last_camera_path: None,
            capture_size: CaptureSize::default(),
            initial_filter: FilterEffect::None,
            circle_mask: false,
            mirror: true,
            refresh_hz: render::DEFAULT_REFRESH_HZ,
            target_ring_depth: render::DEFAULT_TARGET_RING_DEPTH,
            codec: VideoCodec::default(),
            bitrate_preset: BitratePreset::default(),
            output_dir: None,
        }
    }
}

impl Config {
    /// Default location, `<config dir>/shadercam/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from the default location, falling back to defaults
    ///
    /// A missing file is not an error; an unreadable or malformed one is
    /// logged and replaced by defaults.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            warn!("No config directory available, using defaults");
            return Self::default();
        };
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> PipelineResult<()> {
        if self.capture_size.width == 0 || self.capture_size.height == 0 {
            return Err(PipelineError::Config(format!(
                "capture size {}x{} is empty",
                self.capture_size.width, self.capture_size.height
            )));
        }
        if self.target_ring_depth < render::MIN_TARGET_RING_DEPTH {
            return Err(PipelineError::Config(format!(
                "target ring depth {} is below the minimum of {}",
                self.target_ring_depth,
                render::MIN_TARGET_RING_DEPTH
            )));
        }
        Ok(())
    }

    /// Output directory, defaulting to `<videos>/shadercam`
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| {
            dirs::video_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
        })
    }

    /// Recording bitrate for a square output of `side` pixels
    pub fn bitrate_bps(&self, side: u32) -> u32 {
        self.bitrate_preset.bitrate_bps(side)
    }
}
