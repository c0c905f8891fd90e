// SPDX-License-Identifier: MPL-2.0

//! Container muxing
//!
//! Links the encoded stream into a muxer writing a single seekable file.

use gstreamer as gst;
use gstreamer::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

/// Muxer configuration
pub struct MuxerConfig {
    /// Muxer element
    pub muxer: gst::Element,
    /// File sink element
    pub filesink: gst::Element,
    /// Output file path
    pub output_path: PathBuf,
}

/// Create muxer and filesink
///
/// # Arguments
/// * `muxer` - Pre-created muxer element
/// * `output_path` - Path to output file
///
/// # Returns
/// * `Ok(MuxerConfig)` - Muxer configuration
/// * `Err(String)` - Error message
pub fn create_muxer(muxer: gst::Element, output_path: PathBuf) -> Result<MuxerConfig, String> {
    info!(path = %output_path.display(), "Creating muxer");

    let muxer_name = muxer
        .factory()
        .map(|f| f.name().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    // Non-streamable output so duration and indexes are written for seekable playback
    if muxer.has_property("streamable") {
        muxer.set_property("streamable", false);
        debug!(muxer = %muxer_name, "Configured muxer with streamable=false");
    }

    let location = output_path
        .to_str()
        .ok_or_else(|| format!("Output path is not valid UTF-8: {}", output_path.display()))?;

    let filesink = gst::ElementFactory::make("filesink")
        .property("location", location)
        .build()
        .map_err(|e| format!("Failed to create filesink: {}", e))?;

    debug!(muxer = %muxer_name, "Muxer and filesink created");

    Ok(MuxerConfig {
        muxer,
        filesink,
        output_path,
    })
}

/// Link video encoder (or parser, if present) to muxer
pub fn link_video_to_muxer(encoder: &gst::Element, muxer: &gst::Element) -> Result<(), String> {
    encoder
        .link(muxer)
        .map_err(|_| "Failed to link video encoder to muxer".to_string())?;

    debug!("Video encoder linked to muxer");
    Ok(())
}

/// Link muxer to filesink
pub fn link_muxer_to_sink(muxer: &gst::Element, filesink: &gst::Element) -> Result<(), String> {
    muxer
        .link(filesink)
        .map_err(|_| "Failed to link muxer to filesink".to_string())?;

    debug!("Muxer linked to filesink");
    Ok(())
}
