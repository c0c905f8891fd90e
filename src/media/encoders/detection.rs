// SPDX-License-Identifier: MPL-2.0

//! GStreamer element detection
//!
//! Used before recording to report which encoders and muxers the
//! installation provides.

use super::video::{ContainerFormat, EncoderInfo, VideoCodec, enumerate_video_encoders};
use gstreamer as gst;
use tracing::{debug, info};

/// Check if a specific GStreamer element is available
pub fn is_element_available(element_name: &str) -> bool {
    gst::init().ok();
    gst::ElementFactory::find(element_name).is_some()
}

/// Elements the recording pipeline needs regardless of codec
pub const REQUIRED_ELEMENTS: &[&str] = &["appsrc", "videoconvert", "queue", "filesink"];

/// Required elements that are missing from the installation
pub fn missing_required_elements() -> Vec<&'static str> {
    REQUIRED_ELEMENTS
        .iter()
        .copied()
        .filter(|name| !is_element_available(name))
        .collect()
}

/// Detect all usable video encoders
///
/// An encoder counts only if its codec's muxer is installed too.
pub fn detect_video_encoders(preferred: VideoCodec) -> Vec<EncoderInfo> {
    let available: Vec<EncoderInfo> = enumerate_video_encoders(preferred)
        .into_iter()
        .filter(|e| {
            let muxer = e.codec.container_format().muxer_name();
            let ok = is_element_available(muxer);
            if !ok {
                debug!(encoder = %e.element_name, muxer, "Skipping encoder without muxer");
            }
            ok
        })
        .collect();

    info!("Detected {} video encoders", available.len());
    available
}

/// Log all available encoders (for debugging)
pub fn log_available_encoders() {
    info!("=== GStreamer Encoder Detection ===");

    for encoder in detect_video_encoders(VideoCodec::default()) {
        info!(
            "  ✓ {} ({:?}, {})",
            encoder.element_name,
            encoder.codec,
            if encoder.is_hardware { "hardware" } else { "software" }
        );
    }

    for muxer in [ContainerFormat::MP4, ContainerFormat::WebM] {
        info!(
            muxer = muxer.muxer_name(),
            available = is_element_available(muxer.muxer_name()),
            "Muxer"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_runs() {
        // Just ensure detection doesn't panic
        let _ = detect_video_encoders(VideoCodec::H264);
        let _ = missing_required_elements();
    }

    #[test]
    fn test_unknown_element_is_unavailable() {
        assert!(!is_element_available("definitely-not-a-gstreamer-element"));
    }
}
