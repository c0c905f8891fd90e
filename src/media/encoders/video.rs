// SPDX-License-Identifier: MPL-2.0

//! Video encoder selection with hardware acceleration priority
//!
//! Encoders are chosen by codec preference first (H.264 by default, for
//! playback compatibility of the recorded file), then hardware before
//! software within that codec. Other codecs are used as fallbacks.

use gstreamer as gst;
use gstreamer::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Video codec types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VideoCodec {
    /// H.264 codec (best compatibility)
    #[default]
    H264,
    /// HEVC/H.265 codec (good compression)
    HEVC,
    /// AV1 codec (best compression, modern)
    AV1,
}

impl VideoCodec {
    /// Get the container format for this codec
    pub fn container_format(&self) -> ContainerFormat {
        match self {
            VideoCodec::AV1 => ContainerFormat::WebM,
            VideoCodec::HEVC => ContainerFormat::MP4,
            VideoCodec::H264 => ContainerFormat::MP4,
        }
    }

    /// Get the file extension for this codec's container
    pub fn file_extension(&self) -> &'static str {
        self.container_format().extension()
    }

    /// Get the parser element name (if needed)
    pub fn parser_name(&self) -> Option<&'static str> {
        match self {
            VideoCodec::AV1 => Some("av1parse"),
            VideoCodec::HEVC => Some("h265parse"),
            VideoCodec::H264 => Some("h264parse"),
        }
    }
}

impl std::str::FromStr for VideoCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h264" | "avc" => Ok(VideoCodec::H264),
            "h265" | "hevc" => Ok(VideoCodec::HEVC),
            "av1" => Ok(VideoCodec::AV1),
            other => Err(format!("unknown codec '{}'", other)),
        }
    }
}

/// Container formats for video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// MP4 container (good compatibility)
    MP4,
    /// WebM container (open format)
    WebM,
}

impl ContainerFormat {
    /// Get file extension
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::MP4 => "mp4",
            ContainerFormat::WebM => "webm",
        }
    }

    /// Get muxer element name
    pub fn muxer_name(&self) -> &'static str {
        match self {
            ContainerFormat::MP4 => "mp4mux",
            ContainerFormat::WebM => "webmmux",
        }
    }
}

/// Information about an available encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderInfo {
    /// GStreamer element name
    pub element_name: String,
    /// Display name
    pub display_name: String,
    /// Codec type
    pub codec: VideoCodec,
    /// Whether this is hardware accelerated
    pub is_hardware: bool,
    /// Priority within its codec (lower = higher priority)
    pub priority: u32,
}

/// Selected video encoder with configuration
pub struct SelectedVideoEncoder {
    /// The encoder element
    pub encoder: gst::Element,
    /// Optional parser element
    pub parser: Option<gst::Element>,
    /// Muxer element
    pub muxer: gst::Element,
    /// Codec being used
    pub codec: VideoCodec,
    /// Container format
    pub container: ContainerFormat,
    /// File extension
    pub extension: &'static str,
}

/// Rate-control parameters applied to the encoder element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateControl {
    /// Target bitrate in bits per second
    pub bitrate_bps: u32,
    /// Maximum distance between keyframes, in frames
    pub keyframe_interval: u32,
}

/// Known encoders: (element, display name, codec, hardware, priority)
const ENCODER_SPECS: &[(&str, &str, VideoCodec, bool, u32)] = &[
    // Hardware H.264
    ("vah264enc", "VA-API H.264 (HW)", VideoCodec::H264, true, 1),
    ("vaapih264enc", "VA-API H.264 (HW)", VideoCodec::H264, true, 2),
    ("nvh264enc", "NVIDIA H.264 (HW)", VideoCodec::H264, true, 3),
    ("qsvh264enc", "Intel QSV H.264 (HW)", VideoCodec::H264, true, 4),
    ("v4l2h264enc", "V4L2 H.264 (HW)", VideoCodec::H264, true, 5),
    // Software H.264
    ("x264enc", "x264 H.264 (SW)", VideoCodec::H264, false, 10),
    ("openh264enc", "OpenH264 H.264 (SW)", VideoCodec::H264, false, 11),
    // Hardware HEVC/H.265
    ("vah265enc", "VA-API H.265 (HW)", VideoCodec::HEVC, true, 1),
    ("vaapih265enc", "VA-API H.265 (HW)", VideoCodec::HEVC, true, 2),
    ("nvh265enc", "NVIDIA H.265 (HW)", VideoCodec::HEVC, true, 3),
    ("v4l2h265enc", "V4L2 H.265 (HW)", VideoCodec::HEVC, true, 5),
    // Software HEVC/H.265
    ("x265enc", "x265 H.265 (SW)", VideoCodec::HEVC, false, 10),
    // Hardware AV1
    ("vaav1enc", "VA-API AV1 (HW)", VideoCodec::AV1, true, 1),
    ("nvav1enc", "NVIDIA AV1 (HW)", VideoCodec::AV1, true, 2),
    // Software AV1
    ("svtav1enc", "SVT-AV1 (SW)", VideoCodec::AV1, false, 10),
    ("av1enc", "AOM AV1 (SW)", VideoCodec::AV1, false, 11),
];

/// Codec search order starting from `preferred`
pub fn codec_search_order(preferred: VideoCodec) -> [VideoCodec; 3] {
    match preferred {
        VideoCodec::H264 => [VideoCodec::H264, VideoCodec::HEVC, VideoCodec::AV1],
        VideoCodec::HEVC => [VideoCodec::HEVC, VideoCodec::H264, VideoCodec::AV1],
        VideoCodec::AV1 => [VideoCodec::AV1, VideoCodec::H264, VideoCodec::HEVC],
    }
}

/// Order encoder candidates: preferred codec first, then by priority
pub fn rank_encoders(mut encoders: Vec<EncoderInfo>, preferred: VideoCodec) -> Vec<EncoderInfo> {
    let order = codec_search_order(preferred);
    encoders.sort_by_key(|e| {
        let codec_rank = order.iter().position(|c| *c == e.codec).unwrap_or(order.len());
        (codec_rank, e.priority)
    });
    encoders
}

/// Enumerate all available video encoders, ranked for `preferred`
pub fn enumerate_video_encoders(preferred: VideoCodec) -> Vec<EncoderInfo> {
    let _ = gst::init();

    let available: Vec<EncoderInfo> = ENCODER_SPECS
        .iter()
        .filter(|(element_name, ..)| gst::ElementFactory::find(element_name).is_some())
        .map(|(element_name, display_name, codec, is_hardware, priority)| EncoderInfo {
            element_name: element_name.to_string(),
            display_name: display_name.to_string(),
            codec: *codec,
            is_hardware: *is_hardware,
            priority: *priority,
        })
        .collect();

    rank_encoders(available, preferred)
}

/// Create encoder, parser and muxer elements from encoder info
pub fn create_encoder_from_info(
    info: &EncoderInfo,
    rate: RateControl,
) -> Result<SelectedVideoEncoder, String> {
    let encoder = gst::ElementFactory::make(&info.element_name)
        .build()
        .map_err(|e| format!("Failed to create encoder {}: {}", info.element_name, e))?;

    configure_video_encoder(&encoder, &info.element_name, rate);

    // Create parser if needed
    let parser = if let Some(parser_name) = info.codec.parser_name() {
        match gst::ElementFactory::make(parser_name).build() {
            Ok(p) => {
                debug!("Created parser: {}", parser_name);
                Some(p)
            }
            Err(e) => {
                warn!("Failed to create parser {}: {}", parser_name, e);
                None
            }
        }
    } else {
        None
    };

    // Create muxer
    let container = info.codec.container_format();
    let muxer = gst::ElementFactory::make(container.muxer_name())
        .build()
        .map_err(|e| format!("Failed to create muxer {}: {}", container.muxer_name(), e))?;

    Ok(SelectedVideoEncoder {
        encoder,
        parser,
        muxer,
        codec: info.codec,
        container,
        extension: info.codec.file_extension(),
    })
}

/// Select the best available video encoder for `preferred`
///
/// # Returns
/// * `Ok(SelectedVideoEncoder)` - Selected encoder with configuration
/// * `Err(String)` - Error message if no encoder available
pub fn select_video_encoder(
    preferred: VideoCodec,
    rate: RateControl,
) -> Result<SelectedVideoEncoder, String> {
    gst::init().map_err(|e| format!("Failed to initialize GStreamer: {}", e))?;

    for info in enumerate_video_encoders(preferred) {
        match create_encoder_from_info(&info, rate) {
            Ok(selected) => {
                info!(
                    encoder = %info.element_name,
                    codec = ?info.codec,
                    hardware = info.is_hardware,
                    bitrate = rate.bitrate_bps,
                    "Selected video encoder"
                );
                return Ok(selected);
            }
            Err(e) => {
                warn!(encoder = %info.element_name, error = %e, "Encoder unusable, trying next");
            }
        }
    }

    Err("No video encoder available. Please install gstreamer1-plugins-ugly (x264enc) or gstreamer1-plugin-openh264".to_string())
}

/// Configure encoder rate control based on element type
///
/// Element properties disagree on units: most take kbit/s, a few take bit/s.
fn configure_video_encoder(encoder: &gst::Element, encoder_name: &str, rate: RateControl) {
    let kbps = i64::from((rate.bitrate_bps / 1000).max(1));
    let bps = i64::from(rate.bitrate_bps);
    let gop = i64::from(rate.keyframe_interval);

    match encoder_name {
        // x264/x265 software encoders
        "x264enc" | "x265enc" => {
            set_str_property(encoder, "speed-preset", "veryfast");
            set_str_property(encoder, "tune", "zerolatency");
            set_int_property(encoder, "bitrate", kbps);
            set_int_property(encoder, "key-int-max", gop);
            debug!("Configured {}: bitrate={} kbps, gop={}", encoder_name, kbps, gop);
        }

        // VA-API encoders (old plugin)
        "vaapih264enc" | "vaapih265enc" => {
            set_str_property(encoder, "rate-control", "cbr");
            set_int_property(encoder, "bitrate", kbps);
            set_int_property(encoder, "keyframe-period", gop);
            debug!("Configured VA-API encoder: bitrate={} kbps", kbps);
        }

        // VA-API encoders (new plugin)
        "vah264enc" | "vah265enc" | "vaav1enc" => {
            set_str_property(encoder, "rate-control", "cbr");
            set_int_property(encoder, "bitrate", kbps);
            set_int_property(encoder, "key-int-max", gop);
            debug!("Configured VA-API encoder: bitrate={} kbps", kbps);
        }

        // NVIDIA encoders
        "nvh264enc" | "nvh265enc" | "nvav1enc" => {
            set_int_property(encoder, "bitrate", kbps);
            set_str_property(encoder, "rc-mode", "cbr");
            set_int_property(encoder, "gop-size", gop);
            debug!("Configured NVIDIA encoder: bitrate={} kbps", kbps);
        }

        // Intel QSV encoders
        "qsvh264enc" => {
            set_int_property(encoder, "bitrate", kbps);
            set_int_property(encoder, "gop-size", gop);
            debug!("Configured Intel QSV encoder: bitrate={} kbps", kbps);
        }

        // V4L2 hardware encoders
        "v4l2h264enc" | "v4l2h265enc" => {
            // Rate control goes through extra-controls
            let controls = gst::Structure::builder("controls")
                .field("video_bitrate", i32::try_from(bps).unwrap_or(i32::MAX))
                .field("h264_i_frame_period", i32::try_from(gop).unwrap_or(i32::MAX))
                .build();
            set_value_property(encoder, "extra-controls", controls.to_value());
            debug!("Configured V4L2 encoder: bitrate={} bps", bps);
        }

        // OpenH264 (software H.264 encoder)
        "openh264enc" => {
            set_str_property(encoder, "rate-control", "bitrate");
            set_int_property(encoder, "bitrate", bps);
            set_str_property(encoder, "usage-type", "camera");
            set_int_property(encoder, "gop-size", gop);
            debug!("Configured openh264enc: bitrate={} bps", bps);
        }

        // SVT-AV1 encoder
        "svtav1enc" => {
            set_int_property(encoder, "target-bitrate", kbps);
            set_int_property(encoder, "intra-period-length", gop);
            debug!("Configured svtav1enc: bitrate={} kbps", kbps);
        }

        // AOM AV1 encoder
        "av1enc" => {
            set_int_property(encoder, "target-bitrate", kbps);
            set_int_property(encoder, "cpu-used", 8);
            set_int_property(encoder, "keyframe-max-dist", gop);
            debug!("Configured av1enc: bitrate={} kbps", kbps);
        }

        _ => {
            debug!("Unknown encoder type, using default configuration");
        }
    }
}

/// Look up a property the element lets us write
fn writable_property(element: &gst::Element, name: &str) -> Option<gst::glib::ParamSpec> {
    let Some(pspec) = element.find_property(name) else {
        debug!(property = name, element = %element.name(), "Encoder has no such property");
        return None;
    };
    if !pspec.flags().contains(gst::glib::ParamFlags::WRITABLE) {
        debug!(property = name, "Encoder property is read-only");
        return None;
    }
    Some(pspec)
}

/// Set an integer property in whatever integer type and range it declares
///
/// Element versions disagree on signedness and width, and a mismatched
/// `set_property` panics inside glib. Returns whether the value was applied.
fn set_int_property(element: &gst::Element, name: &str, value: i64) -> bool {
    use gst::glib::{ParamSpecInt, ParamSpecInt64, ParamSpecUInt, ParamSpecUInt64};

    let Some(pspec) = writable_property(element, name) else {
        return false;
    };

    let converted = if let Some(p) = pspec.downcast_ref::<ParamSpecInt>() {
        i32::try_from(value)
            .ok()
            .filter(|v| (p.minimum()..=p.maximum()).contains(v))
            .map(|v| v.to_value())
    } else if let Some(p) = pspec.downcast_ref::<ParamSpecUInt>() {
        u32::try_from(value)
            .ok()
            .filter(|v| (p.minimum()..=p.maximum()).contains(v))
            .map(|v| v.to_value())
    } else if let Some(p) = pspec.downcast_ref::<ParamSpecInt64>() {
        Some(value)
            .filter(|v| (p.minimum()..=p.maximum()).contains(v))
            .map(|v| v.to_value())
    } else if let Some(p) = pspec.downcast_ref::<ParamSpecUInt64>() {
        u64::try_from(value)
            .ok()
            .filter(|v| (p.minimum()..=p.maximum()).contains(v))
            .map(|v| v.to_value())
    } else {
        None
    };

    match converted {
        Some(v) => {
            element.set_property_from_value(name, &v);
            true
        }
        None => {
            warn!(
                property = name,
                value,
                declared = %pspec.value_type(),
                "Encoder property rejects value, leaving default"
            );
            false
        }
    }
}

/// Set an enum, flags or string property from its textual form
fn set_str_property(element: &gst::Element, name: &str, text: &str) -> bool {
    let Some(pspec) = writable_property(element, name) else {
        return false;
    };
    match gst::glib::Value::deserialize(text, pspec.value_type()) {
        Ok(value) => {
            element.set_property_from_value(name, &value);
            true
        }
        Err(e) => {
            warn!(property = name, value = text, error = %e, "Encoder property rejects value, leaving default");
            false
        }
    }
}

/// Set a property from a prepared value if the declared type accepts it
fn set_value_property(element: &gst::Element, name: &str, value: gst::glib::Value) -> bool {
    let Some(pspec) = writable_property(element, name) else {
        return false;
    };
    if !value.type_().is_a(pspec.value_type()) {
        warn!(
            property = name,
            given = %value.type_(),
            declared = %pspec.value_type(),
            "Encoder property type mismatch, leaving default"
        );
        return false;
    }
    element.set_property_from_value(name, &value);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, codec: VideoCodec, priority: u32) -> EncoderInfo {
        EncoderInfo {
            element_name: name.to_string(),
            display_name: name.to_string(),
            codec,
            is_hardware: priority < 10,
            priority,
        }
    }

    #[test]
    fn test_codec_extensions() {
        assert_eq!(VideoCodec::H264.file_extension(), "mp4");
        assert_eq!(VideoCodec::HEVC.file_extension(), "mp4");
        assert_eq!(VideoCodec::AV1.file_extension(), "webm");
    }

    #[test]
    fn test_container_formats() {
        assert_eq!(ContainerFormat::MP4.muxer_name(), "mp4mux");
        assert_eq!(ContainerFormat::WebM.muxer_name(), "webmmux");
    }

    #[test]
    fn test_h264_is_preferred_by_default() {
        let ranked = rank_encoders(
            vec![
                info("x265enc", VideoCodec::HEVC, 10),
                info("x264enc", VideoCodec::H264, 10),
                info("vah264enc", VideoCodec::H264, 1),
            ],
            VideoCodec::default(),
        );
        let names: Vec<_> = ranked.iter().map(|e| e.element_name.as_str()).collect();
        assert_eq!(names, ["vah264enc", "x264enc", "x265enc"]);
    }

    #[test]
    fn test_preference_falls_back_to_other_codecs() {
        let ranked = rank_encoders(vec![info("x264enc", VideoCodec::H264, 10)], VideoCodec::AV1);
        assert_eq!(ranked[0].codec, VideoCodec::H264);
    }

    #[test]
    fn test_parse_codec() {
        assert_eq!("hevc".parse::<VideoCodec>().unwrap(), VideoCodec::HEVC);
        assert_eq!("H264".parse::<VideoCodec>().unwrap(), VideoCodec::H264);
        assert!("vp9".parse::<VideoCodec>().is_err());
    }

    #[test]
    fn test_every_available_encoder_configures() {
        if gst::init().is_err() {
            println!("Skipping test (GStreamer unavailable)");
            return;
        }
        let rate = RateControl {
            bitrate_bps: 4_000_000,
            keyframe_interval: 150,
        };
        for (name, ..) in ENCODER_SPECS {
            if gst::ElementFactory::find(name).is_none() {
                continue;
            }
            // Hardware elements may refuse to instantiate without a device
            let Ok(encoder) = gst::ElementFactory::make(name).build() else {
                continue;
            };
            configure_video_encoder(&encoder, name, rate);
        }
    }

    #[test]
    fn test_int_property_follows_declared_type() {
        if gst::init().is_err() {
            return;
        }
        let Ok(queue) = gst::ElementFactory::make("queue").build() else {
            return;
        };
        // max-size-buffers is a guint
        assert!(set_int_property(&queue, "max-size-buffers", 7));
        assert_eq!(queue.property::<u32>("max-size-buffers"), 7);
        assert!(!set_int_property(&queue, "max-size-buffers", -1));
        assert_eq!(queue.property::<u32>("max-size-buffers"), 7);
        assert!(!set_int_property(&queue, "no-such-property", 1));
        // Not an integer at all
        assert!(!set_int_property(&queue, "leaky", 1));
    }

    #[test]
    fn test_str_property_parses_enum_nicks() {
        if gst::init().is_err() {
            return;
        }
        let Ok(queue) = gst::ElementFactory::make("queue").build() else {
            return;
        };
        assert!(set_str_property(&queue, "leaky", "downstream"));
        assert!(!set_str_property(&queue, "leaky", "sideways"));
        assert!(!set_value_property(&queue, "leaky", 3u32.to_value()));
    }
}
