// SPDX-License-Identifier: MPL-2.0

//! Video recording pipeline fed from GPU readback
//!
//! ```text
//! appsrc (RGBA, PTS from the caller) -> queue -> videoconvert -> encoder
//!     -> [parser] -> muxer -> filesink
//! ```
//!
//! The caller owns timestamps. `finish` sends end-of-stream and waits, with
//! an upper bound, for the muxer to finalize the file.

use super::encoder_selection::{EncoderConfig, select_encoders, select_encoders_with_video};
use super::muxer::{create_muxer, link_muxer_to_sink, link_video_to_muxer};
use crate::media::encoders::video::{EncoderInfo, VideoCodec};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Appsrc-driven video recorder
#[derive(Debug)]
pub struct VideoRecorder {
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    file_path: PathBuf,
    codec: VideoCodec,
    width: u32,
    height: u32,
    frames_pushed: u64,
}

impl VideoRecorder {
    /// Build the recording pipeline
    ///
    /// The extension of `output_path` is replaced with the selected
    /// container's extension.
    ///
    /// # Returns
    /// * `Ok(VideoRecorder)` - Video recorder instance, not yet started
    /// * `Err(String)` - Error message
    pub fn new(
        output_path: PathBuf,
        config: &EncoderConfig,
        encoder_info: Option<&EncoderInfo>,
    ) -> Result<Self, String> {
        info!(
            width = config.width,
            height = config.height,
            bitrate = config.bitrate_bps,
            codec = ?config.codec,
            output = %output_path.display(),
            "Creating video recorder"
        );

        if config.width == 0 || config.height == 0 {
            return Err(format!(
                "Invalid recording size {}x{}",
                config.width, config.height
            ));
        }

        gst::init().map_err(|e| format!("Failed to initialize GStreamer: {}", e))?;

        // Use specific encoder if provided, otherwise auto-select
        let encoders = match encoder_info {
            Some(info) => select_encoders_with_video(config, info)?,
            None => select_encoders(config)?,
        };

        info!(
            video_codec = ?encoders.codec,
            container = ?encoders.container,
            "Selected encoders"
        );

        let output_path = output_path.with_extension(encoders.extension);
        if let Some(parent) = output_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
        }

        let pipeline = gst::Pipeline::new();

        let appsrc = gst::ElementFactory::make("appsrc")
            .name("shadercam_record_src")
            .build()
            .map_err(|e| format!("Failed to create appsrc: {}", e))?
            .downcast::<gst_app::AppSrc>()
            .map_err(|_| "Failed to downcast to AppSrc".to_string())?;

        let caps = gst::Caps::builder("video/x-raw")
            .field("format", "RGBA")
            .field("width", config.width as i32)
            .field("height", config.height as i32)
            .field("framerate", gst::Fraction::new(config.framerate as i32, 1))
            .build();

        appsrc.set_caps(Some(&caps));
        appsrc.set_format(gst::Format::Time);
        appsrc.set_is_live(true);
        appsrc.set_do_timestamp(false);

        let queue = gst::ElementFactory::make("queue")
            .build()
            .map_err(|e| format!("Failed to create queue: {}", e))?;

        let videoconvert = gst::ElementFactory::make("videoconvert")
            .build()
            .map_err(|e| format!("Failed to create videoconvert: {}", e))?;

        let video_encoder = encoders.encoder;
        let video_parser = encoders.parser;
        let muxer_config = create_muxer(encoders.muxer, output_path.clone())?;

        let mut elements: Vec<&gst::Element> =
            vec![appsrc.upcast_ref(), &queue, &videoconvert, &video_encoder];
        if let Some(ref parser) = video_parser {
            elements.push(parser);
        }
        elements.push(&muxer_config.muxer);
        elements.push(&muxer_config.filesink);

        pipeline
            .add_many(&elements)
            .map_err(|e| format!("Failed to add elements to pipeline: {}", e))?;

        gst::Element::link_many([appsrc.upcast_ref(), &queue, &videoconvert, &video_encoder])
            .map_err(|_| "Failed to link appsrc to encoder".to_string())?;

        if let Some(ref parser) = video_parser {
            video_encoder
                .link(parser)
                .map_err(|_| "Failed to link encoder to parser")?;
            link_video_to_muxer(parser, &muxer_config.muxer)?;
        } else {
            link_video_to_muxer(&video_encoder, &muxer_config.muxer)?;
        }

        link_muxer_to_sink(&muxer_config.muxer, &muxer_config.filesink)?;

        Ok(VideoRecorder {
            pipeline,
            appsrc,
            file_path: output_path,
            codec: encoders.codec,
            width: config.width,
            height: config.height,
            frames_pushed: 0,
        })
    }

    pub fn file_path(&self) -> &PathBuf {
        &self.file_path
    }

    pub fn codec(&self) -> VideoCodec {
        self.codec
    }

    pub fn frames_pushed(&self) -> u64 {
        self.frames_pushed
    }

    /// Start recording
    pub fn start(&self) -> Result<(), String> {
        info!("Starting video recording");
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| format!("Failed to start recording: {}", e))?;

        // Check for immediate errors
        let bus = self.pipeline.bus().ok_or("No bus available")?;
        if let Some(msg) = bus.timed_pop_filtered(
            gst::ClockTime::from_mseconds(100),
            &[gst::MessageType::Error],
        ) && let gst::MessageView::Error(err) = msg.view()
        {
            error!(
                error = %err.error(),
                debug = ?err.debug(),
                source = ?err.src().map(|s| s.name()),
                "GStreamer error during start"
            );
            return Err(format!("Recording start error: {}", err.error()));
        }

        Ok(())
    }

    /// Push one tightly packed RGBA frame with presentation time `pts_ns`
    ///
    /// Errors reported by the pipeline since the previous push are returned
    /// here.
    pub fn push_frame(&mut self, rgba: &[u8], pts_ns: u64) -> Result<(), String> {
        let expected = (self.width * self.height * 4) as usize;
        if rgba.len() != expected {
            return Err(format!(
                "Frame data size {} doesn't match expected {} for {}x{} RGBA",
                rgba.len(),
                expected,
                self.width,
                self.height
            ));
        }

        self.check_bus_errors()?;

        let mut buffer = gst::Buffer::from_mut_slice(rgba.to_vec());
        {
            let buffer_ref = buffer
                .get_mut()
                .ok_or_else(|| "Failed to get mutable buffer reference".to_string())?;
            buffer_ref.set_pts(gst::ClockTime::from_nseconds(pts_ns));
        }

        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| format!("Failed to push frame: {:?}", e))?;

        self.frames_pushed += 1;
        if self.frames_pushed % crate::constants::timing::FRAME_LOG_INTERVAL == 0 {
            debug!(frames = self.frames_pushed, pts_ns, "Recording frames pushed");
        }
        Ok(())
    }

    fn check_bus_errors(&self) -> Result<(), String> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        while let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error]) {
            if let gst::MessageView::Error(err) = msg.view() {
                error!(
                    error = %err.error(),
                    source = ?err.src().map(|s| s.name()),
                    "GStreamer error while recording"
                );
                return Err(err.error().to_string());
            }
        }
        Ok(())
    }

    /// Send end-of-stream, wait up to `drain_timeout` for the muxer to
    /// finalize, then release the pipeline
    pub fn finish(self, drain_timeout: Duration) -> Result<PathBuf, String> {
        info!(frames = self.frames_pushed, "Stopping video recording");

        if let Err(e) = self.appsrc.end_of_stream() {
            warn!(?e, "Failed to send EOS to appsrc");
        }

        let mut result = Ok(());
        if let Some(bus) = self.pipeline.bus() {
            match bus.timed_pop_filtered(
                gst::ClockTime::from_nseconds(drain_timeout.as_nanos() as u64),
                &[gst::MessageType::Eos, gst::MessageType::Error],
            ) {
                Some(msg) => {
                    if let gst::MessageView::Error(err) = msg.view() {
                        error!(error = %err.error(), "GStreamer error while draining");
                        result = Err(err.error().to_string());
                    } else {
                        debug!("EOS reached muxer");
                    }
                }
                None => {
                    warn!(?drain_timeout, "Timed out waiting for EOS, file may be truncated");
                }
            }
        }

        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| format!("Failed to stop pipeline: {}", e))?;

        result?;
        info!(path = %self.file_path.display(), "Recording saved");
        Ok(self.file_path.clone())
    }
}

impl Drop for VideoRecorder {
    fn drop(&mut self) {
        // Ensure pipeline is properly stopped to avoid GStreamer warnings
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Log which video encoders are available
pub fn check_available_encoders() {
    crate::media::encoders::log_available_encoders();
}
