// SPDX-License-Identifier: MPL-2.0

//! GStreamer camera producer
//!
//! ```text
//! v4l2src -> capsfilter (size) -> videoconvert -> capsfilter (RGBA) -> appsink
//! ```
//!
//! The appsink callback maps each buffer and hands it to the bound external
//! texture without copying. Only the newest frames are kept; the appsink drops
//! older buffers when the render thread falls behind.

use super::types::*;
use super::{ExternalTextureBinding, FrameProducer, choose_closest_size, enumerate_cameras, enumerate_sizes};
use crate::constants::{capture, timing};
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, warn};

type SharedBinding = Arc<Mutex<Option<ExternalTextureBinding>>>;

/// Camera producer backed by a GStreamer `v4l2src` pipeline
pub struct GstCameraProducer {
    device: CameraDevice,
    supported: Vec<CameraFormat>,
    size: (u32, u32),
    binding: SharedBinding,
    pipeline: Option<(gstreamer::Pipeline, AppSink)>,
    frames_delivered: Arc<AtomicU64>,
}

impl GstCameraProducer {
    /// Open a specific device rather than choosing by facing
    pub fn with_device(device: CameraDevice) -> BackendResult<Self> {
        gstreamer::init().map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        if gstreamer::ElementFactory::find("v4l2src").is_none() {
            return Err(BackendError::NotAvailable(
                "GStreamer element 'v4l2src' not found".to_string(),
            ));
        }

        let supported = enumerate_sizes(&device.path);
        info!(
            device = %device.name,
            path = %device.path,
            sizes = supported.len(),
            "Opened camera"
        );

        Ok(Self {
            device,
            supported,
            size: (capture::DESIRED_WIDTH, capture::DESIRED_HEIGHT),
            binding: Arc::new(Mutex::new(None)),
            pipeline: None,
            frames_delivered: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn device(&self) -> &CameraDevice {
        &self.device
    }

    pub fn supported_formats(&self) -> &[CameraFormat] {
        &self.supported
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::Relaxed)
    }

    fn build_pipeline(&self) -> BackendResult<(gstreamer::Pipeline, AppSink)> {
        let (width, height) = self.size;
        let make = |factory: &str| {
            gstreamer::ElementFactory::make(factory)
                .build()
                .map_err(|e| BackendError::InitializationFailed(format!("Failed to create {}: {}", factory, e)))
        };

        let source = gstreamer::ElementFactory::make("v4l2src")
            .property("device", self.device.path.as_str())
            .build()
            .map_err(|e| BackendError::InitializationFailed(format!("Failed to create v4l2src: {}", e)))?;

        let size_filter = make("capsfilter")?;
        size_filter.set_property(
            "caps",
            gstreamer::Caps::builder("video/x-raw")
                .field("width", width as i32)
                .field("height", height as i32)
                .build(),
        );

        let convert = make("videoconvert")?;

        let appsink = make("appsink")?
            .dynamic_cast::<AppSink>()
            .map_err(|_| BackendError::InitializationFailed("Failed to cast appsink".to_string()))?;
        appsink.set_caps(Some(
            &gstreamer::Caps::builder("video/x-raw")
                .field("format", "RGBA")
                .build(),
        ));
        appsink.set_property("sync", false);
        appsink.set_property("max-buffers", capture::MAX_BUFFERS);
        appsink.set_property("drop", true);
        appsink.set_property("enable-last-sample", false);

        let pipeline = gstreamer::Pipeline::new();
        pipeline
            .add_many([&source, &size_filter, &convert, appsink.upcast_ref()])
            .map_err(|e| BackendError::InitializationFailed(format!("Failed to add elements: {}", e)))?;
        gstreamer::Element::link_many([&source, &size_filter, &convert, appsink.upcast_ref()])
            .map_err(|_| BackendError::FormatNotSupported(format!("{}x{}", width, height)))?;

        let binding = Arc::clone(&self.binding);
        let frames_delivered = Arc::clone(&self.frames_delivered);
        let stream_start = Instant::now();

        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let captured_at = Instant::now();
                    let sample = appsink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;

                    let caps = sample.caps().ok_or(gstreamer::FlowError::Error)?;
                    let info = VideoInfo::from_caps(caps).map_err(|e| {
                        error!(error = ?e, "Failed to read video info");
                        gstreamer::FlowError::Error
                    })?;

                    let buffer = sample.buffer_owned().ok_or(gstreamer::FlowError::Error)?;
                    if buffer.flags().contains(gstreamer::BufferFlags::CORRUPTED) {
                        debug!("Skipping corrupted buffer");
                        return Ok(gstreamer::FlowSuccess::Ok);
                    }

                    let timestamp_ns = buffer
                        .pts()
                        .map(|pts| pts.nseconds())
                        .unwrap_or_else(|| stream_start.elapsed().as_nanos() as u64);

                    let mapped = buffer.into_mapped_buffer_readable().map_err(|_| {
                        error!("Failed to map buffer");
                        gstreamer::FlowError::Error
                    })?;

                    let frame = CameraFrame {
                        data: FrameData::from_mapped_buffer(mapped),
                        width: info.width(),
                        height: info.height(),
                        stride: info.stride()[0] as u32,
                        timestamp_ns,
                        captured_at,
                    };

                    let delivered = match binding.lock() {
                        Ok(guard) => guard.as_ref().map(|b| b.deliver(frame)).unwrap_or(false),
                        Err(_) => false,
                    };
                    if delivered {
                        let n = frames_delivered.fetch_add(1, Ordering::Relaxed) + 1;
                        if n % timing::FRAME_LOG_INTERVAL == 0 {
                            debug!(frames = n, width = info.width(), height = info.height(), "Camera frames delivered");
                        }
                    }

                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        Ok((pipeline, appsink))
    }
}

impl FrameProducer for GstCameraProducer {
    fn open(facing: CameraFacing) -> BackendResult<Self> {
        let cameras = enumerate_cameras();
        let device = cameras
            .iter()
            .find(|c| c.facing == facing)
            .or_else(|| cameras.first())
            .cloned()
            .ok_or_else(|| BackendError::DeviceNotFound(format!("no {} camera", facing)))?;

        if device.facing != facing {
            warn!(requested = %facing, device = %device.name, "No camera with requested facing, using first device");
        }

        Self::with_device(device)
    }

    fn negotiate_size(&mut self, width: u32, height: u32) -> (u32, u32) {
        let sizes: Vec<(u32, u32)> = self.supported.iter().map(|f| (f.width, f.height)).collect();
        self.size = choose_closest_size(&sizes, width, height).unwrap_or((width, height));
        self.size
    }

    fn bind_texture(&mut self, binding: ExternalTextureBinding) {
        debug!(generation = binding.generation(), "Binding camera to external texture");
        match self.binding.lock() {
            Ok(mut slot) => *slot = Some(binding),
            Err(poisoned) => *poisoned.into_inner() = Some(binding),
        }
    }

    fn start(&mut self) -> BackendResult<()> {
        if self.pipeline.is_some() {
            return Ok(());
        }

        let (pipeline, appsink) = self.build_pipeline()?;
        pipeline.set_state(gstreamer::State::Playing).map_err(|e| {
            BackendError::InitializationFailed(format!("Failed to start pipeline: {}", e))
        })?;

        let (result, state, pending) =
            pipeline.state(gstreamer::ClockTime::from_seconds(timing::START_TIMEOUT_SECS));
        debug!(result = ?result, state = ?state, pending = ?pending, "Camera pipeline state");
        if state != gstreamer::State::Playing {
            warn!("Camera pipeline is not in PLAYING state");
        }

        info!(
            device = %self.device.name,
            width = self.size.0,
            height = self.size.1,
            "Camera streaming"
        );
        self.pipeline = Some((pipeline, appsink));
        Ok(())
    }

    fn stop(&mut self) -> BackendResult<()> {
        let Some((pipeline, appsink)) = self.pipeline.take() else {
            return Ok(());
        };

        info!(device = %self.device.name, "Stopping camera");

        // Release the callback's references to the binding
        appsink.set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());

        pipeline
            .set_state(gstreamer::State::Null)
            .map_err(|e| BackendError::Other(format!("Failed to stop pipeline: {}", e)))?;

        let (result, state, _) =
            pipeline.state(gstreamer::ClockTime::from_seconds(timing::STOP_TIMEOUT_SECS));
        if let Err(e) = result {
            debug!(error = ?e, state = ?state, "Pipeline state change had issues");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.pipeline.is_some()
    }

    fn name(&self) -> &str {
        &self.device.name
    }
}

impl Drop for GstCameraProducer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "Failed to stop camera on drop");
        }
    }
}
