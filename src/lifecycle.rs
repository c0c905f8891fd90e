// SPDX-License-Identifier: GPL-3.0-only

//! Capture controller
//!
//! Owns the frame producer and the render and encoder threads, and is the
//! only place the host talks to. Every command is forwarded without blocking;
//! results come back through [`CaptureController::poll_events`].

use crate::backends::camera::{CameraFacing, ExternalTextureBinding, FrameProducer};
use crate::backends::surface::SurfaceEvent;
use crate::config::{CaptureSize, Config};
use crate::errors::{PipelineError, PipelineResult};
use crate::media::encoders::video::VideoCodec;
use crate::pipelines::video::{EncoderEvent, GpuEncodeBackend, GpuEncoderThread};
use crate::render::{RenderCommand, RenderEvent, RenderSettings, RenderThread};
use crate::shaders::FilterEffect;
use crate::stats::{PipelineStats, StatsSnapshot};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use tracing::{debug, error, info, warn};

/// Anything the pipeline reports back to the host
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    Render(RenderEvent),
    Encoder(EncoderEvent),
}

pub struct CaptureController<P: FrameProducer> {
    producer: P,
    render: Option<RenderThread>,
    render_events: Receiver<RenderEvent>,
    encoder: Option<GpuEncoderThread>,
    encoder_events: Option<Receiver<EncoderEvent>>,
    stats: Arc<PipelineStats>,
    output_dir: PathBuf,
    codec: VideoCodec,
    facing: CameraFacing,
    requested_size: CaptureSize,
    source_size: (u32, u32),
    recording: Option<PathBuf>,
    /// Texture of the live render context, once announced
    binding: Option<ExternalTextureBinding>,
    paused: bool,
}

impl<P: FrameProducer> CaptureController<P> {
    /// Start the render and encoder threads around `producer`
    ///
    /// The producer is started once the first render context announces its
    /// external texture.
    pub fn new(producer: P, config: &Config) -> PipelineResult<Self> {
        Self::with_encoder(producer, config, Some(GpuEncodeBackend::new()))
    }

    /// Like [`Self::new`], with an explicit encode backend or none at all
    pub fn with_encoder(
        mut producer: P,
        config: &Config,
        backend: Option<GpuEncodeBackend>,
    ) -> PipelineResult<Self> {
        config.validate()?;
        let stats = PipelineStats::new();

        let (encoder, encoder_events) = match backend {
            Some(backend) => {
                let (thread, events) = GpuEncoderThread::spawn(backend, Arc::clone(&stats))?;
                (Some(thread), Some(events))
            }
            None => (None, None),
        };

        let requested = config.capture_size;
        let source_size = producer.negotiate_size(requested.width, requested.height);
        info!(
            producer = producer.name(),
            requested_width = requested.width,
            requested_height = requested.height,
            width = source_size.0,
            height = source_size.1,
            "Negotiated capture size"
        );

        let defaults = RenderSettings::default();
        let settings = RenderSettings {
            initial_effect: config.initial_filter,
            circle_mask: config.circle_mask,
            mirror: config.mirror,
            ring_depth: config.target_ring_depth,
            codec: config.codec,
            bitrate_preset: config.bitrate_preset,
            ..defaults
        };

        let (render, render_events) =
            RenderThread::spawn(settings, Arc::clone(&stats), encoder.as_ref().map(|e| e.sender()))?;
        render.send(RenderCommand::SetSourceSize {
            width: source_size.0,
            height: source_size.1,
        })?;

        Ok(Self {
            producer,
            render: Some(render),
            render_events,
            encoder,
            encoder_events,
            stats,
            output_dir: config.output_dir(),
            codec: config.codec,
            facing: config.facing,
            requested_size: requested,
            source_size,
            recording: None,
            binding: None,
            paused: false,
        })
    }

    fn render(&self) -> PipelineResult<&RenderThread> {
        self.render.as_ref().ok_or(PipelineError::Disconnected("render"))
    }

    pub fn producer(&self) -> &P {
        &self.producer
    }

    /// Size the producer delivers
    pub fn source_size(&self) -> (u32, u32) {
        self.source_size
    }

    /// Facing of the open camera
    pub fn facing(&self) -> CameraFacing {
        self.facing
    }

    /// Output file of the recording in progress
    pub fn recording_path(&self) -> Option<&Path> {
        self.recording.as_deref()
    }

    pub fn set_filter(&self, effect: FilterEffect) -> PipelineResult<()> {
        self.render()?.send(RenderCommand::SetFilter(effect))
    }

    /// Start or stop recording
    ///
    /// Starting creates a timestamped file in the output directory and
    /// returns its path. Stopping when not recording is a no-op.
    pub fn set_recording(&mut self, enabled: bool) -> PipelineResult<Option<PathBuf>> {
        if !enabled {
            self.render()?.send(RenderCommand::SetRecording(None))?;
            return Ok(self.recording.take());
        }
        if let Some(path) = &self.recording {
            debug!(path = %path.display(), "Already recording");
            return Ok(Some(path.clone()));
        }

        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(recording_file_name(self.codec));
        self.render()?.send(RenderCommand::SetRecording(Some(path.clone())))?;
        info!(output = %path.display(), "Recording requested");
        self.recording = Some(path.clone());
        Ok(Some(path))
    }

    /// Requested output size; the recording and display side follows it
    pub fn set_output_size(&self, width: u32, height: u32) -> PipelineResult<()> {
        self.render()?.send(RenderCommand::SetOutputSize { width, height })
    }

    /// Forward a host surface lifecycle event to the render thread
    pub fn notify_surface_lifecycle(&mut self, event: SurfaceEvent) -> PipelineResult<()> {
        if matches!(event, SurfaceEvent::Destroyed) {
            // The old binding closes with its texture; the next one rebinds
            self.binding = None;
        }
        self.render()?.send(RenderCommand::Surface(event))
    }

    /// Save the next displayed frame as PNG, if the surface can read back
    pub fn snapshot(&self, path: PathBuf) -> PipelineResult<()> {
        self.render()?.send(RenderCommand::Snapshot(path))
    }

    /// Release the capture device while the host is in the background
    pub fn pause(&mut self) -> PipelineResult<()> {
        if self.paused {
            return Ok(());
        }
        self.paused = true;
        info!("Pausing capture");
        self.producer.stop().map_err(PipelineError::from)
    }

    /// Restart capture if a render context is waiting for frames
    pub fn resume(&mut self) -> PipelineResult<()> {
        if !self.paused {
            return Ok(());
        }
        self.paused = false;
        info!(bound = self.binding.is_some(), "Resuming capture");
        if self.binding.is_some() {
            self.producer.start()?;
        }
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Reopen capture on the camera facing the other way
    ///
    /// The new producer negotiates the same requested size, is bound to the
    /// current texture and streams unless capture is paused. If the other
    /// camera cannot be opened the current one is restarted.
    pub fn switch_camera(&mut self) -> PipelineResult<CameraFacing> {
        let next = self.facing.opposite();
        info!(from = %self.facing, to = %next, "Switching camera");
        self.producer.stop()?;

        let mut producer = match P::open(next) {
            Ok(producer) => producer,
            Err(e) => {
                warn!(error = %e, facing = %next, "Failed to open camera, keeping the current one");
                if self.binding.is_some() && !self.paused {
                    self.producer.start()?;
                }
                return Err(e.into());
            }
        };

        let CaptureSize { width, height } = self.requested_size;
        let source_size = producer.negotiate_size(width, height);
        debug!(
            producer = producer.name(),
            width = source_size.0,
            height = source_size.1,
            "Negotiated capture size"
        );
        self.render()?.send(RenderCommand::SetSourceSize {
            width: source_size.0,
            height: source_size.1,
        })?;

        if let Some(binding) = &self.binding {
            producer.bind_texture(binding.clone());
        }
        self.producer = producer;
        self.source_size = source_size;
        self.facing = next;

        if self.binding.is_some() && !self.paused {
            self.producer.start()?;
        }
        Ok(next)
    }

    /// Drain pending events, acting on the ones the controller handles itself
    ///
    /// - `ExternalTextureReady`: binds the producer and starts it
    /// - `SessionFailed`: clears the recording request
    pub fn poll_events(&mut self) -> Vec<ControllerEvent> {
        let mut events = Vec::new();

        while let Ok(event) = self.render_events.try_recv() {
            if let RenderEvent::ExternalTextureReady(binding) = &event {
                debug!(generation = binding.generation(), "Binding producer to new texture");
                self.producer.bind_texture(binding.clone());
                self.binding = Some(binding.clone());
                if !self.paused
                    && let Err(e) = self.producer.start()
                {
                    error!(error = %e, "Failed to start producer");
                    events.push(ControllerEvent::Render(RenderEvent::Error(e.into())));
                }
            }
            events.push(ControllerEvent::Render(event));
        }

        let mut failed = false;
        if let Some(rx) = &self.encoder_events {
            while let Ok(event) = rx.try_recv() {
                match &event {
                    EncoderEvent::SessionFailed(e) => {
                        warn!(error = %e, "Recording could not start");
                        failed = true;
                    }
                    EncoderEvent::MidStreamError { error, .. } => {
                        warn!(error = %error, "Recording stopped by encoder error");
                        failed = true;
                    }
                    _ => {}
                }
                events.push(ControllerEvent::Encoder(event));
            }
        }
        if failed && let Err(e) = self.set_recording(false) {
            error!(error = %e, "Failed to clear recording request");
        }

        events
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop the producer, finish any recording and join both threads
    ///
    /// Returns the events emitted while shutting down.
    pub fn shutdown(mut self) -> Vec<ControllerEvent> {
        if let Err(e) = self.producer.stop() {
            warn!(error = %e, "Failed to stop producer");
        }
        if let Some(render) = self.render.take() {
            render.shutdown();
        }
        if let Some(encoder) = self.encoder.take() {
            encoder.shutdown();
        }
        let mut events: Vec<ControllerEvent> = self
            .render_events
            .try_iter()
            .map(ControllerEvent::Render)
            .collect();
        if let Some(rx) = &self.encoder_events {
            events.extend(rx.try_iter().map(ControllerEvent::Encoder));
        }
        info!(stats = ?self.stats.snapshot(), "Capture controller shut down");
        events
    }
}

/// `shadercam_<local timestamp>.<container extension>`
pub fn recording_file_name(codec: VideoCodec) -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    format!("shadercam_{}.{}", timestamp, codec.file_extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_file_name_uses_container_extension() {
        let name = recording_file_name(VideoCodec::AV1);
        assert!(name.starts_with("shadercam_"));
        assert!(name.ends_with(".webm"));
        assert_eq!(recording_file_name(VideoCodec::H264).rsplit('.').next(), Some("mp4"));
    }
}
