// SPDX-License-Identifier: MPL-2.0

//! Shared-context encode backend
//!
//! Blits each leased render target into an encoder-owned input texture on the
//! render context's device, releases the lease once the blit is submitted,
//! then reads the input texture back and pushes it into the GStreamer
//! recording pipeline.

use super::encoder::{EncodeBackend, SessionConfig};
use super::recorder::VideoRecorder;
use crate::errors::{PipelineError, PipelineResult};
use crate::gpu::{ShareGroup, TARGET_FORMAT, wgpu};
use crate::media::encoders::video::EncoderInfo;
use crate::render::offscreen::{OffscreenTarget, TargetLease};
use crate::shaders::{
    FilterProgram, ProgramKind, Viewport, copy_texture_to_buffer, create_readback_buffer,
    padded_bytes_per_row, read_buffer_async, unpad_rows,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// GPU objects the encoder owns on one share-group
struct EncodeSurface {
    share: ShareGroup,
    blit: FilterProgram,
    input: OffscreenTarget,
    readback: wgpu::Buffer,
}

impl EncodeSurface {
    fn new(share: &ShareGroup, side: u32) -> PipelineResult<Self> {
        let device = share.device();
        let blit = FilterProgram::build(device, share.queue(), ProgramKind::Blit, TARGET_FORMAT)?;
        let input = OffscreenTarget::new(device, side, "shadercam encoder input")?;
        let readback = create_readback_buffer(device, side, side, "shadercam encoder readback");
        debug!(share_group = share.id(), side, "Encode surface created");
        Ok(Self {
            share: share.clone(),
            blit,
            input,
            readback,
        })
    }

    /// Blit `lease` into the input texture and return its tightly packed pixels
    ///
    /// The blit samples the whole lease, so a target of another size is
    /// scaled to the input.
    fn render(&self, lease: TargetLease) -> PipelineResult<Vec<u8>> {
        let side = self.input.side();
        let device = self.share.device();

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("shadercam encoder blit"),
        });
        self.blit
            .draw_identity(&mut encoder, lease.view(), self.input.view(), Viewport::full(side, side));
        copy_texture_to_buffer(&mut encoder, self.input.texture(), &self.readback, side, side);
        self.share.queue().submit(Some(encoder.finish()));

        // Later writes to the target are ordered after this submission
        drop(lease);

        let padded = pollster::block_on(read_buffer_async(device, &self.readback))
            .map_err(PipelineError::MidStreamEncode)?;
        Ok(unpad_rows(&padded, side, side, padded_bytes_per_row(side)))
    }
}

/// Encode backend recording render targets through GStreamer
#[derive(Default)]
pub struct GpuEncodeBackend {
    encoder_info: Option<EncoderInfo>,
    recorder: Option<VideoRecorder>,
    surface: Option<EncodeSurface>,
    side: u32,
}

impl GpuEncodeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific encoder instead of the automatic choice
    pub fn with_encoder(encoder_info: EncoderInfo) -> Self {
        Self {
            encoder_info: Some(encoder_info),
            ..Self::default()
        }
    }
}

impl EncodeBackend for GpuEncodeBackend {
    type Context = ShareGroup;
    type Frame = TargetLease;

    fn start(&mut self, config: &SessionConfig, context: &ShareGroup) -> PipelineResult<()> {
        let encoder = &config.encoder;
        if encoder.width != encoder.height {
            return Err(PipelineError::EncodeConfig(format!(
                "recording must be square, got {}x{}",
                encoder.width, encoder.height
            )));
        }

        let recorder = VideoRecorder::new(config.output_path.clone(), encoder, self.encoder_info.as_ref())
            .map_err(PipelineError::EncodeConfig)?;
        let surface = EncodeSurface::new(context, encoder.width)
            .map_err(|e| PipelineError::EncodeConfig(e.to_string()))?;
        recorder.start().map_err(PipelineError::EncodeConfig)?;

        info!(
            output = %recorder.file_path().display(),
            codec = ?recorder.codec(),
            side = encoder.width,
            "Encode backend ready"
        );
        self.side = encoder.width;
        self.surface = Some(surface);
        self.recorder = Some(recorder);
        Ok(())
    }

    fn rebind(&mut self, context: &ShareGroup) -> PipelineResult<()> {
        if self.recorder.is_none() {
            return Err(PipelineError::ContractViolation(
                "rebind without a session".to_string(),
            ));
        }
        // Drop the old surface first so its device can go away
        self.surface = None;
        self.surface = Some(EncodeSurface::new(context, self.side)?);
        Ok(())
    }

    fn encode(&mut self, frame: TargetLease, pts_ns: u64) -> PipelineResult<()> {
        let (Some(surface), Some(recorder)) = (&self.surface, &mut self.recorder) else {
            return Err(PipelineError::ContractViolation(
                "frame without a session".to_string(),
            ));
        };
        if frame.side() != self.side {
            // Target resized mid-session; the blit scales it to the codec size
            debug!(target_side = frame.side(), session_side = self.side, "Scaling resized target");
        }

        let rgba = surface.render(frame)?;
        recorder
            .push_frame(&rgba, pts_ns)
            .map_err(PipelineError::MidStreamEncode)
    }

    fn finish(&mut self, drain_timeout: Duration) -> PipelineResult<PathBuf> {
        self.surface = None;
        let recorder = self
            .recorder
            .take()
            .ok_or_else(|| PipelineError::ContractViolation("finish without a session".to_string()))?;
        recorder
            .finish(drain_timeout)
            .map_err(PipelineError::MidStreamEncode)
    }
}
