// SPDX-License-Identifier: GPL-3.0-only

//! Render coordinator
//!
//! Owns the display-bound GPU context and everything created on it. Each
//! [`RenderCoordinator::draw_frame`] runs the same sequence:
//!
//! 1. latch a pending producer frame into the external texture
//! 2. reconcile the recording state and notify the encoder
//! 3. rebuild the effect program if the filter changed
//! 4. resize targets and recompute texel offsets if sizes changed
//! 5. filter the external texture into a ring target
//! 6. blit the target to the display
//! 7. lend the target to the encoder while recording

use super::frame_signal::FrameSignal;
use super::offscreen::{TargetRing, TargetSlot};
use super::session::{RecordingState, SessionAction, SessionTracker};
use crate::backends::camera::{ExternalFrameTexture, ExternalTextureBinding};
use crate::backends::surface::{DisplaySurface, SurfaceEvent};
use crate::constants::BitratePreset;
use crate::constants::render::DEFAULT_TARGET_RING_DEPTH;
use crate::errors::{PipelineError, PipelineResult};
use crate::gpu::{self, GpuContext, wgpu};
use crate::media::encoders::video::VideoCodec;
use crate::pipelines::video::{EncoderConfig, GpuEncoderSender, SessionConfig};
use crate::shaders::effects::target_side;
use crate::shaders::{FilterEffect, FilterProgram, IDENTITY_MATRIX, ProgramKind, Viewport};
use crate::stats::PipelineStats;
use image::RgbaImage;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::SyncSender;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Render-side settings fixed for the lifetime of the render thread
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub initial_effect: FilterEffect,
    /// Round mask on the display blit
    pub circle_mask: bool,
    /// Mirror the producer image horizontally
    pub mirror: bool,
    pub ring_depth: usize,
    pub codec: VideoCodec,
    /// Resolved against the target side when a session starts
    pub bitrate_preset: BitratePreset,
    pub framerate: u32,
    pub keyframe_interval_secs: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        let encoder = EncoderConfig::default();
        Self {
            initial_effect: FilterEffect::None,
            circle_mask: false,
            mirror: false,
            ring_depth: DEFAULT_TARGET_RING_DEPTH,
            codec: encoder.codec,
            bitrate_preset: BitratePreset::default(),
            framerate: encoder.framerate,
            keyframe_interval_secs: encoder.keyframe_interval_secs,
        }
    }
}

/// Commands from the owner, applied in arrival order between draws
#[derive(Debug)]
pub enum RenderCommand {
    SetFilter(FilterEffect),
    /// `Some(path)` enables recording into `path`, `None` disables it
    SetRecording(Option<PathBuf>),
    /// Requested output size; reconfigures the surface
    SetOutputSize { width: u32, height: u32 },
    /// Size the producer negotiated, used until the first frame arrives
    SetSourceSize { width: u32, height: u32 },
    Surface(SurfaceEvent),
    /// Save the last displayed frame as PNG
    Snapshot(PathBuf),
    Shutdown,
}

/// Notifications from the render thread
#[derive(Debug, Clone)]
pub enum RenderEvent {
    /// A new render context exists; the producer must deliver into `binding`
    ExternalTextureReady(ExternalTextureBinding),
    RecordingStateChanged(RecordingState),
    SnapshotSaved(PathBuf),
    /// Building the render context failed; it stays torn down
    SetupFailed(PipelineError),
    Error(PipelineError),
}

/// Everything bound to one render context
///
/// Field order is drop order: resources go before the context.
struct GpuResources {
    external: ExternalFrameTexture,
    program: FilterProgram,
    blit: FilterProgram,
    ring: TargetRing,
    ctx: GpuContext,
}

pub struct RenderCoordinator {
    settings: RenderSettings,
    stats: Arc<PipelineStats>,
    signal: Arc<FrameSignal>,
    events: SyncSender<RenderEvent>,
    encoder: Option<GpuEncoderSender>,
    surface: Option<Box<dyn DisplaySurface>>,
    gpu: Option<GpuResources>,
    generation: u64,
    effect: FilterEffect,
    pending_effect: Option<FilterEffect>,
    surface_size: (u32, u32),
    source_size: Option<(u32, u32)>,
    size_dirty: bool,
    session: SessionTracker,
    recording_path: Option<PathBuf>,
}

impl RenderCoordinator {
    pub fn new(
        settings: RenderSettings,
        stats: Arc<PipelineStats>,
        events: SyncSender<RenderEvent>,
        encoder: Option<GpuEncoderSender>,
    ) -> Self {
        Self {
            effect: settings.initial_effect,
            signal: FrameSignal::new(Some(Arc::clone(&stats))),
            settings,
            stats,
            events,
            encoder,
            surface: None,
            gpu: None,
            generation: 0,
            pending_effect: None,
            surface_size: (0, 0),
            source_size: None,
            size_dirty: false,
            session: SessionTracker::new(),
            recording_path: None,
        }
    }

    /// Signal shared with producers' texture listeners
    pub fn frame_signal(&self) -> Arc<FrameSignal> {
        Arc::clone(&self.signal)
    }

    pub fn recording_state(&self) -> RecordingState {
        self.session.state()
    }

    pub fn effect(&self) -> FilterEffect {
        self.pending_effect.unwrap_or(self.effect)
    }

    pub fn has_surface(&self) -> bool {
        self.gpu.is_some()
    }

    /// Side of the current offscreen targets
    pub fn target_side(&self) -> Option<u32> {
        self.gpu.as_ref().map(|g| g.ring.side())
    }

    pub fn refresh_interval(&self) -> Duration {
        self.surface
            .as_ref()
            .map(|s| s.refresh_interval())
            .unwrap_or_else(|| crate::backends::surface::interval_from_hz(0))
    }

    fn emit(&self, event: RenderEvent) {
        if let Err(e) = self.events.try_send(event) {
            warn!(error = %e, "Dropping render event");
        }
    }

    /// Apply one owner command; returns `false` on shutdown
    pub fn apply(&mut self, command: RenderCommand) -> bool {
        match command {
            RenderCommand::SetFilter(effect) => self.set_filter(effect),
            RenderCommand::SetRecording(path) => self.set_recording(path),
            RenderCommand::SetOutputSize { width, height } => self.on_surface_size_changed(width, height),
            RenderCommand::SetSourceSize { width, height } => {
                if self.source_size != Some((width, height)) {
                    self.source_size = Some((width, height));
                    self.size_dirty = true;
                }
            }
            RenderCommand::Surface(SurfaceEvent::Created(surface)) => {
                if let Err(e) = self.on_surface_ready(surface) {
                    error!(error = %e, "Failed to set up render context");
                    self.emit(RenderEvent::SetupFailed(e));
                }
            }
            RenderCommand::Surface(SurfaceEvent::SizeChanged { width, height }) => {
                self.on_surface_size_changed(width, height)
            }
            RenderCommand::Surface(SurfaceEvent::Destroyed) => self.on_surface_torn_down(),
            RenderCommand::Snapshot(path) => match self.snapshot() {
                Ok(Some(image)) => match crate::backends::surface::headless::save_png(&image, &path) {
                    Ok(()) => self.emit(RenderEvent::SnapshotSaved(path)),
                    Err(e) => self.emit(RenderEvent::Error(e)),
                },
                Ok(None) => debug!("Surface cannot be read back, skipping snapshot"),
                Err(e) => self.emit(RenderEvent::Error(e)),
            },
            RenderCommand::Shutdown => {
                if self.session.state() != RecordingState::Off || self.session.has_undelivered() {
                    self.session.set_enabled(false);
                    self.reconcile_session();
                }
                if self.session.has_undelivered() {
                    warn!("Encoder queue full at shutdown, session ends with the encoder thread");
                }
                self.on_surface_torn_down();
                return false;
            }
        }
        true
    }

    pub fn set_filter(&mut self, effect: FilterEffect) {
        if effect != self.effect() {
            debug!(%effect, "Filter change requested");
            self.pending_effect = Some(effect);
        }
    }

    pub fn set_recording(&mut self, path: Option<PathBuf>) {
        let enabled = path.is_some();
        self.session.set_enabled(enabled);
        if enabled {
            self.recording_path = path;
        } else if self.gpu.is_none() {
            // No draw will run to reconcile; the encoder needs no surface to stop
            self.reconcile_session();
        }
    }

    /// (Re)build every GPU resource for `surface` and announce the new
    /// external texture
    pub fn on_surface_ready(&mut self, mut surface: Box<dyn DisplaySurface>) -> PipelineResult<()> {
        if self.gpu.is_some() {
            self.on_surface_torn_down();
        }

        let ctx = pollster::block_on(gpu::create_render_context(
            surface.instance(),
            surface.compatible_surface(),
            "shadercam render",
        ))?;

        let (width, height) = surface.size();
        surface.configure(&ctx, width, height)?;

        self.generation += 1;
        let external = ExternalFrameTexture::new(
            &ctx.device,
            &ctx.queue,
            self.generation,
            Arc::clone(&self.signal),
            self.settings.mirror,
        );

        let effect = self.pending_effect.take().unwrap_or(self.effect);
        let program = build_effect_program(&ctx, effect)?;
        let mut blit = FilterProgram::build(&ctx.device, &ctx.queue, ProgramKind::Blit, surface.format())?;
        blit.set_circle_mask(self.settings.circle_mask);
        let ring = TargetRing::new(&ctx.device, target_side(width, height), self.settings.ring_depth)?;

        info!(
            generation = self.generation,
            share_group = ctx.share_group().id(),
            width,
            height,
            %effect,
            "Render context ready"
        );

        let binding = external.binding();
        self.effect = effect;
        self.surface_size = (width, height);
        self.size_dirty = true;
        self.gpu = Some(GpuResources {
            external,
            program,
            blit,
            ring,
            ctx,
        });
        self.surface = Some(surface);
        self.session.on_surface_ready();

        self.emit(RenderEvent::ExternalTextureReady(binding));
        Ok(())
    }

    /// Release GPU-bound resources; recording intent is kept
    pub fn on_surface_torn_down(&mut self) {
        if self.gpu.is_none() && self.surface.is_none() {
            return;
        }
        info!(
            generation = self.generation,
            recording = ?self.session.state(),
            "Render context torn down"
        );
        if let Some(surface) = &mut self.surface {
            surface.release();
        }
        self.gpu = None;
        self.surface = None;
    }

    fn on_surface_size_changed(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            warn!(width, height, "Ignoring empty surface size");
            return;
        }
        let configured = match (&mut self.surface, &self.gpu) {
            (Some(surface), Some(gpu)) => surface.configure(&gpu.ctx, width, height),
            _ => Ok(()),
        };
        if let Err(e) = configured {
            error!(error = %e, "Failed to reconfigure surface");
            self.emit(RenderEvent::Error(e));
            return;
        }
        self.surface_size = (width, height);
        self.size_dirty = true;
    }

    /// Mark a producer frame as pending
    pub fn on_frame_available(&self) {
        self.signal.notify();
    }

    fn reconcile_session(&mut self) {
        let before = self.session.state();
        if let Some(action) = self.session.reconcile() {
            self.session.queue(action);
        }
        self.deliver_session_actions();
        if self.session.state() != before {
            self.emit(RenderEvent::RecordingStateChanged(self.session.state()));
        }
    }

    /// Hand queued actions to the encoder in order until one must wait
    fn deliver_session_actions(&mut self) {
        while let Some(action) = self.session.next_undelivered() {
            if action != SessionAction::Stop && self.gpu.is_none() {
                // Start and rebind read the render context at delivery
                break;
            }
            match self.notify_encoder(action) {
                Ok(()) => self.session.mark_delivered(),
                Err(PipelineError::QueueFull(_)) => {
                    debug!(?action, "Encoder queue full, retrying on next draw");
                    break;
                }
                Err(e) => {
                    error!(error = %e, ?action, "Failed to notify encoder");
                    self.emit(RenderEvent::Error(e));
                    self.session.mark_delivered();
                }
            }
        }
    }

    fn notify_encoder(&self, action: SessionAction) -> PipelineResult<()> {
        let Some(encoder) = &self.encoder else {
            warn!(?action, "No encoder attached, recording state change ignored");
            return Ok(());
        };
        match action {
            SessionAction::Start => match (&self.gpu, &self.recording_path) {
                (Some(gpu), Some(path)) => {
                    let (width, height) = self.surface_size;
                    let side = target_side(width, height);
                    let config = SessionConfig {
                        output_path: path.clone(),
                        encoder: EncoderConfig {
                            codec: self.settings.codec,
                            bitrate_bps: self.settings.bitrate_preset.bitrate_bps(side),
                            width: side,
                            height: side,
                            framerate: self.settings.framerate,
                            keyframe_interval_secs: self.settings.keyframe_interval_secs,
                        },
                    };
                    encoder.start_session(config, gpu.ctx.share_group())
                }
                _ => Err(PipelineError::ContractViolation(
                    "recording started without a render context or output path".to_string(),
                )),
            },
            SessionAction::Rebind => match &self.gpu {
                Some(gpu) => encoder.rebind_context(gpu.ctx.share_group()),
                None => Err(PipelineError::ContractViolation(
                    "rebind without a render context".to_string(),
                )),
            },
            SessionAction::Stop => encoder.stop_session(),
        }
    }

    /// Draw one frame; returns `Ok(false)` when there was nothing to draw
    pub fn draw_frame(&mut self) -> PipelineResult<bool> {
        if self.gpu.is_none() {
            if !self.session.enabled() {
                self.reconcile_session();
            } else {
                self.deliver_session_actions();
            }
            return Ok(false);
        }

        // 1. latch the newest producer frame
        let mut latched_now = false;
        if self.signal.take()
            && let Some(gpu) = &mut self.gpu
            && gpu.external.update_tex_image()?
        {
            latched_now = true;
            PipelineStats::incr(&self.stats.texture_updates);
            let size = gpu.external.size();
            if self.source_size != Some((size.width, size.height)) {
                self.source_size = Some((size.width, size.height));
                self.size_dirty = true;
            }
        }

        // 2. recording state
        self.reconcile_session();

        let Some(gpu) = &mut self.gpu else {
            return Ok(false);
        };

        // 3. effect change replaces the program
        if let Some(effect) = self.pending_effect.take() {
            info!(from = %self.effect, to = %effect, "Switching filter");
            gpu.program = build_effect_program(&gpu.ctx, effect)?;
            self.effect = effect;
            self.size_dirty = true;
        }

        // 4. sizes
        if self.size_dirty {
            let (width, height) = self.surface_size;
            gpu.ring.resize(target_side(width, height))?;
            if let Some((sw, sh)) = self.source_size {
                gpu.program.set_texture_size(sw, sh);
            }
            self.size_dirty = false;
        }

        let Some(source) = gpu.external.view() else {
            return Ok(false);
        };

        // 5. filter into a ring target
        let slot = gpu.ring.next_writable();
        if slot == TargetSlot::Scratch {
            PipelineStats::incr(&self.stats.targets_starved);
        }
        let target = gpu.ring.target(slot);
        let side = target.side();

        let mut encoder = gpu
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("shadercam draw frame"),
            });
        gpu.program.draw(
            &mut encoder,
            source,
            &gpu.external.transform(),
            target.view(),
            Viewport::full(side, side),
        );

        // 6. display
        let present = match &mut self.surface {
            Some(surface) => surface.acquire(&gpu.ctx)?,
            None => None,
        };
        if let Some(frame) = &present {
            gpu.blit.draw(
                &mut encoder,
                target.view(),
                &IDENTITY_MATRIX,
                &frame.view,
                Viewport::centered_square(frame.width, frame.height),
            );
        }
        gpu.ctx.queue.submit(Some(encoder.finish()));
        if let Some(frame) = present {
            frame.present();
        }
        PipelineStats::incr(&self.stats.frames_drawn);

        // 7. encoder handoff, after the draw is on the queue
        if self.session.state() == RecordingState::On
            && !self.session.has_undelivered()
            && latched_now
            && let TargetSlot::Ring(index) = slot
            && let Some(sender) = &self.encoder
        {
            let lease = gpu.ring.lease(index);
            sender.submit_frame(lease, gpu.external.timestamp_ns(), gpu.ctx.share_group().id());
        }

        Ok(true)
    }

    /// Pixels of the last displayed frame, if the surface supports it
    pub fn snapshot(&mut self) -> PipelineResult<Option<RgbaImage>> {
        match (&mut self.surface, &self.gpu) {
            (Some(surface), Some(gpu)) => surface.read_back(&gpu.ctx),
            _ => Ok(None),
        }
    }
}

fn build_effect_program(ctx: &GpuContext, effect: FilterEffect) -> PipelineResult<FilterProgram> {
    let params = effect.program();
    let mut program = FilterProgram::build(&ctx.device, &ctx.queue, params.kind, gpu::TARGET_FORMAT)?;
    if let Some(kernel) = params.kernel {
        program.set_kernel(kernel, params.color_bias);
    }
    Ok(program)
}
