// SPDX-License-Identifier: MPL-2.0

//! Encoder coordinator
//!
//! Runs recording sessions on a dedicated thread so codec and file latency
//! never reach the render cadence. The render thread talks to it through a
//! bounded queue:
//!
//! ```text
//! render thread ──StartSession/RebindContext/StopSession (try_send, retried)──▶ ┐
//!               ──Frame (try_send, dropped when full)────────────────────────▶ ├─ encoder thread ─▶ backend
//! ```
//!
//! Each wake-up drains everything queued and keeps only the newest frame
//! before every control command; the older ones are counted as superseded.

use crate::constants::encoder::{COMMAND_QUEUE_DEPTH, DRAIN_TIMEOUT, EVENT_QUEUE_DEPTH};
use crate::errors::{PipelineError, PipelineResult};
use crate::gpu::ShareGroup;
use crate::pipelines::video::encoder_selection::EncoderConfig;
use crate::stats::PipelineStats;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Handle to a GPU context the encoder can read render targets through
pub trait SharedContext: Clone + Send + 'static {
    /// Id distinguishing this context from earlier and later ones
    fn id(&self) -> u64;
}

impl SharedContext for ShareGroup {
    fn id(&self) -> u64 {
        ShareGroup::id(self)
    }
}

/// Codec, muxer and GPU encode surface for one session at a time
pub trait EncodeBackend: Send + 'static {
    type Context: SharedContext;
    type Frame: Send + 'static;

    /// Configure codec, muxer and encode surface
    fn start(&mut self, config: &SessionConfig, context: &Self::Context) -> PipelineResult<()>;

    /// Recreate the encode surface on a new context; the stream continues
    fn rebind(&mut self, context: &Self::Context) -> PipelineResult<()>;

    /// Encode one frame at presentation time `pts_ns`
    ///
    /// The backend releases `frame` as soon as it no longer reads it.
    fn encode(&mut self, frame: Self::Frame, pts_ns: u64) -> PipelineResult<()>;

    /// Flush, finalize the container and release the session's resources
    fn finish(&mut self, drain_timeout: Duration) -> PipelineResult<PathBuf>;
}

/// Parameters of a recording session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub output_path: PathBuf,
    pub encoder: EncoderConfig,
}

/// Bookkeeping of a session, reported when it ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordingSession {
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub bitrate_bps: u32,
    pub context_id: u64,
    pub frames_encoded: u64,
    /// Producer timestamp of the first encoded frame
    pub first_pts: Option<u64>,
    /// Presentation time of the last encoded frame, relative to the first
    pub last_pts: Option<u64>,
}

/// Commands accepted by the encoder thread
pub enum EncoderCommand<C, F> {
    StartSession { config: SessionConfig, context: C },
    RebindContext(C),
    Frame { frame: F, timestamp_ns: u64, context_id: u64 },
    StopSession,
    Shutdown,
}

impl<C, F> EncoderCommand<C, F> {
    fn is_frame(&self) -> bool {
        matches!(self, EncoderCommand::Frame { .. })
    }
}

impl<C, F> std::fmt::Debug for EncoderCommand<C, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncoderCommand::StartSession { config, .. } => f
                .debug_struct("StartSession")
                .field("output_path", &config.output_path)
                .finish(),
            EncoderCommand::RebindContext(_) => write!(f, "RebindContext"),
            EncoderCommand::Frame {
                timestamp_ns,
                context_id,
                ..
            } => f
                .debug_struct("Frame")
                .field("timestamp_ns", timestamp_ns)
                .field("context_id", context_id)
                .finish(),
            EncoderCommand::StopSession => write!(f, "StopSession"),
            EncoderCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Notifications from the encoder thread to the owner
#[derive(Debug, Clone)]
pub enum EncoderEvent {
    SessionStarted { output_path: PathBuf },
    SessionRebound { context_id: u64 },
    /// The session could not be configured; nothing was recorded
    SessionFailed(PipelineError),
    /// The codec failed mid-stream; the session was stopped and the partial
    /// file kept
    MidStreamError {
        error: PipelineError,
        session: RecordingSession,
    },
    SessionStopped(RecordingSession),
}

/// Keep only the newest frame before each control command
///
/// Returns the commands to apply and the number of frames dropped.
pub fn coalesce_frames<C, F>(batch: Vec<EncoderCommand<C, F>>) -> (Vec<EncoderCommand<C, F>>, u64) {
    let mut out = Vec::with_capacity(batch.len());
    let mut pending: Option<EncoderCommand<C, F>> = None;
    let mut superseded = 0;

    for command in batch {
        if command.is_frame() {
            if pending.replace(command).is_some() {
                superseded += 1;
            }
        } else {
            out.extend(pending.take());
            out.push(command);
        }
    }
    out.extend(pending);
    (out, superseded)
}

/// Maps producer timestamps to a monotonic presentation timeline
///
/// Gaps are preserved. A timestamp that does not advance (a producer restart
/// or a context rebind with a fresh clock) continues one nominal frame
/// interval after the previous frame.
#[derive(Debug, Clone)]
pub struct PtsClock {
    frame_interval_ns: u64,
    last_raw: Option<u64>,
    last_pts: u64,
}

impl PtsClock {
    pub fn new(framerate: u32) -> Self {
        Self {
            frame_interval_ns: 1_000_000_000 / framerate.max(1) as u64,
            last_raw: None,
            last_pts: 0,
        }
    }

    pub fn next(&mut self, raw_ns: u64) -> u64 {
        let pts = match self.last_raw {
            None => 0,
            Some(prev) if raw_ns > prev => self.last_pts + (raw_ns - prev),
            Some(_) => self.last_pts + self.frame_interval_ns,
        };
        self.last_raw = Some(raw_ns);
        self.last_pts = pts;
        pts
    }
}

struct ActiveSession {
    summary: RecordingSession,
    clock: PtsClock,
}

/// Applies commands to a backend; owned by the encoder thread
pub struct SessionDriver<B: EncodeBackend> {
    backend: B,
    session: Option<ActiveSession>,
    stats: Arc<PipelineStats>,
    events: SyncSender<EncoderEvent>,
}

impl<B: EncodeBackend> SessionDriver<B> {
    pub fn new(backend: B, stats: Arc<PipelineStats>, events: SyncSender<EncoderEvent>) -> Self {
        Self {
            backend,
            session: None,
            stats,
            events,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn emit(&self, event: EncoderEvent) {
        if let Err(e) = self.events.try_send(event) {
            warn!(error = %e, "Dropping encoder event");
        }
    }

    /// Apply one command; returns `false` on shutdown
    pub fn apply(&mut self, command: EncoderCommand<B::Context, B::Frame>) -> bool {
        match command {
            EncoderCommand::StartSession { config, context } => self.start(config, context),
            EncoderCommand::RebindContext(context) => self.rebind(context),
            EncoderCommand::Frame {
                frame,
                timestamp_ns,
                context_id,
            } => self.encode(frame, timestamp_ns, context_id),
            EncoderCommand::StopSession => self.stop(),
            EncoderCommand::Shutdown => {
                self.stop();
                return false;
            }
        }
        true
    }

    fn start(&mut self, config: SessionConfig, context: B::Context) {
        if self.session.is_some() {
            warn!(output = %config.output_path.display(), "Session already active, ignoring start");
            return;
        }

        info!(
            output = %config.output_path.display(),
            width = config.encoder.width,
            height = config.encoder.height,
            bitrate = config.encoder.bitrate_bps,
            context = context.id(),
            "Starting recording session"
        );

        if let Err(e) = self.backend.start(&config, &context) {
            error!(error = %e, "Failed to configure recording session");
            let e = match e {
                PipelineError::EncodeConfig(_) => e,
                other => PipelineError::EncodeConfig(other.to_string()),
            };
            self.emit(EncoderEvent::SessionFailed(e));
            return;
        }

        self.session = Some(ActiveSession {
            summary: RecordingSession {
                output_path: config.output_path.clone(),
                width: config.encoder.width,
                height: config.encoder.height,
                bitrate_bps: config.encoder.bitrate_bps,
                context_id: context.id(),
                frames_encoded: 0,
                first_pts: None,
                last_pts: None,
            },
            clock: PtsClock::new(config.encoder.framerate),
        });
        self.emit(EncoderEvent::SessionStarted {
            output_path: config.output_path,
        });
    }

    fn rebind(&mut self, context: B::Context) {
        let Some(session) = &mut self.session else {
            debug!(context = context.id(), "No session to rebind");
            return;
        };

        info!(
            old = session.summary.context_id,
            new = context.id(),
            "Rebinding recording session"
        );
        match self.backend.rebind(&context) {
            Ok(()) => {
                session.summary.context_id = context.id();
                self.emit(EncoderEvent::SessionRebound {
                    context_id: context.id(),
                });
            }
            Err(e) => self.abort(e),
        }
    }

    fn encode(&mut self, frame: B::Frame, timestamp_ns: u64, context_id: u64) {
        let Some(session) = &mut self.session else {
            return;
        };
        if context_id != session.summary.context_id {
            debug!(
                frame_context = context_id,
                session_context = session.summary.context_id,
                "Discarding frame from stale context"
            );
            return;
        }

        let pts = session.clock.next(timestamp_ns);
        match self.backend.encode(frame, pts) {
            Ok(()) => {
                session.summary.first_pts.get_or_insert(timestamp_ns);
                session.summary.last_pts = Some(pts);
                session.summary.frames_encoded += 1;
                PipelineStats::incr(&self.stats.encoder_frames_encoded);
            }
            Err(e) => self.abort(e),
        }
    }

    fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            debug!("No active session, stop is a no-op");
            return;
        };

        match self.backend.finish(DRAIN_TIMEOUT) {
            Ok(path) => {
                session.summary.output_path = path;
                info!(
                    output = %session.summary.output_path.display(),
                    frames = session.summary.frames_encoded,
                    "Recording session stopped"
                );
                self.emit(EncoderEvent::SessionStopped(session.summary));
            }
            Err(e) => {
                error!(error = %e, "Failed to finalize recording");
                self.emit(EncoderEvent::MidStreamError {
                    error: e,
                    session: session.summary,
                });
            }
        }
    }

    /// Stop best-effort after a codec failure, keeping the partial file
    fn abort(&mut self, error: PipelineError) {
        let Some(session) = self.session.take() else {
            return;
        };
        error!(error = %error, frames = session.summary.frames_encoded, "Recording failed mid-stream");
        if let Err(e) = self.backend.finish(DRAIN_TIMEOUT) {
            warn!(error = %e, "Failed to finalize partial recording");
        }
        let error = match error {
            PipelineError::MidStreamEncode(_) => error,
            other => PipelineError::MidStreamEncode(other.to_string()),
        };
        self.emit(EncoderEvent::MidStreamError {
            error,
            session: session.summary,
        });
    }
}

/// Sending side of the encoder queue
pub struct EncoderSender<C, F> {
    tx: SyncSender<EncoderCommand<C, F>>,
    stats: Arc<PipelineStats>,
}

impl<C, F> Clone for EncoderSender<C, F> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<C: SharedContext, F> EncoderSender<C, F> {
    /// Queue a control command without blocking
    ///
    /// A full queue returns [`PipelineError::QueueFull`]; the caller keeps the
    /// command and retries it later.
    fn send(&self, command: EncoderCommand<C, F>) -> PipelineResult<()> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => PipelineError::QueueFull("encoder"),
            TrySendError::Disconnected(_) => PipelineError::Disconnected("encoder"),
        })
    }

    pub fn start_session(&self, config: SessionConfig, context: C) -> PipelineResult<()> {
        self.send(EncoderCommand::StartSession { config, context })
    }

    pub fn rebind_context(&self, context: C) -> PipelineResult<()> {
        self.send(EncoderCommand::RebindContext(context))
    }

    pub fn stop_session(&self) -> PipelineResult<()> {
        self.send(EncoderCommand::StopSession)
    }

    /// Hand a frame to the encoder without blocking
    ///
    /// Returns `false` if the queue was full and the frame was dropped.
    pub fn submit_frame(&self, frame: F, timestamp_ns: u64, context_id: u64) -> bool {
        match self.tx.try_send(EncoderCommand::Frame {
            frame,
            timestamp_ns,
            context_id,
        }) {
            Ok(()) => {
                PipelineStats::incr(&self.stats.frames_handed_to_encoder);
                true
            }
            Err(TrySendError::Full(_)) => {
                PipelineStats::incr(&self.stats.encoder_frames_dropped_full);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// The encoder thread
pub struct EncoderThread<C, F> {
    sender: EncoderSender<C, F>,
    handle: Option<JoinHandle<()>>,
}

impl<C: SharedContext, F: Send + 'static> EncoderThread<C, F> {
    /// Spawn the thread around `backend`
    pub fn spawn<B>(backend: B, stats: Arc<PipelineStats>) -> PipelineResult<(Self, Receiver<EncoderEvent>)>
    where
        B: EncodeBackend<Context = C, Frame = F>,
    {
        let (tx, rx) = sync_channel::<EncoderCommand<C, F>>(COMMAND_QUEUE_DEPTH);
        let (event_tx, event_rx) = sync_channel(EVENT_QUEUE_DEPTH);

        let thread_stats = Arc::clone(&stats);
        let handle = std::thread::Builder::new()
            .name("shadercam-encoder".to_string())
            .spawn(move || run(SessionDriver::new(backend, thread_stats, event_tx), rx))
            .map_err(|e| PipelineError::Io(format!("Failed to spawn encoder thread: {}", e)))?;

        Ok((
            Self {
                sender: EncoderSender { tx, stats },
                handle: Some(handle),
            },
            event_rx,
        ))
    }

    pub fn sender(&self) -> EncoderSender<C, F> {
        self.sender.clone()
    }

    /// Stop any session, then join the thread
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.sender.tx.send(EncoderCommand::Shutdown);
        if handle.join().is_err() {
            error!("Encoder thread panicked");
        }
    }
}

impl<C, F> Drop for EncoderThread<C, F> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.sender.tx.send(EncoderCommand::Shutdown);
            let _ = handle.join();
        }
    }
}

fn run<B: EncodeBackend>(mut driver: SessionDriver<B>, rx: Receiver<EncoderCommand<B::Context, B::Frame>>) {
    debug!("Encoder thread started");
    while let Ok(first) = rx.recv() {
        let mut batch = vec![first];
        batch.extend(rx.try_iter());

        let (commands, superseded) = coalesce_frames(batch);
        if superseded > 0 {
            PipelineStats::add(&driver.stats.encoder_frames_superseded, superseded);
        }

        for command in commands {
            if !driver.apply(command) {
                debug!("Encoder thread shutting down");
                return;
            }
        }
    }
    // Every sender is gone; finalize whatever was running
    driver.stop();
    debug!("Encoder thread exiting");
}
