// SPDX-License-Identifier: GPL-3.0-only

//! Render thread
//!
//! Commands are applied in arrival order between draws; a draw runs once per
//! surface refresh interval. A steady command stream cannot hold off a due
//! draw for more than [`MAX_COMMANDS_PER_DRAW`] commands.

use super::coordinator::{RenderCommand, RenderCoordinator, RenderEvent, RenderSettings};
use super::frame_signal::FrameSignal;
use crate::constants::render::{COMMAND_QUEUE_DEPTH, EVENT_QUEUE_DEPTH, MAX_COMMANDS_PER_DRAW};
use crate::errors::{PipelineError, PipelineResult};
use crate::pipelines::video::GpuEncoderSender;
use crate::stats::PipelineStats;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError, sync_channel};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Owner-side handle to the render thread
pub struct RenderThread {
    tx: SyncSender<RenderCommand>,
    signal: Arc<FrameSignal>,
    handle: Option<JoinHandle<()>>,
}

impl RenderThread {
    pub fn spawn(
        settings: RenderSettings,
        stats: Arc<PipelineStats>,
        encoder: Option<GpuEncoderSender>,
    ) -> PipelineResult<(Self, Receiver<RenderEvent>)> {
        let (tx, rx) = sync_channel(COMMAND_QUEUE_DEPTH);
        let (event_tx, event_rx) = sync_channel(EVENT_QUEUE_DEPTH);

        let coordinator = RenderCoordinator::new(settings, stats, event_tx, encoder);
        let signal = coordinator.frame_signal();

        let handle = std::thread::Builder::new()
            .name("shadercam-render".to_string())
            .spawn(move || run(coordinator, rx))
            .map_err(|e| PipelineError::Io(format!("Failed to spawn render thread: {}", e)))?;

        Ok((
            Self {
                tx,
                signal,
                handle: Some(handle),
            },
            event_rx,
        ))
    }

    /// Queue a command without blocking
    pub fn send(&self, command: RenderCommand) -> PipelineResult<()> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => PipelineError::QueueFull("render"),
            TrySendError::Disconnected(_) => PipelineError::Disconnected("render"),
        })
    }

    /// Signal notified by the external texture on every delivered frame
    pub fn signal(&self) -> Arc<FrameSignal> {
        Arc::clone(&self.signal)
    }

    /// Tear down the surface and join the thread
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        // Blocking send so shutdown is not lost behind a full queue
        let _ = self.tx.send(RenderCommand::Shutdown);
        if handle.join().is_err() {
            error!("Render thread panicked");
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.join();
    }
}

/// When the next draw is due and how many commands ran since the last one
#[derive(Debug, Clone, Copy)]
struct DrawSchedule {
    next_draw: Instant,
    commands_applied: usize,
}

impl DrawSchedule {
    fn new(now: Instant) -> Self {
        Self {
            next_draw: now,
            commands_applied: 0,
        }
    }

    /// How long to wait for commands; `None` means draw now
    fn command_wait(&self, now: Instant) -> Option<Duration> {
        let overdue = now >= self.next_draw;
        if overdue && self.commands_applied >= MAX_COMMANDS_PER_DRAW {
            return None;
        }
        Some(self.next_draw.saturating_duration_since(now))
    }

    fn command_applied(&mut self) {
        self.commands_applied += 1;
    }

    fn drawn(&mut self, now: Instant, interval: Duration) {
        self.next_draw = now + interval;
        self.commands_applied = 0;
    }
}

fn run(mut coordinator: RenderCoordinator, rx: Receiver<RenderCommand>) {
    info!("Render thread started");
    let mut schedule = DrawSchedule::new(Instant::now());

    loop {
        if let Some(wait) = schedule.command_wait(Instant::now()) {
            match rx.recv_timeout(wait) {
                Ok(command) => {
                    if !coordinator.apply(command) {
                        break;
                    }
                    schedule.command_applied();
                    continue;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Render command channel closed");
                    coordinator.apply(RenderCommand::Shutdown);
                    break;
                }
            }
        }

        if let Err(e) = coordinator.draw_frame() {
            error!(error = %e, "Draw failed");
        }
        schedule.drawn(Instant::now(), coordinator.refresh_interval());
    }

    info!("Render thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_run_until_draw_is_due() {
        let now = Instant::now();
        let mut schedule = DrawSchedule::new(now);
        schedule.drawn(now, Duration::from_millis(16));

        for _ in 0..MAX_COMMANDS_PER_DRAW * 2 {
            schedule.command_applied();
        }
        // Not due yet, commands keep flowing
        assert_eq!(schedule.command_wait(now), Some(Duration::from_millis(16)));
    }

    #[test]
    fn test_command_stream_cannot_starve_overdue_draw() {
        let now = Instant::now();
        let mut schedule = DrawSchedule::new(now);
        let late = now + Duration::from_millis(5);

        for _ in 0..MAX_COMMANDS_PER_DRAW - 1 {
            schedule.command_applied();
            assert_eq!(schedule.command_wait(late), Some(Duration::ZERO));
        }
        schedule.command_applied();
        assert_eq!(schedule.command_wait(late), None);

        schedule.drawn(late, Duration::from_millis(16));
        assert_eq!(schedule.command_wait(late), Some(Duration::from_millis(16)));
    }
}
