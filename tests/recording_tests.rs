// SPDX-License-Identifier: GPL-3.0-only

//! Render coordinator driving a live encoder thread
//!
//! The encode backend only records what it is asked to do, so these need a
//! GPU adapter but no codec. Every test returns early without an adapter.

use image::{Rgba, RgbaImage};
use shadercam::BitratePreset;
use shadercam::backends::camera::{CameraFrame, ExternalTextureBinding};
use shadercam::backends::surface::{HeadlessSurface, SurfaceEvent};
use shadercam::errors::PipelineResult;
use shadercam::gpu::ShareGroup;
use shadercam::pipelines::video::{EncodeBackend, EncoderEvent, GpuEncoderThread, SessionConfig};
use shadercam::render::{RecordingState, RenderCommand, RenderCoordinator, RenderEvent, RenderSettings, TargetLease};
use shadercam::stats::PipelineStats;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, sync_channel};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const FRAME_SIDE: u32 = 16;
const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Start { side: u32, bitrate_bps: u32, context: u64 },
    Rebind(u64),
    Encode { side: u32 },
    Finish,
}

#[derive(Clone, Default)]
struct RecordingBackend {
    calls: Arc<Mutex<Vec<Call>>>,
    /// Keep every lease instead of releasing it once encoded
    hold_leases: bool,
    held: Arc<Mutex<Vec<TargetLease>>>,
    output: Option<PathBuf>,
}

impl RecordingBackend {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl EncodeBackend for RecordingBackend {
    type Context = ShareGroup;
    type Frame = TargetLease;

    fn start(&mut self, config: &SessionConfig, context: &ShareGroup) -> PipelineResult<()> {
        self.output = Some(config.output_path.clone());
        self.record(Call::Start {
            side: config.encoder.width,
            bitrate_bps: config.encoder.bitrate_bps,
            context: context.id(),
        });
        Ok(())
    }

    fn rebind(&mut self, context: &ShareGroup) -> PipelineResult<()> {
        self.record(Call::Rebind(context.id()));
        Ok(())
    }

    fn encode(&mut self, frame: TargetLease, _pts_ns: u64) -> PipelineResult<()> {
        self.record(Call::Encode { side: frame.side() });
        if self.hold_leases {
            self.held.lock().unwrap().push(frame);
        }
        Ok(())
    }

    fn finish(&mut self, _drain_timeout: Duration) -> PipelineResult<PathBuf> {
        self.record(Call::Finish);
        Ok(self.output.take().unwrap_or_default())
    }
}

struct Harness {
    coordinator: RenderCoordinator,
    render_events: Receiver<RenderEvent>,
    binding: ExternalTextureBinding,
    encoder: GpuEncoderThread,
    encoder_events: Receiver<EncoderEvent>,
    calls: Arc<Mutex<Vec<Call>>>,
    stats: Arc<PipelineStats>,
}

impl Harness {
    fn new(backend: RecordingBackend, settings: RenderSettings, width: u32, height: u32) -> Option<Self> {
        let stats = PipelineStats::new();
        let calls = Arc::clone(&backend.calls);
        let (encoder, encoder_events) = GpuEncoderThread::spawn(backend, Arc::clone(&stats)).unwrap();

        let (tx, render_events) = sync_channel(64);
        let mut coordinator = RenderCoordinator::new(settings, Arc::clone(&stats), tx, Some(encoder.sender()));
        if let Err(e) = coordinator.on_surface_ready(Box::new(HeadlessSurface::new(width, height, 60))) {
            println!("Skipping test (no GPU): {}", e);
            return None;
        }
        let binding = next_binding(&render_events);
        Some(Self {
            coordinator,
            render_events,
            binding,
            encoder,
            encoder_events,
            calls,
            stats,
        })
    }

    /// Deliver a frame stamped `ts` and draw it
    fn feed(&mut self, ts: u64) {
        let image = RgbaImage::from_pixel(FRAME_SIDE, FRAME_SIDE, Rgba([(ts * 20) as u8, 64, 128, 255]));
        assert!(self.binding.deliver(CameraFrame {
            data: image.as_raw().clone().into(),
            width: FRAME_SIDE,
            height: FRAME_SIDE,
            stride: FRAME_SIDE * 4,
            timestamp_ns: ts * 1_000_000,
            captured_at: Instant::now(),
        }));
        assert!(self.coordinator.draw_frame().unwrap(), "draw produced no frame");
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Wait until the backend calls satisfy `done`, then return them
    fn wait_calls(&self, done: impl Fn(&[Call]) -> bool) -> Vec<Call> {
        let deadline = Instant::now() + WAIT;
        loop {
            let calls = self.calls();
            if done(&calls) || Instant::now() >= deadline {
                return calls;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn recreate_surface(&mut self, width: u32, height: u32) {
        self.coordinator.on_surface_torn_down();
        self.coordinator
            .on_surface_ready(Box::new(HeadlessSurface::new(width, height, 60)))
            .unwrap();
        self.binding = next_binding(&self.render_events);
    }

    fn finish(self) -> Vec<EncoderEvent> {
        drop(self.coordinator);
        self.encoder.shutdown();
        self.encoder_events.try_iter().collect()
    }
}

fn next_binding(events: &Receiver<RenderEvent>) -> ExternalTextureBinding {
    events
        .try_iter()
        .filter_map(|e| match e {
            RenderEvent::ExternalTextureReady(binding) => Some(binding),
            _ => None,
        })
        .last()
        .expect("surface announced its texture")
}

fn count(calls: &[Call], pred: impl Fn(&Call) -> bool) -> usize {
    calls.iter().filter(|c| pred(c)).count()
}

fn encodes(calls: &[Call]) -> usize {
    count(calls, |c| matches!(c, Call::Encode { .. }))
}

fn output() -> Option<PathBuf> {
    Some(std::env::temp_dir().join("shadercam-recording-test.mp4"))
}

#[test]
fn test_session_uses_current_output_side_and_bitrate() {
    let settings = RenderSettings {
        bitrate_preset: BitratePreset::High,
        ..RenderSettings::default()
    };
    let Some(mut h) = Harness::new(RecordingBackend::default(), settings, 512, 512) else {
        return;
    };

    // Resized and enabled before the draw that starts the session
    assert!(h.coordinator.apply(RenderCommand::SetOutputSize { width: 640, height: 480 }));
    h.coordinator.set_recording(output());
    h.feed(1);

    let calls = h.wait_calls(|c| !c.is_empty());
    match calls.first() {
        Some(Call::Start { side, bitrate_bps, .. }) => {
            assert_eq!(*side, 480);
            assert_eq!(*bitrate_bps, BitratePreset::High.bitrate_bps(480));
            assert_ne!(*bitrate_bps, BitratePreset::High.bitrate_bps(FRAME_SIDE));
        }
        other => panic!("expected a session start, got {:?}", other),
    }
    assert_eq!(h.coordinator.target_side(), Some(480));

    let calls = h.wait_calls(|c| encodes(c) == 1);
    assert!(calls.contains(&Call::Encode { side: 480 }));
    h.finish();
}

#[test]
fn test_target_side_follows_size_changes() {
    let Some(mut h) = Harness::new(RecordingBackend::default(), RenderSettings::default(), 64, 64) else {
        return;
    };
    h.feed(1);
    assert_eq!(h.coordinator.target_side(), Some(64));

    assert!(h.coordinator.apply(RenderCommand::Surface(SurfaceEvent::SizeChanged {
        width: 40,
        height: 72,
    })));
    h.feed(2);
    assert_eq!(h.coordinator.target_side(), Some(40));

    assert!(h.coordinator.apply(RenderCommand::SetOutputSize { width: 96, height: 32 }));
    h.feed(3);
    assert_eq!(h.coordinator.target_side(), Some(32));
    h.finish();
}

#[test]
fn test_resume_rebinds_once_without_restart() {
    let Some(mut h) = Harness::new(RecordingBackend::default(), RenderSettings::default(), 32, 32) else {
        return;
    };
    h.coordinator.set_recording(output());
    h.feed(1);
    h.wait_calls(|c| encodes(c) == 1);

    h.recreate_surface(32, 32);
    assert_eq!(h.coordinator.recording_state(), RecordingState::Resumed);
    for ts in 2..5 {
        h.feed(ts);
    }
    assert_eq!(h.coordinator.recording_state(), RecordingState::On);

    let calls = h.wait_calls(|c| encodes(c) >= 2);
    assert_eq!(count(&calls, |c| matches!(c, Call::Start { .. })), 1);
    assert_eq!(count(&calls, |c| matches!(c, Call::Rebind(_))), 1);

    let (Some(Call::Start { context: first, .. }), Some(Call::Rebind(second))) = (
        calls.iter().find(|c| matches!(c, Call::Start { .. })),
        calls.iter().find(|c| matches!(c, Call::Rebind(_))),
    ) else {
        panic!("unexpected calls {:?}", calls);
    };
    assert!(second > first);

    let events = h.finish();
    assert!(!events.iter().any(|e| matches!(e, EncoderEvent::SessionFailed(_))));
}

#[test]
fn test_repeated_disable_stops_once() {
    let Some(mut h) = Harness::new(RecordingBackend::default(), RenderSettings::default(), 32, 32) else {
        return;
    };
    h.coordinator.set_recording(output());
    h.feed(1);
    h.wait_calls(|c| encodes(c) == 1);

    h.coordinator.set_recording(None);
    h.feed(2);
    h.coordinator.set_recording(None);
    h.feed(3);

    h.wait_calls(|c| c.contains(&Call::Finish));
    std::thread::sleep(Duration::from_millis(50));
    let calls = h.calls();
    assert_eq!(count(&calls, |c| *c == Call::Finish), 1);
    // Nothing reaches the encoder once stopped
    assert_eq!(calls.last(), Some(&Call::Finish));

    let events = h.finish();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, EncoderEvent::SessionStopped(_)))
            .count(),
        1
    );
}

#[test]
fn test_disable_without_surface_stops_immediately() {
    let Some(mut h) = Harness::new(RecordingBackend::default(), RenderSettings::default(), 32, 32) else {
        return;
    };
    h.coordinator.set_recording(output());
    h.feed(1);
    h.wait_calls(|c| encodes(c) == 1);

    h.coordinator.on_surface_torn_down();
    h.coordinator.set_recording(None);
    assert_eq!(h.coordinator.recording_state(), RecordingState::Off);

    let calls = h.wait_calls(|c| c.contains(&Call::Finish));
    assert_eq!(calls.last(), Some(&Call::Finish));

    // A new surface does not bring the session back
    h.recreate_surface(32, 32);
    h.feed(2);
    assert_eq!(h.coordinator.recording_state(), RecordingState::Off);
    h.finish();
}

#[test]
fn test_leases_return_to_ring_after_encode() {
    let Some(mut h) = Harness::new(RecordingBackend::default(), RenderSettings::default(), 32, 32) else {
        return;
    };
    h.coordinator.set_recording(output());
    for ts in 1..=6u64 {
        h.feed(ts);
        let calls = h.wait_calls(|c| encodes(c) == ts as usize);
        assert_eq!(encodes(&calls), ts as usize);
    }

    let stats = h.stats.snapshot();
    assert_eq!(stats.frames_handed_to_encoder, 6);
    assert_eq!(stats.targets_starved, 0);
    h.finish();
}

#[test]
fn test_held_leases_fall_back_to_scratch() {
    let backend = RecordingBackend {
        hold_leases: true,
        ..RecordingBackend::default()
    };
    let held = Arc::clone(&backend.held);
    let settings = RenderSettings {
        ring_depth: 3,
        ..RenderSettings::default()
    };
    let Some(mut h) = Harness::new(backend, settings, 32, 32) else {
        return;
    };
    h.coordinator.set_recording(output());

    for ts in 1..=3u64 {
        h.feed(ts);
        h.wait_calls(|c| encodes(c) == ts as usize);
    }
    // Every ring target is lent out; drawing continues on the scratch target
    for ts in 4..=6u64 {
        h.feed(ts);
    }
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(encodes(&h.calls()), 3);
    let stats = h.stats.snapshot();
    assert_eq!(stats.targets_starved, 3);
    assert_eq!(stats.frames_drawn, 6);

    held.lock().unwrap().clear();
    h.feed(7);
    let calls = h.wait_calls(|c| encodes(c) == 4);
    assert_eq!(encodes(&calls), 4);
    assert_eq!(h.stats.snapshot().targets_starved, 3);
    h.finish();
}
