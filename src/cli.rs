// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! - Recording a filtered stream through a headless display surface
//! - Listing cameras, encoders and filters

use shadercam::backends::camera::{
    CameraFacing, FrameProducer, GstCameraProducer, SyntheticPattern, SyntheticProducer,
    enumerate_cameras, enumerate_sizes,
};
use shadercam::backends::surface::SurfaceEvent;
use shadercam::backends::surface::headless::HeadlessSurface;
use shadercam::config::Config;
use shadercam::constants::{capture, encoder as encoder_consts, format_bitrate};
use shadercam::lifecycle::{CaptureController, ControllerEvent};
use shadercam::media::encoders::VideoCodec;
use shadercam::media::encoders::detection::{detect_video_encoders, missing_required_elements};
use shadercam::pipelines::video::{EncoderEvent, GpuEncodeBackend};
use shadercam::render::RenderEvent;
use shadercam::shaders::FilterEffect;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Options of the `record` command
pub struct RecordArgs {
    pub device: Option<String>,
    pub facing: Option<CameraFacing>,
    pub synthetic: bool,
    pub filter: Option<FilterEffect>,
    pub size: (u32, u32),
    pub duration: u64,
    pub output_dir: Option<PathBuf>,
    pub codec: Option<VideoCodec>,
    pub encoder: Option<String>,
    pub circle: bool,
    pub snapshot: Option<PathBuf>,
}

/// Parse `WIDTHxHEIGHT`
pub fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let width: u32 = w.trim().parse().map_err(|_| format!("bad width '{}'", w))?;
    let height: u32 = h.trim().parse().map_err(|_| format!("bad height '{}'", h))?;
    if width == 0 || height == 0 {
        return Err("size must be non-zero".to_string());
    }
    Ok((width, height))
}

/// Record a filtered stream
pub fn record(args: RecordArgs) -> Result<(), Box<dyn std::error::Error>> {
    gstreamer::init()?;

    let missing = missing_required_elements();
    if !missing.is_empty() {
        return Err(format!("Missing GStreamer elements: {}", missing.join(", ")).into());
    }

    let mut config = Config::load_or_default();
    if let Some(facing) = args.facing {
        config.facing = facing;
    }
    if let Some(filter) = args.filter {
        config.initial_filter = filter;
    }
    if let Some(codec) = args.codec {
        config.codec = codec;
    }
    if let Some(dir) = args.output_dir.clone() {
        config.output_dir = Some(dir);
    }
    config.circle_mask |= args.circle;

    let backend = match &args.encoder {
        Some(name) => {
            let info = detect_video_encoders(config.codec)
                .into_iter()
                .find(|e| &e.element_name == name)
                .ok_or_else(|| format!("Encoder '{}' not available", name))?;
            GpuEncodeBackend::with_encoder(info)
        }
        None => GpuEncodeBackend::new(),
    };

    if args.synthetic {
        let producer = SyntheticProducer::new(SyntheticPattern::Gradient, capture::FRAMERATE);
        println!("Using synthetic test pattern");
        run_recording(producer, &config, backend, &args)
    } else {
        let producer = match &args.device {
            Some(path) => {
                let device = enumerate_cameras()
                    .into_iter()
                    .find(|c| &c.path == path)
                    .ok_or_else(|| format!("Camera '{}' not found", path))?;
                GstCameraProducer::with_device(device)?
            }
            None => GstCameraProducer::open(config.facing)?,
        };
        println!("Using camera: {} ({})", producer.device().name, producer.device().path);
        run_recording(producer, &config, backend, &args)
    }
}

fn run_recording<P: FrameProducer>(
    producer: P,
    config: &Config,
    backend: GpuEncodeBackend,
    args: &RecordArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut controller = CaptureController::with_encoder(producer, config, Some(backend))?;
    let (source_w, source_h) = controller.source_size();
    let (width, height) = args.size;
    let side = width.min(height);

    println!("Capture: {}x{}", source_w, source_h);
    println!(
        "Filter: {}, output: {}x{}, bitrate: {}",
        config.initial_filter,
        side,
        side,
        format_bitrate(config.bitrate_bps(side))
    );

    controller.notify_surface_lifecycle(SurfaceEvent::Created(Box::new(HeadlessSurface::new(
        width,
        height,
        config.refresh_hz,
    ))))?;

    let output = controller.set_recording(true)?;
    if let Some(path) = &output {
        println!("Output: {}", path.display());
    }

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = Arc::clone(&stop_flag);
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    println!();
    println!("Recording... (press Ctrl+C to stop early)");

    let start = Instant::now();
    let target = Duration::from_secs(args.duration);
    let mut failed = false;
    while start.elapsed() < target && !stop_flag.load(Ordering::SeqCst) {
        for event in controller.poll_events() {
            failed |= report(&event);
        }
        if failed {
            break;
        }

        let elapsed = start.elapsed().as_secs();
        print!("\rRecording: {:02}:{:02}", elapsed / 60, elapsed % 60);
        std::io::Write::flush(&mut std::io::stdout())?;
        std::thread::sleep(Duration::from_millis(100));
    }
    println!();

    if let Some(path) = &args.snapshot {
        controller.snapshot(path.clone())?;
    }

    controller.set_recording(false)?;

    // Wait for the encoder to finalize before tearing everything down
    let deadline = Instant::now() + encoder_consts::DRAIN_TIMEOUT * 2;
    let mut stopped = failed;
    while !stopped && Instant::now() < deadline {
        for event in controller.poll_events() {
            report(&event);
            stopped |= matches!(
                event,
                ControllerEvent::Encoder(
                    EncoderEvent::SessionStopped(_) | EncoderEvent::MidStreamError { .. }
                )
            );
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    let stats = controller.stats();
    for event in controller.shutdown() {
        report(&event);
    }

    println!(
        "Frames drawn: {}, encoded: {}, dropped: {}",
        stats.frames_drawn,
        stats.encoder_frames_encoded,
        stats.encoder_frames_lost()
    );

    if failed {
        return Err("Recording failed".into());
    }
    Ok(())
}

/// Print an event; returns `true` if it ends the recording
fn report(event: &ControllerEvent) -> bool {
    match event {
        ControllerEvent::Render(RenderEvent::SetupFailed(e)) => {
            eprintln!("Render setup failed: {}", e);
            true
        }
        ControllerEvent::Render(RenderEvent::Error(e)) => {
            eprintln!("Render error: {}", e);
            false
        }
        ControllerEvent::Render(RenderEvent::SnapshotSaved(path)) => {
            println!("Snapshot saved: {}", path.display());
            false
        }
        ControllerEvent::Encoder(EncoderEvent::SessionFailed(e)) => {
            eprintln!("Recording could not start: {}", e);
            true
        }
        ControllerEvent::Encoder(EncoderEvent::MidStreamError { error, session }) => {
            eprintln!(
                "Encoder failed after {} frames: {} (partial file kept at {})",
                session.frames_encoded,
                error,
                session.output_path.display()
            );
            true
        }
        ControllerEvent::Encoder(EncoderEvent::SessionStopped(session)) => {
            println!(
                "Video saved: {} ({} frames)",
                session.output_path.display(),
                session.frames_encoded
            );
            false
        }
        _ => false,
    }
}

/// List all available cameras
pub fn list_cameras() -> Result<(), Box<dyn std::error::Error>> {
    let cameras = enumerate_cameras();

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for camera in &cameras {
        println!("  {} - {} ({})", camera.path, camera.name, camera.facing);

        let mut sizes: Vec<(u32, u32)> = enumerate_sizes(&camera.path)
            .iter()
            .map(|f| (f.width, f.height))
            .collect();
        sizes.sort_by(|a, b| (b.0 * b.1).cmp(&(a.0 * a.1)));
        sizes.dedup();

        if !sizes.is_empty() {
            let shown: Vec<String> = sizes
                .iter()
                .take(5)
                .map(|(w, h)| format!("{}x{}", w, h))
                .collect();
            println!("      Sizes: {}", shown.join(", "));
        }
        println!();
    }

    Ok(())
}

/// List encoders usable for recording, in the order they would be chosen
pub fn list_encoders(preferred: VideoCodec) -> Result<(), Box<dyn std::error::Error>> {
    gstreamer::init()?;

    let encoders = detect_video_encoders(preferred);
    if encoders.is_empty() {
        println!("No usable video encoders found.");
        return Ok(());
    }

    println!("Video encoders (preferred codec {:?}):", preferred);
    for encoder in &encoders {
        println!(
            "  {:<16} {:<6?} {:<8} {}",
            encoder.element_name,
            encoder.codec,
            if encoder.is_hardware { "hardware" } else { "software" },
            encoder.display_name
        );
    }
    Ok(())
}

/// List filter effects with their selection index
pub fn list_filters() -> Result<(), Box<dyn std::error::Error>> {
    println!("Filters:");
    for effect in FilterEffect::ALL {
        let program = effect.program();
        println!("  [{}] {:<12} {}", effect.index(), effect.name(), program.kind.label());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("640x480"), Ok((640, 480)));
        assert_eq!(parse_size("720X720"), Ok((720, 720)));
        assert!(parse_size("640").is_err());
        assert!(parse_size("0x480").is_err());
    }
}
