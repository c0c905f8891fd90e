// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use shadercam::backends::camera::CameraFacing;
use shadercam::media::encoders::VideoCodec;
use shadercam::shaders::FilterEffect;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "shadercam")]
#[command(about = "Live camera capture through GPU shader filters, with recording")]
#[command(version = shadercam::constants::app_info::version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a filtered stream to a video file
    Record {
        /// Camera device path (default: first camera with the configured facing)
        #[arg(short, long)]
        device: Option<String>,

        /// Camera facing to open when no device is given (front, back)
        #[arg(long)]
        facing: Option<CameraFacing>,

        /// Use a generated test pattern instead of a camera
        #[arg(long)]
        synthetic: bool,

        /// Filter name or index (see 'shadercam filters')
        #[arg(short, long)]
        filter: Option<FilterEffect>,

        /// Display (and recording) size as WIDTHxHEIGHT
        #[arg(short, long, default_value = "720x720", value_parser = cli::parse_size)]
        size: (u32, u32),

        /// Recording duration in seconds
        #[arg(short = 't', long, default_value = "10")]
        duration: u64,

        /// Directory for the recording (default: ~/Videos/shadercam)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Preferred codec (h264, hevc, av1)
        #[arg(long)]
        codec: Option<VideoCodec>,

        /// Encoder element to use (see 'shadercam list-encoders')
        #[arg(long)]
        encoder: Option<String>,

        /// Apply the round display mask
        #[arg(long)]
        circle: bool,

        /// Save the last displayed frame as PNG
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// List available cameras and their sizes
    ListCameras,

    /// List usable video encoders, best first
    ListEncoders {
        /// Preferred codec (h264, hevc, av1)
        #[arg(long, default_value = "h264")]
        codec: VideoCodec,
    },

    /// List filter effects
    Filters,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control the log level, e.g. RUST_LOG=shadercam=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Record {
            device,
            facing,
            synthetic,
            filter,
            size,
            duration,
            output_dir,
            codec,
            encoder,
            circle,
            snapshot,
        } => cli::record(cli::RecordArgs {
            device,
            facing,
            synthetic,
            filter,
            size,
            duration,
            output_dir,
            codec,
            encoder,
            circle,
            snapshot,
        }),
        Commands::ListCameras => cli::list_cameras(),
        Commands::ListEncoders { codec } => cli::list_encoders(codec),
        Commands::Filters => cli::list_filters(),
    }
}
