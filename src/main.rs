// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand, ValueEnum};
use scan_session::Facing;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "scan-session")]
#[command(about = "Scan QR codes and check in attendees from a camera")]
#[command(version)]
struct Cli {
    /// Read still images from this directory instead of V4L2 cameras
    #[arg(short, long, global = true)]
    source: Option<PathBuf>,

    /// Print events as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum FacingArg {
    User,
    Environment,
}

impl From<FacingArg> for Facing {
    fn from(arg: FacingArg) -> Self {
        match arg {
            FacingArg::User => Facing::User,
            FacingArg::Environment => Facing::Environment,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List,

    /// Scan QR codes and print their contents
    Scan {
        /// Device id to use (from 'scan-session list'); defaults to the last used device
        #[arg(short, long)]
        device: Option<String>,

        /// Preferred camera direction for automatic selection
        #[arg(long, value_enum)]
        facing: Option<FacingArg>,

        /// Keep scanning after the first code (stop with Ctrl+C)
        #[arg(short, long)]
        keep_scanning: bool,

        /// Decode attempts per second
        #[arg(long)]
        fps: Option<u32>,
    },

    /// Check in attendees against an allow-list of codes
    CheckIn {
        /// JSON file mapping codes to attendee ids, e.g. {"1234": "attendee-7"}
        #[arg(short, long)]
        codes: PathBuf,

        /// Device id to use (from 'scan-session list')
        #[arg(short, long)]
        device: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=scan_session=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = cli::Output { json: cli.json };

    match cli.command {
        Commands::List => cli::list_devices(cli.source, output),
        Commands::Scan {
            device,
            facing,
            keep_scanning,
            fps,
        } => cli::scan(
            cli::ScanArgs {
                source: cli.source,
                device,
                facing: facing.map(Facing::from),
                keep_scanning,
                fps,
            },
            output,
        ),
        Commands::CheckIn { codes, device } => cli::check_in(cli.source, device, codes, output),
    }
}
