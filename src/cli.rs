// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for scan sessions
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Scanning QR codes
//! - Checking in attendees

use futures::StreamExt;
use scan_session::backends::camera::file_source::FileSourcePlatform;
use scan_session::backends::camera::v4l2::V4l2Platform;
use scan_session::checkin::{AllowListVerifier, CheckInError, CheckInHandler, CheckInSession};
use scan_session::constants::CHECKIN_CODE_LEN;
use scan_session::session::{SessionEvent, event_stream};
use scan_session::{
    AcceptAll, CameraSessionController, Config, DecodePlatform, DeviceChoice, Facing,
    SessionState,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// How results are printed
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

/// Options for the `scan` command
#[derive(Debug)]
pub struct ScanArgs {
    pub source: Option<PathBuf>,
    pub device: Option<String>,
    pub facing: Option<Facing>,
    pub keep_scanning: bool,
    pub fps: Option<u32>,
}

fn platform(source: Option<PathBuf>) -> Arc<dyn DecodePlatform> {
    match source {
        Some(dir) => Arc::new(FileSourcePlatform::new(dir)),
        None => Arc::new(V4l2Platform::new()),
    }
}

fn device_choice(device: Option<String>) -> DeviceChoice {
    match device {
        Some(id) => DeviceChoice::Exact(id),
        None => DeviceChoice::Auto,
    }
}

/// Dispose the controller on Ctrl+C so the camera is released before exit
fn dispose_on_interrupt(
    runtime: &tokio::runtime::Runtime,
    controller: &CameraSessionController,
) -> Result<(), ctrlc::Error> {
    let handle = runtime.handle().clone();
    let controller = controller.clone();
    ctrlc::set_handler(move || {
        let controller = controller.clone();
        handle.spawn(async move { controller.dispose().await });
    })
}

/// Store the device of the finished session for the next automatic start
///
/// The device comes from the session events: disposal on Ctrl+C clears the
/// controller's own record before the command gets here.
fn persist_last_device(config: &mut Config, device: Option<String>) {
    if config.remember_device(device)
        && let Err(e) = config.save()
    {
        warn!(error = %e, "Failed to save last used device");
    }
}

/// List all available cameras
pub fn list_devices(source: Option<PathBuf>, output: Output) -> Result<(), Box<dyn std::error::Error>> {
    let platform = platform(source);
    let runtime = tokio::runtime::Runtime::new()?;
    let devices = runtime.block_on(platform.enumerate_devices())?;

    if output.json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for device in &devices {
        println!("  {}", device.label);
        println!("      Id: {}", device.id);
    }

    Ok(())
}

fn print_event(event: &SessionEvent, output: Output) -> Result<(), Box<dyn std::error::Error>> {
    if output.json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    match event {
        SessionEvent::Started { device } => eprintln!("Using camera {}", device),
        SessionEvent::Decoded(result) => println!("{}", result.text),
        SessionEvent::Rejected { text, reason } => eprintln!("Rejected {:?}: {}", text, reason),
        SessionEvent::Status {
            state,
            error: Some(error),
        } => eprintln!("[{}] {}", state, error),
        SessionEvent::Status { state, error: None } => eprintln!("[{}]", state),
    }
    Ok(())
}

/// Scan QR codes and print each accepted payload
pub fn scan(args: ScanArgs, output: Output) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load();
    if let Some(fps) = args.fps {
        config.scan.decode_fps = fps;
    }
    if let Some(facing) = args.facing {
        config.facing = facing;
    }
    config.scan.stop_after_first_result = !args.keep_scanning;

    let runtime = tokio::runtime::Runtime::new()?;
    let controller = CameraSessionController::new(
        platform(args.source),
        Arc::new(AcceptAll),
        config.controller_options(),
    );
    dispose_on_interrupt(&runtime, &controller)?;

    let choice = device_choice(args.device.or_else(|| controller.last_device()));

    if !output.json && args.keep_scanning {
        eprintln!("Scanning... (press Ctrl+C to stop)");
    }

    let mut session_device = None;
    let result: Result<(), Box<dyn std::error::Error>> = runtime.block_on(async {
        let mut events = Box::pin(event_stream(controller.subscribe()));
        controller.start(choice).await;

        while let Some(event) = events.next().await {
            print_event(&event, output)?;
            match event {
                SessionEvent::Started { device } => session_device = Some(device),
                SessionEvent::Status {
                    state: SessionState::Error(message),
                    ..
                } => return Err(message.into()),
                SessionEvent::Status {
                    state: SessionState::Idle,
                    ..
                } => break,
                _ => {}
            }
        }
        Ok(())
    });

    persist_last_device(&mut config, session_device);
    runtime.block_on(controller.dispose());
    result
}

/// Scan badges until one verifies against the allow-list
pub fn check_in(
    source: Option<PathBuf>,
    device: Option<String>,
    codes: PathBuf,
    output: Output,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load();
    config.scan.stop_after_first_result = true;

    let verifier = AllowListVerifier::load(&codes)?;
    if verifier.is_empty() {
        return Err(format!("{} contains no codes", codes.display()).into());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let controller = CameraSessionController::new(
        platform(source),
        Arc::new(CheckInHandler::new(CHECKIN_CODE_LEN)),
        config.controller_options(),
    );
    dispose_on_interrupt(&runtime, &controller)?;

    let session = CheckInSession::new(controller.clone(), Arc::new(verifier), CHECKIN_CODE_LEN);
    if !output.json {
        eprintln!("Show a badge to the camera... (press Ctrl+C to cancel)");
    }

    let result = runtime.block_on(session.run(device_choice(device)));
    persist_last_device(&mut config, session.device());
    runtime.block_on(controller.dispose());

    match result {
        Ok(check_in) if output.json => {
            let value = serde_json::json!({
                "code": check_in.code,
                "id": check_in.id,
                "attempts": check_in.attempts,
            });
            println!("{}", value);
            Ok(())
        }
        Ok(check_in) => {
            println!("Checked in {} (code {})", check_in.id, check_in.code);
            Ok(())
        }
        Err(CheckInError::Closed) => {
            eprintln!("Cancelled.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
