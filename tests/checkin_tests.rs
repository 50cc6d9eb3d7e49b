// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the check-in flow

use scan_session::backends::camera::scripted::{PlatformCall, ScriptedPlatform};
use scan_session::backends::camera::{CaptureDevice, DeviceRequest, ScanConfig};
use scan_session::checkin::{
    AllowListVerifier, CheckIn, CheckInError, CheckInHandler, CheckInSession,
};
use scan_session::errors::BackendError;
use scan_session::session::{CameraSessionController, ControllerOptions, DeviceChoice, SessionState};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn setup() -> (Arc<ScriptedPlatform>, CameraSessionController, CheckInSession) {
    let platform = Arc::new(ScriptedPlatform::new(vec![
        CaptureDevice::new("1", "Integrated Camera"),
        CaptureDevice::new("2", "Front Facing Camera"),
    ]));
    let controller = CameraSessionController::new(
        platform.clone(),
        Arc::new(CheckInHandler::default()),
        ControllerOptions {
            config: ScanConfig::default(),
            ..ControllerOptions::default()
        },
    );
    let verifier = AllowListVerifier::new(HashMap::from([
        ("1234".to_string(), "attendee-7".to_string()),
        ("4321".to_string(), "attendee-9".to_string()),
    ]));
    let session = CheckInSession::new(controller.clone(), Arc::new(verifier), 4);
    (platform, controller, session)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test(start_paused = true)]
async fn test_registered_code_checks_in() {
    let (platform, controller, session) = setup();

    let (result, _) = tokio::join!(session.run(DeviceChoice::Auto), async {
        settle().await;
        assert!(platform.emit_decode("https://example.org/badge?code=1234"));
    });

    assert_eq!(
        result,
        Ok(CheckIn {
            code: "1234".into(),
            id: "attendee-7".into(),
            attempts: 1,
        })
    );
    settle().await;
    assert_eq!(controller.state(), SessionState::Idle);
    assert_eq!(platform.running(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unregistered_code_resumes_scanning_on_same_device() {
    let (platform, controller, session) = setup();

    let (result, _) = tokio::join!(session.run(DeviceChoice::Auto), async {
        settle().await;
        platform.emit_decode("5555");
        settle().await;
        assert_eq!(controller.state(), SessionState::Scanning);
        platform.emit_decode("4321");
    });

    let check_in = result.unwrap();
    assert_eq!(check_in.id, "attendee-9");
    assert_eq!(check_in.attempts, 2);
    assert_eq!(platform.starts(), 2);
    assert_eq!(
        platform.count(|c| *c == PlatformCall::Start(DeviceRequest::Exact("2".into()))),
        1
    );
    assert_eq!(platform.max_running(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_payload_without_code_never_reaches_verifier() {
    let (platform, _controller, session) = setup();

    let (result, _) = tokio::join!(session.run(DeviceChoice::Auto), async {
        settle().await;
        platform.emit_decode("abc");
        settle().await;
        platform.emit_decode("1234");
    });

    assert_eq!(result.unwrap().attempts, 1);
    // The rejected payload never stopped the engine
    assert_eq!(platform.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_code_checks_in_only_once() {
    let (platform, _controller, session) = setup();

    let (first, _) = tokio::join!(session.run(DeviceChoice::Auto), async {
        settle().await;
        platform.emit_decode("1234");
    });
    assert!(first.is_ok());

    let (second, _) = tokio::join!(session.run(DeviceChoice::Auto), async {
        settle().await;
        platform.emit_decode("1234");
        settle().await;
        platform.emit_decode("4321");
    });
    let second = second.unwrap();
    assert_eq!(second.id, "attendee-9");
    assert_eq!(second.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_start_failure_ends_run() {
    let (platform, _controller, session) = setup();
    platform.fail_next_start(BackendError::InitializationFailed("device busy".into()));

    let result = session.run(DeviceChoice::Exact("1".into())).await;

    assert!(matches!(result, Err(CheckInError::Scan(message)) if message.contains("device busy")));
}

#[tokio::test(start_paused = true)]
async fn test_dispose_cancels_run() {
    let (platform, controller, session) = setup();

    let (result, _) = tokio::join!(session.run(DeviceChoice::Auto), async {
        settle().await;
        controller.dispose().await;
    });

    assert_eq!(result, Err(CheckInError::Closed));
    assert_eq!(platform.running(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_run_still_reports_scanned_device() {
    let (_platform, controller, session) = setup();

    let (result, _) = tokio::join!(session.run(DeviceChoice::Auto), async {
        settle().await;
        controller.dispose().await;
    });

    assert_eq!(result, Err(CheckInError::Closed));
    assert_eq!(controller.last_device(), None);
    assert_eq!(session.device().as_deref(), Some("2"));
}

#[tokio::test(start_paused = true)]
async fn test_resumed_scan_tracks_latest_device() {
    let (platform, _controller, session) = setup();

    let (result, _) = tokio::join!(session.run(DeviceChoice::Exact("1".into())), async {
        settle().await;
        platform.emit_decode("5555");
        settle().await;
        platform.emit_decode("1234");
    });

    assert!(result.is_ok());
    assert_eq!(session.device().as_deref(), Some("1"));
}
