// SPDX-License-Identifier: GPL-3.0-only
// Shared types for decode platform abstraction

//! Shared types for decode platforms

use crate::constants::{DEFAULT_DECODE_FPS, DEFAULT_SCAN_REGION, MAX_DECODE_FPS};
use crate::session::SessionToken;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A capture device exposed by the platform
///
/// Supplied by enumeration and never mutated by the controller. The label is
/// free text and only used for best-effort heuristics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureDevice {
    /// Opaque platform identifier (device path, node id, file path)
    pub id: String,
    /// Human-readable name
    pub label: String,
}

impl CaptureDevice {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

impl std::fmt::Display for CaptureDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label, self.id)
    }
}

/// Camera facing direction used for automatic device requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Front / selfie camera
    #[default]
    User,
    /// Rear camera
    Environment,
}

impl std::fmt::Display for Facing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Facing::User => write!(f, "user"),
            Facing::Environment => write!(f, "environment"),
        }
    }
}

/// How the platform should pick the device for a capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRequest {
    /// Let the platform pick a device with this facing mode.
    ///
    /// The platform may reject this with `BackendError::OverConstrained`.
    Facing(Facing),
    /// Use exactly this device id
    Exact(String),
}

impl DeviceRequest {
    pub fn is_automatic(&self) -> bool {
        matches!(self, DeviceRequest::Facing(_))
    }
}

impl std::fmt::Display for DeviceRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceRequest::Facing(facing) => write!(f, "facing={}", facing),
            DeviceRequest::Exact(id) => write!(f, "device={}", id),
        }
    }
}

/// Size of the region decoded out of each frame, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRegion {
    pub width: u32,
    pub height: u32,
}

impl Default for ScanRegion {
    fn default() -> Self {
        Self {
            width: DEFAULT_SCAN_REGION,
            height: DEFAULT_SCAN_REGION,
        }
    }
}

impl ScanRegion {
    /// Centre the region inside a frame, clamped to the frame bounds
    ///
    /// Returns `(x, y, width, height)` in pixels.
    pub fn centered_in(&self, frame_width: u32, frame_height: u32) -> (u32, u32, u32, u32) {
        let width = self.width.min(frame_width);
        let height = self.height.min(frame_height);
        let x = (frame_width - width) / 2;
        let y = (frame_height - height) / 2;
        (x, y, width, height)
    }
}

/// Capability requests passed to the decode engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Target decode rate in frames per second
    pub decode_fps: u32,
    /// Region of each frame handed to the decoder
    pub scan_region: ScanRegion,
    /// Whether the last used device should be remembered across sessions
    pub remember_last_device: bool,
    /// Stop the session once a decode has been accepted
    pub stop_after_first_result: bool,
    /// Settle delay between release and re-acquire, in milliseconds
    pub restart_delay_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            decode_fps: DEFAULT_DECODE_FPS,
            scan_region: ScanRegion::default(),
            remember_last_device: true,
            stop_after_first_result: true,
            restart_delay_ms: crate::constants::timing::RESTART_SETTLE_DELAY.as_millis() as u64,
        }
    }
}

impl ScanConfig {
    /// Decode rate clamped to a usable range
    pub fn effective_fps(&self) -> u32 {
        self.decode_fps.clamp(1, MAX_DECODE_FPS)
    }

    /// Interval between decode attempts
    pub fn decode_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(1000 / self.effective_fps() as u64)
    }

    /// Settle delay clamped to the supported bounds
    pub fn restart_delay(&self) -> std::time::Duration {
        use crate::constants::timing::{MAX_RESTART_DELAY, MIN_RESTART_DELAY};
        std::time::Duration::from_millis(self.restart_delay_ms)
            .clamp(MIN_RESTART_DELAY, MAX_RESTART_DELAY)
    }
}

/// A decoded payload produced by the engine
///
/// Consumed once by the decode handler; the controller does not retain it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodeResult {
    pub text: String,
    pub timestamp: DateTime<Local>,
}

impl DecodeResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: Local::now(),
        }
    }
}

/// Notification sent from a running engine to the controller
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A frame decoded successfully
    Decoded(DecodeResult),
    /// A frame produced no decodable payload or failed to process
    FrameError(String),
}

/// Engine event tagged with the session it belongs to
#[derive(Debug, Clone)]
pub struct TaggedEvent {
    pub token: SessionToken,
    pub event: EngineEvent,
}

/// Sending half handed to the engine in place of decode/error callbacks
///
/// Every event is tagged with the token of the session that started the
/// engine, so events from a released session can be recognised as stale.
#[derive(Debug, Clone)]
pub struct EngineEventSender {
    token: SessionToken,
    sender: mpsc::UnboundedSender<TaggedEvent>,
}

impl EngineEventSender {
    pub fn new(token: SessionToken, sender: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { token, sender }
    }

    /// Report a decoded payload. Returns false once the session is gone.
    pub fn decoded(&self, text: impl Into<String>) -> bool {
        self.send(EngineEvent::Decoded(DecodeResult::new(text)))
    }

    /// Report a per-frame failure. Returns false once the session is gone.
    pub fn frame_error(&self, message: impl Into<String>) -> bool {
        self.send(EngineEvent::FrameError(message.into()))
    }

    /// Whether the owning session has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn send(&self, event: EngineEvent) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.sender
            .send(TaggedEvent {
                token: self.token.clone(),
                event,
            })
            .is_ok()
    }
}

/// Everything the platform needs to start one capture
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub device: DeviceRequest,
    pub config: ScanConfig,
    pub render_target: String,
    pub events: EngineEventSender,
}

/// Opaque handle to a started engine
///
/// Only the controller holds handles; platforms key their bookkeeping by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaptureHandle {
    pub id: u64,
    /// Device the engine actually bound to
    pub device_id: String,
    pub render_target: String,
}

/// Engine state as self-reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    NotStarted,
    Scanning,
    Paused,
    Stopped,
}

impl EngineState {
    /// Whether stop + clear must be issued to release this engine
    pub fn needs_stop(&self) -> bool {
        matches!(self, EngineState::Scanning | EngineState::Paused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_region_centered() {
        let region = ScanRegion {
            width: 250,
            height: 250,
        };
        assert_eq!(region.centered_in(640, 480), (195, 115, 250, 250));
    }

    #[test]
    fn test_scan_region_clamped_to_frame() {
        let region = ScanRegion {
            width: 800,
            height: 800,
        };
        assert_eq!(region.centered_in(640, 480), (0, 0, 640, 480));
    }

    #[test]
    fn test_decode_interval_clamps_zero_fps() {
        let config = ScanConfig {
            decode_fps: 0,
            ..ScanConfig::default()
        };
        assert_eq!(config.decode_interval(), std::time::Duration::from_millis(1000));
    }

    #[test]
    fn test_engine_state_needs_stop() {
        assert!(EngineState::Scanning.needs_stop());
        assert!(EngineState::Paused.needs_stop());
        assert!(!EngineState::Stopped.needs_stop());
        assert!(!EngineState::NotStarted.needs_stop());
    }

    #[test]
    fn test_sender_drops_events_after_cancel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = SessionToken::new();
        let sender = EngineEventSender::new(token.clone(), tx);

        assert!(sender.decoded("1234"));
        token.cancel();
        assert!(!sender.decoded("5678"));

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
