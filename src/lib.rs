// SPDX-License-Identifier: MPL-2.0

//! Scan Session - camera session control for live QR decoding
//!
//! This library drives a camera through a guarded lifecycle while a decode
//! engine looks for QR codes in the stream, and builds an attendee check-in
//! flow on top of it.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`session`]: Session state machine and the [`CameraSessionController`]
//! - [`backends`]: Decode platform abstraction (V4L2, still images, scripted)
//! - [`decoder`]: QR detection on luma frames
//! - [`checkin`]: Check-in code extraction and verification
//! - [`config`]: Persistent user settings
//!
//! # Example
//!
//! ```ignore
//! let platform = Arc::new(V4l2Platform::new());
//! let controller = CameraSessionController::new(platform, Arc::new(AcceptAll), Config::load().controller_options());
//! let mut events = controller.subscribe();
//! controller.start(DeviceChoice::Auto).await;
//! ```

pub mod backends;
pub mod checkin;
pub mod config;
pub mod constants;
pub mod decoder;
pub mod errors;
pub mod session;

// Re-export commonly used types
pub use backends::camera::{CaptureDevice, DecodePlatform, DecodeResult, Facing, ScanConfig};
pub use checkin::{AllowListVerifier, CheckIn, CheckInHandler, CheckInSession, Verifier};
pub use config::Config;
pub use errors::{BackendError, ScanError};
pub use session::{
    AcceptAll, CameraSessionController, ControllerOptions, DeviceChoice, SessionEvent,
    SessionState, Visibility,
};
