// SPDX-License-Identifier: MPL-2.0

//! Scan session lifecycle
//!
//! This module provides the camera session state machine and its controller:
//! - [`SessionState`]: the finite states and their allowed transitions
//! - [`CameraSessionController`]: guarded start/stop/restart, visibility
//!   handling, decode dispatch and teardown
//! - [`SessionEvent`]: what observers receive

pub mod controller;
pub mod events;
pub mod state;
pub mod token;

pub use controller::{
    CameraSessionController, ControllerOptions, DeviceChoice, DropReason, RequestOutcome,
    Visibility,
};
pub use events::{
    AcceptAll, DecodeHandler, DecodeVerdict, SessionEvent, SessionEvents, event_stream,
};
pub use state::{IllegalTransition, SessionState, Transition};
pub use token::SessionToken;
