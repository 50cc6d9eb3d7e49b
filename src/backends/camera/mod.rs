// SPDX-License-Identifier: MPL-2.0

//! Decode platform abstraction
//!
//! This module provides a trait-based abstraction over the platform pieces a
//! scan session needs: device enumeration and a frame-decoding engine bound
//! to a render target.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │  Collaborator (CLI / UI) │
//! └────────────┬─────────────┘
//!              │ start / stop / restart / visibility
//!              ▼
//! ┌──────────────────────────┐
//! │ CameraSessionController  │  ← State machine, guards, cleanup
//! └────────────┬─────────────┘
//!              │ uses DeviceSelector for fallback selection
//!              ▼
//! ┌──────────────────────────┐
//! │   DecodePlatform trait   │  ← Outbound interface
//! └────────────┬─────────────┘
//!              │
//!      ┌───────┼────────────┐
//!      ▼       ▼            ▼
//!   ┌─────┐ ┌───────────┐ ┌────────┐
//!   │V4L2 │ │File source│ │Scripted│
//!   └─────┘ └───────────┘ └────────┘
//! ```

pub mod device_selector;
pub mod file_source;
pub mod frame_loop;
pub mod registry;
pub mod scripted;
pub mod types;
pub mod v4l2;

pub use device_selector::DeviceSelector;
pub use types::*;

use crate::errors::BackendResult;
use futures::future::BoxFuture;

/// Outbound interface to the device platform and its decode engine
///
/// Each asynchronous method is a suspension point for the controller. The
/// controller guarantees it never calls `stop_capture`/`clear_capture` on a
/// handle concurrently, and only calls them while `query_state` reports
/// scanning or paused.
pub trait DecodePlatform: Send + Sync {
    /// Enumerate available capture devices in platform order
    ///
    /// # Returns
    /// * `Ok(devices)` - possibly empty list
    /// * `Err(BackendError)` - enumeration rejected (permission, no hardware)
    fn enumerate_devices(&self) -> BoxFuture<'_, BackendResult<Vec<CaptureDevice>>>;

    /// Acquire a device and start the decode engine
    ///
    /// Decoded payloads and per-frame errors are delivered through
    /// `request.events` until the capture is stopped.
    ///
    /// # Returns
    /// * `Ok(CaptureHandle)` - engine running
    /// * `Err(BackendError::OverConstrained)` - facing/capability request unsatisfiable
    /// * `Err(BackendError)` - any other acquisition failure
    fn start_capture(&self, request: CaptureRequest) -> BoxFuture<'_, BackendResult<CaptureHandle>>;

    /// Stop frame delivery and release the device stream
    fn stop_capture<'a>(&'a self, handle: &'a CaptureHandle) -> BoxFuture<'a, BackendResult<()>>;

    /// Detach the engine from its render target and drop its bookkeeping
    fn clear_capture<'a>(&'a self, handle: &'a CaptureHandle) -> BoxFuture<'a, BackendResult<()>>;

    /// Engine state as the platform sees it
    fn query_state(&self, handle: &CaptureHandle) -> EngineState;

    /// Force-release any stream still bound to a render target
    ///
    /// Returns the number of residual streams released.
    fn release_render_target(&self, render_target: &str) -> usize;

    /// Short platform name for logging
    fn name(&self) -> &'static str;
}
