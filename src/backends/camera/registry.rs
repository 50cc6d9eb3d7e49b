// SPDX-License-Identifier: GPL-3.0-only

//! Capture bookkeeping for thread-backed platforms
//!
//! Tracks every started engine by handle id: its state, the device it holds,
//! the render target it is bound to, and the decode loop thread behind it.

use super::frame_loop::{DecodeLoop, LoopAction};
use super::types::{CaptureHandle, EngineState};
use crate::constants::timing::DEVICE_OPEN_TIMEOUT;
use crate::errors::{BackendError, BackendResult};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct Entry {
    state: EngineState,
    device_id: String,
    render_target: String,
    decode_loop: Option<DecodeLoop>,
}

#[derive(Debug, Default)]
struct RegistryState {
    next_id: u64,
    entries: HashMap<u64, Entry>,
}

/// Thread-safe registry of running captures
#[derive(Debug, Default)]
pub struct CaptureRegistry {
    state: Mutex<RegistryState>,
}

impl CaptureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a decode loop and register it once its source is open
    ///
    /// `init_fn` runs on the loop thread. Its outcome is reported back here so
    /// the caller learns about open failures (permission, busy device, bad
    /// format) instead of getting a handle to a dead loop.
    pub async fn launch<S, I, F>(
        &self,
        device_id: &str,
        render_target: &str,
        interval: Duration,
        init_fn: I,
        step_fn: F,
    ) -> BackendResult<CaptureHandle>
    where
        S: 'static,
        I: FnOnce() -> BackendResult<S> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        if self.is_device_busy(device_id) {
            return Err(BackendError::InitializationFailed(format!(
                "{} is already capturing",
                device_id
            )));
        }

        let (ready_tx, ready_rx) = oneshot::channel::<BackendResult<()>>();
        let init = move || match init_fn() {
            Ok(state) => {
                let _ = ready_tx.send(Ok(()));
                Ok(state)
            }
            Err(error) => {
                let message = error.to_string();
                let _ = ready_tx.send(Err(error));
                Err(message)
            }
        };

        let decode_loop = DecodeLoop::start_with_init(device_id, interval, init, step_fn);

        match tokio::time::timeout(DEVICE_OPEN_TIMEOUT, ready_rx).await {
            Ok(Ok(Ok(()))) => {
                info!(device = %device_id, "Capture source opened");
                Ok(self.insert(device_id, render_target, decode_loop))
            }
            Ok(Ok(Err(error))) => {
                reap(vec![decode_loop]);
                Err(error)
            }
            Ok(Err(_)) => {
                reap(vec![decode_loop]);
                Err(BackendError::InitializationFailed(format!(
                    "{} exited before opening",
                    device_id
                )))
            }
            Err(_) => {
                warn!(device = %device_id, "Timed out opening capture source");
                reap(vec![decode_loop]);
                Err(BackendError::InitializationFailed(format!(
                    "timed out opening {}",
                    device_id
                )))
            }
        }
    }

    /// Stop a running capture and wait for its thread
    pub async fn stop(&self, handle: &CaptureHandle) -> BackendResult<()> {
        let mut decode_loop = self.begin_stop(handle)?;
        tokio::task::spawn_blocking(move || decode_loop.stop())
            .await
            .map_err(|e| BackendError::StopFailed(e.to_string()))?
            .map_err(BackendError::StopFailed)
    }

    /// Release every capture bound to a render target
    ///
    /// Returns how many were still running.
    pub fn release_render_target(&self, render_target: &str) -> usize {
        let loops = self.drain_render_target(render_target);
        let count = loops.len();
        reap(loops);
        count
    }

    /// Register a started decode loop and mint its handle
    pub fn insert(&self, device_id: &str, render_target: &str, decode_loop: DecodeLoop) -> CaptureHandle {
        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.entries.insert(
            id,
            Entry {
                state: EngineState::Scanning,
                device_id: device_id.to_string(),
                render_target: render_target.to_string(),
                decode_loop: Some(decode_loop),
            },
        );
        debug!(id, device = %device_id, render_target, "Registered capture");

        CaptureHandle {
            id,
            device_id: device_id.to_string(),
            render_target: render_target.to_string(),
        }
    }

    /// Whether a running capture already holds this device
    pub fn is_device_busy(&self, device_id: &str) -> bool {
        self.lock()
            .entries
            .values()
            .any(|e| e.device_id == device_id && e.state.needs_stop())
    }

    pub fn state(&self, handle: &CaptureHandle) -> EngineState {
        self.lock()
            .entries
            .get(&handle.id)
            .map(|e| e.state)
            .unwrap_or_default()
    }

    /// Take the decode loop out of a running capture so it can be joined
    ///
    /// The entry is marked stopped immediately.
    pub fn begin_stop(&self, handle: &CaptureHandle) -> BackendResult<DecodeLoop> {
        let mut state = self.lock();
        let entry = state
            .entries
            .get_mut(&handle.id)
            .ok_or_else(|| BackendError::StopFailed(format!("unknown capture {}", handle.id)))?;

        if !entry.state.needs_stop() {
            return Err(BackendError::StopFailed(format!(
                "capture {} is not running",
                handle.id
            )));
        }

        entry.state = EngineState::Stopped;
        entry
            .decode_loop
            .take()
            .ok_or_else(|| BackendError::StopFailed(format!("capture {} has no loop", handle.id)))
    }

    /// Drop a stopped capture
    pub fn clear(&self, handle: &CaptureHandle) -> BackendResult<()> {
        let mut state = self.lock();
        match state.entries.get(&handle.id).map(|e| e.state) {
            Some(s) if s.needs_stop() => Err(BackendError::StopFailed(format!(
                "capture {} cleared while running",
                handle.id
            ))),
            Some(_) => {
                state.entries.remove(&handle.id);
                Ok(())
            }
            None => Err(BackendError::StopFailed(format!(
                "capture {} already cleared",
                handle.id
            ))),
        }
    }

    /// Remove every capture bound to a render target, returning their loops
    pub fn drain_render_target(&self, render_target: &str) -> Vec<DecodeLoop> {
        let mut state = self.lock();
        let ids: Vec<u64> = state
            .entries
            .iter()
            .filter(|(_, e)| e.render_target == render_target)
            .map(|(id, _)| *id)
            .collect();

        ids.into_iter()
            .filter_map(|id| state.entries.remove(&id))
            .filter_map(|e| {
                if e.decode_loop.is_some() {
                    warn!(device = %e.device_id, render_target, "Residual capture still bound to render target");
                }
                e.decode_loop
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Signal loops to stop and join them off the caller's thread
fn reap(loops: Vec<DecodeLoop>) {
    if loops.is_empty() {
        return;
    }
    for decode_loop in &loops {
        decode_loop.request_stop();
    }
    std::thread::spawn(move || {
        for mut decode_loop in loops {
            if let Err(e) = decode_loop.join() {
                warn!(error = %e, "Decode loop did not exit cleanly");
            }
        }
    });
}
