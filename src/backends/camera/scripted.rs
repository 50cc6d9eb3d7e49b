// SPDX-License-Identifier: GPL-3.0-only

//! Scripted in-memory decode platform
//!
//! Deterministic platform with a call journal. Devices, start failures and
//! stop failures are configured up front; decode results are injected with
//! [`ScriptedPlatform::emit_decode`]. Used by tests and dry runs, so every
//! lifecycle property can be observed without hardware.

use super::DecodePlatform;
use super::device_selector::DeviceSelector;
use super::types::*;
use crate::errors::{BackendError, BackendResult};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// One call received by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    Enumerate,
    Start(DeviceRequest),
    Stop(u64),
    Clear(u64),
    ReleaseRenderTarget(String),
}

#[derive(Debug)]
struct ScriptedEngine {
    state: EngineState,
    device_id: String,
    render_target: String,
    events: EngineEventSender,
}

#[derive(Debug, Default)]
struct Script {
    devices: Option<Vec<CaptureDevice>>,
    start_failures: VecDeque<BackendError>,
    stop_failure: Option<BackendError>,
    clear_failure: Option<BackendError>,
    start_delay: Duration,
    stop_delay: Duration,
    next_id: u64,
    engines: BTreeMap<u64, ScriptedEngine>,
    journal: Vec<PlatformCall>,
    max_running: usize,
}

impl Script {
    fn running(&self) -> usize {
        self.engines.values().filter(|e| e.state.needs_stop()).count()
    }
}

/// Deterministic platform for tests and dry runs
#[derive(Debug, Default)]
pub struct ScriptedPlatform {
    script: Mutex<Script>,
}

impl ScriptedPlatform {
    /// Platform exposing the given devices
    pub fn new(devices: Vec<CaptureDevice>) -> Self {
        Self {
            script: Mutex::new(Script {
                devices: Some(devices),
                ..Script::default()
            }),
        }
    }

    /// Platform whose enumeration is rejected
    pub fn denied() -> Self {
        Self::default()
    }

    /// Fail the next start attempt with `error`; calls queue up in order
    pub fn fail_next_start(&self, error: BackendError) -> &Self {
        self.lock().start_failures.push_back(error);
        self
    }

    /// Fail every stop call with `error`
    pub fn fail_stops(&self, error: BackendError) -> &Self {
        self.lock().stop_failure = Some(error);
        self
    }

    /// Fail every clear call with `error`
    pub fn fail_clears(&self, error: BackendError) -> &Self {
        self.lock().clear_failure = Some(error);
        self
    }

    /// Simulate slow device acquisition
    pub fn set_start_delay(&self, delay: Duration) -> &Self {
        self.lock().start_delay = delay;
        self
    }

    /// Simulate slow engine shutdown
    pub fn set_stop_delay(&self, delay: Duration) -> &Self {
        self.lock().stop_delay = delay;
        self
    }

    /// Deliver a decoded payload from the most recently started running engine
    ///
    /// Returns false when no engine is running or its session is gone.
    pub fn emit_decode(&self, text: &str) -> bool {
        let script = self.lock();
        script
            .engines
            .values()
            .rev()
            .find(|e| e.state == EngineState::Scanning)
            .is_some_and(|e| e.events.decoded(text))
    }

    /// Deliver a per-frame error from the most recently started running engine
    pub fn emit_frame_error(&self, message: &str) -> bool {
        let script = self.lock();
        script
            .engines
            .values()
            .rev()
            .find(|e| e.state == EngineState::Scanning)
            .is_some_and(|e| e.events.frame_error(message))
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.lock().journal.clone()
    }

    /// Number of calls matching a predicate
    pub fn count(&self, predicate: impl Fn(&PlatformCall) -> bool) -> usize {
        self.lock().journal.iter().filter(|c| predicate(c)).count()
    }

    pub fn starts(&self) -> usize {
        self.count(|c| matches!(c, PlatformCall::Start(_)))
    }

    pub fn stops(&self) -> usize {
        self.count(|c| matches!(c, PlatformCall::Stop(_)))
    }

    pub fn clears(&self) -> usize {
        self.count(|c| matches!(c, PlatformCall::Clear(_)))
    }

    /// Engines currently running (started and not yet stopped)
    pub fn running(&self) -> usize {
        self.lock().running()
    }

    /// Highest number of engines ever running at the same time
    pub fn max_running(&self) -> usize {
        self.lock().max_running
    }

    /// Device bound by the most recent engine, if any
    pub fn current_device(&self) -> Option<String> {
        self.lock()
            .engines
            .values()
            .next_back()
            .map(|e| e.device_id.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn resolve_device(script: &Script, request: &DeviceRequest) -> BackendResult<String> {
        let devices = script
            .devices
            .as_ref()
            .ok_or_else(|| BackendError::PermissionDenied("camera access denied".to_string()))?;

        match request {
            DeviceRequest::Exact(id) => devices
                .iter()
                .find(|d| &d.id == id)
                .map(|d| d.id.clone())
                .ok_or_else(|| BackendError::DeviceNotFound(id.clone())),
            DeviceRequest::Facing(facing) => DeviceSelector::new(*facing)
                .find_facing(devices)
                .map(|d| d.id.clone())
                .ok_or_else(|| BackendError::OverConstrained(format!("facingMode={}", facing))),
        }
    }
}

impl DecodePlatform for ScriptedPlatform {
    fn enumerate_devices(&self) -> BoxFuture<'_, BackendResult<Vec<CaptureDevice>>> {
        let result = {
            let mut script = self.lock();
            script.journal.push(PlatformCall::Enumerate);
            script
                .devices
                .clone()
                .ok_or_else(|| BackendError::PermissionDenied("camera access denied".to_string()))
        };
        futures::future::ready(result).boxed()
    }

    fn start_capture(&self, request: CaptureRequest) -> BoxFuture<'_, BackendResult<CaptureHandle>> {
        async move {
            let delay = {
                let mut script = self.lock();
                script.journal.push(PlatformCall::Start(request.device.clone()));
                script.start_delay
            };

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let mut script = self.lock();
            if let Some(error) = script.start_failures.pop_front() {
                debug!(%error, "Scripted start failure");
                return Err(error);
            }

            let device_id = match Self::resolve_device(&script, &request.device) {
                Ok(id) => id,
                Err(error) => return Err(error),
            };
            script.next_id += 1;
            let id = script.next_id;
            script.engines.insert(
                id,
                ScriptedEngine {
                    state: EngineState::Scanning,
                    device_id: device_id.clone(),
                    render_target: request.render_target.clone(),
                    events: request.events,
                },
            );
            let running = script.running();
            script.max_running = script.max_running.max(running);

            Ok(CaptureHandle {
                id,
                device_id,
                render_target: request.render_target,
            })
        }
        .boxed()
    }

    fn stop_capture<'a>(&'a self, handle: &'a CaptureHandle) -> BoxFuture<'a, BackendResult<()>> {
        async move {
            let delay = {
                let mut script = self.lock();
                script.journal.push(PlatformCall::Stop(handle.id));
                script.stop_delay
            };

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let mut script = self.lock();
            if let Some(error) = script.stop_failure.clone() {
                return Err(error);
            }
            match script.engines.get_mut(&handle.id) {
                Some(engine) if engine.state.needs_stop() => {
                    engine.state = EngineState::Stopped;
                    Ok(())
                }
                _ => Err(BackendError::StopFailed(format!(
                    "engine {} is not running",
                    handle.id
                ))),
            }
        }
        .boxed()
    }

    fn clear_capture<'a>(&'a self, handle: &'a CaptureHandle) -> BoxFuture<'a, BackendResult<()>> {
        let result = {
            let mut script = self.lock();
            script.journal.push(PlatformCall::Clear(handle.id));
            if let Some(error) = script.clear_failure.clone() {
                Err(error)
            } else {
                match script.engines.get(&handle.id).map(|e| e.state) {
                    Some(EngineState::Scanning | EngineState::Paused) => Err(BackendError::StopFailed(
                        format!("engine {} cleared while running", handle.id),
                    )),
                    Some(_) => {
                        script.engines.remove(&handle.id);
                        Ok(())
                    }
                    None => Err(BackendError::StopFailed(format!(
                        "engine {} already cleared",
                        handle.id
                    ))),
                }
            }
        };
        futures::future::ready(result).boxed()
    }

    fn query_state(&self, handle: &CaptureHandle) -> EngineState {
        self.lock()
            .engines
            .get(&handle.id)
            .map(|e| e.state)
            .unwrap_or_default()
    }

    fn release_render_target(&self, render_target: &str) -> usize {
        let mut script = self.lock();
        script
            .journal
            .push(PlatformCall::ReleaseRenderTarget(render_target.to_string()));
        let before = script.engines.len();
        script.engines.retain(|_, e| e.render_target != render_target);
        before - script.engines.len()
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionToken;
    use tokio::sync::mpsc;

    fn request(device: DeviceRequest) -> CaptureRequest {
        let (tx, _rx) = mpsc::unbounded_channel();
        CaptureRequest {
            device,
            config: ScanConfig::default(),
            render_target: "reader".to_string(),
            events: EngineEventSender::new(SessionToken::new(), tx),
        }
    }

    #[tokio::test]
    async fn test_facing_request_over_constrained_without_front_label() {
        let platform = ScriptedPlatform::new(vec![CaptureDevice::new("1", "Integrated Camera")]);
        let result = platform
            .start_capture(request(DeviceRequest::Facing(Facing::User)))
            .await;
        assert!(matches!(result, Err(BackendError::OverConstrained(_))));
    }

    #[tokio::test]
    async fn test_stop_then_clear_removes_engine() {
        let platform = ScriptedPlatform::new(vec![CaptureDevice::new("1", "Integrated Camera")]);
        let handle = platform
            .start_capture(request(DeviceRequest::Exact("1".into())))
            .await
            .unwrap();

        assert_eq!(platform.query_state(&handle), EngineState::Scanning);
        platform.stop_capture(&handle).await.unwrap();
        assert_eq!(platform.query_state(&handle), EngineState::Stopped);
        platform.clear_capture(&handle).await.unwrap();
        assert_eq!(platform.query_state(&handle), EngineState::NotStarted);
        assert_eq!(platform.running(), 0);
    }

    #[tokio::test]
    async fn test_clear_while_running_is_an_error() {
        let platform = ScriptedPlatform::new(vec![CaptureDevice::new("1", "Cam")]);
        let handle = platform
            .start_capture(request(DeviceRequest::Exact("1".into())))
            .await
            .unwrap();
        assert!(platform.clear_capture(&handle).await.is_err());
    }

    #[tokio::test]
    async fn test_release_render_target_counts_residual() {
        let platform = ScriptedPlatform::new(vec![CaptureDevice::new("1", "Cam")]);
        platform
            .start_capture(request(DeviceRequest::Exact("1".into())))
            .await
            .unwrap();
        assert_eq!(platform.release_render_target("other"), 0);
        assert_eq!(platform.release_render_target("reader"), 1);
        assert_eq!(platform.running(), 0);
    }
}
