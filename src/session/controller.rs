// SPDX-License-Identifier: GPL-3.0-only

//! Camera session controller
//!
//! Owns the single decode engine bound to one render target and mediates
//! every transition between idle, initializing, scanning, stopping and error,
//! whichever trigger asks for it: UI actions, visibility changes, decode
//! results or a timed restart.
//!
//! Requests that arrive while a start or stop is in flight are dropped, not
//! queued. The outcome tells the caller so it can re-issue the request later.
//! No public operation returns an error; failures become a state plus a
//! message delivered to observers.

use super::events::{DecodeHandler, DecodeVerdict, Observers, SessionEvent, SessionEvents};
use super::state::{IllegalTransition, SessionState, Transition};
use super::token::SessionToken;
use crate::backends::camera::{
    CaptureHandle, CaptureRequest, DecodePlatform, DeviceRequest, DeviceSelector, EngineEvent,
    EngineEventSender, Facing, ScanConfig, TaggedEvent,
};
use crate::constants::DEFAULT_RENDER_TARGET;
use crate::errors::{ScanError, ScanResult};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Which device a start request targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceChoice {
    /// Ask the platform for the preferred facing camera
    Auto,
    /// Use this device id
    Exact(String),
}

impl std::fmt::Display for DeviceChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceChoice::Auto => write!(f, "auto"),
            DeviceChoice::Exact(id) => write!(f, "{}", id),
        }
    }
}

/// External visibility signal for the scanning screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Why a request was not acted upon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// A start or stop is already in flight
    InFlight,
    /// Start requested while already scanning
    AlreadyScanning,
    /// Stop requested with nothing to stop
    NotScanning,
    /// Controller has been disposed
    Disposed,
}

/// Result of a transition request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The request ran; this is the state it settled in
    Applied(SessionState),
    /// The request was ignored
    Dropped(DropReason),
}

/// Construction options for a controller
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Render target the engine is bound to
    pub render_target: String,
    /// Capability requests and behaviour flags
    pub config: ScanConfig,
    /// Facing direction preferred for automatic starts
    pub facing: Facing,
    /// Device to resume with before any session has started
    pub last_device: Option<String>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            render_target: DEFAULT_RENDER_TARGET.to_string(),
            config: ScanConfig::default(),
            facing: Facing::User,
            last_device: None,
        }
    }
}

/// A started engine plus the receiving end of its event channel
type Acquired = (SessionToken, CaptureHandle, mpsc::UnboundedReceiver<TaggedEvent>);

/// Engine handle owned by the controller for the lifetime of one session
#[derive(Debug)]
struct ActiveSession {
    token: SessionToken,
    handle: CaptureHandle,
    started_at: Instant,
}

/// Mutable controller state, guarded by one mutex that is never held across an await
#[derive(Debug)]
struct Core {
    state: SessionState,
    active: Option<ActiveSession>,
    last_device: Option<String>,
    disposed: bool,
}

impl Core {
    fn advance(&mut self, transition: Transition) -> Result<SessionState, IllegalTransition> {
        let next = self.state.apply(transition)?;
        self.state = next.clone();
        Ok(next)
    }
}

struct Shared {
    platform: Arc<dyn DecodePlatform>,
    handler: Arc<dyn DecodeHandler>,
    selector: DeviceSelector,
    render_target: String,
    config: ScanConfig,
    observers: Observers,
    core: Mutex<Core>,
}

/// Controller for one scanning screen
///
/// Cheap to clone; all clones drive the same session. Constructed once per
/// screen and disposed with it.
#[derive(Clone)]
pub struct CameraSessionController {
    shared: Arc<Shared>,
}

impl CameraSessionController {
    /// Create a controller in the idle state
    pub fn new(
        platform: Arc<dyn DecodePlatform>,
        handler: Arc<dyn DecodeHandler>,
        options: ControllerOptions,
    ) -> Self {
        info!(
            platform = platform.name(),
            render_target = %options.render_target,
            facing = %options.facing,
            "Creating camera session controller"
        );

        let core = Core {
            state: SessionState::Idle,
            active: None,
            last_device: options.last_device,
            disposed: false,
        };

        Self {
            shared: Arc::new(Shared {
                platform,
                handler,
                selector: DeviceSelector::new(options.facing),
                render_target: options.render_target,
                config: options.config,
                observers: Observers::default(),
                core: Mutex::new(core),
            }),
        }
    }

    /// Register an observer for status and decode events
    ///
    /// After disposal the returned receiver is already closed.
    pub fn subscribe(&self) -> SessionEvents {
        if self.is_disposed() {
            let (_tx, rx) = mpsc::unbounded_channel();
            return rx;
        }
        self.shared.observers.subscribe()
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.lock().state.clone()
    }

    /// Device of the current or most recent session
    pub fn last_device(&self) -> Option<String> {
        self.lock().last_device.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    pub fn config(&self) -> &ScanConfig {
        &self.shared.config
    }

    /// Start a session
    ///
    /// Dropped while initializing, scanning or stopping, and after disposal.
    pub async fn start(&self, choice: DeviceChoice) -> RequestOutcome {
        {
            let mut core = self.lock();
            if core.disposed {
                debug!(device = %choice, "Start dropped: controller disposed");
                return RequestOutcome::Dropped(DropReason::Disposed);
            }
            if let Err(e) = core.advance(Transition::Start) {
                debug!(device = %choice, reason = %e, "Start dropped");
                let reason = if core.state.is_scanning() {
                    DropReason::AlreadyScanning
                } else {
                    DropReason::InFlight
                };
                return RequestOutcome::Dropped(reason);
            }
        }

        info!(device = %choice, "Starting scan session");
        self.shared.observers.status(SessionState::Initializing, None);

        let acquired = self.acquire(choice).await;
        self.finish_start(acquired).await
    }

    /// Stop the session and release the camera
    ///
    /// A no-op when idle; concurrent calls issue at most one stop/clear pair.
    pub async fn stop(&self) -> RequestOutcome {
        if self.is_disposed() {
            debug!("Stop dropped: controller disposed");
            return RequestOutcome::Dropped(DropReason::Disposed);
        }
        self.stop_session().await
    }

    /// Stop, wait for the hardware to settle, then start the previous device
    pub async fn restart(&self) -> RequestOutcome {
        let choice = self.resume_choice();
        info!(device = %choice, "Restarting scan session");
        self.stop_then_start(choice).await
    }

    /// Move the session to another device via stop-then-start
    pub async fn switch_device(&self, device_id: impl Into<String>) -> RequestOutcome {
        let device_id = device_id.into();
        info!(device = %device_id, "Switching capture device");
        self.stop_then_start(DeviceChoice::Exact(device_id)).await
    }

    /// Route a visibility change through the normal start/stop entry points
    pub async fn set_visibility(&self, visibility: Visibility) -> RequestOutcome {
        let state = self.state();
        debug!(?visibility, %state, "Visibility changed");

        match visibility {
            Visibility::Hidden if state.is_scanning() => self.stop().await,
            Visibility::Hidden => RequestOutcome::Dropped(DropReason::NotScanning),
            Visibility::Visible if state.is_scanning() => {
                RequestOutcome::Dropped(DropReason::AlreadyScanning)
            }
            Visibility::Visible if state.is_busy() => {
                RequestOutcome::Dropped(DropReason::InFlight)
            }
            Visibility::Visible => self.start(self.resume_choice()).await,
        }
    }

    /// Tear the controller down
    ///
    /// Forces a best-effort stop whatever the state. Terminal: every later
    /// request is dropped and observer streams end. A start still in flight
    /// releases its device as soon as it completes.
    pub async fn dispose(&self) {
        {
            let mut core = self.lock();
            if core.disposed {
                return;
            }
            core.disposed = true;
        }

        info!(render_target = %self.shared.render_target, "Disposing camera session controller");

        match self.stop_session().await {
            RequestOutcome::Applied(state) => debug!(%state, "Session released on dispose"),
            RequestOutcome::Dropped(reason) => debug!(?reason, "Nothing to release on dispose"),
        }

        self.lock().last_device = None;
        self.shared.observers.close();
    }

    // ===== Internals =====

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.shared.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn resume_choice(&self) -> DeviceChoice {
        match self.last_device() {
            Some(id) => DeviceChoice::Exact(id),
            None => DeviceChoice::Auto,
        }
    }

    async fn stop_then_start(&self, choice: DeviceChoice) -> RequestOutcome {
        let held = self.state().holds_hardware();
        match self.stop().await {
            RequestOutcome::Applied(_) if held => {
                let delay = self.shared.config.restart_delay();
                debug!(delay_ms = delay.as_millis() as u64, "Waiting for camera release to settle");
                tokio::time::sleep(delay).await;
            }
            RequestOutcome::Applied(_) | RequestOutcome::Dropped(DropReason::NotScanning) => {}
            dropped @ RequestOutcome::Dropped(_) => return dropped,
        }
        self.start(choice).await
    }

    /// Acquire a device, retrying once with an explicit device on over-constraint
    async fn acquire(&self, choice: DeviceChoice) -> ScanResult<Acquired> {
        let request = match choice {
            DeviceChoice::Auto => DeviceRequest::Facing(self.shared.selector.facing()),
            DeviceChoice::Exact(id) => DeviceRequest::Exact(id),
        };

        match self.start_engine(request.clone()).await {
            Err(err) if err.is_capability() && request.is_automatic() => {
                warn!(error = %err, "Automatic device request over-constrained, falling back to enumeration");

                let devices = self.shared.selector.enumerate(self.shared.platform.as_ref()).await?;
                let previous = self.last_device();
                let device_id = self
                    .shared
                    .selector
                    .pick_preferred(&devices, previous.as_deref())
                    .ok_or_else(|| ScanError::NoDevice("no capture devices found".to_string()))?;

                self.start_engine(DeviceRequest::Exact(device_id)).await
            }
            other => other,
        }
    }

    async fn start_engine(&self, device: DeviceRequest) -> ScanResult<Acquired> {
        let token = SessionToken::new();
        let (tx, rx) = mpsc::unbounded_channel();

        debug!(session = %token.id(), %device, "Requesting capture");

        let request = CaptureRequest {
            device,
            config: self.shared.config.clone(),
            render_target: self.shared.render_target.clone(),
            events: EngineEventSender::new(token.clone(), tx),
        };

        match self.shared.platform.start_capture(request).await {
            Ok(handle) => Ok((token, handle, rx)),
            Err(e) => {
                token.cancel();
                Err(ScanError::from_start(e))
            }
        }
    }

    async fn finish_start(&self, acquired: ScanResult<Acquired>) -> RequestOutcome {
        let (token, handle, events) = match acquired {
            Ok(started) => started,
            Err(err) => {
                let message = err.to_string();
                error!(error = %err, "Failed to start scan session");
                let state = {
                    let mut core = self.lock();
                    core.advance(Transition::StartFailed(message.clone()))
                        .unwrap_or_else(|e| {
                            error!(reason = %e, "Unexpected state after failed start");
                            core.state = SessionState::Error(message.clone());
                            core.state.clone()
                        })
                };
                self.shared.observers.status(state.clone(), Some(message));
                return RequestOutcome::Applied(state);
            }
        };

        let session_id = token.id();
        let device_id = handle.device_id.clone();

        let disposed = {
            let mut core = self.lock();
            if let Err(e) = core.advance(Transition::Started) {
                error!(reason = %e, "Unexpected state after successful start");
                core.state = SessionState::Scanning;
            }
            core.last_device = Some(device_id.clone());
            core.active = Some(ActiveSession {
                token: token.clone(),
                handle,
                started_at: Instant::now(),
            });
            core.disposed
        };

        if disposed {
            info!(session = %session_id, "Controller disposed during start, releasing device");
            let outcome = self.stop_session().await;
            self.lock().last_device = None;
            return outcome;
        }

        info!(session = %session_id, device = %device_id, "Scan session started");
        self.shared
            .observers
            .publish(SessionEvent::Started { device: device_id });
        self.shared.observers.status(SessionState::Scanning, None);

        self.spawn_event_pump(token, events);
        RequestOutcome::Applied(SessionState::Scanning)
    }

    /// Stop path shared by `stop`, `dispose` and decode-triggered stops
    async fn stop_session(&self) -> RequestOutcome {
        let session = {
            let mut core = self.lock();
            let current = core.state.clone();
            match current {
                SessionState::Idle => return RequestOutcome::Dropped(DropReason::NotScanning),
                SessionState::Initializing | SessionState::Stopping => {
                    debug!(state = %current, "Stop dropped: transition in flight");
                    return RequestOutcome::Dropped(DropReason::InFlight);
                }
                SessionState::Error(_) => {
                    let _ = core.advance(Transition::Stop);
                    drop(core);
                    self.shared.observers.status(SessionState::Idle, None);
                    return RequestOutcome::Applied(SessionState::Idle);
                }
                SessionState::Scanning => {
                    let _ = core.advance(Transition::Stop);
                    core.active.take()
                }
            }
        };

        self.shared.observers.status(SessionState::Stopping, None);

        let failure = self.release(session).await;

        {
            let mut core = self.lock();
            if let Err(e) = core.advance(Transition::Stopped) {
                error!(reason = %e, "Unexpected state after stop");
                core.state = SessionState::Idle;
            }
        }

        match failure {
            Some(err) => {
                warn!(error = %err, "Camera released with errors");
                self.shared
                    .observers
                    .status(SessionState::Idle, Some(err.to_string()));
            }
            None => {
                info!("Scan session stopped");
                self.shared.observers.status(SessionState::Idle, None);
            }
        }

        RequestOutcome::Applied(SessionState::Idle)
    }

    /// Release the engine and any residual streams on the render target
    ///
    /// Stop then clear, only when the engine reports it is running. Residual
    /// streams are released whether or not that succeeded.
    async fn release(&self, session: Option<ActiveSession>) -> Option<ScanError> {
        let platform = self.shared.platform.as_ref();
        let mut failure = None;

        if let Some(session) = session {
            session.token.cancel();
            let engine_state = platform.query_state(&session.handle);

            debug!(
                session = %session.token.id(),
                ?engine_state,
                scanned_ms = session.started_at.elapsed().as_millis() as u64,
                "Releasing capture"
            );

            if engine_state.needs_stop() {
                if let Err(e) = platform.stop_capture(&session.handle).await {
                    failure = Some(ScanError::EngineStop(e.to_string()));
                } else if let Err(e) = platform.clear_capture(&session.handle).await {
                    failure = Some(ScanError::EngineStop(e.to_string()));
                }
            } else {
                debug!(?engine_state, "Engine not running, skipping stop/clear");
            }
        }

        let residual = platform.release_render_target(&self.shared.render_target);
        if residual > 0 {
            warn!(
                residual,
                render_target = %self.shared.render_target,
                "Released residual streams bound to render target"
            );
        }

        failure
    }

    fn spawn_event_pump(&self, token: SessionToken, mut events: mpsc::UnboundedReceiver<TaggedEvent>) {
        let controller = self.clone();
        tokio::spawn(async move {
            loop {
                let tagged = tokio::select! {
                    _ = token.cancelled() => break,
                    tagged = events.recv() => match tagged {
                        Some(tagged) => tagged,
                        None => break,
                    },
                };
                controller.handle_engine_event(&token, tagged).await;
            }
            debug!(session = %token.id(), "Engine event pump finished");
        });
    }

    async fn handle_engine_event(&self, session: &SessionToken, tagged: TaggedEvent) {
        if tagged.token != *session || tagged.token.is_cancelled() {
            trace!("Dropping event from released session");
            return;
        }

        let result = match tagged.event {
            EngineEvent::FrameError(message) => {
                // Most frames contain no code; this is not a session error
                trace!(%message, "Frame decode failed");
                return;
            }
            EngineEvent::Decoded(result) => result,
        };

        {
            let core = self.lock();
            let current = core.active.as_ref().map(|a| &a.token);
            if !core.state.is_scanning() || current != Some(session) {
                debug!(text = %result.text, "Dropping decode outside active scan");
                return;
            }
        }

        match self.shared.handler.on_decode(&result) {
            DecodeVerdict::Accept => {
                info!(text = %result.text, "Decode accepted");
                self.shared.observers.publish(SessionEvent::Decoded(result));
                if self.shared.config.stop_after_first_result {
                    self.stop().await;
                }
            }
            DecodeVerdict::Reject(reason) => {
                info!(text = %result.text, %reason, "Decode rejected, resuming scan");
                let message = ScanError::InvalidDecode(reason.clone()).to_string();
                self.shared.observers.publish(SessionEvent::Rejected {
                    text: result.text,
                    reason,
                });
                self.shared
                    .observers
                    .status(SessionState::Scanning, Some(message));
            }
        }
    }
}

impl std::fmt::Debug for CameraSessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.lock();
        f.debug_struct("CameraSessionController")
            .field("platform", &self.shared.platform.name())
            .field("render_target", &self.shared.render_target)
            .field("state", &core.state)
            .field("disposed", &core.disposed)
            .finish()
    }
}
