// SPDX-License-Identifier: GPL-3.0-only

//! Attendee check-in on top of a scan session
//!
//! A badge QR code carries a short numeric code somewhere in its payload.
//! [`CheckInHandler`] rejects payloads without one so the session keeps
//! scanning; [`CheckInSession`] hands accepted codes to a [`Verifier`] and
//! resumes scanning when the verifier turns them down.

use crate::backends::camera::DecodeResult;
use crate::constants::CHECKIN_CODE_LEN;
use crate::errors::ConfigError;
use crate::session::{
    CameraSessionController, DecodeHandler, DecodeVerdict, DeviceChoice, DropReason,
    RequestOutcome, SessionEvent, SessionEvents, SessionState,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Pull a `len`-digit code out of decoded text
///
/// A digit run of exactly `len` standing on its own (not glued to letters or
/// other digits) wins. Failing that, the first `len` digits of any longer run
/// or of a run embedded in a word are used. A payload that is nothing but the
/// code is a standalone run, so it is covered by the first pass.
pub fn extract_code(text: &str, len: usize) -> Option<String> {
    if len == 0 {
        return None;
    }

    let chars: Vec<char> = text.chars().collect();
    let is_word = |i: usize| chars.get(i).is_some_and(|c| c.is_alphanumeric() || *c == '_');

    let mut runs = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            runs.push((start, i));
        } else {
            i += 1;
        }
    }

    let collect = |start: usize| chars[start..start + len].iter().collect::<String>();

    let bounded = runs.iter().find(|(start, end)| {
        end - start == len && (*start == 0 || !is_word(start - 1)) && !is_word(*end)
    });
    if let Some((start, _)) = bounded {
        return Some(collect(*start));
    }

    runs.iter()
        .find(|(start, end)| end - start >= len)
        .map(|(start, _)| collect(*start))
}

/// Decode handler accepting only payloads that carry a check-in code
#[derive(Debug, Clone, Copy)]
pub struct CheckInHandler {
    code_len: usize,
}

impl Default for CheckInHandler {
    fn default() -> Self {
        Self::new(CHECKIN_CODE_LEN)
    }
}

impl CheckInHandler {
    pub fn new(code_len: usize) -> Self {
        Self { code_len }
    }
}

impl DecodeHandler for CheckInHandler {
    fn on_decode(&self, result: &DecodeResult) -> DecodeVerdict {
        match extract_code(&result.text, self.code_len) {
            Some(code) => {
                debug!(%code, "Found check-in code");
                DecodeVerdict::Accept
            }
            None => DecodeVerdict::Reject(format!("no {}-digit code in payload", self.code_len)),
        }
    }
}

/// Answer from a verifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Code is valid; `id` identifies the attendee
    Accepted { id: String },
    Rejected { reason: String },
}

/// Checks a code against whatever holds the registrations
pub trait Verifier: Send + Sync {
    fn verify<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Verification>;
}

/// Verifier backed by a code-to-attendee map
///
/// Each code checks in once.
#[derive(Debug, Default)]
pub struct AllowListVerifier {
    entries: HashMap<String, String>,
    used: Mutex<HashSet<String>>,
}

impl AllowListVerifier {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self {
            entries,
            used: Mutex::new(HashSet::new()),
        }
    }

    /// Load a JSON object mapping codes to attendee ids, e.g. `{"1234": "attendee-7"}`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let entries: HashMap<String, String> = serde_json::from_str(&data)?;
        info!(path = %path.display(), count = entries.len(), "Loaded check-in allow-list");
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Verifier for AllowListVerifier {
    fn verify<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Verification> {
        let verdict = match self.entries.get(code) {
            None => Verification::Rejected {
                reason: format!("code {} is not registered", code),
            },
            Some(id) => {
                let mut used = self.used.lock().unwrap_or_else(|e| e.into_inner());
                if used.insert(code.to_string()) {
                    Verification::Accepted { id: id.clone() }
                } else {
                    Verification::Rejected {
                        reason: format!("code {} already checked in", code),
                    }
                }
            }
        };
        futures::future::ready(verdict).boxed()
    }
}

/// Successful check-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckIn {
    pub code: String,
    pub id: String,
    /// Codes sent to the verifier, including this one
    pub attempts: u32,
}

/// Why a check-in run ended without a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInError {
    /// The session failed; carries the observer message
    Scan(String),
    /// The controller ignored a start request
    Dropped(DropReason),
    /// The controller went away (disposed or dropped)
    Closed,
}

impl std::fmt::Display for CheckInError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckInError::Scan(msg) => write!(f, "Scan failed: {}", msg),
            CheckInError::Dropped(reason) => write!(f, "Scan request dropped: {:?}", reason),
            CheckInError::Closed => write!(f, "Scan session closed"),
        }
    }
}

impl std::error::Error for CheckInError {}

/// Scan-verify-resume loop for one attendee
pub struct CheckInSession {
    controller: CameraSessionController,
    verifier: Arc<dyn Verifier>,
    code_len: usize,
    device: Mutex<Option<String>>,
}

impl CheckInSession {
    /// The controller should be built with a [`CheckInHandler`] of the same code length
    pub fn new(controller: CameraSessionController, verifier: Arc<dyn Verifier>, code_len: usize) -> Self {
        Self {
            controller,
            verifier,
            code_len,
            device: Mutex::new(None),
        }
    }

    /// Device the most recent scan ran on
    ///
    /// Taken from the session events, so it is still known after the
    /// controller has been disposed.
    pub fn device(&self) -> Option<String> {
        self.device.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Scan until a code is verified
    ///
    /// Rejected codes resume scanning on the same device. Returns when a code
    /// is accepted, the session errors, or the controller is disposed.
    pub async fn run(&self, choice: DeviceChoice) -> Result<CheckIn, CheckInError> {
        let mut events = self.controller.subscribe();
        self.begin(choice).await?;

        let mut attempts = 0u32;
        loop {
            let Some(event) = events.recv().await else {
                return Err(CheckInError::Closed);
            };

            match event {
                SessionEvent::Started { device } => {
                    *self.device.lock().unwrap_or_else(|e| e.into_inner()) = Some(device);
                }
                SessionEvent::Decoded(result) => {
                    let Some(code) = extract_code(&result.text, self.code_len) else {
                        debug!(text = %result.text, "Accepted payload without a code, ignoring");
                        continue;
                    };

                    attempts += 1;
                    match self.verifier.verify(&code).await {
                        Verification::Accepted { id } => {
                            info!(%code, %id, attempts, "Check-in accepted");
                            if self.controller.state().is_scanning() {
                                self.controller.stop().await;
                            }
                            return Ok(CheckIn { code, id, attempts });
                        }
                        Verification::Rejected { reason } => {
                            warn!(%code, %reason, "Check-in rejected, resuming scan");
                            self.resume(&mut events).await?;
                        }
                    }
                }
                SessionEvent::Rejected { text, reason } => {
                    debug!(%text, %reason, "Payload rejected by check-in handler");
                }
                SessionEvent::Status {
                    state: SessionState::Error(message),
                    ..
                } => return Err(CheckInError::Scan(message)),
                SessionEvent::Status {
                    state: SessionState::Idle,
                    ..
                } if self.controller.is_disposed() => return Err(CheckInError::Closed),
                SessionEvent::Status { .. } => {}
            }
        }
    }

    async fn begin(&self, choice: DeviceChoice) -> Result<(), CheckInError> {
        match self.controller.start(choice).await {
            RequestOutcome::Applied(SessionState::Error(message)) => Err(CheckInError::Scan(message)),
            RequestOutcome::Applied(_) => Ok(()),
            RequestOutcome::Dropped(DropReason::AlreadyScanning) => Ok(()),
            RequestOutcome::Dropped(reason) => Err(CheckInError::Dropped(reason)),
        }
    }

    /// Get back to scanning after a rejected code
    ///
    /// In keep-scanning mode the session is still live and nothing needs to
    /// happen. Otherwise the accepted decode is stopping it; wait until it
    /// is idle, then start again on the device it was using.
    async fn resume(&self, events: &mut SessionEvents) -> Result<(), CheckInError> {
        let stops_on_decode = self.controller.config().stop_after_first_result;
        loop {
            match self.controller.state() {
                SessionState::Scanning if !stops_on_decode => return Ok(()),
                SessionState::Idle | SessionState::Error(_) => break,
                _ => {
                    if events.recv().await.is_none() {
                        return Err(CheckInError::Closed);
                    }
                }
            }
        }

        if self.controller.is_disposed() {
            return Err(CheckInError::Closed);
        }

        let choice = match self.controller.last_device() {
            Some(id) => DeviceChoice::Exact(id),
            None => DeviceChoice::Auto,
        };
        self.begin(choice).await
    }
}

impl std::fmt::Debug for CheckInSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckInSession")
            .field("controller", &self.controller)
            .field("code_len", &self.code_len)
            .finish()
    }
}
