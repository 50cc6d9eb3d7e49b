// SPDX-License-Identifier: GPL-3.0-only

//! Session state machine
//!
//! [`SessionState`] is the single source of truth for whether camera hardware
//! is held. Every change goes through [`SessionState::apply`], which rejects
//! edges the controller must never take.
//!
//! ```text
//!            Start               Started
//!   Idle ──────────► Initializing ───────► Scanning
//!    ▲  ▲                 │                   │
//!    │  │     StartFailed │              Stop │
//!    │  │                 ▼                   ▼
//!    │  └──── Stop ──── Error             Stopping
//!    │         Start ◄──┘                     │
//!    └────────────────── Stopped ─────────────┘
//! ```

use serde::Serialize;

/// Lifecycle state of a scan session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum SessionState {
    /// No hardware held
    #[default]
    Idle,
    /// Device acquisition and engine start in flight
    Initializing,
    /// Engine running, decode events flowing
    Scanning,
    /// Engine stop/clear in flight
    Stopping,
    /// Last start attempt failed; no hardware held
    Error(String),
}

/// Requested edge of the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// `start()` accepted
    Start,
    /// Device acquired and engine running
    Started,
    /// Acquisition failed after any fallback
    StartFailed(String),
    /// `stop()` accepted
    Stop,
    /// Stop path finished (successfully or not)
    Stopped,
}

/// A transition the current state does not allow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: SessionState,
    pub transition: Transition,
}

impl std::fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot apply {:?} in state {}", self.transition, self.from)
    }
}

impl std::error::Error for IllegalTransition {}

impl SessionState {
    /// Compute the next state, or reject the edge
    pub fn apply(&self, transition: Transition) -> Result<SessionState, IllegalTransition> {
        use SessionState as S;
        use Transition as T;

        let next = match (self, &transition) {
            (S::Idle | S::Error(_), T::Start) => S::Initializing,
            (S::Initializing, T::Started) => S::Scanning,
            (S::Initializing, T::StartFailed(msg)) => S::Error(msg.clone()),
            (S::Scanning, T::Stop) => S::Stopping,
            // Error holds no hardware, so stopping from it is immediate
            (S::Error(_), T::Stop) => S::Idle,
            (S::Stopping, T::Stopped) => S::Idle,
            _ => {
                return Err(IllegalTransition {
                    from: self.clone(),
                    transition,
                });
            }
        };
        Ok(next)
    }

    /// Whether a start or stop is currently in flight
    pub fn is_busy(&self) -> bool {
        matches!(self, SessionState::Initializing | SessionState::Stopping)
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self, SessionState::Scanning)
    }

    /// Whether this state may hold camera hardware
    pub fn holds_hardware(&self) -> bool {
        matches!(
            self,
            SessionState::Initializing | SessionState::Scanning | SessionState::Stopping
        )
    }

    /// Short lowercase name used in status output
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Initializing => "initializing",
            SessionState::Scanning => "scanning",
            SessionState::Stopping => "stopping",
            SessionState::Error(_) => "error",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Error(msg) => write!(f, "error: {}", msg),
            other => write!(f, "{}", other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let state = SessionState::Idle;
        let state = state.apply(Transition::Start).unwrap();
        assert_eq!(state, SessionState::Initializing);
        let state = state.apply(Transition::Started).unwrap();
        assert_eq!(state, SessionState::Scanning);
        let state = state.apply(Transition::Stop).unwrap();
        assert_eq!(state, SessionState::Stopping);
        let state = state.apply(Transition::Stopped).unwrap();
        assert_eq!(state, SessionState::Idle);
    }

    #[test]
    fn test_start_rejected_while_busy_or_scanning() {
        for state in [
            SessionState::Initializing,
            SessionState::Scanning,
            SessionState::Stopping,
        ] {
            assert!(state.apply(Transition::Start).is_err(), "{state}");
        }
    }

    #[test]
    fn test_stop_rejected_unless_scanning_or_error() {
        for state in [
            SessionState::Idle,
            SessionState::Initializing,
            SessionState::Stopping,
        ] {
            assert!(state.apply(Transition::Stop).is_err(), "{state}");
        }
    }

    #[test]
    fn test_busy_and_hardware_predicates() {
        assert!(SessionState::Initializing.is_busy());
        assert!(SessionState::Stopping.is_busy());
        assert!(!SessionState::Scanning.is_busy());

        assert!(SessionState::Scanning.holds_hardware());
        assert!(!SessionState::Idle.holds_hardware());
        assert!(!SessionState::Error("denied".into()).holds_hardware());
    }

    #[test]
    fn test_error_recovers() {
        let state = SessionState::Initializing
            .apply(Transition::StartFailed("no camera".into()))
            .unwrap();
        assert_eq!(state, SessionState::Error("no camera".into()));
        assert_eq!(
            state.apply(Transition::Start).unwrap(),
            SessionState::Initializing
        );
        assert_eq!(state.apply(Transition::Stop).unwrap(), SessionState::Idle);
    }

    #[test]
    fn test_completion_edges_require_matching_phase() {
        assert!(SessionState::Idle.apply(Transition::Started).is_err());
        assert!(SessionState::Scanning.apply(Transition::Stopped).is_err());
        assert!(
            SessionState::Stopping
                .apply(Transition::StartFailed("x".into()))
                .is_err()
        );
    }

    #[test]
    fn test_serializes_with_message() {
        let json = serde_json::to_string(&SessionState::Error("denied".into())).unwrap();
        assert_eq!(json, r#"{"state":"error","message":"denied"}"#);
        let json = serde_json::to_string(&SessionState::Scanning).unwrap();
        assert_eq!(json, r#"{"state":"scanning"}"#);
    }
}
