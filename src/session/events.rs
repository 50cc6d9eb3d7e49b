// SPDX-License-Identifier: GPL-3.0-only

//! Collaborator-facing events and decode handling

use super::state::SessionState;
use crate::backends::camera::DecodeResult;
use futures::Stream;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::trace;

/// Notification delivered to observers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Lifecycle status changed, with an optional error message
    Status {
        #[serde(flatten)]
        state: SessionState,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A session acquired this device; sent just before the `Scanning` status
    Started { device: String },
    /// A decode was accepted by the decode handler
    Decoded(DecodeResult),
    /// A decode was rejected by the decode handler; scanning continues
    Rejected { text: String, reason: String },
}

/// Outcome of handing a decode to the collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeVerdict {
    /// Payload accepted; the session may stop
    Accept,
    /// Payload invalid; keep scanning
    Reject(String),
}

/// Collaborator callback invoked exactly once per decoded payload
pub trait DecodeHandler: Send + Sync {
    fn on_decode(&self, result: &DecodeResult) -> DecodeVerdict;
}

impl<F> DecodeHandler for F
where
    F: Fn(&DecodeResult) -> DecodeVerdict + Send + Sync,
{
    fn on_decode(&self, result: &DecodeResult) -> DecodeVerdict {
        self(result)
    }
}

/// Decode handler that accepts every payload
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl DecodeHandler for AcceptAll {
    fn on_decode(&self, _result: &DecodeResult) -> DecodeVerdict {
        DecodeVerdict::Accept
    }
}

/// Receiving end of an observer registration
pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;

/// Registered observers
///
/// Observers whose receiver has been dropped are pruned on the next publish.
#[derive(Debug, Clone, Default)]
pub struct Observers {
    senders: Arc<Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>>,
}

impl Observers {
    pub fn subscribe(&self) -> SessionEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: SessionEvent) {
        trace!(?event, "Publishing session event");
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn status(&self, state: SessionState, error: Option<String>) {
        self.publish(SessionEvent::Status { state, error });
    }

    /// Drop every registration; receivers see the end of their stream
    pub fn close(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<SessionEvent>>> {
        self.senders.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Adapt an observer registration into a `Stream`
pub fn event_stream(mut events: SessionEvents) -> impl Stream<Item = SessionEvent> {
    async_stream::stream! {
        while let Some(event) = events.recv().await {
            yield event;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_is_decode_handler() {
        let handler = |r: &DecodeResult| {
            if r.text.is_empty() {
                DecodeVerdict::Reject("empty".into())
            } else {
                DecodeVerdict::Accept
            }
        };
        assert_eq!(handler.on_decode(&DecodeResult::new("x")), DecodeVerdict::Accept);
        assert!(matches!(
            handler.on_decode(&DecodeResult::new("")),
            DecodeVerdict::Reject(_)
        ));
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        use futures::StreamExt;

        let observers = Observers::default();
        let stream = event_stream(observers.subscribe());
        observers.status(SessionState::Idle, None);
        observers.close();

        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_dropped_observers_are_pruned() {
        let observers = Observers::default();
        let mut kept = observers.subscribe();
        let dropped = observers.subscribe();
        drop(dropped);

        observers.status(SessionState::Scanning, None);

        assert_eq!(observers.lock().len(), 1);
        assert_eq!(
            kept.try_recv().unwrap(),
            SessionEvent::Status {
                state: SessionState::Scanning,
                error: None
            }
        );
    }

    #[test]
    fn test_status_event_json() {
        let event = SessionEvent::Status {
            state: SessionState::Error("busy".into()),
            error: Some("busy".into()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "status");
        assert_eq!(json["state"], "error");
        assert_eq!(json["message"], "busy");
        assert_eq!(json["error"], "busy");
    }

    #[test]
    fn test_started_event_json() {
        let event = SessionEvent::Started {
            device: "/dev/video2".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "started");
        assert_eq!(json["device"], "/dev/video2");
    }

    #[tokio::test]
    async fn test_event_stream_ends_with_channel() {
        use futures::StreamExt;

        let observers = Observers::default();
        let stream = event_stream(observers.subscribe());
        observers.status(SessionState::Idle, None);
        drop(observers);

        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 1);
    }
}
