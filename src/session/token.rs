// SPDX-License-Identifier: GPL-3.0-only

//! Cancellation token tied to one active session

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use uuid::Uuid;

/// Identifies one active session and signals its cancellation
///
/// Cloned into the engine's event sender and the event pump. Once cancelled,
/// engine events carrying this token are dropped, so callbacks registered
/// for a released session can never reach the collaborator.
#[derive(Debug, Clone)]
pub struct SessionToken {
    id: Uuid,
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl SessionToken {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once `cancel` has been called on any clone
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent cancel cannot be missed
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for SessionToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SessionToken {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_cancellation() {
        let token = SessionToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token, clone);
    }

    #[test]
    fn test_tokens_are_distinct() {
        assert_ne!(SessionToken::new(), SessionToken::new());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = SessionToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::task::yield_now().await;
        token.cancel();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let token = SessionToken::new();
        token.cancel();
        token.cancelled().await;
    }
}
