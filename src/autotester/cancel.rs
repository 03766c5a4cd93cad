// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! One-shot cooperative cancellation
//!
//! A [`CancelHandle`] fires once; every clone of the matching
//! [`CancelToken`] observes it. Dropping the handle counts as firing it, so
//! a worker never outlives the owner of its handle.

use std::sync::Arc;

use tokio::sync::watch;

/// Owner side of a cancellation pair
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

/// Observer side of a cancellation pair
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: watch::Receiver<bool>,
    // Keeps the channel open for tokens that are never cancelled
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

/// Create a connected handle/token pair
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (sender, receiver) = watch::channel(false);
    (
        CancelHandle { sender },
        CancelToken {
            receiver,
            _keepalive: None,
        },
    )
}

impl CancelHandle {
    /// Fire the cancellation; idempotent
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether the cancellation already fired
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// A new token observing this handle
    pub fn token(&self) -> CancelToken {
        CancelToken {
            receiver: self.sender.subscribe(),
            _keepalive: None,
        }
    }
}

impl CancelToken {
    /// A token that is never cancelled
    pub fn never() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            receiver,
            _keepalive: Some(Arc::new(sender)),
        }
    }

    /// Whether the cancellation fired (or its handle was dropped)
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow() || self.receiver.has_changed().is_err()
    }

    /// Resolve once the cancellation fires
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // An error means the handle was dropped, which counts as cancelled
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_every_token() {
        let (handle, token) = cancel_pair();
        let other = handle.token();
        assert!(!token.is_cancelled());

        handle.cancel();
        token.cancelled().await;
        other.cancelled().await;
        assert!(token.is_cancelled());
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_handle_cancels() {
        let (handle, token) = cancel_pair();
        drop(handle);
        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_token_stays_pending() {
        let token = CancelToken::never();
        let outcome = tokio::time::timeout(Duration::from_secs(3600), token.cancelled()).await;
        assert!(outcome.is_err());
        assert!(!token.is_cancelled());
    }
}
