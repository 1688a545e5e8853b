// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Cooperative stop signalling.
//!
//! A [`StopToken`] is checked *before* each retry attempt and awaited
//! *during* each retry delay, so a client that is shutting down neither
//! starts new protocol calls nor sleeps out its remaining backoff.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

// =============================================================================
// StopToken
// =============================================================================

/// A cloneable token that turns permanently "stopped" once signalled.
///
/// Cheap to clone; all clones observe the same state.
#[derive(Clone, Default)]
pub struct StopToken {
    inner: Arc<StopInner>,
}

#[derive(Default)]
struct StopInner {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopToken {
    /// Creates a fresh, un-stopped token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals stop. Idempotent; wakes every pending [`StopToken::stopped`]
    /// waiter.
    pub fn stop(&self) {
        if self
            .inner
            .stopped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns `true` once [`StopToken::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Resolves when the token is stopped. Resolves immediately if it
    /// already is.
    pub async fn stopped(&self) {
        // Register the waiter before re-checking the flag so a concurrent
        // stop() cannot slip between the check and the await.
        let notified = self.inner.notify.notified();
        if self.is_stopped() {
            return;
        }
        notified.await;
    }
}

impl std::fmt::Debug for StopToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopToken")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
