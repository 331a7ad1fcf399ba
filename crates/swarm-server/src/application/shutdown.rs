//! Cooperative shutdown signal shared by every long-running loop.
//!
//! The announcer, the acceptor, and each client session wait on exactly one
//! thing at a time (the interval timer, `accept`, `read`).  Each of them
//! races that wait against [`ShutdownSignal::cancelled`] in a
//! `tokio::select!`, so triggering the signal wakes them at their suspension
//! point without killing the process.
//!
//! Built on a [`tokio::sync::watch`] channel holding a single `bool`.
//! Clones share the same channel; triggering is idempotent.

use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable handle to a one-way "stop now" flag.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Requests shutdown.  Calling it again has no further effect.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`trigger`](Self::trigger) has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // `self` keeps the sender alive, so this only returns once triggered.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
