//! SessionObserver: where session lifecycle events and client text go.
//!
//! Client sessions never print directly.  They report to a
//! [`SessionObserver`] injected at construction time.  Production uses
//! [`TracingObserver`], which turns every event into a structured `tracing`
//! record; tests inject recording or mock observers to assert exactly what
//! each session reported.

use swarm_core::{CloseReason, SessionInfo};
use tracing::{info, warn};

/// Receives the events of every client session.
///
/// Called concurrently from many session tasks; implementations must be
/// cheap and must not block.
#[cfg_attr(test, mockall::automock)]
pub trait SessionObserver: Send + Sync {
    /// A connection was accepted and registered.
    fn on_connected(&self, session: &SessionInfo);

    /// A chunk of text arrived from the client.
    fn on_message(&self, session: &SessionInfo, text: &str);

    /// The session reached its terminal state and has been deregistered.
    fn on_closed(&self, session: &SessionInfo, reason: CloseReason);
}

/// Observer that emits every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_connected(&self, session: &SessionInfo) {
        info!(
            session = %session.id,
            peer = %session.peer_addr,
            "new connection"
        );
    }

    fn on_message(&self, session: &SessionInfo, text: &str) {
        info!(
            session = %session.id,
            peer = %session.peer_addr,
            "[{}] says: {text}",
            session.peer_addr
        );
    }

    fn on_closed(&self, session: &SessionInfo, reason: CloseReason) {
        if reason.is_error() {
            warn!(
                session = %session.id,
                peer = %session.peer_addr,
                %reason,
                "connection issue; disconnected"
            );
        } else {
            info!(
                session = %session.id,
                peer = %session.peer_addr,
                %reason,
                "disconnected"
            );
        }
    }
}
