//! Client session domain types.
//!
//! A *client session* is the server-side lifetime of one accepted TCP
//! connection.  It moves through exactly two states:
//!
//! ```text
//! accept ──► Reading ──► Closing (terminal)
//!              │  ▲
//!              └──┘ bytes received
//! ```
//!
//! [`CloseReason`] records which path led to `Closing`.  Whatever the path,
//! the server runs the same cleanup exactly once.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::SystemTime;

use serde::Serialize;
use uuid::Uuid;

/// Unique identifier for one client session.
///
/// Every accepted connection receives a fresh random UUID v4, so a device
/// that reconnects gets a brand-new identity unrelated to its previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a new random session identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Bookkeeping record held by the client registry.
///
/// This is deliberately *not* the connection itself: the registry can list
/// who is connected but can never read from or close a stream it does not
/// own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub peer_addr: SocketAddr,
    pub connected_at: SystemTime,
}

impl SessionInfo {
    /// Creates a record for a connection accepted just now.
    pub fn new(peer_addr: SocketAddr) -> Self {
        Self {
            id: SessionId::new(),
            peer_addr,
            connected_at: SystemTime::now(),
        }
    }
}

/// Lifecycle state of a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered and waiting for bytes from the peer.
    Reading,
    /// Terminal: deregistered and connection closed.
    Closing,
}

/// Why a session left the `Reading` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer performed an orderly shutdown (a read returned zero bytes).
    PeerClosed,
    /// The transport reported an error (reset, aborted, ...).
    TransportError(io::ErrorKind),
    /// The peer sent bytes that are not valid UTF-8.
    InvalidText,
    /// No bytes arrived within the configured idle timeout.
    IdleTimeout,
    /// The server is shutting down.
    Shutdown,
}

impl CloseReason {
    /// Returns `true` for the paths that represent a failure rather than an
    /// orderly end of the session.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            CloseReason::TransportError(_) | CloseReason::InvalidText | CloseReason::IdleTimeout
        )
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => f.write_str("peer closed the connection"),
            CloseReason::TransportError(kind) => write!(f, "transport error: {kind}"),
            CloseReason::InvalidText => f.write_str("peer sent invalid UTF-8"),
            CloseReason::IdleTimeout => f.write_str("idle timeout"),
            CloseReason::Shutdown => f.write_str("server shutdown"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        // Arrange / Act
        let a = SessionId::new();
        let b = SessionId::new();

        // Assert
        assert_ne!(a, b);
    }

    #[test]
    fn test_session_id_display_is_uuid() {
        let id = SessionId::new();
        assert_eq!(id.to_string(), id.as_uuid().to_string());
    }

    #[test]
    fn test_session_info_new_records_peer() {
        let peer: SocketAddr = "192.168.4.23:51234".parse().unwrap();
        let info = SessionInfo::new(peer);
        assert_eq!(info.peer_addr, peer);
        assert!(info.connected_at <= SystemTime::now());
    }

    #[test]
    fn test_orderly_reasons_are_not_errors() {
        assert!(!CloseReason::PeerClosed.is_error());
        assert!(!CloseReason::Shutdown.is_error());
    }

    #[test]
    fn test_failure_reasons_are_errors() {
        assert!(CloseReason::TransportError(io::ErrorKind::ConnectionReset).is_error());
        assert!(CloseReason::InvalidText.is_error());
        assert!(CloseReason::IdleTimeout.is_error());
    }

    #[test]
    fn test_close_reason_display_mentions_error_kind() {
        let reason = CloseReason::TransportError(io::ErrorKind::ConnectionReset);
        assert!(reason.to_string().contains("reset"), "got {reason}");
    }
}
