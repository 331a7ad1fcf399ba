//! Domain entities for the swarm server.
//!
//! Pure types with no socket or runtime dependencies.  The server's
//! infrastructure layer creates and consumes them; tests can build them
//! directly.

/// Session identity, registry records, and close reasons.
pub mod session;
