//! Network infrastructure for the swarm server.
//!
//! # Sub-modules
//!
//! - **`announcer`** – Broadcasts `SERVER_IP_DISCOVERY:<tcp_port>` over UDP
//!   at a fixed interval so clients can find the server without manual IP
//!   configuration.
//!
//! - **`acceptor`** – Owns the TCP listener.  Accepts connections, registers
//!   them, and spawns one session task per connection.
//!
//! - **`session`** – The per-connection state machine: read chunks, decode
//!   text, report to the observer, and clean up exactly once on close.

pub mod acceptor;
pub mod announcer;
pub mod session;
