//! # swarm-core
//!
//! Shared library for the Hollister swarm server containing the discovery
//! announcement format, the inbound text decoder, and the session domain
//! types.
//!
//! This crate has zero dependencies on sockets, async runtimes, or logging
//! backends, so both the server and any client-side tooling can use it.
//!
//! # Architecture overview (for beginners)
//!
//! The swarm server is a rendezvous point for many small embedded devices
//! (Raspberry Pi Pico boards) on one local network.  It does two things:
//!
//! 1. It shouts "I am here, connect to TCP port N" as a UDP broadcast every
//!    few seconds, so devices never need a hard-coded server address.
//! 2. It accepts a long-lived TCP connection from every device and logs the
//!    text each device sends.
//!
//! This crate (`swarm-core`) defines what travels over the wire and how the
//! server names the things it tracks:
//!
//! - **`protocol`** – The `SERVER_IP_DISCOVERY:<port>` announcement and the
//!   UTF-8 decoder for the raw byte chunks read from each device.
//!
//! - **`domain`** – Session identity, the bookkeeping record the client
//!   registry stores, and the reasons a session can close.

pub mod domain;
pub mod protocol;

pub use domain::session::{CloseReason, SessionId, SessionInfo, SessionState};
pub use protocol::announcement::{Announcement, AnnouncementError, DISCOVERY_MARKER};
pub use protocol::text::{TextDecodeError, TextDecoder};
pub use protocol::{
    DEFAULT_BROADCAST_INTERVAL, DEFAULT_TCP_PORT, DEFAULT_UDP_PORT, READ_BUFFER_SIZE,
};
