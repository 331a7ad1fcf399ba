//! Infrastructure layer for the swarm server.
//!
//! Contains the OS-facing adapters: UDP and TCP sockets, the config file,
//! and the [`server::SwarmServer`] that composes them.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `swarm_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod server;
pub mod storage;
