//! Application layer for the swarm server.
//!
//! Shared state and seams that the network tasks are built around.  Nothing
//! in here opens a socket, which keeps every piece unit-testable.
//!
//! # Sub-modules
//!
//! - **`client_registry`** – The mutex-guarded set of live client sessions,
//!   with an RAII [`Registration`](client_registry::Registration) guard that
//!   guarantees exactly-once removal.
//!
//! - **`observer`** – The [`SessionObserver`](observer::SessionObserver)
//!   trait sessions report to, and its `tracing`-backed implementation.
//!
//! - **`shutdown`** – The cooperative [`ShutdownSignal`](shutdown::ShutdownSignal)
//!   every loop selects on.

pub mod client_registry;
pub mod observer;
pub mod shutdown;
