//! swarm-server library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.

pub mod application;
pub mod infrastructure;

pub use application::client_registry::{ClientRegistry, Registration, RegistryError};
pub use application::observer::{SessionObserver, TracingObserver};
pub use application::shutdown::ShutdownSignal;
pub use infrastructure::server::{ServerError, SwarmConfig, SwarmServer};
