//! Wire-level formats shared by the server and its clients.
//!
//! # Sub-modules
//!
//! - **`announcement`** – The UDP discovery datagram
//!   (`SERVER_IP_DISCOVERY:<tcp_port>`).
//!
//! - **`text`** – Incremental UTF-8 decoding of the byte chunks read from a
//!   client's TCP stream.

use std::time::Duration;

pub mod announcement;
pub mod text;

pub use announcement::{Announcement, AnnouncementError};
pub use text::{TextDecodeError, TextDecoder};

/// TCP port clients connect to when no override is configured.
pub const DEFAULT_TCP_PORT: u16 = 50001;

/// UDP port the discovery announcement is broadcast to.
pub const DEFAULT_UDP_PORT: u16 = 50002;

/// Pause between two discovery announcements.
pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_secs(3);

/// Upper bound on the number of bytes taken from a client stream per read.
pub const READ_BUFFER_SIZE: usize = 1024;
