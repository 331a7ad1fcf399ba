//! Storage infrastructure: the optional TOML configuration file.
//!
//! The `config` sub-module reads the file from an explicit path or the
//! platform-appropriate directory, fills in defaults for anything missing,
//! and validates the result into the typed server configuration.

pub mod config;
