//! TOML configuration file for the swarm server.
//!
//! The file is optional.  When no path is given on the command line, the
//! server looks in the platform-appropriate location:
//! - Linux:    `$XDG_CONFIG_HOME/swarm/config.toml` or `~/.config/swarm/config.toml`
//! - macOS:    `~/Library/Application Support/Swarm/config.toml`
//! - Windows:  `%APPDATA%\Swarm\config.toml`
//!
//! A missing file means "use the defaults".  Example:
//!
//! ```toml
//! [network]
//! tcp_port = 50001
//! udp_port = 50002
//! bind_address = "0.0.0.0"
//! broadcast_address = "255.255.255.255"
//! broadcast_interval_secs = 3
//!
//! [server]
//! read_buffer_size = 1024
//! idle_timeout_secs = 300
//! max_clients = 64
//! drain_timeout_secs = 5
//! log_level = "info"
//! ```
//!
//! # Serde default values (for beginners)
//!
//! Every field carries `#[serde(default = "some_fn")]`, so a file may list
//! only the keys it wants to change.  Whole sections may be omitted too.
//! `Option` fields (`idle_timeout_secs`, `max_clients`) are simply left out
//! to mean "no limit".
//!
//! # Raw file vs. validated config
//!
//! [`AppConfig`] mirrors the file as written, with addresses as strings.
//! [`AppConfig::validate`] turns it into the typed [`SwarmConfig`] the server
//! runs with, rejecting zero ports, a zero interval, a zero buffer size, and
//! addresses that do not parse.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use swarm_core::{DEFAULT_BROADCAST_INTERVAL, DEFAULT_TCP_PORT, DEFAULT_UDP_PORT, READ_BUFFER_SIZE};
use thiserror::Error;

use crate::infrastructure::network::announcer::AnnouncerConfig;
use crate::infrastructure::network::session::SessionConfig;
use crate::infrastructure::server::SwarmConfig;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but is not acceptable.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Ports and addresses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    /// TCP port clients connect to; also the port advertised in announcements.
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    /// UDP port announcements are sent to.
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,
    /// Address the TCP listener binds.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// IPv4 destination for announcements.
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: String,
    #[serde(default = "default_broadcast_interval_secs")]
    pub broadcast_interval_secs: u64,
}

/// Session and process behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Maximum bytes per read from a client.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Close a client that sends nothing for this many seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
    /// Refuse connections beyond this many live sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_clients: Option<usize>,
    /// How long shutdown waits for sessions to finish.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_tcp_port() -> u16 {
    DEFAULT_TCP_PORT
}
fn default_udp_port() -> u16 {
    DEFAULT_UDP_PORT
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_broadcast_address() -> String {
    "255.255.255.255".to_string()
}
fn default_broadcast_interval_secs() -> u64 {
    DEFAULT_BROADCAST_INTERVAL.as_secs()
}
fn default_read_buffer_size() -> usize {
    READ_BUFFER_SIZE
}
fn default_drain_timeout_secs() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            tcp_port: default_tcp_port(),
            udp_port: default_udp_port(),
            bind_address: default_bind_address(),
            broadcast_address: default_broadcast_address(),
            broadcast_interval_secs: default_broadcast_interval_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: default_read_buffer_size(),
            idle_timeout_secs: None,
            max_clients: None,
            drain_timeout_secs: default_drain_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Checks every value and builds the typed runtime configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<SwarmConfig, ConfigError> {
        let net = &self.network;
        let srv = &self.server;

        non_zero("network.tcp_port", u64::from(net.tcp_port))?;
        non_zero("network.udp_port", u64::from(net.udp_port))?;
        non_zero("network.broadcast_interval_secs", net.broadcast_interval_secs)?;
        non_zero("server.read_buffer_size", srv.read_buffer_size as u64)?;
        if let Some(secs) = srv.idle_timeout_secs {
            non_zero("server.idle_timeout_secs", secs)?;
        }
        if let Some(limit) = srv.max_clients {
            non_zero("server.max_clients", limit as u64)?;
        }

        let bind_ip: IpAddr = net
            .bind_address
            .trim()
            .parse()
            .map_err(|e| invalid("network.bind_address", format!("{:?}: {e}", net.bind_address)))?;
        let broadcast_address: Ipv4Addr = net.broadcast_address.trim().parse().map_err(|e| {
            invalid(
                "network.broadcast_address",
                format!("{:?}: {e} (IPv4 required)", net.broadcast_address),
            )
        })?;

        Ok(SwarmConfig {
            bind_addr: SocketAddr::new(bind_ip, net.tcp_port),
            announcer: AnnouncerConfig {
                tcp_port: net.tcp_port,
                udp_port: net.udp_port,
                broadcast_address,
                interval: Duration::from_secs(net.broadcast_interval_secs),
            },
            session: SessionConfig {
                read_buffer_size: srv.read_buffer_size,
                idle_timeout: srv.idle_timeout_secs.map(Duration::from_secs),
            },
            max_clients: srv.max_clients,
            drain_timeout: Duration::from_secs(srv.drain_timeout_secs),
        })
    }

    /// Renders the config as pretty TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn non_zero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        Err(invalid(field, "must be greater than zero".to_string()))
    } else {
        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Resolves the default config file path for this platform.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the base directory
/// cannot be determined from the environment.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from `path`, or from the platform default location when
/// `path` is `None`.
///
/// A missing default file yields [`AppConfig::default()`].  A missing file
/// that was named explicitly is an error.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match config_file_path() {
            Ok(p) => (p, false),
            Err(ConfigError::NoPlatformConfigDir) => return Ok(AppConfig::default()),
            Err(e) => return Err(e),
        },
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io { path, source }),
    }
}

/// Parses TOML text into an [`AppConfig`].
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed.
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Swarm"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("Swarm")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("swarm"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
