//! Hollister swarm server: entry point.
//!
//! Announces itself over UDP broadcast so Raspberry Pi Pico clients can find
//! it, accepts one long-lived TCP connection per client, and logs the text
//! every client sends.
//!
//! # Usage
//!
//! ```text
//! swarm-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>             TOML config file [default: platform config dir]
//!   --tcp-port <PORT>           TCP port clients connect to [default: 50001]
//!   --udp-port <PORT>           UDP port announcements go to [default: 50002]
//!   --bind <IP>                 TCP bind address [default: 0.0.0.0]
//!   --broadcast-address <IPV4>  Announcement destination [default: 255.255.255.255]
//!   --broadcast-interval <SECS> Seconds between announcements [default: 3]
//!   --read-buffer <BYTES>       Maximum bytes per read [default: 1024]
//!   --idle-timeout <SECS>       Close silent clients after this long
//!   --max-clients <N>           Refuse connections beyond N live sessions
//!   --print-config              Print the effective config as TOML and exit
//! ```
//!
//! # Configuration layers
//!
//! Built-in defaults, then the TOML file, then environment variables and
//! command-line flags (a flag wins over its environment variable).
//!
//! | Variable                   | Flag                   |
//! |----------------------------|------------------------|
//! | `SWARM_CONFIG`             | `--config`             |
//! | `SWARM_TCP_PORT`           | `--tcp-port`           |
//! | `SWARM_UDP_PORT`           | `--udp-port`           |
//! | `SWARM_BIND`               | `--bind`               |
//! | `SWARM_BROADCAST_ADDR`     | `--broadcast-address`  |
//! | `SWARM_BROADCAST_INTERVAL` | `--broadcast-interval` |
//! | `SWARM_READ_BUFFER`        | `--read-buffer`        |
//! | `SWARM_IDLE_TIMEOUT`       | `--idle-timeout`       |
//! | `SWARM_MAX_CLIENTS`        | `--max-clients`        |
//!
//! The log level comes from `RUST_LOG` when set, otherwise from
//! `server.log_level` in the config file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use swarm_server::infrastructure::storage::config::{load_config, AppConfig};
use swarm_server::{SwarmServer, TracingObserver};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Hollister swarm server.
///
/// Every flag is optional; anything not given keeps the value from the
/// config file, or the built-in default.
#[derive(Debug, Parser)]
#[command(
    name = "swarm-server",
    about = "Discovery broadcaster and TCP ingest server for Pico swarm clients",
    version
)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, env = "SWARM_CONFIG")]
    config: Option<PathBuf>,

    /// TCP port clients connect to; also the port advertised over UDP.
    #[arg(long, env = "SWARM_TCP_PORT")]
    tcp_port: Option<u16>,

    /// UDP port the discovery announcements are sent to.
    #[arg(long, env = "SWARM_UDP_PORT")]
    udp_port: Option<u16>,

    /// IP address the TCP listener binds.
    #[arg(long = "bind", env = "SWARM_BIND")]
    bind_address: Option<String>,

    /// IPv4 destination of the discovery announcements.
    #[arg(long, env = "SWARM_BROADCAST_ADDR")]
    broadcast_address: Option<String>,

    /// Seconds between discovery announcements.
    #[arg(long, env = "SWARM_BROADCAST_INTERVAL")]
    broadcast_interval: Option<u64>,

    /// Maximum bytes read from a client at once.
    #[arg(long, env = "SWARM_READ_BUFFER")]
    read_buffer: Option<usize>,

    /// Close a client that sends nothing for this many seconds.
    #[arg(long, env = "SWARM_IDLE_TIMEOUT")]
    idle_timeout: Option<u64>,

    /// Refuse new connections while this many clients are connected.
    #[arg(long, env = "SWARM_MAX_CLIENTS")]
    max_clients: Option<usize>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    /// Layers the command-line values over `config`.
    fn apply_to(&self, mut config: AppConfig) -> AppConfig {
        let net = &mut config.network;
        if let Some(port) = self.tcp_port {
            net.tcp_port = port;
        }
        if let Some(port) = self.udp_port {
            net.udp_port = port;
        }
        if let Some(addr) = &self.bind_address {
            net.bind_address = addr.clone();
        }
        if let Some(addr) = &self.broadcast_address {
            net.broadcast_address = addr.clone();
        }
        if let Some(secs) = self.broadcast_interval {
            net.broadcast_interval_secs = secs;
        }

        let srv = &mut config.server;
        if let Some(size) = self.read_buffer {
            srv.read_buffer_size = size;
        }
        if self.idle_timeout.is_some() {
            srv.idle_timeout_secs = self.idle_timeout;
        }
        if self.max_clients.is_some() {
            srv.max_clients = self.max_clients;
        }
        config
    }

    /// Loads the config file and applies the command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    fn resolve_config(&self) -> anyhow::Result<AppConfig> {
        let file = load_config(self.config.as_deref()).with_context(|| match &self.config {
            Some(path) => format!("failed to load config file {}", path.display()),
            None => "failed to load config file from the platform config directory".to_string(),
        })?;
        Ok(self.apply_to(file))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let app_config = cli.resolve_config()?;

    if cli.print_config {
        print!("{}", app_config.to_toml_string()?);
        return Ok(());
    }

    // `RUST_LOG` wins; otherwise the configured level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&app_config.server.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = app_config
        .validate()
        .context("invalid server configuration")?;

    info!(
        bind = %config.bind_addr,
        broadcast = %config.announcer.destination(),
        interval_secs = config.announcer.interval.as_secs(),
        "Hollister swarm server starting"
    );

    let server = SwarmServer::bind(config, Arc::new(TracingObserver))
        .await
        .context("failed to start swarm server")?;

    server
        .run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("received Ctrl+C, shutting down"),
                Err(e) => {
                    error!("failed to listen for Ctrl+C: {e}");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
        .context("swarm server stopped with an error")?;

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
