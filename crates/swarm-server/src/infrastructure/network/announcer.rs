//! UDP presence announcer.
//!
//! Every `interval` the server broadcasts `SERVER_IP_DISCOVERY:<tcp_port>`
//! to `broadcast_address:udp_port` (by default `255.255.255.255:50002`).
//! Pico clients listen on that port, take the sender address of the datagram
//! as the server IP, and connect to the advertised TCP port.
//!
//! # How broadcast discovery works (for beginners)
//!
//! A datagram sent to the limited broadcast address `255.255.255.255` is
//! delivered to every host on the local network segment.  The operating
//! system refuses such sends unless the socket has `SO_BROADCAST` enabled,
//! which [`PresenceAnnouncer::bind`] does.  The socket itself is bound to
//! `0.0.0.0:0`, so the OS picks the outgoing interface and an ephemeral
//! source port; clients only care about the source IP.
//!
//! UDP gives no delivery guarantee, so the announcer simply repeats itself.
//! A lost datagram costs a client at most one extra interval.
//!
//! # Failure policy
//!
//! A failed send is logged and the loop keeps going; the next tick tries
//! again.  Only the shutdown signal ends the loop.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use swarm_core::{Announcement, DEFAULT_BROADCAST_INTERVAL, DEFAULT_TCP_PORT, DEFAULT_UDP_PORT};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::application::shutdown::ShutdownSignal;

/// Error type for announcer setup.
#[derive(Debug, Error)]
pub enum AnnouncerError {
    /// The UDP socket could not be bound.
    #[error("failed to bind announcer socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// `SO_BROADCAST` could not be enabled on the socket.
    #[error("failed to enable broadcast: {0}")]
    EnableBroadcast(#[source] io::Error),

    /// The broadcast interval must be non-zero.
    #[error("broadcast interval must be greater than zero")]
    ZeroInterval,
}

/// Where and how often to announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnouncerConfig {
    /// TCP port written into the payload.
    pub tcp_port: u16,
    /// Destination UDP port.
    pub udp_port: u16,
    /// Destination address; the limited broadcast address in production.
    pub broadcast_address: Ipv4Addr,
    pub interval: Duration,
}

impl AnnouncerConfig {
    pub fn destination(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.broadcast_address, self.udp_port))
    }
}

impl Default for AnnouncerConfig {
    fn default() -> Self {
        Self {
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            broadcast_address: Ipv4Addr::BROADCAST,
            interval: DEFAULT_BROADCAST_INTERVAL,
        }
    }
}

/// Something that can send one datagram.
///
/// Implemented for [`UdpSocket`]; tests substitute in-memory transports.
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize>;
}

#[async_trait]
impl DatagramTransport for UdpSocket {
    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, payload, target).await
    }
}

/// Counters for announcements, readable while the loop runs.
#[derive(Debug, Clone, Default)]
pub struct AnnouncerStats {
    sent: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl AnnouncerStats {
    /// Number of datagrams handed to the transport successfully.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Number of send attempts that returned an error.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Periodically broadcasts the server's presence.
pub struct PresenceAnnouncer<T = UdpSocket> {
    transport: T,
    config: AnnouncerConfig,
    payload: Vec<u8>,
    stats: AnnouncerStats,
}

impl PresenceAnnouncer<UdpSocket> {
    /// Binds a broadcast-enabled UDP socket on `0.0.0.0:0`.
    ///
    /// # Errors
    ///
    /// Returns [`AnnouncerError`] if the socket cannot be bound or
    /// broadcast cannot be enabled.
    pub async fn bind(config: AnnouncerConfig) -> Result<Self, AnnouncerError> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| AnnouncerError::Bind { addr, source })?;
        socket
            .set_broadcast(true)
            .map_err(AnnouncerError::EnableBroadcast)?;
        Self::with_transport(socket, config)
    }
}

impl<T: DatagramTransport> PresenceAnnouncer<T> {
    /// Wraps an existing transport.
    ///
    /// # Errors
    ///
    /// Returns [`AnnouncerError::ZeroInterval`] for a zero interval, which
    /// `tokio::time::interval` would reject with a panic.
    pub fn with_transport(transport: T, config: AnnouncerConfig) -> Result<Self, AnnouncerError> {
        if config.interval.is_zero() {
            return Err(AnnouncerError::ZeroInterval);
        }
        Ok(Self {
            transport,
            payload: Announcement::new(config.tcp_port).to_bytes(),
            config,
            stats: AnnouncerStats::default(),
        })
    }

    /// The exact bytes broadcast on every tick.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn config(&self) -> &AnnouncerConfig {
        &self.config
    }

    /// A handle to the send counters; stays valid after `run` consumes `self`.
    pub fn stats(&self) -> AnnouncerStats {
        self.stats.clone()
    }

    /// Sends one announcement and updates the counters.
    async fn announce_once(&self, target: SocketAddr) {
        match self.transport.send_to(&self.payload, target).await {
            Ok(_) => {
                let n = self.stats.sent.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(%target, count = n, "presence announced");
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(%target, "presence broadcast failed: {e}");
            }
        }
    }

    /// Broadcasts immediately, then once per interval, until `shutdown` fires.
    pub async fn run(self, shutdown: ShutdownSignal) {
        let target = self.config.destination();
        info!(
            %target,
            tcp_port = self.config.tcp_port,
            interval_ms = self.config.interval.as_millis() as u64,
            "presence announcer started"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.announce_once(target).await,
            }
        }

        info!(
            sent = self.stats.sent(),
            failed = self.stats.failed(),
            "presence announcer stopped"
        );
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
