//! SwarmServer: wires the announcer, the acceptor, and the session tasks
//! together and owns their shutdown order.
//!
//! ```text
//!             ┌────────────── SwarmServer::run_until ──────────────┐
//!  ctrl_c ──► │ 1. stop  ──► announcer task   (stops broadcasting) │
//!             │          └─► acceptor task    (closes listener)    │
//!             │ 2. sessions.trigger()  ──► every session: Shutdown │
//!             │ 3. drain: wait until registry is empty (bounded)   │
//!             └────────────────────────────────────────────────────┘
//! ```
//!
//! Two signals are used on purpose: `stop` ends the announcer and the accept
//! loop, `sessions` ends open sessions.  Tests fire only the first to check
//! that open sessions survive the listener going away.
//!
//! The announcer is best-effort.  If its socket cannot be set up, the server
//! logs the error and runs without discovery; clients that already know the
//! address can still connect.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinError;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::application::client_registry::ClientRegistry;
use crate::application::observer::SessionObserver;
use crate::application::shutdown::ShutdownSignal;
use crate::infrastructure::network::acceptor::{AcceptError, ConnectionAcceptor};
use crate::infrastructure::network::announcer::{AnnouncerConfig, AnnouncerStats, PresenceAnnouncer};
use crate::infrastructure::network::session::{SessionConfig, SessionContext};

/// Validated runtime configuration for a [`SwarmServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwarmConfig {
    /// Address the TCP listener binds.
    pub bind_addr: SocketAddr,
    pub announcer: AnnouncerConfig,
    pub session: SessionConfig,
    /// Refuse connections beyond this many live sessions.  `None` = unbounded.
    pub max_clients: Option<usize>,
    /// Upper bound on how long shutdown waits for sessions to finish.
    pub drain_timeout: Duration,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        let announcer = AnnouncerConfig::default();
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], announcer.tcp_port)),
            announcer,
            session: SessionConfig::default(),
            max_clients: None,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// Errors that end the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listener failed or the accept loop died.
    #[error(transparent)]
    Accept(#[from] AcceptError),

    /// A background task panicked or was cancelled.
    #[error("server task failed: {0}")]
    Task(#[from] JoinError),
}

/// A bound, not-yet-running swarm server.
pub struct SwarmServer {
    acceptor: ConnectionAcceptor,
    announcer: Option<PresenceAnnouncer>,
    registry: Arc<ClientRegistry>,
    sessions: ShutdownSignal,
    drain_timeout: Duration,
}

impl SwarmServer {
    /// Binds the TCP listener and the announcer socket.
    ///
    /// When `config.bind_addr` uses port 0, the announcer advertises the
    /// port the OS actually assigned.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Accept`] if the TCP listener cannot be bound.
    /// Announcer setup failures are logged, not returned.
    pub async fn bind(
        config: SwarmConfig,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self, ServerError> {
        let registry = ClientRegistry::new();
        let sessions = ShutdownSignal::new();
        let ctx = SessionContext {
            registry: Arc::clone(&registry),
            observer,
            shutdown: sessions.clone(),
            config: config.session,
        };

        let acceptor = ConnectionAcceptor::bind(config.bind_addr, ctx, config.max_clients).await?;

        let announcer_config = AnnouncerConfig {
            tcp_port: acceptor.local_addr().port(),
            ..config.announcer
        };
        let announcer = match PresenceAnnouncer::bind(announcer_config).await {
            Ok(announcer) => Some(announcer),
            Err(e) => {
                error!("presence announcer unavailable, continuing without discovery: {e}");
                None
            }
        };

        Ok(Self {
            acceptor,
            announcer,
            registry,
            sessions,
            drain_timeout: config.drain_timeout,
        })
    }

    /// The address the TCP listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.acceptor.local_addr()
    }

    /// The live-session registry, shared with every session task.
    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    /// Counters of the announcer, if its socket could be set up.
    pub fn announcer_stats(&self) -> Option<AnnouncerStats> {
        self.announcer.as_ref().map(PresenceAnnouncer::stats)
    }

    /// The signal that closes every open session.
    pub fn session_shutdown(&self) -> ShutdownSignal {
        self.sessions.clone()
    }

    /// Runs until `shutdown` resolves or the accept loop fails, then shuts
    /// everything down in order and drains open sessions.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the accept loop failed or a task panicked.
    /// A drain that exceeds the drain timeout is logged, not returned.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let Self {
            acceptor,
            announcer,
            registry,
            sessions,
            drain_timeout,
        } = self;

        let stop = ShutdownSignal::new();
        let announcer_task = announcer.map(|a| tokio::spawn(a.run(stop.clone())));
        let mut acceptor_task = tokio::spawn(acceptor.run(stop.clone()));

        let early_exit = tokio::select! {
            _ = shutdown => {
                info!("shutdown requested");
                None
            }
            joined = &mut acceptor_task => Some(joined),
        };

        stop.trigger();
        let accept_result = match early_exit {
            Some(joined) => joined,
            None => acceptor_task.await,
        };
        if let Some(task) = announcer_task {
            if let Err(e) = task.await {
                warn!("announcer task ended abnormally: {e}");
            }
        }

        sessions.trigger();
        drain(&registry, drain_timeout).await;

        accept_result??;
        info!("server stopped");
        Ok(())
    }
}

/// Waits for every session to deregister, up to `limit`.
async fn drain(registry: &ClientRegistry, limit: Duration) {
    let open = registry.len();
    if open == 0 {
        return;
    }
    info!(open, "waiting for sessions to close");
    if timeout(limit, registry.wait_until_empty()).await.is_err() {
        warn!(
            remaining = registry.len(),
            "drain timeout elapsed with sessions still open"
        );
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::observer::TracingObserver;
    use std::net::Ipv4Addr;
    use tokio::sync::oneshot;

    fn local_config() -> SwarmConfig {
        SwarmConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            announcer: AnnouncerConfig {
                broadcast_address: Ipv4Addr::LOCALHOST,
                interval: Duration::from_millis(50),
                ..AnnouncerConfig::default()
            },
            drain_timeout: Duration::from_secs(2),
            ..SwarmConfig::default()
        }
    }

    #[test]
    fn test_swarm_config_default_binds_all_interfaces_on_50001() {
        let cfg = SwarmConfig::default();
        assert_eq!(cfg.bind_addr, "0.0.0.0:50001".parse().unwrap());
        assert_eq!(cfg.drain_timeout, Duration::from_secs(5));
        assert_eq!(cfg.max_clients, None);
    }

    #[tokio::test]
    async fn test_bind_reports_assigned_port() {
        let server = SwarmServer::bind(local_config(), Arc::new(TracingObserver))
            .await
            .unwrap();

        assert_ne!(server.local_addr().port(), 0);
        assert!(server.registry().is_empty());
        assert!(server.announcer_stats().is_some());
    }

    #[tokio::test]
    async fn test_run_until_returns_when_shutdown_future_resolves() {
        // Arrange
        let server = SwarmServer::bind(local_config(), Arc::new(TracingObserver))
            .await
            .unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));

        // Act
        tx.send(()).unwrap();

        // Assert
        let result = timeout(Duration::from_secs(2), handle)
            .await
            .expect("server must stop")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_bind_on_taken_port_fails() {
        let first = SwarmServer::bind(local_config(), Arc::new(TracingObserver))
            .await
            .unwrap();
        let cfg = SwarmConfig {
            bind_addr: first.local_addr(),
            ..local_config()
        };

        let result = SwarmServer::bind(cfg, Arc::new(TracingObserver)).await;

        assert!(matches!(
            result,
            Err(ServerError::Accept(AcceptError::Bind { .. }))
        ));
    }
}
