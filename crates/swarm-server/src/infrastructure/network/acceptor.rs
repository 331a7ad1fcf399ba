//! TCP connection acceptor: the server's accept loop.
//!
//! Binds the listening socket (default `0.0.0.0:50001`) and accepts
//! connections until its stop signal fires.  Each accepted connection is
//! registered and handed to its own session task immediately, so a slow or
//! silent client never delays the next `accept`.
//!
//! ```text
//! loop {
//!     select! {
//!         stop.cancelled()   => break,
//!         listener.accept()  => register + spawn_session(...)
//!     }
//! }
//! ```
//!
//! The acceptor has its own stop signal, separate from the one sessions
//! watch.  Stopping the acceptor closes the listening socket only; sessions
//! already spawned keep running until their own close condition.
//!
//! # Accept errors
//!
//! A peer that resets between the SYN and our `accept` shows up as
//! `ConnectionAborted`/`ConnectionReset`; a signal can produce `Interrupted`.
//! Those concern one connection and the loop continues.  Any other error
//! (for example running out of file descriptors) ends the loop with
//! [`AcceptError::Accept`].

use std::io;
use std::net::SocketAddr;

use swarm_core::SessionInfo;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::application::client_registry::RegistryError;
use crate::application::shutdown::ShutdownSignal;
use crate::infrastructure::network::session::{spawn_session, SessionContext};

/// Error type for the accept loop.
#[derive(Debug, Error)]
pub enum AcceptError {
    /// The listening socket could not be bound.
    #[error("failed to bind TCP listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The listening socket could not report its local address.
    #[error("failed to read listener address: {0}")]
    LocalAddr(#[source] io::Error),

    /// `accept` failed in a way that affects the listener itself.
    #[error("accept failed: {source}")]
    Accept {
        #[source]
        source: io::Error,
    },
}

/// Accepts client connections and spawns one session task per connection.
pub struct ConnectionAcceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
    ctx: SessionContext,
    max_clients: Option<usize>,
}

impl ConnectionAcceptor {
    /// Binds a listener on `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`AcceptError::Bind`] if the address is in use or not
    /// permitted.
    pub async fn bind(
        addr: SocketAddr,
        ctx: SessionContext,
        max_clients: Option<usize>,
    ) -> Result<Self, AcceptError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| AcceptError::Bind { addr, source })?;
        Self::from_listener(listener, ctx, max_clients)
    }

    /// Wraps an already-bound listener.
    ///
    /// # Errors
    ///
    /// Returns [`AcceptError::LocalAddr`] if the socket address cannot be read.
    pub fn from_listener(
        listener: TcpListener,
        ctx: SessionContext,
        max_clients: Option<usize>,
    ) -> Result<Self, AcceptError> {
        let local_addr = listener.local_addr().map_err(AcceptError::LocalAddr)?;
        Ok(Self {
            listener,
            local_addr,
            ctx,
            max_clients,
        })
    }

    /// The bound address, including the OS-chosen port when bound to port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the accept loop until `stop` fires.
    ///
    /// The listener is dropped (closed) when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`AcceptError::Accept`] for a non-transient accept failure.
    pub async fn run(self, stop: ShutdownSignal) -> Result<(), AcceptError> {
        info!(addr = %self.local_addr, "listening for client connections");

        loop {
            let accepted = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => self.admit(stream, peer_addr),
                Err(e) if is_transient_accept_error(&e) => {
                    warn!("accept failed for one connection: {e}");
                }
                Err(e) => {
                    error!("accept loop failed: {e}");
                    return Err(AcceptError::Accept { source: e });
                }
            }
        }

        info!(addr = %self.local_addr, "stopped accepting connections");
        Ok(())
    }

    /// Registers a freshly accepted connection and spawns its session.
    fn admit(&self, stream: TcpStream, peer_addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer_addr, "could not set TCP_NODELAY: {e}");
        }

        let info = SessionInfo::new(peer_addr);
        match self.ctx.registry.try_register(info, self.max_clients) {
            Ok(registration) => {
                debug!(
                    session = %registration.info().id,
                    peer = %peer_addr,
                    "connection accepted"
                );
                spawn_session(stream, registration, self.ctx.clone());
            }
            Err(RegistryError::Full { limit }) => {
                warn!(peer = %peer_addr, limit, "client limit reached; refusing connection");
                drop(stream);
            }
            Err(e) => {
                error!(peer = %peer_addr, "could not register connection: {e}");
            }
        }
    }
}

/// Returns `true` for accept errors that concern a single connection only.
pub fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::client_registry::ClientRegistry;
    use crate::application::observer::TracingObserver;
    use crate::infrastructure::network::session::SessionConfig;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::time::timeout;

    fn make_ctx() -> SessionContext {
        SessionContext {
            registry: ClientRegistry::new(),
            observer: Arc::new(TracingObserver),
            shutdown: ShutdownSignal::new(),
            config: SessionConfig::default(),
        }
    }

    async fn bind_local(ctx: SessionContext, max_clients: Option<usize>) -> ConnectionAcceptor {
        ConnectionAcceptor::bind("127.0.0.1:0".parse().unwrap(), ctx, max_clients)
            .await
            .unwrap()
    }

    #[test]
    fn test_transient_accept_errors_are_classified() {
        for kind in [
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::Interrupted,
        ] {
            assert!(is_transient_accept_error(&io::Error::from(kind)), "{kind:?}");
        }
        assert!(!is_transient_accept_error(&io::Error::from(
            io::ErrorKind::PermissionDenied
        )));
        assert!(!is_transient_accept_error(&io::Error::new(
            io::ErrorKind::Other,
            "too many open files"
        )));
    }

    #[tokio::test]
    async fn test_bind_to_port_zero_reports_real_port() {
        let acceptor = bind_local(make_ctx(), None).await;
        assert_ne!(acceptor.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_to_taken_port_is_a_bind_error() {
        // Arrange
        let first = bind_local(make_ctx(), None).await;

        // Act
        let result = ConnectionAcceptor::bind(first.local_addr(), make_ctx(), None).await;

        // Assert
        assert!(matches!(result, Err(AcceptError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_accepted_connection_is_registered_then_removed() {
        // Arrange
        let ctx = make_ctx();
        let registry = ctx.registry.clone();
        let acceptor = bind_local(ctx, None).await;
        let addr = acceptor.local_addr();
        let stop = ShutdownSignal::new();
        let handle = tokio::spawn(acceptor.run(stop.clone()));

        // Act
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"hello").await.unwrap();
        timeout(Duration::from_secs(2), registry.wait_for_len(|n| n == 1))
            .await
            .expect("session must register");
        drop(client);

        // Assert
        timeout(Duration::from_secs(2), registry.wait_until_empty())
            .await
            .expect("session must deregister after close");
        stop.trigger();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stop_closes_listener() {
        // Arrange
        let acceptor = bind_local(make_ctx(), None).await;
        let addr = acceptor.local_addr();
        let stop = ShutdownSignal::new();
        let handle = tokio::spawn(acceptor.run(stop.clone()));

        // Act
        stop.trigger();
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("accept loop must stop")
            .unwrap()
            .unwrap();

        // Assert
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_max_clients_refuses_extra_connections() {
        // Arrange
        let ctx = make_ctx();
        let registry = ctx.registry.clone();
        let acceptor = bind_local(ctx, Some(1)).await;
        let addr = acceptor.local_addr();
        let stop = ShutdownSignal::new();
        let handle = tokio::spawn(acceptor.run(stop.clone()));

        let _first = TcpStream::connect(addr).await.unwrap();
        timeout(Duration::from_secs(2), registry.wait_for_len(|n| n == 1))
            .await
            .unwrap();

        // Act
        let mut second = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 8];
        let read = timeout(
            Duration::from_secs(2),
            tokio::io::AsyncReadExt::read(&mut second, &mut buf),
        )
        .await
        .expect("refused connection must be closed by the server");

        // Assert – EOF or reset, never data, and still one session
        assert!(matches!(read, Ok(0) | Err(_)));
        assert_eq!(registry.len(), 1);

        stop.trigger();
        handle.await.unwrap().unwrap();
    }
}
