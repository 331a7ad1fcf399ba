//! Client session: the full server-side lifetime of one accepted connection.
//!
//! ```text
//! Start ──► Reading ──► Closing
//!   │          │  ▲        │
//!   │          └──┘        ├─ shut down + drop the stream   (closed once)
//!   │        chunk         ├─ release the registration      (removed once)
//!   │                      └─ observer.on_closed(reason)
//!   └─ registry.register(info) + observer.on_connected
//! ```
//!
//! `Reading` leaves through exactly one [`CloseReason`]:
//!
//! | read result                 | reason                       |
//! |-----------------------------|------------------------------|
//! | `Ok(0)`                     | `PeerClosed`                 |
//! | `Ok(n)`, invalid UTF-8      | `InvalidText`                |
//! | `Err(e)`                    | `TransportError(e.kind())`   |
//! | no data within idle timeout | `IdleTimeout`                |
//! | shutdown signal             | `Shutdown`                   |
//!
//! [`ClientSession::close`] consumes the session, so the compiler rules out
//! running the Closing step twice.  If the task panics instead, the stream
//! and the [`Registration`] are still dropped during unwinding.
//!
//! The session is generic over the stream type so tests can drive it with
//! `tokio_test::io` mocks as well as real `TcpStream`s.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use swarm_core::{
    CloseReason, SessionInfo, SessionState, TextDecodeError, TextDecoder, READ_BUFFER_SIZE,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error};

use crate::application::client_registry::{ClientRegistry, Registration, RegistryError};
use crate::application::observer::SessionObserver;
use crate::application::shutdown::ShutdownSignal;

/// Per-session tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum bytes taken from the stream per read.
    pub read_buffer_size: usize,
    /// Close the session if the peer sends nothing for this long.
    /// `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: READ_BUFFER_SIZE,
            idle_timeout: None,
        }
    }
}

/// Everything a session task needs besides its stream.
///
/// Cloned once per accepted connection; every field is a cheap handle.
#[derive(Clone)]
pub struct SessionContext {
    pub registry: Arc<ClientRegistry>,
    pub observer: Arc<dyn SessionObserver>,
    pub shutdown: ShutdownSignal,
    pub config: SessionConfig,
}

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub info: SessionInfo,
    pub reason: CloseReason,
    pub bytes_received: u64,
    pub chunks_received: u64,
}

/// Result of one bounded read.
enum ReadEvent {
    Data(usize),
    Eof,
    Idle,
    Failed(io::Error),
}

/// One connected client.  Owns its stream for its whole life.
pub struct ClientSession<S> {
    stream: S,
    registration: Registration,
    state: SessionState,
    decoder: TextDecoder,
    bytes_received: u64,
    chunks_received: u64,
}

impl<S> ClientSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Start: takes ownership of an already-registered connection.
    pub fn start(stream: S, registration: Registration, observer: &dyn SessionObserver) -> Self {
        observer.on_connected(registration.info());
        Self {
            stream,
            registration,
            state: SessionState::Reading,
            decoder: TextDecoder::new(),
            bytes_received: 0,
            chunks_received: 0,
        }
    }

    pub fn info(&self) -> &SessionInfo {
        self.registration.info()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Reading: consumes chunks until one of the close conditions occurs.
    pub async fn read_until_closed(
        &mut self,
        observer: &dyn SessionObserver,
        shutdown: &ShutdownSignal,
        config: &SessionConfig,
    ) -> CloseReason {
        let mut buf = vec![0u8; config.read_buffer_size.max(1)];

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return CloseReason::Shutdown,
                event = read_chunk(&mut self.stream, &mut buf, config.idle_timeout) => event,
            };

            let n = match event {
                ReadEvent::Data(n) => n,
                ReadEvent::Eof => {
                    if let Err(e) = self.decoder.finish() {
                        debug!(session = %self.info().id, "discarding partial character: {e}");
                    }
                    return CloseReason::PeerClosed;
                }
                ReadEvent::Idle => return CloseReason::IdleTimeout,
                ReadEvent::Failed(e) => {
                    debug!(session = %self.info().id, "read error: {e}");
                    return CloseReason::TransportError(e.kind());
                }
            };

            self.bytes_received += n as u64;
            self.chunks_received += 1;

            match self.decoder.decode(&buf[..n]) {
                Ok(text) if text.is_empty() => {}
                Ok(text) => observer.on_message(self.registration.info(), &text),
                Err(TextDecodeError::InvalidUtf8 { offset }) => {
                    debug!(
                        session = %self.info().id,
                        offset,
                        "undecodable bytes from peer"
                    );
                    return CloseReason::InvalidText;
                }
                Err(e) => {
                    debug!(session = %self.info().id, "decode error: {e}");
                    return CloseReason::InvalidText;
                }
            }
        }
    }

    /// Closing: closes the stream, deregisters, and reports.  Runs once.
    pub async fn close(mut self, reason: CloseReason, observer: &dyn SessionObserver) -> SessionOutcome {
        self.state = SessionState::Closing;

        // The peer may already be gone; a failed FIN changes nothing.
        if let Err(e) = self.stream.shutdown().await {
            debug!(session = %self.info().id, "stream shutdown: {e}");
        }

        let Self {
            stream,
            registration,
            bytes_received,
            chunks_received,
            ..
        } = self;
        drop(stream);

        let info = registration.info().clone();
        if !registration.release() {
            error!(session = %info.id, "session was missing from the registry at close");
        }

        observer.on_closed(&info, reason);

        SessionOutcome {
            info,
            reason,
            bytes_received,
            chunks_received,
        }
    }
}

/// Drives an already-registered connection from Start to Closing.
pub async fn serve<S>(stream: S, registration: Registration, ctx: &SessionContext) -> SessionOutcome
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let observer = ctx.observer.as_ref();
    let mut session = ClientSession::start(stream, registration, observer);
    let reason = session
        .read_until_closed(observer, &ctx.shutdown, &ctx.config)
        .await;
    session.close(reason, observer).await
}

/// Registers `stream` under a fresh session id and serves it to completion.
///
/// # Errors
///
/// Returns a [`RegistryError`] only if registration itself fails; the
/// stream is dropped (closed) in that case.
pub async fn run_session<S>(
    stream: S,
    peer_addr: SocketAddr,
    ctx: &SessionContext,
) -> Result<SessionOutcome, RegistryError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let registration = ctx.registry.register(SessionInfo::new(peer_addr))?;
    Ok(serve(stream, registration, ctx).await)
}

/// Spawns an independent task serving one accepted TCP connection.
///
/// Fire-and-forget: the acceptor never awaits the handle.  Callers that need
/// to know when the session is finished can await it or watch the registry.
pub fn spawn_session(
    stream: TcpStream,
    registration: Registration,
    ctx: SessionContext,
) -> JoinHandle<SessionOutcome> {
    tokio::spawn(async move {
        let outcome = serve(stream, registration, &ctx).await;
        debug!(
            session = %outcome.info.id,
            bytes = outcome.bytes_received,
            chunks = outcome.chunks_received,
            "session task finished"
        );
        outcome
    })
}

async fn read_chunk<S>(stream: &mut S, buf: &mut [u8], idle_timeout: Option<Duration>) -> ReadEvent
where
    S: AsyncRead + Unpin,
{
    let result = match idle_timeout {
        Some(limit) => match timeout(limit, stream.read(buf)).await {
            Ok(result) => result,
            Err(_) => return ReadEvent::Idle,
        },
        None => stream.read(buf).await,
    };

    match result {
        Ok(0) => ReadEvent::Eof,
        Ok(n) => ReadEvent::Data(n),
        Err(e) => ReadEvent::Failed(e),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
