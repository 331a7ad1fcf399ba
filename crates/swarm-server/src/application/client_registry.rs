//! ClientRegistry: the shared set of currently connected client sessions.
//!
//! The registry is the only mutable state shared between the acceptor and
//! the per-client session tasks.  Every session task inserts one record when
//! it starts and removes it when it finishes, concurrently with every other
//! session, so every access goes through one mutex.
//!
//! # Registration guard (for beginners)
//!
//! [`ClientRegistry::register`] does not just insert a record: it returns a
//! [`Registration`] value.  Dropping that value removes the record.  Rust runs
//! `Drop` on every exit path of the owning task (normal return, early
//! `break`, even a panic unwinding through it), so a session can never leave
//! a stale entry behind, and it can never remove its entry twice.
//!
//! ```text
//! session task
//!  ├─ let reg = registry.register(info)?;   // inserted
//!  ├─ ... read loop ...
//!  └─ drop(reg)                             // removed, exactly once
//! ```
//!
//! # Size channel
//!
//! The current number of sessions is also published on a
//! [`tokio::sync::watch`] channel, updated inside the same critical section
//! as the mutation.  Shutdown drains and tests wait on it instead of polling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use swarm_core::{SessionId, SessionInfo};
use thiserror::Error;
use tokio::sync::watch;
use tracing::error;

/// Errors returned by registry mutations.
///
/// None of these are expected at runtime; each one means an invariant of the
/// session lifecycle has been broken.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A session with this id is already registered.
    #[error("session {0} is already registered")]
    Duplicate(SessionId),

    /// The registry already holds the maximum number of sessions.
    #[error("client limit of {limit} reached")]
    Full { limit: usize },
}

/// In-memory registry of live client sessions.
///
/// Holds [`SessionInfo`] bookkeeping records only; the connections themselves
/// stay owned by their session tasks.
pub struct ClientRegistry {
    sessions: Mutex<HashMap<SessionId, SessionInfo>>,
    size_tx: watch::Sender<usize>,
}

impl ClientRegistry {
    /// Creates an empty registry, ready to be shared between tasks.
    pub fn new() -> Arc<Self> {
        let (size_tx, _) = watch::channel(0);
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            size_tx,
        })
    }

    /// Inserts `info` and returns the guard that removes it again.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if `info.id` is already present.
    pub fn register(self: &Arc<Self>, info: SessionInfo) -> Result<Registration, RegistryError> {
        self.try_register(info, None)
    }

    /// Inserts `info` unless the registry already holds `limit` sessions.
    ///
    /// The capacity check and the insertion happen under the same lock, so a
    /// burst of simultaneous connections can never overshoot the limit.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Full`] at capacity, or
    /// [`RegistryError::Duplicate`] if `info.id` is already present.
    pub fn try_register(
        self: &Arc<Self>,
        info: SessionInfo,
        limit: Option<usize>,
    ) -> Result<Registration, RegistryError> {
        let mut sessions = self.lock();

        if let Some(limit) = limit {
            if sessions.len() >= limit {
                return Err(RegistryError::Full { limit });
            }
        }

        let id = info.id;
        if sessions.contains_key(&id) {
            error!(session = %id, "duplicate session registration");
            return Err(RegistryError::Duplicate(id));
        }
        sessions.insert(id, info.clone());
        self.size_tx.send_replace(sessions.len());

        Ok(Registration {
            registry: Some(Arc::clone(self)),
            info,
        })
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if a session with `id` is currently registered.
    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Returns a copy of every live record, oldest connection first.
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let mut all: Vec<SessionInfo> = self.lock().values().cloned().collect();
        all.sort_by_key(|info| (info.connected_at, info.id));
        all
    }

    /// Subscribes to changes of the session count.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.size_tx.subscribe()
    }

    /// Waits until the session count satisfies `predicate`.
    pub async fn wait_for_len(&self, mut predicate: impl FnMut(usize) -> bool) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|len| predicate(*len)).await;
    }

    /// Waits until every session has finished its cleanup.
    pub async fn wait_until_empty(&self) {
        self.wait_for_len(|len| len == 0).await;
    }

    /// Removes `id`; returns whether an entry was present.
    fn remove(&self, id: SessionId) -> bool {
        let mut sessions = self.lock();
        let removed = sessions.remove(&id).is_some();
        self.size_tx.send_replace(sessions.len());
        removed
    }

    /// Mutations are single `HashMap` calls that cannot leave the map half
    /// updated, so a poisoned lock still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, SessionInfo>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof of registration; removes the record from the registry when released
/// or dropped.
#[derive(Debug)]
pub struct Registration {
    registry: Option<Arc<ClientRegistry>>,
    info: SessionInfo,
}

impl Registration {
    /// The record this guard registered.
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Removes the record now.  Returns `false` if it had already vanished,
    /// which would indicate a broken invariant.
    pub fn release(mut self) -> bool {
        self.remove_once()
    }

    fn remove_once(&mut self) -> bool {
        match self.registry.take() {
            Some(registry) => registry.remove(self.info.id),
            None => false,
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.remove_once();
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("len", &self.len())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::thread;
    use std::time::Duration;

    fn make_info(port: u16) -> SessionInfo {
        let addr: SocketAddr = format!("192.168.4.{}:{port}", port % 250 + 1)
            .parse()
            .unwrap();
        SessionInfo::new(addr)
    }

    #[test]
    fn test_registry_starts_empty() {
        let registry = ClientRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_register_adds_session() {
        // Arrange
        let registry = ClientRegistry::new();
        let info = make_info(40000);
        let id = info.id;

        // Act
        let _reg = registry.register(info).unwrap();

        // Assert
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_dropping_registration_removes_session() {
        let registry = ClientRegistry::new();
        let info = make_info(40001);
        let id = info.id;

        let reg = registry.register(info).unwrap();
        drop(reg);

        assert!(!registry.contains(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_release_removes_exactly_once() {
        // Arrange
        let registry = ClientRegistry::new();
        let reg = registry.register(make_info(40002)).unwrap();

        // Act – release consumes the guard, so Drop must not remove again
        let removed = reg.release();

        // Assert
        assert!(removed);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        // Arrange
        let registry = ClientRegistry::new();
        let info = make_info(40003);
        let _first = registry.register(info.clone()).unwrap();

        // Act
        let second = registry.register(info.clone());

        // Assert
        assert_eq!(second.unwrap_err(), RegistryError::Duplicate(info.id));
        assert_eq!(registry.len(), 1, "rejected duplicate must not be counted");
    }

    #[test]
    fn test_rejected_duplicate_does_not_remove_original_on_drop() {
        let registry = ClientRegistry::new();
        let info = make_info(40004);
        let _first = registry.register(info.clone()).unwrap();

        let _ = registry.register(info.clone());

        assert!(registry.contains(info.id));
    }

    #[test]
    fn test_try_register_enforces_limit() {
        // Arrange
        let registry = ClientRegistry::new();
        let _a = registry.try_register(make_info(40005), Some(2)).unwrap();
        let _b = registry.try_register(make_info(40006), Some(2)).unwrap();

        // Act
        let third = registry.try_register(make_info(40007), Some(2));

        // Assert
        assert_eq!(third.unwrap_err(), RegistryError::Full { limit: 2 });
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_limit_frees_up_after_release() {
        let registry = ClientRegistry::new();
        let a = registry.try_register(make_info(40008), Some(1)).unwrap();
        assert!(registry.try_register(make_info(40009), Some(1)).is_err());

        drop(a);

        assert!(registry.try_register(make_info(40010), Some(1)).is_ok());
    }

    #[test]
    fn test_snapshot_is_ordered_by_connect_time() {
        let registry = ClientRegistry::new();
        let first = make_info(40011);
        thread::sleep(Duration::from_millis(2));
        let second = make_info(40012);
        let (first_id, second_id) = (first.id, second.id);

        let _b = registry.register(second).unwrap();
        let _a = registry.register(first).unwrap();

        let ids: Vec<_> = registry.snapshot().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![first_id, second_id]);
    }

    #[test]
    fn test_concurrent_register_and_release_leaves_no_leaks() {
        // Arrange
        let registry = ClientRegistry::new();
        let thread_count = 16;
        let rounds = 200;

        // Act – every thread registers and releases repeatedly in parallel
        let handles: Vec<_> = (0..thread_count)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for r in 0..rounds {
                        let reg = registry.register(make_info((t * rounds + r) as u16)).unwrap();
                        assert!(registry.contains(reg.info().id));
                        drop(reg);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread panicked");
        }

        // Assert
        assert!(registry.is_empty(), "every registration must be removed");
    }

    #[test]
    fn test_concurrent_registrations_are_all_counted() {
        let registry = ClientRegistry::new();

        let guards: Vec<Registration> = (0..32)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.register(make_info(41000 + i)).unwrap())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();

        assert_eq!(registry.len(), 32);
        drop(guards);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_size_channel_tracks_mutations() {
        let registry = ClientRegistry::new();
        let rx = registry.subscribe();

        let reg = registry.register(make_info(40013)).unwrap();
        assert_eq!(*rx.borrow(), 1);

        drop(reg);
        assert_eq!(*rx.borrow(), 0);
    }

    #[tokio::test]
    async fn test_wait_until_empty_resolves_after_last_release() {
        // Arrange
        let registry = ClientRegistry::new();
        let reg = registry.register(make_info(40014)).unwrap();

        // Act – release from another task after a short delay
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(reg);
        });

        // Assert
        tokio::time::timeout(Duration::from_secs(1), registry.wait_until_empty())
            .await
            .expect("registry must drain");
    }

    #[tokio::test]
    async fn test_wait_for_len_returns_immediately_when_satisfied() {
        let registry = ClientRegistry::new();
        let _reg = registry.register(make_info(40015)).unwrap();

        tokio::time::timeout(
            Duration::from_millis(100),
            registry.wait_for_len(|len| len == 1),
        )
        .await
        .expect("predicate already holds");
    }
}
