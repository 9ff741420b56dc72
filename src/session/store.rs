//! Server-side storage for session data
//!
//! The coordinator only needs two operations from its cache: fetch the data for an
//! identifier and overwrite it with a TTL. Any backend that can do that implements
//! [`SessionStore`]. [`InMemoryStore`] is bundled for tests and local development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Data attached to a session: string keys, JSON values
pub type SessionData = serde_json::Map<String, serde_json::Value>;

/// Errors a store may report
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("The session store is unavailable")]
    Unavailable,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A TTL-aware key-value store holding [`SessionData`]
#[async_trait::async_trait]
pub trait SessionStore: std::fmt::Debug + Send + Sync {
    /// Load the data stored under `key`
    ///
    /// Returns `Ok(None)` when there is no live entry for `key`.
    async fn get(&self, key: &str) -> Result<Option<SessionData>, StoreError>;

    /// Store `data` under `key`, replacing any previous entry, for `ttl`
    async fn set(&self, key: &str, data: &SessionData, ttl: Duration) -> Result<(), StoreError>;
}

#[derive(Debug)]
struct Entry {
    data: SessionData,
    deadline: Instant,
}

impl Entry {
    fn is_stale(&self) -> bool {
        self.deadline <= Instant::now()
    }
}

/// Stale entries are purged on every this many writes
const PURGE_EVERY: usize = 64;

/// An in-memory session store
///
/// Stale entries are evicted when read and purged periodically on write.
///
/// # Limitations
///
/// Nothing survives a restart and nothing is shared between processes.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    writes: Arc<AtomicUsize>,
    disconnected: Arc<AtomicBool>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("disconnected", &self.disconnected.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`]
    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    /// Undo [`InMemoryStore::disconnect`]
    pub fn reconnect(&self) {
        self.disconnected.store(false, Ordering::SeqCst);
    }

    fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.disconnected.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        self.entries
            .lock()
            .await
            .values()
            .filter(|entry| !entry.is_stale())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every stale entry, returning how many were removed
    pub async fn delete_expired(&self) -> usize {
        let mut guard = self.entries.lock().await;
        let before = guard.len();
        guard.retain(|_, entry| !entry.is_stale());
        before - guard.len()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<SessionData>, StoreError> {
        self.ensure_connected()?;
        let mut guard = self.entries.lock().await;
        if guard.get(key).is_some_and(Entry::is_stale) {
            guard.remove(key);
        }
        Ok(guard.get(key).map(|entry| entry.data.clone()))
    }

    async fn set(&self, key: &str, data: &SessionData, ttl: Duration) -> Result<(), StoreError> {
        self.ensure_connected()?;
        let mut guard = self.entries.lock().await;
        if self.writes.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            guard.retain(|_, entry| !entry.is_stale());
        }
        guard.insert(
            key.to_string(),
            Entry {
                data: data.clone(),
                deadline: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}
