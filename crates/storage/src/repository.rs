use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use vocab_core::model::{ProgressEntry, ProgressKey};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Local key-value cache that survives restarts.
///
/// Holds the last-known-good progress snapshot; see [`crate::snapshot`].
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be stored.
    async fn set(&self, key: &str, value: String) -> Result<(), StorageError>;
}

/// A remote write that has not been acknowledged yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    pub entry: ProgressEntry,
    pub queued_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl PendingWrite {
    #[must_use]
    pub fn new(entry: ProgressEntry, queued_at: DateTime<Utc>) -> Self {
        Self {
            entry,
            queued_at,
            attempts: 0,
            last_error: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> ProgressKey {
        self.entry.key()
    }
}

/// Outbox of remote writes, at most one row per progress key.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Insert or replace the pending write for its key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write cannot be stored.
    async fn upsert_pending(&self, write: &PendingWrite) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get_pending(&self, key: ProgressKey) -> Result<Option<PendingWrite>, StorageError>;

    /// All pending writes, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read or a row is corrupt.
    async fn list_pending(&self) -> Result<Vec<PendingWrite>, StorageError>;

    /// Drop the pending write for `key`. Missing rows are not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn remove_pending(&self, key: ProgressKey) -> Result<(), StorageError>;

    /// Count one more failed delivery and remember why.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if nothing is pending for `key`.
    async fn record_failure(&self, key: ProgressKey, error: &str) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    cache: Arc<Mutex<HashMap<String, String>>>,
    outbox: Arc<Mutex<BTreeMap<ProgressKey, PendingWrite>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemoryRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .cache
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut guard = self
            .cache
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.to_owned(), value);
        Ok(())
    }
}

#[async_trait]
impl OutboxRepository for InMemoryRepository {
    async fn upsert_pending(&self, write: &PendingWrite) -> Result<(), StorageError> {
        let mut guard = self
            .outbox
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(write.key(), write.clone());
        Ok(())
    }

    async fn get_pending(&self, key: ProgressKey) -> Result<Option<PendingWrite>, StorageError> {
        let guard = self
            .outbox
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&key).cloned())
    }

    async fn list_pending(&self) -> Result<Vec<PendingWrite>, StorageError> {
        let guard = self
            .outbox
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut pending: Vec<PendingWrite> = guard.values().cloned().collect();
        pending.sort_by_key(|write| (write.queued_at, write.key()));
        Ok(pending)
    }

    async fn remove_pending(&self, key: ProgressKey) -> Result<(), StorageError> {
        let mut guard = self
            .outbox
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(&key);
        Ok(())
    }

    async fn record_failure(&self, key: ProgressKey, error: &str) -> Result<(), StorageError> {
        let mut guard = self
            .outbox
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let write = guard.get_mut(&key).ok_or(StorageError::NotFound)?;
        write.attempts = write.attempts.saturating_add(1);
        write.last_error = Some(error.to_owned());
        Ok(())
    }
}

/// Aggregates the cache and outbox behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub cache: Arc<dyn CacheStore>,
    pub outbox: Arc<dyn OutboxRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let cache: Arc<dyn CacheStore> = Arc::new(repo.clone());
        let outbox: Arc<dyn OutboxRepository> = Arc::new(repo);
        Self { cache, outbox }
    }
}
