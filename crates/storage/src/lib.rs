#![forbid(unsafe_code)]

pub mod repository;
pub mod snapshot;
pub mod sqlite;

pub use repository::{
    CacheStore, InMemoryRepository, OutboxRepository, PendingWrite, Storage, StorageError,
};
pub use snapshot::PROGRESS_CACHE_KEY;
