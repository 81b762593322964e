use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::error::AppServicesError;
use crate::progress_service::ProgressService;
use crate::remote::{CredentialProvider, HttpProgressRemote, ProgressRemote, RemoteConfig};

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    progress: Arc<ProgressService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage and the HTTP progress API.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        remote: RemoteConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let remote: Arc<dyn ProgressRemote> = Arc::new(HttpProgressRemote::new(remote, credentials));
        Ok(Self::from_storage(storage, clock, remote))
    }

    /// Build services over in-memory storage with the given remote.
    #[must_use]
    pub fn in_memory(clock: Clock, remote: Arc<dyn ProgressRemote>) -> Self {
        Self::from_storage(Storage::in_memory(), clock, remote)
    }

    #[must_use]
    pub fn from_storage(storage: Storage, clock: Clock, remote: Arc<dyn ProgressRemote>) -> Self {
        let progress = Arc::new(ProgressService::new(
            clock,
            remote,
            Arc::clone(&storage.cache),
            Arc::clone(&storage.outbox),
        ));
        Self { progress }
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }
}
