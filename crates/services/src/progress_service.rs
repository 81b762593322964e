use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vocab_core::Clock;
use vocab_core::model::{
    Catalog, CategoryId, ItemId, LessonId, ProgressEntry, ProgressStore, ProgressSummary,
};
use storage::repository::{CacheStore, OutboxRepository, PendingWrite, StorageError};
use storage::snapshot::{self, PROGRESS_CACHE_KEY};

use crate::error::RemoteError;
use crate::reconcile;
use crate::remote::ProgressRemote;

/// Where the store came from on the last load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Remote,
    Cache,
    /// Neither the remote nor the cache had anything usable.
    Empty,
}

/// Outcome of [`ProgressService::load_progress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub source: LoadSource,
    /// Why the remote could not be used, if it failed.
    pub degraded: Option<String>,
    /// Outbox flush triggered by a successful remote load.
    pub flushed: Option<FlushReport>,
}

impl LoadReport {
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Outcome of [`ProgressService::flush_pending`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct ProgressState {
    store: ProgressStore,
    total_items: usize,
    /// Bumped by every user mutation; lets a load notice it raced one.
    revision: u64,
    /// Committed mutations whose remote push has not settled or queued yet.
    /// Their records are in neither the remote summary nor the outbox.
    deliveries: usize,
}

/// Owns the learner's progress for one session.
///
/// The in-memory store is the source of truth. Every mutation is mirrored to
/// the local cache right away and pushed to the remote on a best-effort
/// basis; writes the remote did not take land in the outbox and are retried
/// after the next successful load.
pub struct ProgressService {
    clock: Clock,
    remote: Arc<dyn ProgressRemote>,
    cache: Arc<dyn CacheStore>,
    outbox: Arc<dyn OutboxRepository>,
    state: RwLock<ProgressState>,
    // Serializes state transitions with their cache mirror write.
    write_gate: Mutex<()>,
    load_gate: Mutex<()>,
    // Serializes read-modify-write sequences on the outbox.
    outbox_gate: Mutex<()>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        remote: Arc<dyn ProgressRemote>,
        cache: Arc<dyn CacheStore>,
        outbox: Arc<dyn OutboxRepository>,
    ) -> Self {
        Self {
            clock,
            remote,
            cache,
            outbox,
            state: RwLock::new(ProgressState::default()),
            write_gate: Mutex::new(()),
            load_gate: Mutex::new(()),
            outbox_gate: Mutex::new(()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ProgressState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ProgressState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ─── Loading ────────────────────────────────────────────────────────────

    /// Populate the store from the remote, falling back to the local cache.
    ///
    /// Never fails: a remote failure is reported through
    /// [`LoadReport::degraded`]. Concurrent calls run one after another.
    pub async fn load_progress(&self) -> LoadReport {
        let _load = self.load_gate.lock().await;
        let (started_at, clean_start) = {
            let state = self.read();
            (state.revision, state.deliveries == 0)
        };

        let (loaded, total_items, source, degraded) = match self.remote.fetch_summary().await {
            Ok(summary) => {
                let translated = reconcile::translate(summary);
                info!(records = translated.store.len(), "loaded progress from remote");
                (
                    translated.store,
                    translated.total_items,
                    LoadSource::Remote,
                    None,
                )
            }
            Err(RemoteError::Unauthenticated) => {
                debug!("no credential, loading cached progress");
                let (store, source) = self.read_cache().await;
                (store, None, source, None)
            }
            Err(err) => {
                warn!(error = %err, "remote progress unavailable, loading cached progress");
                let (store, source) = self.read_cache().await;
                (store, None, source, Some(err.to_string()))
            }
        };

        let pending = match self.outbox.list_pending().await {
            Ok(pending) => pending,
            Err(err) => {
                warn!(error = %err, "could not read pending progress writes");
                Vec::new()
            }
        };

        {
            let _gate = self.write_gate.lock().await;
            let encoded = {
                let mut state = self.write();
                if clean_start && state.revision == started_at {
                    state.store = loaded;
                } else {
                    debug!("local progress is newer than the load, merging instead of replacing");
                    state.store.merge(&loaded);
                }
                for write in &pending {
                    state.store.merge_entry(&write.entry);
                }
                if let Some(total) = total_items {
                    state.total_items = total;
                }
                snapshot::encode(&state.store)
            };
            self.mirror(encoded).await;
        }

        let flushed = if source == LoadSource::Remote && !pending.is_empty() {
            Some(self.flush_pending().await)
        } else {
            None
        };

        LoadReport {
            source,
            degraded,
            flushed,
        }
    }

    async fn read_cache(&self) -> (ProgressStore, LoadSource) {
        match self.cache.get(PROGRESS_CACHE_KEY).await {
            Ok(Some(raw)) => match snapshot::decode(&raw) {
                Ok(store) => (store, LoadSource::Cache),
                Err(err) => {
                    warn!(error = %err, "discarding unreadable cached progress");
                    (ProgressStore::new(), LoadSource::Empty)
                }
            },
            Ok(None) => (ProgressStore::new(), LoadSource::Empty),
            Err(err) => {
                warn!(error = %err, "could not read cached progress");
                (ProgressStore::new(), LoadSource::Empty)
            }
        }
    }

    /// Set the number of items across all lessons.
    pub fn set_total_items(&self, total_items: usize) {
        self.write().total_items = total_items;
    }

    /// Take the item count from loaded lesson content.
    pub fn apply_catalog(&self, catalog: &Catalog) {
        self.set_total_items(catalog.total_items());
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn is_item_completed(&self, id: ItemId) -> bool {
        self.read().store.is_item_completed(id)
    }

    #[must_use]
    pub fn item_stars(&self, id: ItemId) -> u32 {
        self.read().store.item_stars(id)
    }

    #[must_use]
    pub fn is_lesson_completed(&self, id: LessonId) -> bool {
        self.read().store.is_lesson_completed(id)
    }

    #[must_use]
    pub fn lesson_stars(&self, id: LessonId) -> u32 {
        self.read().store.lesson_stars(id)
    }

    #[must_use]
    pub fn is_lesson_quiz_completed(&self, id: LessonId) -> bool {
        self.read().store.is_quiz_completed(id)
    }

    #[must_use]
    pub fn lesson_quiz_score(&self, id: LessonId) -> u32 {
        self.read().store.quiz_score(id)
    }

    #[must_use]
    pub fn total_items(&self) -> usize {
        self.read().total_items
    }

    #[must_use]
    pub fn completed_items(&self) -> usize {
        self.read().store.completed_items()
    }

    #[must_use]
    pub fn total_stars(&self) -> u64 {
        self.read().store.total_stars()
    }

    #[must_use]
    pub fn overall_completion_percentage(&self) -> u32 {
        let state = self.read();
        state.store.overall_completion_percentage(state.total_items)
    }

    #[must_use]
    pub fn category_completion_percentage(&self, category_id: &CategoryId) -> u32 {
        self.read().store.category_completion_percentage(category_id)
    }

    /// A copy of the whole store, for summary views.
    #[must_use]
    pub fn store(&self) -> ProgressStore {
        self.read().store.clone()
    }

    #[must_use]
    pub fn summary(&self) -> ProgressSummary {
        let state = self.read();
        ProgressSummary::from_store(&state.store, state.total_items)
    }

    // ─── Mutators ───────────────────────────────────────────────────────────

    /// Record a finished item, keeping the best star count.
    pub async fn mark_item_completed(&self, id: ItemId, stars: u32) {
        let entry = self
            .commit(|store| store.mark_item_completed(id, stars))
            .await;
        self.deliver(entry).await;
    }

    /// Record a finished lesson, keeping the best star count and stamping its category.
    pub async fn mark_lesson_completed(&self, id: LessonId, stars: u32, category_id: CategoryId) {
        let entry = self
            .commit(|store| store.mark_lesson_completed(id, stars, category_id))
            .await;
        self.deliver(entry).await;
    }

    /// Record a finished lesson quiz, keeping the best score.
    pub async fn mark_lesson_quiz_completed(&self, id: LessonId, score: u32) {
        let entry = self
            .commit(|store| store.mark_quiz_completed(id, score))
            .await;
        self.deliver(entry).await;
    }

    /// Apply a transition to the store and mirror the result to the cache
    /// before anyone else may touch the store.
    async fn commit<F>(&self, transition: F) -> ProgressEntry
    where
        F: FnOnce(&mut ProgressStore) -> ProgressEntry,
    {
        let _gate = self.write_gate.lock().await;
        let (entry, encoded) = {
            let mut state = self.write();
            let entry = transition(&mut state.store);
            state.revision += 1;
            state.deliveries += 1;
            (entry, snapshot::encode(&state.store))
        };
        self.mirror(encoded).await;
        entry
    }

    async fn mirror(&self, encoded: Result<String, StorageError>) {
        let result = match encoded {
            Ok(raw) => self.cache.set(PROGRESS_CACHE_KEY, raw).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            warn!(error = %err, "could not mirror progress to the local cache");
        }
    }

    // ─── Remote delivery ────────────────────────────────────────────────────

    async fn push(&self, entry: &ProgressEntry) -> Result<(), RemoteError> {
        match entry {
            ProgressEntry::Item { id, progress } => {
                self.remote
                    .update_item(*id, progress.completed, progress.stars)
                    .await
            }
            ProgressEntry::Lesson { id, progress } => {
                self.remote
                    .update_lesson(*id, progress.completed, progress.stars)
                    .await
            }
            ProgressEntry::Quiz { id, progress } => {
                self.remote
                    .update_quiz(*id, progress.completed, progress.quiz_score)
                    .await
            }
        }
    }

    async fn deliver(&self, entry: ProgressEntry) {
        match self.push(&entry).await {
            Ok(()) => {
                debug!(key = %entry.key(), "progress delivered");
                self.settle(&entry).await;
            }
            Err(RemoteError::Unauthenticated) => {
                debug!(key = %entry.key(), "no credential, keeping progress for a later sync");
                self.enqueue(entry, None).await;
            }
            Err(err) => {
                warn!(key = %entry.key(), error = %err, "remote progress update failed, queued for retry");
                self.enqueue(entry, Some(err.to_string())).await;
            }
        }
        let mut state = self.write();
        state.deliveries = state.deliveries.saturating_sub(1);
    }

    async fn enqueue(&self, entry: ProgressEntry, error: Option<String>) {
        let _gate = self.outbox_gate.lock().await;
        let key = entry.key();
        if let Err(err) = self.try_enqueue(entry, error).await {
            warn!(%key, error = %err, "could not queue progress write");
        }
    }

    async fn try_enqueue(
        &self,
        entry: ProgressEntry,
        error: Option<String>,
    ) -> Result<(), StorageError> {
        let mut write = match self.outbox.get_pending(entry.key()).await? {
            Some(mut existing) => {
                existing.entry.merge(&entry);
                existing
            }
            None => PendingWrite::new(entry, self.clock.now()),
        };
        if let Some(error) = error {
            write.attempts = write.attempts.saturating_add(1);
            write.last_error = Some(error);
        }
        self.outbox.upsert_pending(&write).await
    }

    /// Drop the pending write for a delivered entry unless it holds something newer.
    async fn settle(&self, delivered: &ProgressEntry) {
        let _gate = self.outbox_gate.lock().await;
        if let Err(err) = self.try_settle(delivered).await {
            warn!(key = %delivered.key(), error = %err, "could not clear delivered progress write");
        }
    }

    async fn try_settle(&self, delivered: &ProgressEntry) -> Result<(), StorageError> {
        let key = delivered.key();
        if let Some(pending) = self.outbox.get_pending(key).await? {
            if delivered.covers(&pending.entry) {
                self.outbox.remove_pending(key).await?;
            }
        }
        Ok(())
    }

    /// Push every pending write to the remote.
    ///
    /// Stops early without counting failures when there is no credential.
    pub async fn flush_pending(&self) -> FlushReport {
        let pending = match self.outbox.list_pending().await {
            Ok(pending) => pending,
            Err(err) => {
                warn!(error = %err, "could not read pending progress writes");
                return FlushReport::default();
            }
        };

        let mut report = FlushReport::default();
        for write in pending {
            let key = write.key();
            match self.push(&write.entry).await {
                Ok(()) => {
                    self.settle(&write.entry).await;
                    report.delivered += 1;
                }
                Err(RemoteError::Unauthenticated) => {
                    debug!("no credential, leaving pending progress writes queued");
                    break;
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(%key, attempts = write.attempts.saturating_add(1), error = %err, "pending progress write failed");
                    if let Err(store_err) = self.outbox.record_failure(key, &err.to_string()).await
                    {
                        debug!(%key, error = %store_err, "could not record delivery failure");
                    }
                }
            }
        }

        if report.delivered > 0 || report.failed > 0 {
            info!(
                delivered = report.delivered,
                failed = report.failed,
                "flushed pending progress writes"
            );
        }
        report
    }
}
