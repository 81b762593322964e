use chrono::Duration;
use storage::repository::{CacheStore, OutboxRepository, PendingWrite, Storage, StorageError};
use storage::snapshot::{self, PROGRESS_CACHE_KEY};
use storage::sqlite::SqliteRepository;
use vocab_core::model::{
    CategoryId, ItemId, ItemProgress, LessonId, LessonProgress, ProgressEntry, ProgressKey,
    ProgressStore,
};
use vocab_core::time::fixed_now;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_cache_round_trips_snapshot() {
    let repo = connect("memdb_cache_roundtrip").await;
    assert_eq!(repo.get(PROGRESS_CACHE_KEY).await.unwrap(), None);

    let mut store = ProgressStore::new();
    store.mark_item_completed(ItemId::new(1), 2);
    store.mark_lesson_completed(LessonId::new(2), 3, CategoryId::new("fruits"));
    store.mark_quiz_completed(LessonId::new(2), 5);

    repo.set(PROGRESS_CACHE_KEY, snapshot::encode(&store).unwrap())
        .await
        .unwrap();
    store.mark_item_completed(ItemId::new(4), 1);
    repo.set(PROGRESS_CACHE_KEY, snapshot::encode(&store).unwrap())
        .await
        .unwrap();

    let raw = repo.get(PROGRESS_CACHE_KEY).await.unwrap().expect("cached");
    assert_eq!(snapshot::decode(&raw).unwrap(), store);
}

#[tokio::test]
async fn sqlite_outbox_upserts_lists_and_removes() {
    let repo = connect("memdb_outbox").await;

    let lesson = ProgressEntry::Lesson {
        id: LessonId::new(2),
        progress: LessonProgress {
            completed: true,
            stars: 3,
            category_id: Some(CategoryId::new("fruits")),
        },
    };
    let item = ProgressEntry::Item {
        id: ItemId::new(7),
        progress: ItemProgress {
            completed: true,
            stars: 1,
        },
    };

    repo.upsert_pending(&PendingWrite::new(lesson.clone(), fixed_now() + Duration::seconds(1)))
        .await
        .unwrap();
    repo.upsert_pending(&PendingWrite::new(item, fixed_now()))
        .await
        .unwrap();

    // Replacing the item row keeps a single row for the key.
    let better_item = ProgressEntry::Item {
        id: ItemId::new(7),
        progress: ItemProgress {
            completed: true,
            stars: 3,
        },
    };
    repo.upsert_pending(&PendingWrite::new(better_item.clone(), fixed_now()))
        .await
        .unwrap();

    let pending = repo.list_pending().await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].entry, better_item);
    assert_eq!(pending[1].entry, lesson);
    assert_eq!(pending[1].queued_at, fixed_now() + Duration::seconds(1));

    let key = ProgressKey::Item(ItemId::new(7));
    repo.record_failure(key, "connection refused").await.unwrap();
    let write = repo.get_pending(key).await.unwrap().expect("pending");
    assert_eq!(write.attempts, 1);
    assert_eq!(write.last_error.as_deref(), Some("connection refused"));

    repo.remove_pending(key).await.unwrap();
    assert!(repo.get_pending(key).await.unwrap().is_none());
    assert!(matches!(
        repo.record_failure(key, "gone").await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let repo = connect("memdb_migrate_twice").await;
    repo.migrate().await.expect("second migrate");
    repo.set("k", "v".into()).await.unwrap();
    assert_eq!(repo.get("k").await.unwrap().as_deref(), Some("v"));
}

#[tokio::test]
async fn storage_sqlite_wires_both_repositories() {
    let storage = Storage::sqlite("sqlite:file:memdb_storage?mode=memory&cache=shared")
        .await
        .expect("storage");
    storage.cache.set("k", "v".into()).await.unwrap();
    assert!(storage.outbox.list_pending().await.unwrap().is_empty());
}
