//! Cache snapshot codec.
//!
//! The whole progress store is kept as one JSON object under
//! [`PROGRESS_CACHE_KEY`], keyed the way the web client always wrote it:
//! a bare item id (`"7"`), `lesson_<id>` or `lesson_quiz_<id>`. Keeping that
//! layout means snapshots written by older clients still load.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use vocab_core::model::{
    CategoryId, ItemId, ItemProgress, LessonId, LessonProgress, ProgressEntry, ProgressKey,
    ProgressStore, QuizProgress,
};

use crate::repository::StorageError;

pub const PROGRESS_CACHE_KEY: &str = "learningProgress";

const LESSON_PREFIX: &str = "lesson_";
const QUIZ_PREFIX: &str = "lesson_quiz_";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedRecord {
    #[serde(default)]
    completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stars: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category_id: Option<CategoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    quiz_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    quiz_score: Option<u32>,
}

/// Cache key for a progress key, e.g. `lesson_quiz_5`.
#[must_use]
pub fn cache_key(key: ProgressKey) -> String {
    match key {
        ProgressKey::Item(id) => id.to_string(),
        ProgressKey::Lesson(id) => format!("{LESSON_PREFIX}{id}"),
        ProgressKey::Quiz(id) => format!("{QUIZ_PREFIX}{id}"),
    }
}

/// Inverse of [`cache_key`]. Returns `None` for keys this codec does not know.
#[must_use]
pub fn parse_cache_key(raw: &str) -> Option<ProgressKey> {
    // The quiz prefix starts with the lesson prefix, so it must be tried first.
    if let Some(id) = raw.strip_prefix(QUIZ_PREFIX) {
        return id.parse::<LessonId>().ok().map(ProgressKey::Quiz);
    }
    if let Some(id) = raw.strip_prefix(LESSON_PREFIX) {
        return id.parse::<LessonId>().ok().map(ProgressKey::Lesson);
    }
    raw.parse::<ItemId>().ok().map(ProgressKey::Item)
}

fn to_cached(entry: ProgressEntry) -> (String, CachedRecord) {
    let key = cache_key(entry.key());
    let record = match entry {
        ProgressEntry::Item { progress, .. } => CachedRecord {
            completed: progress.completed,
            stars: Some(progress.stars),
            ..CachedRecord::default()
        },
        ProgressEntry::Lesson { progress, .. } => CachedRecord {
            completed: progress.completed,
            stars: Some(progress.stars),
            category_id: progress.category_id,
            ..CachedRecord::default()
        },
        ProgressEntry::Quiz { progress, .. } => CachedRecord {
            completed: progress.completed,
            quiz_completed: Some(progress.quiz_completed),
            quiz_score: Some(progress.quiz_score),
            ..CachedRecord::default()
        },
    };
    (key, record)
}

fn from_cached(key: ProgressKey, record: CachedRecord) -> ProgressEntry {
    match key {
        ProgressKey::Item(id) => ProgressEntry::Item {
            id,
            progress: ItemProgress {
                completed: record.completed,
                stars: record.stars.unwrap_or(0),
            },
        },
        ProgressKey::Lesson(id) => ProgressEntry::Lesson {
            id,
            progress: LessonProgress {
                completed: record.completed,
                stars: record.stars.unwrap_or(0),
                category_id: record.category_id,
            },
        },
        ProgressKey::Quiz(id) => ProgressEntry::Quiz {
            id,
            progress: QuizProgress {
                completed: record.completed,
                quiz_completed: record.quiz_completed.unwrap_or(false),
                quiz_score: record.quiz_score.unwrap_or(0),
            },
        },
    }
}

/// Serialize the store into the cache format.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if JSON encoding fails.
pub fn encode(store: &ProgressStore) -> Result<String, StorageError> {
    let records: BTreeMap<String, CachedRecord> = store.entries().map(to_cached).collect();
    serde_json::to_string(&records).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Parse a cached snapshot.
///
/// Unknown keys and malformed individual records are skipped with a warning
/// so one bad entry does not throw away the rest of the learner's progress.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the snapshot is not a JSON object.
pub fn decode(raw: &str) -> Result<ProgressStore, StorageError> {
    let records: BTreeMap<String, Value> =
        serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))?;

    let mut store = ProgressStore::new();
    for (raw_key, value) in records {
        let Some(key) = parse_cache_key(&raw_key) else {
            warn!(key = %raw_key, "skipping unknown key in cached progress");
            continue;
        };
        match serde_json::from_value::<CachedRecord>(value) {
            Ok(record) => {
                store.merge_entry(&from_cached(key, record));
            }
            Err(err) => warn!(key = %raw_key, error = %err, "skipping malformed cached record"),
        }
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_snapshot_written_by_the_web_client() {
        let raw = r#"{
            "1": {"completed": true, "stars": 2},
            "lesson_2": {"completed": true, "stars": 3, "categoryId": "fruits"},
            "lesson_quiz_5": {"completed": true, "quizCompleted": true, "quizScore": 3}
        }"#;
        let store = decode(raw).unwrap();
        assert!(store.is_item_completed(ItemId::new(1)));
        assert_eq!(store.item_stars(ItemId::new(1)), 2);
        assert_eq!(store.lesson_stars(LessonId::new(2)), 3);
        assert_eq!(
            store.lesson(LessonId::new(2)).unwrap().category_id,
            Some(CategoryId::new("fruits"))
        );
        assert!(store.is_quiz_completed(LessonId::new(5)));
        assert_eq!(store.quiz_score(LessonId::new(5)), 3);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn encodes_with_namespaced_keys() {
        let mut store = ProgressStore::new();
        store.mark_item_completed(ItemId::new(7), 3);
        store.mark_lesson_completed(LessonId::new(2), 1, CategoryId::new("fruits"));
        store.mark_quiz_completed(LessonId::new(2), 4);

        let value: Value = serde_json::from_str(&encode(&store).unwrap()).unwrap();
        assert_eq!(value["7"]["stars"], 3);
        assert_eq!(value["lesson_2"]["categoryId"], "fruits");
        assert_eq!(value["lesson_quiz_2"]["quizScore"], 4);
        assert!(value["lesson_quiz_2"].get("stars").is_none());

        assert_eq!(decode(&encode(&store).unwrap()).unwrap(), store);
    }

    #[test]
    fn skips_unknown_keys_and_bad_records() {
        let raw = r#"{
            "3": {"completed": true, "stars": 1},
            "badge_1": {"completed": true},
            "4": {"completed": "yes"},
            "lesson_x": {"completed": true}
        }"#;
        let store = decode(raw).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.is_item_completed(ItemId::new(3)));
    }

    #[test]
    fn rejects_non_object_snapshot() {
        assert!(matches!(
            decode("[1, 2, 3]"),
            Err(StorageError::Serialization(_))
        ));
        assert!(matches!(decode("not json"), Err(StorageError::Serialization(_))));
    }

    #[test]
    fn quiz_prefix_wins_over_lesson_prefix() {
        assert_eq!(
            parse_cache_key("lesson_quiz_5"),
            Some(ProgressKey::Quiz(LessonId::new(5)))
        );
        assert_eq!(
            parse_cache_key("lesson_5"),
            Some(ProgressKey::Lesson(LessonId::new(5)))
        );
        assert_eq!(parse_cache_key("5"), Some(ProgressKey::Item(ItemId::new(5))));
        assert_eq!(parse_cache_key("quiz_5"), None);
    }
}
