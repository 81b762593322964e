//! Translation of the remote summary into the typed progress store.

use tracing::warn;
use vocab_core::model::{
    CategoryId, ItemId, ItemProgress, LessonId, LessonProgress, ProgressEntry, ProgressKey,
    ProgressStore, QuizProgress,
};

use crate::remote::{RemoteRecord, RemoteSummary};

/// A remote summary after translation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Translated {
    pub store: ProgressStore,
    pub total_items: Option<usize>,
}

/// Map a remote key (`item_1`, `lesson_2`, `quiz_3`) to a typed key.
///
/// `lesson_quiz_<id>` is accepted as a quiz key as well, since some clients
/// echo the cache layout back to the server.
#[must_use]
pub fn parse_remote_key(raw: &str) -> Option<ProgressKey> {
    if let Some(id) = raw.strip_prefix("item_") {
        return id.parse::<ItemId>().ok().map(ProgressKey::Item);
    }
    if let Some(id) = raw
        .strip_prefix("lesson_quiz_")
        .or_else(|| raw.strip_prefix("quiz_"))
    {
        return id.parse::<LessonId>().ok().map(ProgressKey::Quiz);
    }
    if let Some(id) = raw.strip_prefix("lesson_") {
        return id.parse::<LessonId>().ok().map(ProgressKey::Lesson);
    }
    None
}

fn to_entry(key: ProgressKey, record: RemoteRecord) -> ProgressEntry {
    match key {
        ProgressKey::Item(id) => ProgressEntry::Item {
            id,
            progress: ItemProgress {
                completed: record.completed.unwrap_or(false),
                stars: record.stars.unwrap_or(0),
            },
        },
        ProgressKey::Lesson(id) => ProgressEntry::Lesson {
            id,
            progress: LessonProgress {
                completed: record.completed.unwrap_or(false),
                stars: record.stars.unwrap_or(0),
                category_id: record.category_id.map(CategoryId::from),
            },
        },
        // The server only keeps quiz rows for finished quizzes.
        ProgressKey::Quiz(id) => ProgressEntry::Quiz {
            id,
            progress: QuizProgress {
                completed: true,
                quiz_completed: true,
                quiz_score: record.score.unwrap_or(0),
            },
        },
    }
}

#[must_use]
pub fn translate(summary: RemoteSummary) -> Translated {
    let mut store = ProgressStore::new();
    for (raw_key, record) in summary.records {
        match parse_remote_key(&raw_key) {
            Some(key) => {
                store.merge_entry(&to_entry(key, record));
            }
            None => warn!(key = %raw_key, "skipping unknown remote progress key"),
        }
    }

    Translated {
        store,
        total_items: summary
            .total_items
            .map(|total| usize::try_from(total).unwrap_or(usize::MAX)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(completed: Option<bool>, stars: Option<u32>, score: Option<u32>) -> RemoteRecord {
        RemoteRecord {
            completed,
            stars,
            score,
            category_id: None,
        }
    }

    #[test]
    fn parses_each_remote_prefix() {
        assert_eq!(
            parse_remote_key("item_4"),
            Some(ProgressKey::Item(ItemId::new(4)))
        );
        assert_eq!(
            parse_remote_key("lesson_2"),
            Some(ProgressKey::Lesson(LessonId::new(2)))
        );
        assert_eq!(
            parse_remote_key("quiz_5"),
            Some(ProgressKey::Quiz(LessonId::new(5)))
        );
        assert_eq!(
            parse_remote_key("lesson_quiz_5"),
            Some(ProgressKey::Quiz(LessonId::new(5)))
        );
        assert_eq!(parse_remote_key("4"), None);
        assert_eq!(parse_remote_key("item_x"), None);
        assert_eq!(parse_remote_key("badge_1"), None);
    }

    #[test]
    fn quiz_records_become_completed_quizzes() {
        let mut summary = RemoteSummary::default();
        summary
            .records
            .insert("quiz_5".into(), record(None, None, Some(3)));
        let translated = translate(summary);
        assert!(translated.store.is_quiz_completed(LessonId::new(5)));
        assert_eq!(translated.store.quiz_score(LessonId::new(5)), 3);
        assert_eq!(translated.total_items, None);
    }

    #[test]
    fn items_and_lessons_keep_their_fields() {
        let mut summary = RemoteSummary {
            total_items: Some(24),
            ..RemoteSummary::default()
        };
        summary
            .records
            .insert("item_1".into(), record(Some(true), Some(2), None));
        summary
            .records
            .insert("item_2".into(), record(Some(false), None, None));
        summary.records.insert(
            "lesson_3".into(),
            RemoteRecord {
                completed: Some(true),
                stars: Some(3),
                score: None,
                category_id: Some("fruits".into()),
            },
        );
        summary
            .records
            .insert("trophy_1".into(), record(Some(true), Some(9), None));

        let translated = translate(summary);
        assert_eq!(translated.total_items, Some(24));
        assert_eq!(translated.store.len(), 3);
        assert_eq!(translated.store.item_stars(ItemId::new(1)), 2);
        assert!(!translated.store.is_item_completed(ItemId::new(2)));
        assert_eq!(
            translated
                .store
                .category_completion_percentage(&CategoryId::new("fruits")),
            100
        );
    }
}
