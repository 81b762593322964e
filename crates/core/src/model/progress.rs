use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::ids::{CategoryId, ItemId, LessonId};

//
// ─── KEYS ──────────────────────────────────────────────────────────────────────
//

/// Which kind of entity a progress record tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    Item,
    Lesson,
    Quiz,
}

impl ProgressKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Lesson => "lesson",
            Self::Quiz => "quiz",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "item" => Some(Self::Item),
            "lesson" => Some(Self::Lesson),
            "quiz" => Some(Self::Quiz),
            _ => None,
        }
    }
}

/// Identifies one progress record: the `(kind, id)` pair.
///
/// Quiz progress is keyed by the lesson that owns the quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProgressKey {
    Item(ItemId),
    Lesson(LessonId),
    Quiz(LessonId),
}

impl ProgressKey {
    #[must_use]
    pub fn kind(&self) -> ProgressKind {
        match self {
            Self::Item(_) => ProgressKind::Item,
            Self::Lesson(_) => ProgressKind::Lesson,
            Self::Quiz(_) => ProgressKind::Quiz,
        }
    }

    #[must_use]
    pub fn raw_id(&self) -> u64 {
        match self {
            Self::Item(id) => id.value(),
            Self::Lesson(id) | Self::Quiz(id) => id.value(),
        }
    }

    #[must_use]
    pub fn from_parts(kind: ProgressKind, id: u64) -> Self {
        match kind {
            ProgressKind::Item => Self::Item(ItemId::new(id)),
            ProgressKind::Lesson => Self::Lesson(LessonId::new(id)),
            ProgressKind::Quiz => Self::Quiz(LessonId::new(id)),
        }
    }
}

impl fmt::Display for ProgressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.raw_id())
    }
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Progress on a single vocabulary item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemProgress {
    pub completed: bool,
    pub stars: u32,
}

impl ItemProgress {
    fn merge(&mut self, other: &Self) {
        self.completed |= other.completed;
        self.stars = self.stars.max(other.stars);
    }
}

/// Progress on a lesson. `category_id` groups lessons for category percentages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgress {
    pub completed: bool,
    pub stars: u32,
    pub category_id: Option<CategoryId>,
}

impl LessonProgress {
    fn merge(&mut self, other: &Self) {
        self.completed |= other.completed;
        self.stars = self.stars.max(other.stars);
        // Category is not monotonic: the latest stamp wins.
        if let Some(category) = &other.category_id {
            self.category_id = Some(category.clone());
        }
    }
}

/// Progress on the quiz attached to a lesson.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizProgress {
    pub completed: bool,
    pub quiz_completed: bool,
    pub quiz_score: u32,
}

impl QuizProgress {
    fn merge(&mut self, other: &Self) {
        self.completed |= other.completed;
        self.quiz_completed |= other.quiz_completed;
        self.quiz_score = self.quiz_score.max(other.quiz_score);
    }
}

/// A key paired with its record.
///
/// Used wherever a single record travels on its own: merges, outbox rows and
/// remote pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEntry {
    Item { id: ItemId, progress: ItemProgress },
    Lesson { id: LessonId, progress: LessonProgress },
    Quiz { id: LessonId, progress: QuizProgress },
}

impl ProgressEntry {
    #[must_use]
    pub fn key(&self) -> ProgressKey {
        match self {
            Self::Item { id, .. } => ProgressKey::Item(*id),
            Self::Lesson { id, .. } => ProgressKey::Lesson(*id),
            Self::Quiz { id, .. } => ProgressKey::Quiz(*id),
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        match self {
            Self::Item { progress, .. } => progress.completed,
            Self::Lesson { progress, .. } => progress.completed,
            Self::Quiz { progress, .. } => progress.completed,
        }
    }

    /// Stars carried by the record; quiz records carry none.
    #[must_use]
    pub fn stars(&self) -> u32 {
        match self {
            Self::Item { progress, .. } => progress.stars,
            Self::Lesson { progress, .. } => progress.stars,
            Self::Quiz { .. } => 0,
        }
    }

    /// Whether `self` already carries everything `other` would deliver upstream.
    ///
    /// True when both entries share a key and none of the monotonic fields of
    /// `other` is ahead of `self`. The lesson category is not compared.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Item { id, progress }, Self::Item { id: other_id, progress: theirs }) => {
                id == other_id
                    && (progress.completed || !theirs.completed)
                    && progress.stars >= theirs.stars
            }
            (Self::Lesson { id, progress }, Self::Lesson { id: other_id, progress: theirs }) => {
                id == other_id
                    && (progress.completed || !theirs.completed)
                    && progress.stars >= theirs.stars
            }
            (Self::Quiz { id, progress }, Self::Quiz { id: other_id, progress: theirs }) => {
                id == other_id
                    && (progress.completed || !theirs.completed)
                    && (progress.quiz_completed || !theirs.quiz_completed)
                    && progress.quiz_score >= theirs.quiz_score
            }
            _ => false,
        }
    }

    /// Merge `other` into `self` with the max/OR rules.
    ///
    /// Entries with different keys are left untouched and `false` is returned.
    pub fn merge(&mut self, other: &Self) -> bool {
        match (self, other) {
            (Self::Item { id, progress }, Self::Item { id: other_id, progress: incoming })
                if *id == *other_id =>
            {
                progress.merge(incoming);
                true
            }
            (Self::Lesson { id, progress }, Self::Lesson { id: other_id, progress: incoming })
                if *id == *other_id =>
            {
                progress.merge(incoming);
                true
            }
            (Self::Quiz { id, progress }, Self::Quiz { id: other_id, progress: incoming })
                if *id == *other_id =>
            {
                progress.merge(incoming);
                true
            }
            _ => false,
        }
    }
}

//
// ─── STORE ─────────────────────────────────────────────────────────────────────
//

/// All progress known for one learner.
///
/// Every write goes through [`ProgressStore::merge_entry`], so `stars`,
/// `quiz_score`, `completed` and `quiz_completed` never move backwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressStore {
    items: BTreeMap<ItemId, ItemProgress>,
    lessons: BTreeMap<LessonId, LessonProgress>,
    quizzes: BTreeMap<LessonId, QuizProgress>,
}

impl ProgressStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.lessons.is_empty() && self.quizzes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len() + self.lessons.len() + self.quizzes.len()
    }

    #[must_use]
    pub fn item(&self, id: ItemId) -> Option<&ItemProgress> {
        self.items.get(&id)
    }

    #[must_use]
    pub fn lesson(&self, id: LessonId) -> Option<&LessonProgress> {
        self.lessons.get(&id)
    }

    #[must_use]
    pub fn quiz(&self, id: LessonId) -> Option<&QuizProgress> {
        self.quizzes.get(&id)
    }

    #[must_use]
    pub fn get(&self, key: ProgressKey) -> Option<ProgressEntry> {
        match key {
            ProgressKey::Item(id) => self.items.get(&id).map(|progress| ProgressEntry::Item {
                id,
                progress: *progress,
            }),
            ProgressKey::Lesson(id) => self.lessons.get(&id).map(|progress| {
                ProgressEntry::Lesson {
                    id,
                    progress: progress.clone(),
                }
            }),
            ProgressKey::Quiz(id) => self.quizzes.get(&id).map(|progress| ProgressEntry::Quiz {
                id,
                progress: *progress,
            }),
        }
    }

    /// Iterate every record as an owned entry, items first, then lessons, then quizzes.
    pub fn entries(&self) -> impl Iterator<Item = ProgressEntry> + '_ {
        let items = self.items.iter().map(|(id, progress)| ProgressEntry::Item {
            id: *id,
            progress: *progress,
        });
        let lessons = self.lessons.iter().map(|(id, progress)| ProgressEntry::Lesson {
            id: *id,
            progress: progress.clone(),
        });
        let quizzes = self.quizzes.iter().map(|(id, progress)| ProgressEntry::Quiz {
            id: *id,
            progress: *progress,
        });
        items.chain(lessons).chain(quizzes)
    }

    /// Merge a single entry and return the record now stored under its key.
    pub fn merge_entry(&mut self, entry: &ProgressEntry) -> ProgressEntry {
        match entry {
            ProgressEntry::Item { id, progress } => {
                let current = self.items.entry(*id).or_default();
                current.merge(progress);
                ProgressEntry::Item {
                    id: *id,
                    progress: *current,
                }
            }
            ProgressEntry::Lesson { id, progress } => {
                let current = self.lessons.entry(*id).or_default();
                current.merge(progress);
                ProgressEntry::Lesson {
                    id: *id,
                    progress: current.clone(),
                }
            }
            ProgressEntry::Quiz { id, progress } => {
                let current = self.quizzes.entry(*id).or_default();
                current.merge(progress);
                ProgressEntry::Quiz {
                    id: *id,
                    progress: *current,
                }
            }
        }
    }

    /// Merge every record of `other` into `self`.
    pub fn merge(&mut self, other: &ProgressStore) {
        for entry in other.entries() {
            self.merge_entry(&entry);
        }
    }

    pub fn mark_item_completed(&mut self, id: ItemId, stars: u32) -> ProgressEntry {
        self.merge_entry(&ProgressEntry::Item {
            id,
            progress: ItemProgress {
                completed: true,
                stars,
            },
        })
    }

    pub fn mark_lesson_completed(
        &mut self,
        id: LessonId,
        stars: u32,
        category_id: CategoryId,
    ) -> ProgressEntry {
        self.merge_entry(&ProgressEntry::Lesson {
            id,
            progress: LessonProgress {
                completed: true,
                stars,
                category_id: Some(category_id),
            },
        })
    }

    pub fn mark_quiz_completed(&mut self, id: LessonId, score: u32) -> ProgressEntry {
        self.merge_entry(&ProgressEntry::Quiz {
            id,
            progress: QuizProgress {
                completed: true,
                quiz_completed: true,
                quiz_score: score,
            },
        })
    }

    #[must_use]
    pub fn is_item_completed(&self, id: ItemId) -> bool {
        self.items.get(&id).is_some_and(|p| p.completed)
    }

    #[must_use]
    pub fn item_stars(&self, id: ItemId) -> u32 {
        self.items.get(&id).map_or(0, |p| p.stars)
    }

    #[must_use]
    pub fn is_lesson_completed(&self, id: LessonId) -> bool {
        self.lessons.get(&id).is_some_and(|p| p.completed)
    }

    #[must_use]
    pub fn lesson_stars(&self, id: LessonId) -> u32 {
        self.lessons.get(&id).map_or(0, |p| p.stars)
    }

    #[must_use]
    pub fn is_quiz_completed(&self, id: LessonId) -> bool {
        self.quizzes.get(&id).is_some_and(|p| p.quiz_completed)
    }

    #[must_use]
    pub fn quiz_score(&self, id: LessonId) -> u32 {
        self.quizzes.get(&id).map_or(0, |p| p.quiz_score)
    }

    /// Number of completed item records. Lesson and quiz records are not counted.
    #[must_use]
    pub fn completed_items(&self) -> usize {
        self.items.values().filter(|p| p.completed).count()
    }

    /// Sum of stars over every record of every kind.
    ///
    /// Item and lesson stars are added together into one figure; quiz records
    /// contribute nothing.
    #[must_use]
    pub fn total_stars(&self) -> u64 {
        let items: u64 = self.items.values().map(|p| u64::from(p.stars)).sum();
        let lessons: u64 = self.lessons.values().map(|p| u64::from(p.stars)).sum();
        items + lessons
    }

    /// Share of completed items out of `total_items`, in whole percent.
    #[must_use]
    pub fn overall_completion_percentage(&self, total_items: usize) -> u32 {
        completion_percentage(self.completed_items(), total_items)
    }

    /// Share of completed lessons among the lesson records stamped with `category_id`.
    ///
    /// Returns 0 when no lesson record carries that category yet.
    #[must_use]
    pub fn category_completion_percentage(&self, category_id: &CategoryId) -> u32 {
        let (completed, total) = self
            .lessons
            .values()
            .filter(|p| p.category_id.as_ref() == Some(category_id))
            .fold((0_usize, 0_usize), |(completed, total), p| {
                (completed + usize::from(p.completed), total + 1)
            });
        completion_percentage(completed, total)
    }
}

/// `round(completed / total * 100)` clamped to `[0, 100]`; 0 when `total` is 0.
///
/// Rounds half up, like the percentages shown in the client.
#[must_use]
pub fn completion_percentage(completed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let completed = u64::try_from(completed).unwrap_or(u64::MAX);
    let total = u64::try_from(total).unwrap_or(u64::MAX);
    let scaled = completed.saturating_mul(100).saturating_add(total / 2) / total;
    u32::try_from(scaled.min(100)).unwrap_or(100)
}

/// Derived totals for summary views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSummary {
    pub total_items: usize,
    pub completed_items: usize,
    pub total_stars: u64,
    pub overall_completion_percentage: u32,
}

impl ProgressSummary {
    #[must_use]
    pub fn from_store(store: &ProgressStore, total_items: usize) -> Self {
        Self {
            total_items,
            completed_items: store.completed_items(),
            total_stars: store.total_stars(),
            overall_completion_percentage: store.overall_completion_percentage(total_items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: u64) -> ItemId {
        ItemId::new(id)
    }

    fn lesson(id: u64) -> LessonId {
        LessonId::new(id)
    }

    #[test]
    fn item_stars_keep_the_best_score() {
        for (first, second) in [(1, 3), (3, 1), (2, 2), (0, 0), (5, 0)] {
            let mut store = ProgressStore::new();
            store.mark_item_completed(item(4), first);
            store.mark_item_completed(item(4), second);
            assert_eq!(store.item_stars(item(4)), first.max(second));
            assert!(store.is_item_completed(item(4)));
        }
    }

    #[test]
    fn completed_is_never_reset_by_a_merge() {
        let mut store = ProgressStore::new();
        store.mark_item_completed(item(1), 2);
        store.merge_entry(&ProgressEntry::Item {
            id: item(1),
            progress: ItemProgress {
                completed: false,
                stars: 0,
            },
        });
        assert!(store.is_item_completed(item(1)));
        assert_eq!(store.item_stars(item(1)), 2);
    }

    #[test]
    fn missing_records_read_as_zero() {
        let store = ProgressStore::new();
        assert!(!store.is_item_completed(item(9)));
        assert_eq!(store.item_stars(item(9)), 0);
        assert!(!store.is_lesson_completed(lesson(9)));
        assert_eq!(store.lesson_stars(lesson(9)), 0);
        assert!(!store.is_quiz_completed(lesson(9)));
        assert_eq!(store.quiz_score(lesson(9)), 0);
    }

    #[test]
    fn lesson_category_is_last_write_wins() {
        let mut store = ProgressStore::new();
        store.mark_lesson_completed(lesson(2), 3, CategoryId::new("fruits"));
        store.mark_lesson_completed(lesson(2), 1, CategoryId::new("animals"));
        let record = store.lesson(lesson(2)).unwrap();
        assert_eq!(record.stars, 3);
        assert_eq!(record.category_id, Some(CategoryId::new("animals")));

        // A merge without a category keeps the stamped one.
        store.merge_entry(&ProgressEntry::Lesson {
            id: lesson(2),
            progress: LessonProgress {
                completed: true,
                stars: 4,
                category_id: None,
            },
        });
        let record = store.lesson(lesson(2)).unwrap();
        assert_eq!(record.stars, 4);
        assert_eq!(record.category_id, Some(CategoryId::new("animals")));
    }

    #[test]
    fn marking_a_lesson_twice_is_idempotent() {
        let mut once = ProgressStore::new();
        once.mark_lesson_completed(lesson(2), 3, CategoryId::new("fruits"));
        let mut twice = once.clone();
        twice.mark_lesson_completed(lesson(2), 3, CategoryId::new("fruits"));
        assert_eq!(once, twice);
    }

    #[test]
    fn quiz_score_keeps_the_best_attempt() {
        let mut store = ProgressStore::new();
        store.mark_quiz_completed(lesson(5), 3);
        let merged = store.mark_quiz_completed(lesson(5), 1);
        assert_eq!(
            merged,
            ProgressEntry::Quiz {
                id: lesson(5),
                progress: QuizProgress {
                    completed: true,
                    quiz_completed: true,
                    quiz_score: 3,
                },
            }
        );
        assert!(store.is_quiz_completed(lesson(5)));
        assert!(!store.is_lesson_completed(lesson(5)));
    }

    #[test]
    fn completed_items_ignores_lessons_and_quizzes() {
        let mut store = ProgressStore::new();
        store.mark_item_completed(item(1), 1);
        store.mark_item_completed(item(2), 2);
        store.mark_lesson_completed(lesson(1), 3, CategoryId::new("english"));
        store.mark_quiz_completed(lesson(1), 2);
        assert_eq!(store.completed_items(), 2);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn total_stars_sums_across_kinds() {
        let mut store = ProgressStore::new();
        store.mark_item_completed(item(1), 2);
        store.mark_item_completed(item(2), 1);
        store.mark_lesson_completed(lesson(1), 3, CategoryId::new("english"));
        store.mark_quiz_completed(lesson(1), 10);
        assert_eq!(store.total_stars(), 6);
    }

    #[test]
    fn percentage_stays_in_range() {
        assert_eq!(completion_percentage(0, 0), 0);
        assert_eq!(completion_percentage(5, 0), 0);
        assert_eq!(completion_percentage(0, 7), 0);
        assert_eq!(completion_percentage(1, 3), 33);
        assert_eq!(completion_percentage(2, 3), 67);
        assert_eq!(completion_percentage(1, 8), 13);
        assert_eq!(completion_percentage(3, 3), 100);
        assert_eq!(completion_percentage(10, 3), 100);
        for total in 0..20 {
            for completed in 0..40 {
                assert!(completion_percentage(completed, total) <= 100);
            }
        }
    }

    #[test]
    fn category_percentage_counts_only_matching_lessons() {
        let mut store = ProgressStore::new();
        let fruits = CategoryId::new("fruits");
        assert_eq!(store.category_completion_percentage(&fruits), 0);

        store.mark_lesson_completed(lesson(1), 1, fruits.clone());
        store.merge_entry(&ProgressEntry::Lesson {
            id: lesson(2),
            progress: LessonProgress {
                completed: false,
                stars: 0,
                category_id: Some(fruits.clone()),
            },
        });
        store.mark_lesson_completed(lesson(3), 1, CategoryId::new("animals"));

        assert_eq!(store.category_completion_percentage(&fruits), 50);
        assert_eq!(
            store.category_completion_percentage(&CategoryId::new("animals")),
            100
        );
        assert_eq!(
            store.category_completion_percentage(&CategoryId::new("colors")),
            0
        );
    }

    #[test]
    fn merge_combines_two_stores() {
        let mut local = ProgressStore::new();
        local.mark_item_completed(item(1), 3);
        local.mark_quiz_completed(lesson(1), 1);

        let mut remote = ProgressStore::new();
        remote.mark_item_completed(item(1), 1);
        remote.mark_item_completed(item(2), 2);
        remote.mark_quiz_completed(lesson(1), 4);

        local.merge(&remote);
        assert_eq!(local.item_stars(item(1)), 3);
        assert_eq!(local.item_stars(item(2)), 2);
        assert_eq!(local.quiz_score(lesson(1)), 4);
    }

    #[test]
    fn entry_merge_rejects_other_keys() {
        let mut entry = ProgressEntry::Item {
            id: item(1),
            progress: ItemProgress::default(),
        };
        let other = ProgressEntry::Quiz {
            id: lesson(1),
            progress: QuizProgress::default(),
        };
        assert!(!entry.merge(&other));
        assert_eq!(entry.key(), ProgressKey::Item(item(1)));
    }

    #[test]
    fn covers_ignores_category_but_not_scores() {
        let newer = ProgressEntry::Lesson {
            id: lesson(2),
            progress: LessonProgress {
                completed: true,
                stars: 3,
                category_id: Some(CategoryId::new("fruits")),
            },
        };
        let older = ProgressEntry::Lesson {
            id: lesson(2),
            progress: LessonProgress {
                completed: true,
                stars: 2,
                category_id: Some(CategoryId::new("animals")),
            },
        };
        assert!(newer.covers(&older));
        assert!(!older.covers(&newer));
        assert!(!newer.covers(&ProgressEntry::Lesson {
            id: lesson(3),
            progress: LessonProgress::default(),
        }));
    }

    #[test]
    fn key_round_trips_through_parts() {
        let key = ProgressKey::Quiz(lesson(12));
        assert_eq!(key.to_string(), "quiz:12");
        let kind = ProgressKind::parse(key.kind().as_str()).unwrap();
        assert_eq!(ProgressKey::from_parts(kind, key.raw_id()), key);
    }

    #[test]
    fn summary_reflects_store() {
        let mut store = ProgressStore::new();
        store.mark_item_completed(item(1), 2);
        let summary = ProgressSummary::from_store(&store, 4);
        assert_eq!(summary.completed_items, 1);
        assert_eq!(summary.total_stars, 2);
        assert_eq!(summary.overall_completion_percentage, 25);
    }
}
