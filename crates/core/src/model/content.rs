//! Lesson content as served by the content API.
//!
//! Only the parts the progress layer needs are modelled: item counts for the
//! completion percentage, category ownership of lessons, and premium flags.

use serde::{Deserialize, Serialize};

use crate::error::ContentError;
use crate::model::ids::{CategoryId, ItemId, LessonId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemNames {
    pub english: String,
    pub malay: String,
    pub arabic: String,
}

/// A vocabulary entry: one picture and its name in three languages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageItem {
    pub id: ItemId,
    pub image: String,
    pub names: ItemNames,
    #[serde(default)]
    pub is_premium: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: u64,
    pub question: String,
    #[serde(default)]
    pub image: Option<String>,
    pub options: Vec<String>,
    pub correct_answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: LessonId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default)]
    pub items: Vec<ImageItem>,
    #[serde(default)]
    pub quiz: Option<Quiz>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

/// Whether the learner may open a piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Open,
    Locked,
}

impl Access {
    /// Premium content is locked unless the learner has premium.
    #[must_use]
    pub fn for_content(is_premium: bool, has_premium: bool) -> Self {
        if is_premium && !has_premium {
            Self::Locked
        } else {
            Self::Open
        }
    }

    #[must_use]
    pub fn is_locked(self) -> bool {
        matches!(self, Self::Locked)
    }
}

/// The full category tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    categories: Vec<Category>,
}

impl Catalog {
    #[must_use]
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    #[must_use]
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Number of items across every lesson. This is the denominator of the
    /// overall completion percentage.
    #[must_use]
    pub fn total_items(&self) -> usize {
        self.categories
            .iter()
            .flat_map(|category| &category.lessons)
            .map(|lesson| lesson.items.len())
            .sum()
    }

    /// # Errors
    ///
    /// Returns `ContentError::UnknownCategory` if no category has this id.
    pub fn category(&self, id: &CategoryId) -> Result<&Category, ContentError> {
        self.categories
            .iter()
            .find(|category| &category.id == id)
            .ok_or_else(|| ContentError::UnknownCategory(id.clone()))
    }

    /// Find a lesson and the category that owns it.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::UnknownLesson` if no category contains the lesson.
    pub fn lesson(&self, id: LessonId) -> Result<(&Lesson, &CategoryId), ContentError> {
        self.categories
            .iter()
            .find_map(|category| {
                category
                    .lessons
                    .iter()
                    .find(|lesson| lesson.id == id)
                    .map(|lesson| (lesson, &category.id))
            })
            .ok_or(ContentError::UnknownLesson(id))
    }

    /// # Errors
    ///
    /// Returns `ContentError::UnknownLesson` for a missing lesson and
    /// `ContentError::EmptyLesson` when the lesson has no items.
    pub fn lesson_items(&self, id: LessonId) -> Result<&[ImageItem], ContentError> {
        let (lesson, _) = self.lesson(id)?;
        if lesson.items.is_empty() {
            return Err(ContentError::EmptyLesson(id));
        }
        Ok(&lesson.items)
    }

    /// A lesson is locked if it or its category is premium.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::UnknownLesson` if the lesson does not exist.
    pub fn lesson_access(&self, id: LessonId, has_premium: bool) -> Result<Access, ContentError> {
        let (lesson, category_id) = self.lesson(id)?;
        let category = self.category(category_id)?;
        Ok(Access::for_content(
            lesson.is_premium || category.is_premium,
            has_premium,
        ))
    }

    /// A lesson the learner can actually open: unlocked and with items.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::Locked` for premium content without premium,
    /// `ContentError::EmptyLesson` for a lesson without items and
    /// `ContentError::UnknownLesson` for a missing lesson.
    pub fn playable_lesson(
        &self,
        id: LessonId,
        has_premium: bool,
    ) -> Result<(&Lesson, &CategoryId), ContentError> {
        if self.lesson_access(id, has_premium)?.is_locked() {
            return Err(ContentError::Locked(id));
        }
        self.lesson_items(id)?;
        self.lesson(id)
    }
}
