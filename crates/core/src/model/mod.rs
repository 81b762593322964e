pub mod content;
mod ids;
mod progress;
mod quiz;

pub use content::{Access, Catalog, Category, ImageItem, ItemNames, Lesson, Quiz, QuizQuestion};
pub use ids::{CategoryId, ItemId, LessonId, ParseIdError};

pub use progress::{
    ItemProgress, LessonProgress, ProgressEntry, ProgressKey, ProgressKind, ProgressStore,
    ProgressSummary, QuizProgress, completion_percentage,
};
pub use quiz::{QuizResult, QuizTier};
