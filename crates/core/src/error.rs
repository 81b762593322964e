use thiserror::Error;

use crate::model::{CategoryId, LessonId};

/// Missing or incomplete content. Callers render these as empty states.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContentError {
    #[error("lesson {0} does not exist")]
    UnknownLesson(LessonId),

    #[error("category {0} does not exist")]
    UnknownCategory(CategoryId),

    #[error("lesson {0} has no items")]
    EmptyLesson(LessonId),

    #[error("lesson {0} needs premium")]
    Locked(LessonId),

    #[error("quiz has no questions")]
    NoQuestions,

    #[error("score {score} is higher than the {total} questions asked")]
    ScoreOutOfRange { score: u32, total: u32 },
}
