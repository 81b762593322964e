use crate::error::ContentError;
use crate::model::progress::completion_percentage;

/// How well a quiz went, as shown on the results screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizTier {
    /// 70% or more.
    Excellent,
    /// 40% up to 69%.
    Good,
    TryAgain,
}

impl QuizTier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::TryAgain => "try again",
        }
    }
}

/// Graded outcome of one quiz attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizResult {
    score: u32,
    total: u32,
    percentage: u32,
}

impl QuizResult {
    /// Grade `score` correct answers out of `total` questions.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::NoQuestions` for an empty quiz and
    /// `ContentError::ScoreOutOfRange` if `score > total`.
    pub fn grade(score: u32, total: u32) -> Result<Self, ContentError> {
        if total == 0 {
            return Err(ContentError::NoQuestions);
        }
        if score > total {
            return Err(ContentError::ScoreOutOfRange { score, total });
        }
        let percentage = completion_percentage(score as usize, total as usize);
        Ok(Self {
            score,
            total,
            percentage,
        })
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub fn percentage(&self) -> u32 {
        self.percentage
    }

    #[must_use]
    pub fn tier(&self) -> QuizTier {
        match self.percentage {
            70.. => QuizTier::Excellent,
            40..=69 => QuizTier::Good,
            _ => QuizTier::TryAgain,
        }
    }
}
