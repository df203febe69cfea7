use thiserror::Error;

use crate::model::{Lesson, Percentage, Quiz, QuizError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GatingConfigError {
    #[error("quiz default passing score: {0}")]
    QuizDefault(QuizError),
    #[error("gate default passing score: {0}")]
    GateDefault(QuizError),
}

/// Fallback passing scores for quizzes whose content does not set one.
///
/// The two values are independent: `quiz_default` decides whether a submission
/// counts as passed (and so completes the lesson), `gate_default` decides whether
/// the lesson's quiz still blocks forward navigation and unlocking.
/// A quiz's own `passing_score` always wins over both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatingConfig {
    quiz_default: Percentage,
    gate_default: Percentage,
}

impl GatingConfig {
    pub const DEFAULT_PASSING_SCORE: u16 = 70;
    pub const LEGACY_GATE_PASSING_SCORE: u16 = 75;

    /// # Errors
    ///
    /// Returns `GatingConfigError` if either value exceeds 100.
    pub fn new(quiz_default: u16, gate_default: u16) -> Result<Self, GatingConfigError> {
        Ok(Self {
            quiz_default: Percentage::new(quiz_default).map_err(GatingConfigError::QuizDefault)?,
            gate_default: Percentage::new(gate_default).map_err(GatingConfigError::GateDefault)?,
        })
    }

    /// 70 for content, 75 for the gate.
    #[must_use]
    pub fn legacy() -> Self {
        Self {
            quiz_default: pct(Self::DEFAULT_PASSING_SCORE),
            gate_default: pct(Self::LEGACY_GATE_PASSING_SCORE),
        }
    }

    #[must_use]
    pub fn quiz_default(&self) -> Percentage {
        self.quiz_default
    }

    #[must_use]
    pub fn gate_default(&self) -> Percentage {
        self.gate_default
    }

    /// Threshold for scoring a submission.
    #[must_use]
    pub fn submission_threshold(&self, quiz: &Quiz) -> Percentage {
        quiz.passing_score().unwrap_or(self.quiz_default)
    }

    /// Threshold for treating a stored score as unlocking.
    #[must_use]
    pub fn gate_threshold(&self, quiz: &Quiz) -> Percentage {
        quiz.passing_score().unwrap_or(self.gate_default)
    }

    /// Whether `lesson` has a gating quiz the enrollment has not yet cleared.
    #[must_use]
    pub fn quiz_blocks(&self, lesson: &Lesson, score: Option<Percentage>) -> bool {
        lesson
            .gating_quiz()
            .is_some_and(|quiz| score.is_none_or(|s| s < self.gate_threshold(quiz)))
    }
}

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            quiz_default: pct(Self::DEFAULT_PASSING_SCORE),
            gate_default: pct(Self::DEFAULT_PASSING_SCORE),
        }
    }
}

fn pct(value: u16) -> Percentage {
    Percentage::new(value).unwrap_or(Percentage::FULL)
}
