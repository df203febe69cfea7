use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, LessonId};
use crate::model::quiz::{Quiz, QuizDraft, QuizError};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LessonError {
    #[error("lesson title cannot be empty")]
    EmptyTitle,

    #[error("lesson order must be >= 1")]
    InvalidOrder,

    #[error("lesson duration must be > 0 minutes")]
    InvalidDuration,

    #[error("invalid quiz: {0}")]
    Quiz(#[from] QuizError),
}

//
// ─── LESSON ────────────────────────────────────────────────────────────────────
//

/// One step of a course curriculum.
///
/// `order` is the sequencing key. Preview lessons bypass locking entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    id: LessonId,
    course_id: CourseId,
    order: u32,
    title: String,
    is_preview: bool,
    duration_minutes: Option<u32>,
    quiz: Option<Quiz>,
}

impl Lesson {
    #[must_use]
    pub fn id(&self) -> LessonId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn order(&self) -> u32 {
        self.order
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn is_preview(&self) -> bool {
        self.is_preview
    }

    #[must_use]
    pub fn duration_minutes(&self) -> Option<u32> {
        self.duration_minutes
    }

    #[must_use]
    pub fn quiz(&self) -> Option<&Quiz> {
        self.quiz.as_ref()
    }

    /// The quiz, if it has at least one question.
    #[must_use]
    pub fn gating_quiz(&self) -> Option<&Quiz> {
        self.quiz.as_ref().filter(|q| q.is_gating())
    }

    /// Returns a copy renumbered to `order`. Used by batch reordering.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::InvalidOrder` if `order` is zero.
    pub fn with_order(&self, order: u32) -> Result<Self, LessonError> {
        if order == 0 {
            return Err(LessonError::InvalidOrder);
        }
        Ok(Self {
            order,
            ..self.clone()
        })
    }

    #[must_use]
    pub fn to_draft(&self) -> LessonDraft {
        LessonDraft {
            id: self.id,
            course_id: self.course_id,
            order: self.order,
            title: self.title.clone(),
            is_preview: self.is_preview,
            duration_minutes: self.duration_minutes,
            quiz: self.quiz.as_ref().map(Quiz::to_draft),
        }
    }
}

/// Unvalidated lesson in the shape the lesson read API returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonDraft {
    pub id: LessonId,
    pub course_id: CourseId,
    pub order: u32,
    pub title: String,
    #[serde(default)]
    pub is_preview: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz: Option<QuizDraft>,
}

impl LessonDraft {
    /// Validate and normalize the draft into a `Lesson`.
    ///
    /// # Errors
    ///
    /// Returns `LessonError` for an empty title, a zero order or duration, or an invalid quiz.
    pub fn validate(self) -> Result<Lesson, LessonError> {
        let title = self.title.trim().to_owned();
        if title.is_empty() {
            return Err(LessonError::EmptyTitle);
        }
        if self.order == 0 {
            return Err(LessonError::InvalidOrder);
        }
        if self.duration_minutes == Some(0) {
            return Err(LessonError::InvalidDuration);
        }
        let quiz = self.quiz.map(QuizDraft::validate).transpose()?;

        Ok(Lesson {
            id: self.id,
            course_id: self.course_id,
            order: self.order,
            title,
            is_preview: self.is_preview,
            duration_minutes: self.duration_minutes,
            quiz,
        })
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
