use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{LearnerId, LessonId, QuestionId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LessonQuestionError {
    #[error("question text cannot be empty")]
    EmptyText,
}

/// Question text as submitted, before it has been persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLessonQuestion {
    lesson_id: LessonId,
    learner_id: LearnerId,
    text: String,
    posted_at: DateTime<Utc>,
}

impl NewLessonQuestion {
    /// # Errors
    ///
    /// Returns `LessonQuestionError::EmptyText` if the trimmed text is empty.
    pub fn new(
        lesson_id: LessonId,
        learner_id: LearnerId,
        text: impl Into<String>,
        posted_at: DateTime<Utc>,
    ) -> Result<Self, LessonQuestionError> {
        let text = text.into().trim().to_owned();
        if text.is_empty() {
            return Err(LessonQuestionError::EmptyText);
        }
        Ok(Self {
            lesson_id,
            learner_id,
            text,
            posted_at,
        })
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn learner_id(&self) -> LearnerId {
        self.learner_id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn posted_at(&self) -> DateTime<Utc> {
        self.posted_at
    }

    /// Attach the id assigned by storage.
    #[must_use]
    pub fn with_id(self, id: QuestionId) -> LessonQuestion {
        LessonQuestion {
            id,
            lesson_id: self.lesson_id,
            learner_id: self.learner_id,
            text: self.text,
            posted_at: self.posted_at,
        }
    }
}

/// A learner's question posted on a lesson page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonQuestion {
    id: QuestionId,
    lesson_id: LessonId,
    learner_id: LearnerId,
    text: String,
    posted_at: DateTime<Utc>,
}

impl LessonQuestion {
    /// Rehydrate a stored question.
    ///
    /// # Errors
    ///
    /// Returns `LessonQuestionError::EmptyText` if the stored text is blank.
    pub fn from_persisted(
        id: QuestionId,
        lesson_id: LessonId,
        learner_id: LearnerId,
        text: String,
        posted_at: DateTime<Utc>,
    ) -> Result<Self, LessonQuestionError> {
        Ok(NewLessonQuestion::new(lesson_id, learner_id, text, posted_at)?.with_id(id))
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn learner_id(&self) -> LearnerId {
        self.learner_id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn posted_at(&self) -> DateTime<Utc> {
        self.posted_at
    }
}
