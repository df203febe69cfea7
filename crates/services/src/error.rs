//! Shared error types for the services crate.

use thiserror::Error;

use lesson_core::gate::GateError;
use lesson_core::lock::{LockError, LockReason};
use lesson_core::model::{
    CourseId, CurriculumError, LessonError, LessonId, LessonQuestionError, QuizError,
};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `LessonPageService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LessonPageError {
    /// The course or lesson is missing. The page shows an empty state.
    #[error("lesson or course not found")]
    NotFound,
    #[error("lesson {lesson} is locked")]
    Locked { lesson: LessonId, reason: LockReason },
    /// Rejected before anything was sent to storage.
    #[error("invalid submission: {0}")]
    Validation(#[source] QuizError),
    #[error("a submission for this quiz is already in flight")]
    AlreadySubmitting,
    /// A progress write failed. Nothing was unlocked and quiz answers are kept.
    #[error("unable to save progress: {0}")]
    Mutation(#[source] StorageError),
    #[error(transparent)]
    Gate(GateError),
    #[error(transparent)]
    Curriculum(#[from] CurriculumError),
    #[error("unable to load: {0}")]
    Storage(#[source] StorageError),
}

impl LessonPageError {
    /// Whether asking the learner to try again makes sense.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Mutation(_) | Self::Storage(StorageError::Connection(_))
        )
    }
}

impl From<StorageError> for LessonPageError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => Self::NotFound,
            other => Self::Storage(other),
        }
    }
}

impl From<GateError> for LessonPageError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::AlreadySubmitting => Self::AlreadySubmitting,
            GateError::Quiz(quiz) => Self::Validation(quiz),
            GateError::Lock(LockError::UnknownLesson(_)) => Self::NotFound,
            other => Self::Gate(other),
        }
    }
}

impl From<LockError> for LessonPageError {
    fn from(e: LockError) -> Self {
        GateError::from(e).into()
    }
}

/// Errors emitted by `CurriculumService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CurriculumServiceError {
    #[error("course {0} has no lessons")]
    EmptyCourse(CourseId),
    #[error("reorder must list every lesson of the course exactly once")]
    ReorderMismatch {
        missing: Vec<LessonId>,
        unexpected: Vec<LessonId>,
    },
    #[error("order {order} is already taken in course {course}")]
    OrderTaken { course: CourseId, order: u32 },
    #[error(transparent)]
    Lesson(#[from] LessonError),
    #[error(transparent)]
    Curriculum(#[from] CurriculumError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `QuestionService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuestionServiceError {
    #[error(transparent)]
    Question(#[from] LessonQuestionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
