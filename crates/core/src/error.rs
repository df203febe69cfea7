use thiserror::Error;

use crate::config::GatingConfigError;
use crate::gate::GateError;
use crate::lock::LockError;
use crate::model::{
    CurriculumError, LessonError, LessonQuestionError, ParseIdError, ProgressError, QuizError,
};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Lesson(#[from] LessonError),
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    Question(#[from] LessonQuestionError),
    #[error(transparent)]
    Curriculum(#[from] CurriculumError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Config(#[from] GatingConfigError),
    #[error(transparent)]
    Id(#[from] ParseIdError),
}
