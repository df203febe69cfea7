use lesson_core::model::{
    CourseId, LearnerId, Lesson, LessonDraft, LessonId, Percentage, QuestionId, QuizDraft,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Unique-constraint violations surface as `Conflict`; everything else is a
/// connection-level failure.
pub(crate) fn db_err(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        sqlx::Error::RowNotFound => StorageError::NotFound,
        _ => StorageError::Connection(e.to_string()),
    }
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn lesson_id_from_i64(v: i64) -> Result<LessonId, StorageError> {
    Ok(LessonId::new(i64_to_u64("lesson_id", v)?))
}

pub(crate) fn course_id_from_i64(v: i64) -> Result<CourseId, StorageError> {
    Ok(CourseId::new(i64_to_u64("course_id", v)?))
}

pub(crate) fn learner_id_from_i64(v: i64) -> Result<LearnerId, StorageError> {
    Ok(LearnerId::new(i64_to_u64("learner_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn percentage_from_i64(field: &'static str, v: i64) -> Result<Percentage, StorageError> {
    let raw = u16::try_from(v)
        .map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))?;
    Percentage::new(raw).map_err(ser)
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) const LESSON_COLUMNS: &str =
    "id, course_id, ord, title, is_preview, duration_minutes, quiz_json";

pub(crate) fn quiz_to_json(lesson: &Lesson) -> Result<Option<String>, StorageError> {
    lesson
        .quiz()
        .map(|quiz| serde_json::to_string(&quiz.to_draft()).map_err(ser))
        .transpose()
}

/// Rebuild a lesson through the same validation as a freshly authored one.
pub(crate) fn map_lesson_row(row: &SqliteRow) -> Result<Lesson, StorageError> {
    let quiz = row
        .try_get::<Option<String>, _>("quiz_json")
        .map_err(ser)?
        .map(|json| serde_json::from_str::<QuizDraft>(&json).map_err(ser))
        .transpose()?;

    LessonDraft {
        id: lesson_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        course_id: course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
        order: u32_from_i64("ord", row.try_get::<i64, _>("ord").map_err(ser)?)?,
        title: row.try_get::<String, _>("title").map_err(ser)?,
        is_preview: row.try_get::<i64, _>("is_preview").map_err(ser)? != 0,
        duration_minutes: row
            .try_get::<Option<i64>, _>("duration_minutes")
            .map_err(ser)?
            .map(|v| u32_from_i64("duration_minutes", v))
            .transpose()?,
        quiz,
    }
    .validate()
    .map_err(ser)
}
