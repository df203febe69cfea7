use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use lesson_core::model::{
    CourseId, Enrollment, EnrollmentStatus, LearnerId, LessonId, ProgressUpdate,
};
use sqlx::{Row, SqliteConnection};

use super::SqliteRepository;
use super::mapping::{
    course_id_from_i64, db_err, learner_id_from_i64, lesson_id_from_i64, percentage_from_i64,
    ser, to_i64,
};
use crate::repository::{ProgressRepository, StorageError};

#[derive(Clone, Copy)]
struct Key {
    learner: i64,
    course: i64,
}

impl Key {
    fn new(learner_id: LearnerId, course_id: CourseId) -> Result<Self, StorageError> {
        Ok(Self {
            learner: to_i64("learner_id", learner_id.value())?,
            course: to_i64("course_id", course_id.value())?,
        })
    }
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn enroll(
        &self,
        learner_id: LearnerId,
        course_id: CourseId,
        now: DateTime<Utc>,
    ) -> Result<Enrollment, StorageError> {
        let key = Key::new(learner_id, course_id)?;
        let fresh = Enrollment::new(learner_id, course_id, now);
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r"
            INSERT INTO enrollments (learner_id, course_id, progress_percent, status, enrolled_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(learner_id, course_id) DO NOTHING
            ",
        )
        .bind(key.learner)
        .bind(key.course)
        .bind(i64::from(fresh.progress_percent().value()))
        .bind(fresh.status().as_str())
        .bind(fresh.enrolled_at())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let enrollment = load_enrollment(&mut tx, key)
            .await?
            .ok_or(StorageError::NotFound)?;
        tx.commit().await.map_err(db_err)?;
        Ok(enrollment)
    }

    async fn get_progress(
        &self,
        learner_id: LearnerId,
        course_id: CourseId,
    ) -> Result<Enrollment, StorageError> {
        let key = Key::new(learner_id, course_id)?;
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        load_enrollment(&mut conn, key)
            .await?
            .ok_or(StorageError::NotFound)
    }

    async fn update_progress(
        &self,
        learner_id: LearnerId,
        course_id: CourseId,
        update: &ProgressUpdate,
        now: DateTime<Utc>,
    ) -> Result<Enrollment, StorageError> {
        let key = Key::new(learner_id, course_id)?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let mut enrollment = load_enrollment(&mut tx, key)
            .await?
            .ok_or(StorageError::NotFound)?;
        let lesson_ids = course_lesson_ids(&mut tx, key.course).await?;
        enrollment.apply(update, &lesson_ids, now);
        write_enrollment(&mut tx, key, &enrollment).await?;

        tx.commit().await.map_err(db_err)?;
        Ok(enrollment)
    }
}

async fn course_lesson_ids(
    conn: &mut SqliteConnection,
    course: i64,
) -> Result<Vec<LessonId>, StorageError> {
    let rows = sqlx::query("SELECT id FROM lessons WHERE course_id = ?1")
        .bind(course)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;
    rows.iter()
        .map(|row| lesson_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?))
        .collect()
}

async fn load_enrollment(
    conn: &mut SqliteConnection,
    key: Key,
) -> Result<Option<Enrollment>, StorageError> {
    let Some(row) = sqlx::query(
        r"
        SELECT learner_id, course_id, progress_percent, status, last_accessed_lesson_id,
               last_accessed_at, enrolled_at, completed_at
        FROM enrollments
        WHERE learner_id = ?1 AND course_id = ?2
        ",
    )
    .bind(key.learner)
    .bind(key.course)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err)?
    else {
        return Ok(None);
    };

    let completed_rows = sqlx::query(
        "SELECT lesson_id FROM lesson_completions WHERE learner_id = ?1 AND course_id = ?2",
    )
    .bind(key.learner)
    .bind(key.course)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;
    let mut completed = BTreeSet::new();
    for r in &completed_rows {
        completed.insert(lesson_id_from_i64(r.try_get::<i64, _>("lesson_id").map_err(ser)?)?);
    }

    let score_rows = sqlx::query(
        "SELECT lesson_id, score FROM quiz_scores WHERE learner_id = ?1 AND course_id = ?2",
    )
    .bind(key.learner)
    .bind(key.course)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;
    let mut scores = BTreeMap::new();
    for r in &score_rows {
        scores.insert(
            lesson_id_from_i64(r.try_get::<i64, _>("lesson_id").map_err(ser)?)?,
            percentage_from_i64("score", r.try_get::<i64, _>("score").map_err(ser)?)?,
        );
    }

    let status: String = row.try_get("status").map_err(ser)?;
    let enrollment = Enrollment::from_persisted(
        learner_id_from_i64(row.try_get::<i64, _>("learner_id").map_err(ser)?)?,
        course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
        completed,
        scores,
        row.try_get::<Option<i64>, _>("last_accessed_lesson_id")
            .map_err(ser)?
            .map(lesson_id_from_i64)
            .transpose()?,
        row.try_get("last_accessed_at").map_err(ser)?,
        percentage_from_i64(
            "progress_percent",
            row.try_get::<i64, _>("progress_percent").map_err(ser)?,
        )?,
        EnrollmentStatus::parse(&status).map_err(ser)?,
        row.try_get("enrolled_at").map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
    )
    .map_err(ser)?;
    Ok(Some(enrollment))
}

async fn write_enrollment(
    conn: &mut SqliteConnection,
    key: Key,
    enrollment: &Enrollment,
) -> Result<(), StorageError> {
    sqlx::query(
        r"
        UPDATE enrollments SET
            progress_percent = ?3,
            status = ?4,
            last_accessed_lesson_id = ?5,
            last_accessed_at = ?6,
            completed_at = ?7
        WHERE learner_id = ?1 AND course_id = ?2
        ",
    )
    .bind(key.learner)
    .bind(key.course)
    .bind(i64::from(enrollment.progress_percent().value()))
    .bind(enrollment.status().as_str())
    .bind(
        enrollment
            .last_accessed()
            .map(|id| to_i64("lesson_id", id.value()))
            .transpose()?,
    )
    .bind(enrollment.last_accessed_at())
    .bind(enrollment.completed_at())
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    for lesson in enrollment.completed_lessons() {
        sqlx::query(
            r"
            INSERT INTO lesson_completions (learner_id, course_id, lesson_id)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(learner_id, course_id, lesson_id) DO NOTHING
            ",
        )
        .bind(key.learner)
        .bind(key.course)
        .bind(to_i64("lesson_id", lesson.value())?)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    }

    for (lesson, score) in enrollment.quiz_scores() {
        sqlx::query(
            r"
            INSERT INTO quiz_scores (learner_id, course_id, lesson_id, score)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(learner_id, course_id, lesson_id) DO UPDATE SET score = excluded.score
            ",
        )
        .bind(key.learner)
        .bind(key.course)
        .bind(to_i64("lesson_id", lesson.value())?)
        .bind(i64::from(score.value()))
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    }

    Ok(())
}
