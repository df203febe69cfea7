use std::collections::BTreeSet;

use lesson_core::model::{CourseId, Lesson, LessonId};
use sqlx::{Row, SqliteConnection};

use super::SqliteRepository;
use super::mapping::{
    LESSON_COLUMNS, db_err, lesson_id_from_i64, map_lesson_row, quiz_to_json, ser, to_i64,
};
use crate::repository::{LessonRepository, StorageError};

#[async_trait::async_trait]
impl LessonRepository for SqliteRepository {
    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        write_lesson(&mut conn, lesson).await
    }

    async fn upsert_lessons(&self, lessons: &[Lesson]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Lift the batch's existing rows off their slots so members can swap.
        for lesson in lessons {
            sqlx::query("UPDATE lessons SET ord = -ord WHERE id = ?1")
                .bind(to_i64("lesson_id", lesson.id().value())?)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        for lesson in lessons {
            write_lesson(&mut tx, lesson).await?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Lesson, StorageError> {
        let sql = format!("SELECT {LESSON_COLUMNS} FROM lessons WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(to_i64("lesson_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(StorageError::NotFound)?;
        map_lesson_row(&row)
    }

    async fn list_lessons(&self, course_id: CourseId) -> Result<Vec<Lesson>, StorageError> {
        let sql = format!("SELECT {LESSON_COLUMNS} FROM lessons WHERE course_id = ?1");
        let rows = sqlx::query(&sql)
            .bind(to_i64("course_id", course_id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut lessons = Vec::with_capacity(rows.len());
        for row in rows {
            lessons.push(map_lesson_row(&row)?);
        }
        Ok(lessons)
    }

    async fn delete_lesson(&self, id: LessonId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM lessons WHERE id = ?1")
            .bind(to_i64("lesson_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn reorder_lessons(
        &self,
        course_id: CourseId,
        ordered: &[LessonId],
    ) -> Result<(), StorageError> {
        let course = to_i64("course_id", course_id.value())?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let rows = sqlx::query("SELECT id FROM lessons WHERE course_id = ?1")
            .bind(course)
            .fetch_all(&mut *tx)
            .await
            .map_err(db_err)?;
        let mut existing = BTreeSet::new();
        for row in rows {
            existing.insert(lesson_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?);
        }
        let wanted: BTreeSet<LessonId> = ordered.iter().copied().collect();
        if wanted.len() != ordered.len() || wanted != existing {
            return Err(StorageError::Conflict);
        }

        // (course_id, ord) is unique: park every row on a negative slot first.
        sqlx::query("UPDATE lessons SET ord = -ord WHERE course_id = ?1")
            .bind(course)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for (slot, id) in (1_i64..).zip(ordered) {
            sqlx::query("UPDATE lessons SET ord = ?1 WHERE id = ?2 AND course_id = ?3")
                .bind(slot)
                .bind(to_i64("lesson_id", id.value())?)
                .bind(course)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}

async fn write_lesson(conn: &mut SqliteConnection, lesson: &Lesson) -> Result<(), StorageError> {
    sqlx::query(
        r"
        INSERT INTO lessons (id, course_id, ord, title, is_preview, duration_minutes, quiz_json)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            course_id = excluded.course_id,
            ord = excluded.ord,
            title = excluded.title,
            is_preview = excluded.is_preview,
            duration_minutes = excluded.duration_minutes,
            quiz_json = excluded.quiz_json
        ",
    )
    .bind(to_i64("lesson_id", lesson.id().value())?)
    .bind(to_i64("course_id", lesson.course_id().value())?)
    .bind(i64::from(lesson.order()))
    .bind(lesson.title())
    .bind(i64::from(lesson.is_preview()))
    .bind(lesson.duration_minutes().map(i64::from))
    .bind(quiz_to_json(lesson)?)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;
    Ok(())
}
