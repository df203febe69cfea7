use lesson_core::model::{LessonId, LessonQuestion, NewLessonQuestion};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    db_err, learner_id_from_i64, lesson_id_from_i64, question_id_from_i64, ser, to_i64,
};
use crate::repository::{QuestionRepository, StorageError};

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn post_question(
        &self,
        question: NewLessonQuestion,
    ) -> Result<LessonQuestion, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO lesson_questions (lesson_id, learner_id, body, posted_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(to_i64("lesson_id", question.lesson_id().value())?)
        .bind(to_i64("learner_id", question.learner_id().value())?)
        .bind(question.text())
        .bind(question.posted_at())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let id = question_id_from_i64(res.last_insert_rowid())?;
        Ok(question.with_id(id))
    }

    async fn list_questions(
        &self,
        lesson_id: LessonId,
    ) -> Result<Vec<LessonQuestion>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, lesson_id, learner_id, body, posted_at
            FROM lesson_questions
            WHERE lesson_id = ?1
            ORDER BY posted_at ASC, id ASC
            ",
        )
        .bind(to_i64("lesson_id", lesson_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in rows {
            questions.push(
                LessonQuestion::from_persisted(
                    question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
                    lesson_id_from_i64(row.try_get::<i64, _>("lesson_id").map_err(ser)?)?,
                    learner_id_from_i64(row.try_get::<i64, _>("learner_id").map_err(ser)?)?,
                    row.try_get::<String, _>("body").map_err(ser)?,
                    row.try_get("posted_at").map_err(ser)?,
                )
                .map_err(ser)?,
            );
        }
        Ok(questions)
    }
}
