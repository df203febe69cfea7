use std::sync::Arc;

use lesson_core::model::{LearnerId, LessonId, LessonQuestion, NewLessonQuestion};
use storage::repository::{LessonRepository, QuestionRepository};

use crate::Clock;
use crate::error::QuestionServiceError;

/// Lesson Q&A.
#[derive(Clone)]
pub struct QuestionService {
    clock: Clock,
    lessons: Arc<dyn LessonRepository>,
    questions: Arc<dyn QuestionRepository>,
}

impl QuestionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        lessons: Arc<dyn LessonRepository>,
        questions: Arc<dyn QuestionRepository>,
    ) -> Self {
        Self {
            clock,
            lessons,
            questions,
        }
    }

    /// Post a question on an existing lesson.
    ///
    /// # Errors
    ///
    /// Returns `QuestionServiceError::Question` for blank text and
    /// `QuestionServiceError::Storage` for a missing lesson or write failure.
    pub async fn post_question(
        &self,
        lesson_id: LessonId,
        learner_id: LearnerId,
        text: &str,
    ) -> Result<LessonQuestion, QuestionServiceError> {
        let question = NewLessonQuestion::new(lesson_id, learner_id, text, self.clock.now())?;
        self.lessons.get_lesson(lesson_id).await?;
        let stored = self.questions.post_question(question).await?;
        tracing::info!(question = %stored.id(), lesson = %lesson_id, "question posted");
        Ok(stored)
    }

    /// Questions on a lesson, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `QuestionServiceError::Storage` if repository access fails.
    pub async fn list_questions(
        &self,
        lesson_id: LessonId,
    ) -> Result<Vec<LessonQuestion>, QuestionServiceError> {
        Ok(self.questions.list_questions(lesson_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lesson_core::model::{CourseId, LessonDraft, LessonQuestionError};
    use lesson_core::time::{fixed_clock, fixed_now};
    use storage::repository::{InMemoryRepository, StorageError};

    async fn service() -> QuestionService {
        let repo = InMemoryRepository::new();
        let lesson = LessonDraft {
            id: LessonId::new(1),
            course_id: CourseId::new(1),
            order: 1,
            title: "Intro".into(),
            is_preview: true,
            duration_minutes: Some(5),
            quiz: None,
        }
        .validate()
        .unwrap();
        repo.upsert_lesson(&lesson).await.unwrap();
        QuestionService::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(repo),
        )
    }

    #[tokio::test]
    async fn posts_and_lists() {
        let svc = service().await;
        let posted = svc
            .post_question(LessonId::new(1), LearnerId::new(3), "  What is a trait?  ")
            .await
            .unwrap();
        assert_eq!(posted.text(), "What is a trait?");
        assert_eq!(posted.posted_at(), fixed_now());

        let listed = svc.list_questions(LessonId::new(1)).await.unwrap();
        assert_eq!(listed, vec![posted]);
    }

    #[tokio::test]
    async fn rejects_blank_and_unknown_lesson() {
        let svc = service().await;
        assert!(matches!(
            svc.post_question(LessonId::new(1), LearnerId::new(3), "   ").await,
            Err(QuestionServiceError::Question(LessonQuestionError::EmptyText))
        ));
        assert!(matches!(
            svc.post_question(LessonId::new(8), LearnerId::new(3), "hello?").await,
            Err(QuestionServiceError::Storage(StorageError::NotFound))
        ));
    }
}
