use std::collections::BTreeSet;
use std::sync::Arc;

use lesson_core::model::{CourseId, Curriculum, Lesson, LessonDraft, LessonId};
use storage::repository::{LessonRepository, StorageError};

use crate::error::CurriculumServiceError;

/// Authoring-side lesson management.
#[derive(Clone)]
pub struct CurriculumService {
    lessons: Arc<dyn LessonRepository>,
}

impl CurriculumService {
    #[must_use]
    pub fn new(lessons: Arc<dyn LessonRepository>) -> Self {
        Self { lessons }
    }

    /// The course's lessons sorted by order.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumServiceError::EmptyCourse` when the course has no lessons.
    pub async fn curriculum(
        &self,
        course_id: CourseId,
    ) -> Result<Curriculum, CurriculumServiceError> {
        let lessons = self.lessons.list_lessons(course_id).await?;
        if lessons.is_empty() {
            return Err(CurriculumServiceError::EmptyCourse(course_id));
        }
        Ok(Curriculum::new(course_id, lessons)?)
    }

    /// Validate and store one lesson.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumServiceError::Lesson` for invalid content and
    /// `CurriculumServiceError::OrderTaken` if another lesson holds the order.
    pub async fn upsert_lesson(
        &self,
        draft: LessonDraft,
    ) -> Result<Lesson, CurriculumServiceError> {
        let lesson = draft.validate()?;
        self.store(&lesson).await?;
        tracing::info!(
            lesson = %lesson.id(),
            course = %lesson.course_id(),
            order = lesson.order(),
            "lesson saved"
        );
        Ok(lesson)
    }

    /// Validate a whole course and store every lesson in one batch.
    ///
    /// Nothing is written if any lesson is invalid, the set does not form a
    /// consistent curriculum, or an order is held by a stored lesson outside
    /// the set.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumServiceError` for invalid lessons, a taken order or
    /// storage failures.
    pub async fn import_course(
        &self,
        course_id: CourseId,
        drafts: Vec<LessonDraft>,
    ) -> Result<Curriculum, CurriculumServiceError> {
        let lessons = drafts
            .into_iter()
            .map(LessonDraft::validate)
            .collect::<Result<Vec<_>, _>>()?;
        let curriculum = Curriculum::new(course_id, lessons)?;

        let incoming: BTreeSet<LessonId> = curriculum.ordered_ids().into_iter().collect();
        let orders: BTreeSet<u32> = curriculum.lessons().iter().map(Lesson::order).collect();
        let stored = self.lessons.list_lessons(course_id).await?;
        if let Some(holder) = stored
            .iter()
            .filter(|l| !incoming.contains(&l.id()))
            .find(|l| orders.contains(&l.order()))
        {
            return Err(CurriculumServiceError::OrderTaken {
                course: course_id,
                order: holder.order(),
            });
        }

        self.lessons.upsert_lessons(curriculum.lessons()).await?;
        tracing::info!(course = %course_id, lessons = curriculum.total(), "course imported");
        Ok(curriculum)
    }

    /// # Errors
    ///
    /// Returns `CurriculumServiceError::Storage` if the lesson is missing or
    /// cannot be removed.
    pub async fn delete_lesson(&self, id: LessonId) -> Result<(), CurriculumServiceError> {
        self.lessons.delete_lesson(id).await?;
        tracing::info!(lesson = %id, "lesson deleted");
        Ok(())
    }

    /// Renumber the course to follow `ordered`, as one batch.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumServiceError::ReorderMismatch` unless `ordered` lists
    /// every lesson of the course exactly once.
    pub async fn reorder(
        &self,
        course_id: CourseId,
        ordered: &[LessonId],
    ) -> Result<Curriculum, CurriculumServiceError> {
        let current = self.curriculum(course_id).await?;
        let existing: BTreeSet<LessonId> = current.ordered_ids().into_iter().collect();
        let wanted: BTreeSet<LessonId> = ordered.iter().copied().collect();
        if wanted.len() != ordered.len() || wanted != existing {
            return Err(CurriculumServiceError::ReorderMismatch {
                missing: existing.difference(&wanted).copied().collect(),
                unexpected: wanted.difference(&existing).copied().collect(),
            });
        }

        self.lessons.reorder_lessons(course_id, ordered).await?;
        tracing::info!(course = %course_id, lessons = ordered.len(), "course reordered");
        self.curriculum(course_id).await
    }

    async fn store(&self, lesson: &Lesson) -> Result<(), CurriculumServiceError> {
        match self.lessons.upsert_lesson(lesson).await {
            Err(StorageError::Conflict) => Err(CurriculumServiceError::OrderTaken {
                course: lesson.course_id(),
                order: lesson.order(),
            }),
            other => Ok(other?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::repository::InMemoryRepository;

    fn draft(id: u64, order: u32) -> LessonDraft {
        LessonDraft {
            id: LessonId::new(id),
            course_id: CourseId::new(4),
            order,
            title: format!("Lesson {id}"),
            is_preview: false,
            duration_minutes: None,
            quiz: None,
        }
    }

    fn service() -> CurriculumService {
        CurriculumService::new(Arc::new(InMemoryRepository::new()))
    }

    #[tokio::test]
    async fn import_rejects_duplicate_orders_without_writing() {
        let svc = service();
        let err = svc
            .import_course(CourseId::new(4), vec![draft(1, 1), draft(2, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, CurriculumServiceError::Curriculum(_)));
        assert!(matches!(
            svc.curriculum(CourseId::new(4)).await,
            Err(CurriculumServiceError::EmptyCourse(_))
        ));
    }

    #[tokio::test]
    async fn import_leaves_course_untouched_when_an_order_is_held() {
        let svc = service();
        svc.upsert_lesson(draft(9, 3)).await.unwrap();

        let err = svc
            .import_course(
                CourseId::new(4),
                vec![draft(1, 1), draft(2, 2), draft(3, 3)],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CurriculumServiceError::OrderTaken { order: 3, .. }
        ));
        let curriculum = svc.curriculum(CourseId::new(4)).await.unwrap();
        assert_eq!(curriculum.ordered_ids(), vec![LessonId::new(9)]);
    }

    #[tokio::test]
    async fn reimport_may_move_stored_lessons() {
        let svc = service();
        svc.import_course(CourseId::new(4), vec![draft(1, 1), draft(2, 2)])
            .await
            .unwrap();
        let curriculum = svc
            .import_course(CourseId::new(4), vec![draft(1, 2), draft(2, 1)])
            .await
            .unwrap();
        assert_eq!(
            curriculum.ordered_ids(),
            vec![LessonId::new(2), LessonId::new(1)]
        );
        assert_eq!(
            svc.curriculum(CourseId::new(4)).await.unwrap().ordered_ids(),
            vec![LessonId::new(2), LessonId::new(1)]
        );
    }

    #[tokio::test]
    async fn upsert_reports_taken_order() {
        let svc = service();
        svc.upsert_lesson(draft(1, 1)).await.unwrap();
        let err = svc.upsert_lesson(draft(2, 1)).await.unwrap_err();
        assert!(matches!(
            err,
            CurriculumServiceError::OrderTaken { order: 1, .. }
        ));
    }

    #[tokio::test]
    async fn reorder_lists_the_mismatch() {
        let svc = service();
        svc.import_course(CourseId::new(4), vec![draft(1, 1), draft(2, 2)])
            .await
            .unwrap();
        let err = svc
            .reorder(CourseId::new(4), &[LessonId::new(2), LessonId::new(9)])
            .await
            .unwrap_err();
        match err {
            CurriculumServiceError::ReorderMismatch {
                missing,
                unexpected,
            } => {
                assert_eq!(missing, vec![LessonId::new(1)]);
                assert_eq!(unexpected, vec![LessonId::new(9)]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn reorder_moves_lessons() {
        let svc = service();
        svc.import_course(
            CourseId::new(4),
            vec![draft(1, 1), draft(2, 2), draft(3, 7)],
        )
        .await
        .unwrap();
        let curriculum = svc
            .reorder(
                CourseId::new(4),
                &[LessonId::new(2), LessonId::new(3), LessonId::new(1)],
            )
            .await
            .unwrap();
        assert_eq!(
            curriculum.ordered_ids(),
            vec![LessonId::new(2), LessonId::new(3), LessonId::new(1)]
        );
        assert!(curriculum.order_gaps().is_empty());
    }
}
