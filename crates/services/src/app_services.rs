use std::sync::Arc;

use lesson_core::GatingConfig;
use storage::repository::Storage;

use crate::Clock;
use crate::curriculum_service::CurriculumService;
use crate::error::AppServicesError;
use crate::lesson_page::LessonPageService;
use crate::question_service::QuestionService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    lesson_pages: Arc<LessonPageService>,
    curriculum: Arc<CurriculumService>,
    questions: Arc<QuestionService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        config: GatingConfig,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock, config))
    }

    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock, config: GatingConfig) -> Self {
        let lesson_pages = Arc::new(LessonPageService::new(
            clock,
            config,
            Arc::clone(&storage.lessons),
            Arc::clone(&storage.progress),
        ));
        let curriculum = Arc::new(CurriculumService::new(Arc::clone(&storage.lessons)));
        let questions = Arc::new(QuestionService::new(
            clock,
            Arc::clone(&storage.lessons),
            Arc::clone(&storage.questions),
        ));
        Self {
            lesson_pages,
            curriculum,
            questions,
        }
    }

    #[must_use]
    pub fn lesson_pages(&self) -> Arc<LessonPageService> {
        Arc::clone(&self.lesson_pages)
    }

    #[must_use]
    pub fn curriculum(&self) -> Arc<CurriculumService> {
        Arc::clone(&self.curriculum)
    }

    #[must_use]
    pub fn questions(&self) -> Arc<QuestionService> {
        Arc::clone(&self.questions)
    }
}
