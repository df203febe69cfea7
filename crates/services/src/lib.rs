#![forbid(unsafe_code)]

pub mod app_services;
pub mod curriculum_service;
pub mod error;
pub mod lesson_page;
pub mod question_service;

pub use lesson_core::{Clock, GatingConfig};

pub use app_services::AppServices;
pub use curriculum_service::CurriculumService;
pub use error::{AppServicesError, CurriculumServiceError, LessonPageError, QuestionServiceError};
pub use lesson_page::{LessonPage, LessonPageService};
pub use question_service::QuestionService;
