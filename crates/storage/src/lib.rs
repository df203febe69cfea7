#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    InMemoryRepository, LessonRepository, ProgressRepository, QuestionRepository, Storage,
    StorageError,
};
