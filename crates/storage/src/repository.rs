use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lesson_core::model::{
    CourseId, Enrollment, LearnerId, Lesson, LessonId, LessonQuestion, NewLessonQuestion,
    ProgressUpdate, QuestionId, sort_by_order,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Repository contract for course lessons.
#[async_trait]
pub trait LessonRepository: Send + Sync {
    /// Persist or update a lesson.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if another lesson of the same course
    /// already holds the order, or other storage errors.
    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError>;

    /// Persist or update several lessons as one batch.
    ///
    /// Orders are checked against the state after the whole batch applies, so
    /// lessons in the batch may swap slots with each other.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the batch leaves two lessons of one
    /// course on the same order. Nothing is written in that case.
    async fn upsert_lessons(&self, lessons: &[Lesson]) -> Result<(), StorageError>;

    /// Fetch a lesson by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_lesson(&self, id: LessonId) -> Result<Lesson, StorageError>;

    /// All lessons of a course. No ordering is guaranteed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lessons cannot be read.
    async fn list_lessons(&self, course_id: CourseId) -> Result<Vec<Lesson>, StorageError>;

    /// Remove a lesson. Progress recorded against it is kept.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn delete_lesson(&self, id: LessonId) -> Result<(), StorageError>;

    /// Renumber the course's lessons `1..=N` following `ordered`, in one step.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if `ordered` is not exactly the
    /// course's set of lesson ids. Nothing is written in that case.
    async fn reorder_lessons(
        &self,
        course_id: CourseId,
        ordered: &[LessonId],
    ) -> Result<(), StorageError>;
}

/// Repository contract for enrollment progress.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Create an empty enrollment, or return the existing one unchanged.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn enroll(
        &self,
        learner_id: LearnerId,
        course_id: CourseId,
        now: DateTime<Utc>,
    ) -> Result<Enrollment, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the learner is not enrolled.
    async fn get_progress(
        &self,
        learner_id: LearnerId,
        course_id: CourseId,
    ) -> Result<Enrollment, StorageError>;

    /// Merge `update` into the stored record and recompute percent and status
    /// against the course's current lessons, atomically. Returns the stored
    /// result.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the learner is not enrolled.
    async fn update_progress(
        &self,
        learner_id: LearnerId,
        course_id: CourseId,
        update: &ProgressUpdate,
        now: DateTime<Utc>,
    ) -> Result<Enrollment, StorageError>;
}

/// Repository contract for lesson Q&A.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Store a question and assign its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn post_question(
        &self,
        question: NewLessonQuestion,
    ) -> Result<LessonQuestion, StorageError>;

    /// Questions for a lesson, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the questions cannot be read.
    async fn list_questions(&self, lesson_id: LessonId)
    -> Result<Vec<LessonQuestion>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Locks are always taken lessons first, then enrollments.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    lessons: Arc<Mutex<HashMap<LessonId, Lesson>>>,
    enrollments: Arc<Mutex<HashMap<(LearnerId, CourseId), Enrollment>>>,
    questions: Arc<Mutex<Vec<LessonQuestion>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn course_lesson_ids(lessons: &HashMap<LessonId, Lesson>, course_id: CourseId) -> Vec<LessonId> {
    lessons
        .values()
        .filter(|l| l.course_id() == course_id)
        .map(Lesson::id)
        .collect()
}

#[async_trait]
impl LessonRepository for InMemoryRepository {
    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        let mut guard = self.lessons.lock().map_err(poisoned)?;
        let taken = guard.values().any(|other| {
            other.id() != lesson.id()
                && other.course_id() == lesson.course_id()
                && other.order() == lesson.order()
        });
        if taken {
            return Err(StorageError::Conflict);
        }
        guard.insert(lesson.id(), lesson.clone());
        Ok(())
    }

    async fn upsert_lessons(&self, lessons: &[Lesson]) -> Result<(), StorageError> {
        let mut guard = self.lessons.lock().map_err(poisoned)?;
        let mut staged = guard.clone();
        for lesson in lessons {
            staged.insert(lesson.id(), lesson.clone());
        }
        let mut slots = HashSet::with_capacity(staged.len());
        if !staged
            .values()
            .all(|l| slots.insert((l.course_id(), l.order())))
        {
            return Err(StorageError::Conflict);
        }
        *guard = staged;
        Ok(())
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Lesson, StorageError> {
        let guard = self.lessons.lock().map_err(poisoned)?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_lessons(&self, course_id: CourseId) -> Result<Vec<Lesson>, StorageError> {
        let guard = self.lessons.lock().map_err(poisoned)?;
        Ok(guard
            .values()
            .filter(|l| l.course_id() == course_id)
            .cloned()
            .collect())
    }

    async fn delete_lesson(&self, id: LessonId) -> Result<(), StorageError> {
        let mut guard = self.lessons.lock().map_err(poisoned)?;
        guard.remove(&id).map(|_| ()).ok_or(StorageError::NotFound)
    }

    async fn reorder_lessons(
        &self,
        course_id: CourseId,
        ordered: &[LessonId],
    ) -> Result<(), StorageError> {
        let mut guard = self.lessons.lock().map_err(poisoned)?;
        let mut current: Vec<Lesson> = guard
            .values()
            .filter(|l| l.course_id() == course_id)
            .cloned()
            .collect();
        sort_by_order(&mut current);

        let wanted: BTreeSet<LessonId> = ordered.iter().copied().collect();
        let existing: BTreeSet<LessonId> = current.iter().map(Lesson::id).collect();
        if wanted.len() != ordered.len() || wanted != existing {
            return Err(StorageError::Conflict);
        }

        let mut renumbered = Vec::with_capacity(ordered.len());
        for (slot, id) in (1_u32..).zip(ordered) {
            let lesson = guard.get(id).ok_or(StorageError::NotFound)?;
            renumbered.push(
                lesson
                    .with_order(slot)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
            );
        }
        for lesson in renumbered {
            guard.insert(lesson.id(), lesson);
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn enroll(
        &self,
        learner_id: LearnerId,
        course_id: CourseId,
        now: DateTime<Utc>,
    ) -> Result<Enrollment, StorageError> {
        let lessons = self.lessons.lock().map_err(poisoned)?;
        let mut guard = self.enrollments.lock().map_err(poisoned)?;
        let record = guard.entry((learner_id, course_id)).or_insert_with(|| {
            let mut fresh = Enrollment::new(learner_id, course_id, now);
            fresh.recompute(&course_lesson_ids(&lessons, course_id), now);
            fresh
        });
        Ok(record.clone())
    }

    async fn get_progress(
        &self,
        learner_id: LearnerId,
        course_id: CourseId,
    ) -> Result<Enrollment, StorageError> {
        let guard = self.enrollments.lock().map_err(poisoned)?;
        guard
            .get(&(learner_id, course_id))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn update_progress(
        &self,
        learner_id: LearnerId,
        course_id: CourseId,
        update: &ProgressUpdate,
        now: DateTime<Utc>,
    ) -> Result<Enrollment, StorageError> {
        let lessons = self.lessons.lock().map_err(poisoned)?;
        let mut guard = self.enrollments.lock().map_err(poisoned)?;
        let record = guard
            .get_mut(&(learner_id, course_id))
            .ok_or(StorageError::NotFound)?;
        record.apply(update, &course_lesson_ids(&lessons, course_id), now);
        Ok(record.clone())
    }
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn post_question(
        &self,
        question: NewLessonQuestion,
    ) -> Result<LessonQuestion, StorageError> {
        let mut guard = self.questions.lock().map_err(poisoned)?;
        let next = guard.iter().map(|q| q.id().value()).max().unwrap_or(0) + 1;
        let stored = question.with_id(QuestionId::new(next));
        guard.push(stored.clone());
        Ok(stored)
    }

    async fn list_questions(
        &self,
        lesson_id: LessonId,
    ) -> Result<Vec<LessonQuestion>, StorageError> {
        let guard = self.questions.lock().map_err(poisoned)?;
        let mut found: Vec<LessonQuestion> = guard
            .iter()
            .filter(|q| q.lesson_id() == lesson_id)
            .cloned()
            .collect();
        found.sort_by_key(|q| (q.posted_at(), q.id()));
        Ok(found)
    }
}

/// Aggregate storage facade.
#[derive(Clone)]
pub struct Storage {
    pub lessons: Arc<dyn LessonRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub questions: Arc<dyn QuestionRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let lessons: Arc<dyn LessonRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let questions: Arc<dyn QuestionRepository> = Arc::new(repo);
        Self {
            lessons,
            progress,
            questions,
        }
    }
}
