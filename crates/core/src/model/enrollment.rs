use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::curriculum::Curriculum;
use crate::model::ids::{CourseId, LearnerId, LessonId};
use crate::model::quiz::Percentage;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("invalid enrollment status: {0}")]
    InvalidStatus(String),

    #[error("completed_at is set on an active enrollment")]
    CompletedAtOnActive,
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Active,
    Completed,
}

impl EnrollmentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    /// Parses the storage representation.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidStatus` for unknown values.
    pub fn parse(s: &str) -> Result<Self, ProgressError> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            other => Err(ProgressError::InvalidStatus(other.to_owned())),
        }
    }
}

//
// ─── UPDATE ────────────────────────────────────────────────────────────────────
//

/// Partial progress mutation with merge semantics.
///
/// Completions are added to the existing set, scores overwrite the stored score
/// for their lesson only, and `last_accessed` replaces the previous value when set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressUpdate {
    pub completed: BTreeSet<LessonId>,
    pub quiz_scores: BTreeMap<LessonId, Percentage>,
    pub last_accessed: Option<LessonId>,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn complete(mut self, lesson: LessonId) -> Self {
        self.completed.insert(lesson);
        self
    }

    #[must_use]
    pub fn score(mut self, lesson: LessonId, score: Percentage) -> Self {
        self.quiz_scores.insert(lesson, score);
        self
    }

    #[must_use]
    pub fn accessed(mut self, lesson: LessonId) -> Self {
        self.last_accessed = Some(lesson);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.quiz_scores.is_empty() && self.last_accessed.is_none()
    }
}

//
// ─── ENROLLMENT ────────────────────────────────────────────────────────────────
//

/// A learner's progress through one course.
///
/// `progress_percent` and `status` are derived; they are recomputed from the
/// course's current lesson ids on every mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    learner_id: LearnerId,
    course_id: CourseId,
    completed: BTreeSet<LessonId>,
    quiz_scores: BTreeMap<LessonId, Percentage>,
    last_accessed: Option<LessonId>,
    last_accessed_at: Option<DateTime<Utc>>,
    progress_percent: Percentage,
    status: EnrollmentStatus,
    enrolled_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    /// A fresh enrollment with nothing completed.
    #[must_use]
    pub fn new(learner_id: LearnerId, course_id: CourseId, enrolled_at: DateTime<Utc>) -> Self {
        Self {
            learner_id,
            course_id,
            completed: BTreeSet::new(),
            quiz_scores: BTreeMap::new(),
            last_accessed: None,
            last_accessed_at: None,
            progress_percent: Percentage::ZERO,
            status: EnrollmentStatus::Active,
            enrolled_at,
            completed_at: None,
        }
    }

    /// Rehydrate an enrollment from storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CompletedAtOnActive` if the timestamps contradict the status.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        learner_id: LearnerId,
        course_id: CourseId,
        completed: BTreeSet<LessonId>,
        quiz_scores: BTreeMap<LessonId, Percentage>,
        last_accessed: Option<LessonId>,
        last_accessed_at: Option<DateTime<Utc>>,
        progress_percent: Percentage,
        status: EnrollmentStatus,
        enrolled_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ProgressError> {
        if status == EnrollmentStatus::Active && completed_at.is_some() {
            return Err(ProgressError::CompletedAtOnActive);
        }
        Ok(Self {
            learner_id,
            course_id,
            completed,
            quiz_scores,
            last_accessed,
            last_accessed_at,
            progress_percent,
            status,
            enrolled_at,
            completed_at,
        })
    }

    // Accessors
    #[must_use]
    pub fn learner_id(&self) -> LearnerId {
        self.learner_id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn completed_lessons(&self) -> &BTreeSet<LessonId> {
        &self.completed
    }

    #[must_use]
    pub fn quiz_scores(&self) -> &BTreeMap<LessonId, Percentage> {
        &self.quiz_scores
    }

    #[must_use]
    pub fn is_completed(&self, lesson: LessonId) -> bool {
        self.completed.contains(&lesson)
    }

    #[must_use]
    pub fn quiz_score(&self, lesson: LessonId) -> Option<Percentage> {
        self.quiz_scores.get(&lesson).copied()
    }

    #[must_use]
    pub fn last_accessed(&self) -> Option<LessonId> {
        self.last_accessed
    }

    #[must_use]
    pub fn last_accessed_at(&self) -> Option<DateTime<Utc>> {
        self.last_accessed_at
    }

    #[must_use]
    pub fn progress_percent(&self) -> Percentage {
        self.progress_percent
    }

    #[must_use]
    pub fn status(&self) -> EnrollmentStatus {
        self.status
    }

    #[must_use]
    pub fn enrolled_at(&self) -> DateTime<Utc> {
        self.enrolled_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Merge `update` into this record, then recompute derived fields against
    /// the course's current lesson ids.
    pub fn apply(&mut self, update: &ProgressUpdate, lesson_ids: &[LessonId], now: DateTime<Utc>) {
        self.completed.extend(update.completed.iter().copied());
        for (lesson, score) in &update.quiz_scores {
            self.quiz_scores.insert(*lesson, *score);
        }
        if let Some(lesson) = update.last_accessed {
            self.last_accessed = Some(lesson);
            self.last_accessed_at = Some(now);
        }
        self.recompute(lesson_ids, now);
    }

    /// Recompute `progress_percent` and `status`.
    ///
    /// Only completions of lessons that still exist count.
    pub fn recompute(&mut self, lesson_ids: &[LessonId], now: DateTime<Utc>) {
        let total = lesson_ids.len();
        let done = lesson_ids
            .iter()
            .filter(|id| self.completed.contains(id))
            .count();
        self.progress_percent = Percentage::of(done, total).unwrap_or(Percentage::ZERO);

        if total > 0 && done == total {
            if self.status != EnrollmentStatus::Completed {
                self.status = EnrollmentStatus::Completed;
                self.completed_at = Some(now);
            }
        } else {
            self.status = EnrollmentStatus::Active;
            self.completed_at = None;
        }
    }

    /// Lesson ids this record holds progress for that the curriculum no longer has.
    #[must_use]
    pub fn orphaned_lessons(&self, curriculum: &Curriculum) -> Vec<LessonId> {
        let ids: BTreeSet<LessonId> = self
            .completed
            .iter()
            .chain(self.quiz_scores.keys())
            .copied()
            .filter(|id| !curriculum.contains(*id))
            .collect();
        ids.into_iter().collect()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
