//! Lesson accessibility.
//!
//! Only the immediately preceding lesson (by `order`) gates a lesson. Earlier
//! lessons are not re-checked, so a course that was renumbered by hand still
//! evaluates.

use thiserror::Error;

use crate::config::GatingConfig;
use crate::model::{CourseId, Curriculum, Enrollment, Lesson, LessonId, Percentage};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LockError {
    #[error("lesson {0} is not part of the curriculum")]
    UnknownLesson(LessonId),

    #[error("enrollment is for course {enrollment}, curriculum is course {curriculum}")]
    CourseMismatch {
        curriculum: CourseId,
        enrollment: CourseId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockReason {
    Preview,
    FirstLesson,
    PrerequisiteMet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockReason {
    /// The previous lesson has not been completed.
    PreviousIncomplete { previous: LessonId },
    /// The previous lesson is completed but its quiz score is missing or too low.
    QuizNotPassed {
        previous: LessonId,
        score: Option<Percentage>,
        required: Percentage,
    },
    /// The slot directly before this lesson is empty while the learner holds
    /// progress on lessons that no longer exist, so whatever they completed
    /// there cannot be matched to the current predecessor.
    StaleDependency {
        previous: LessonId,
        orphaned: Vec<LessonId>,
    },
}

impl LockReason {
    /// The lesson whose state causes the lock.
    #[must_use]
    pub fn blocking_lesson(&self) -> LessonId {
        match self {
            Self::PreviousIncomplete { previous }
            | Self::QuizNotPassed { previous, .. }
            | Self::StaleDependency { previous, .. } => *previous,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    Unlocked(UnlockReason),
    Locked(LockReason),
}

impl LockState {
    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked(_))
    }

    #[must_use]
    pub fn reason(&self) -> Option<&LockReason> {
        match self {
            Self::Locked(reason) => Some(reason),
            Self::Unlocked(_) => None,
        }
    }
}

/// Decide whether `target` is accessible for this enrollment.
///
/// # Errors
///
/// Returns `LockError` if `target` is not in the curriculum or the enrollment
/// belongs to another course.
pub fn evaluate(
    curriculum: &Curriculum,
    enrollment: &Enrollment,
    config: &GatingConfig,
    target: LessonId,
) -> Result<LockState, LockError> {
    if enrollment.course_id() != curriculum.course_id() {
        return Err(LockError::CourseMismatch {
            curriculum: curriculum.course_id(),
            enrollment: enrollment.course_id(),
        });
    }
    let lesson = curriculum
        .get(target)
        .ok_or(LockError::UnknownLesson(target))?;

    if lesson.is_preview() {
        return Ok(LockState::Unlocked(UnlockReason::Preview));
    }
    let Some(previous) = curriculum.previous(target) else {
        return Ok(LockState::Unlocked(UnlockReason::FirstLesson));
    };

    if !enrollment.is_completed(previous.id()) {
        return Ok(LockState::Locked(incomplete_reason(
            curriculum, enrollment, lesson, previous,
        )));
    }

    if let Some(quiz) = previous.gating_quiz() {
        let score = enrollment.quiz_score(previous.id());
        let required = config.gate_threshold(quiz);
        if score.is_none_or(|s| s < required) {
            return Ok(LockState::Locked(LockReason::QuizNotPassed {
                previous: previous.id(),
                score,
                required,
            }));
        }
    }

    Ok(LockState::Unlocked(UnlockReason::PrerequisiteMet))
}

/// Shorthand for `evaluate(..)?.is_locked()`.
///
/// # Errors
///
/// See [`evaluate`].
pub fn is_locked(
    curriculum: &Curriculum,
    enrollment: &Enrollment,
    config: &GatingConfig,
    target: LessonId,
) -> Result<bool, LockError> {
    evaluate(curriculum, enrollment, config, target).map(|s| s.is_locked())
}

/// Lock state for every lesson, in curriculum order.
#[must_use]
pub fn evaluate_all(
    curriculum: &Curriculum,
    enrollment: &Enrollment,
    config: &GatingConfig,
) -> Vec<(LessonId, LockState)> {
    curriculum
        .lessons()
        .iter()
        .filter_map(|l| {
            evaluate(curriculum, enrollment, config, l.id())
                .ok()
                .map(|s| (l.id(), s))
        })
        .collect()
}

fn incomplete_reason(
    curriculum: &Curriculum,
    enrollment: &Enrollment,
    lesson: &Lesson,
    previous: &Lesson,
) -> LockReason {
    let gap_before = previous.order() + 1 < lesson.order();
    if gap_before {
        let orphaned = enrollment.orphaned_lessons(curriculum);
        if !orphaned.is_empty() {
            tracing::warn!(
                course = %curriculum.course_id(),
                learner = %enrollment.learner_id(),
                lesson = %lesson.id(),
                previous = %previous.id(),
                ?orphaned,
                "lock depends on a lesson that no longer exists; treating as locked"
            );
            return LockReason::StaleDependency {
                previous: previous.id(),
                orphaned,
            };
        }
    }
    LockReason::PreviousIncomplete {
        previous: previous.id(),
    }
}
