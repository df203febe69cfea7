use crate::config::GatingConfig;
use crate::lock::{self, LockReason, LockState};
use crate::model::{Curriculum, Enrollment, LessonId, Percentage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LessonStatus {
    Completed,
    Current,
    Locked,
    Available,
}

/// One sidebar row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarEntry {
    pub lesson_id: LessonId,
    pub order: u32,
    pub title: String,
    pub is_preview: bool,
    pub has_quiz: bool,
    pub quiz_score: Option<Percentage>,
    pub status: LessonStatus,
    pub lock_reason: Option<LockReason>,
}

/// Sidebar rows in curriculum order.
///
/// The open lesson is `Current` even if it is also completed. Locked rows carry
/// the reason so the page can explain them.
#[must_use]
pub fn sidebar(
    curriculum: &Curriculum,
    enrollment: &Enrollment,
    config: &GatingConfig,
    current: Option<LessonId>,
) -> Vec<SidebarEntry> {
    lock::evaluate_all(curriculum, enrollment, config)
        .into_iter()
        .filter_map(|(id, state)| {
            let lesson = curriculum.get(id)?;
            let (status, lock_reason) = if current == Some(id) {
                (LessonStatus::Current, None)
            } else if enrollment.is_completed(id) {
                (LessonStatus::Completed, None)
            } else {
                match state {
                    LockState::Locked(reason) => (LessonStatus::Locked, Some(reason)),
                    LockState::Unlocked(_) => (LessonStatus::Available, None),
                }
            };
            Some(SidebarEntry {
                lesson_id: id,
                order: lesson.order(),
                title: lesson.title().to_owned(),
                is_preview: lesson.is_preview(),
                has_quiz: lesson.gating_quiz().is_some(),
                quiz_score: enrollment.quiz_score(id),
                status,
                lock_reason,
            })
        })
        .collect()
}

/// Page-header progress numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseProgressSummary {
    pub completed: usize,
    pub total: usize,
    pub percent: Percentage,
    /// First unlocked lesson the learner has not completed yet.
    pub resume_at: Option<LessonId>,
}

#[must_use]
pub fn summarize(
    curriculum: &Curriculum,
    enrollment: &Enrollment,
    config: &GatingConfig,
) -> CourseProgressSummary {
    let completed = curriculum
        .lessons()
        .iter()
        .filter(|l| enrollment.is_completed(l.id()))
        .count();
    let total = curriculum.total();
    let resume_at = lock::evaluate_all(curriculum, enrollment, config)
        .into_iter()
        .find(|(id, state)| !state.is_locked() && !enrollment.is_completed(*id))
        .map(|(id, _)| id);

    CourseProgressSummary {
        completed,
        total,
        percent: Percentage::of(completed, total).unwrap_or(Percentage::ZERO),
        resume_at,
    }
}
