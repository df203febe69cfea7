//! Per-visit navigation gating for the lesson page.
//!
//! `LessonVisit` is the domain half of the page: which lesson is open, whether a
//! quiz prompt or attempt is in progress, and the answers picked so far. It never
//! performs I/O. Callers persist the `ProgressUpdate` returned by
//! [`LessonVisit::begin_submission`] and report back with
//! [`LessonVisit::submission_succeeded`] (carrying the refreshed enrollment) or
//! [`LessonVisit::submission_failed`].

use thiserror::Error;

use crate::config::GatingConfig;
use crate::grading::{self, QuizAnswers, QuizResult};
use crate::lock::{self, LockError, LockReason};
use crate::model::{
    Curriculum, Enrollment, Lesson, LessonId, OPTIONS_PER_QUESTION, ProgressUpdate, QuizError,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GateError {
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },

    #[error("a quiz submission is already in flight")]
    AlreadySubmitting,

    #[error("no quiz submission is in flight")]
    NotSubmitting,

    #[error("lesson {0} has no quiz")]
    NoQuiz(LessonId),

    #[error("lesson {0} is the last lesson")]
    NoNextLesson(LessonId),

    #[error(transparent)]
    Quiz(#[from] QuizError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// A quiz attempt in progress.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuizAttempt {
    /// Where the learner was heading when the prompt interrupted them.
    pub intended: Option<LessonId>,
    pub answers: QuizAnswers,
    /// Graded locally and sent, waiting for the progress write to resolve.
    pub pending: Option<QuizResult>,
}

impl QuizAttempt {
    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.pending.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Viewing,
    QuizPromptBlocking { target: LessonId },
    QuizAttempt(QuizAttempt),
    Advancing { target: LessonId },
}

impl GateState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Viewing => "viewing",
            Self::QuizPromptBlocking { .. } => "showing the quiz prompt",
            Self::QuizAttempt(_) => "attempting the quiz",
            Self::Advancing { .. } => "advancing",
        }
    }
}

/// Result of asking to move to another lesson.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    /// The visit is now `Advancing` toward `target`.
    Allow { target: LessonId },
    /// The current lesson's quiz must be passed first; the visit shows the prompt.
    PromptQuiz { target: LessonId },
    /// The target itself is locked for a reason the current quiz cannot fix.
    Blocked { target: LessonId, reason: LockReason },
}

/// What happened once a submission's write resolved successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Passed; the visit is `Advancing` toward the lesson the learner wanted.
    PassedAdvancing { result: QuizResult, target: LessonId },
    /// Passed with nowhere queued to go; back to `Viewing`.
    Passed { result: QuizResult },
    /// Passed, but the intended lesson is still locked by something else.
    PassedBlocked {
        result: QuizResult,
        target: LessonId,
        reason: LockReason,
    },
    /// Not passed; the attempt stays open with answers cleared.
    Failed { result: QuizResult },
}

//
// ─── VISIT ─────────────────────────────────────────────────────────────────────
//

/// One lesson-page visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonVisit {
    lesson_id: LessonId,
    state: GateState,
    last_result: Option<QuizResult>,
}

impl LessonVisit {
    /// Open `lesson_id` in the `Viewing` state.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Lock(LockError::UnknownLesson)` if the lesson is not in the curriculum.
    pub fn open(curriculum: &Curriculum, lesson_id: LessonId) -> Result<Self, GateError> {
        if !curriculum.contains(lesson_id) {
            return Err(LockError::UnknownLesson(lesson_id).into());
        }
        Ok(Self {
            lesson_id,
            state: GateState::Viewing,
            last_result: None,
        })
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn state(&self) -> &GateState {
        &self.state
    }

    /// Most recent graded attempt during this visit.
    #[must_use]
    pub fn last_result(&self) -> Option<&QuizResult> {
        self.last_result.as_ref()
    }

    #[must_use]
    pub fn answers(&self) -> Option<&QuizAnswers> {
        match &self.state {
            GateState::QuizAttempt(attempt) => Some(&attempt.answers),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_submitting(&self) -> bool {
        matches!(&self.state, GateState::QuizAttempt(a) if a.is_submitting())
    }

    /// Handle a sidebar click or direct jump to `target`.
    ///
    /// Moving to a lesson at or before the current one never shows the quiz
    /// prompt, and moving back to a lesson the learner already completed skips
    /// the lock check. Moving forward shows the prompt when the current lesson
    /// has a quiz the learner has not cleared.
    ///
    /// # Errors
    ///
    /// Returns `GateError::InvalidTransition` outside `Viewing`, or a lock error
    /// for an unknown target.
    pub fn request_navigation(
        &mut self,
        curriculum: &Curriculum,
        enrollment: &Enrollment,
        config: &GatingConfig,
        target: LessonId,
    ) -> Result<NavigationDecision, GateError> {
        self.expect_viewing("navigate")?;
        let current = self.current_lesson(curriculum)?;
        let target_lesson = curriculum
            .get(target)
            .ok_or(LockError::UnknownLesson(target))?;

        let forward = target_lesson.order() > current.order();
        if forward && config.quiz_blocks(current, enrollment.quiz_score(current.id())) {
            tracing::debug!(lesson = %current.id(), %target, "forward navigation gated by quiz");
            self.state = GateState::QuizPromptBlocking { target };
            return Ok(NavigationDecision::PromptQuiz { target });
        }

        let revisit = !forward && enrollment.is_completed(target);
        if target != current.id() && !revisit {
            if let lock::LockState::Locked(reason) =
                lock::evaluate(curriculum, enrollment, config, target)?
            {
                tracing::debug!(lesson = %current.id(), %target, ?reason, "navigation blocked");
                return Ok(NavigationDecision::Blocked { target, reason });
            }
        }

        self.state = GateState::Advancing { target };
        Ok(NavigationDecision::Allow { target })
    }

    /// Handle the "Next Lesson" button.
    ///
    /// # Errors
    ///
    /// Returns `GateError::NoNextLesson` on the last lesson, otherwise as
    /// [`LessonVisit::request_navigation`].
    pub fn request_next(
        &mut self,
        curriculum: &Curriculum,
        enrollment: &Enrollment,
        config: &GatingConfig,
    ) -> Result<NavigationDecision, GateError> {
        self.expect_viewing("navigate")?;
        let next = curriculum
            .next(self.lesson_id)
            .ok_or(GateError::NoNextLesson(self.lesson_id))?
            .id();
        self.request_navigation(curriculum, enrollment, config, next)
    }

    /// Start a quiz attempt, either from the blocking prompt or directly.
    ///
    /// # Errors
    ///
    /// Returns `GateError::NoQuiz` if the current lesson has no gating quiz, or
    /// `GateError::InvalidTransition` from `QuizAttempt` / `Advancing`.
    pub fn attempt_quiz(&mut self, curriculum: &Curriculum) -> Result<(), GateError> {
        let intended = match &self.state {
            GateState::QuizPromptBlocking { target } => Some(*target),
            GateState::Viewing => None,
            other => {
                return Err(GateError::InvalidTransition {
                    state: other.name(),
                    action: "start a quiz",
                });
            }
        };
        let current = self.current_lesson(curriculum)?;
        if current.gating_quiz().is_none() {
            return Err(GateError::NoQuiz(current.id()));
        }
        self.state = GateState::QuizAttempt(QuizAttempt {
            intended,
            ..QuizAttempt::default()
        });
        Ok(())
    }

    /// Close the blocking prompt and stay on the current lesson.
    ///
    /// # Errors
    ///
    /// Returns `GateError::InvalidTransition` unless the prompt is showing.
    pub fn dismiss_prompt(&mut self) -> Result<(), GateError> {
        match self.state {
            GateState::QuizPromptBlocking { .. } => {
                self.state = GateState::Viewing;
                Ok(())
            }
            ref other => Err(GateError::InvalidTransition {
                state: other.name(),
                action: "dismiss the quiz prompt",
            }),
        }
    }

    /// Leave an attempt without submitting.
    ///
    /// # Errors
    ///
    /// Returns `GateError::AlreadySubmitting` while a write is pending.
    pub fn abandon_quiz(&mut self) -> Result<(), GateError> {
        let attempt = self.attempt_mut("leave the quiz")?;
        if attempt.is_submitting() {
            return Err(GateError::AlreadySubmitting);
        }
        self.state = GateState::Viewing;
        Ok(())
    }

    /// Record a selection for `question`.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Quiz` for an unknown question or option, and
    /// `GateError::AlreadySubmitting` while a write is pending.
    pub fn select_answer(
        &mut self,
        curriculum: &Curriculum,
        question: usize,
        option: usize,
    ) -> Result<(), GateError> {
        let count = self
            .current_lesson(curriculum)?
            .gating_quiz()
            .map_or(0, crate::model::Quiz::question_count);
        let attempt = self.attempt_mut("answer")?;
        if attempt.is_submitting() {
            return Err(GateError::AlreadySubmitting);
        }
        if question >= count {
            return Err(QuizError::UnknownQuestion { index: question }.into());
        }
        if option >= OPTIONS_PER_QUESTION {
            return Err(QuizError::OptionOutOfRange {
                index: question,
                option,
            }
            .into());
        }
        attempt.answers.select(question, option);
        Ok(())
    }

    /// Grade the current answers and mark the attempt as submitting.
    ///
    /// Returns the graded result; persist `result.progress_update()` and report
    /// back. Nothing changes if validation fails.
    ///
    /// # Errors
    ///
    /// Returns `GateError::AlreadySubmitting` for a second submit, or
    /// `GateError::Quiz` for incomplete or malformed answers.
    pub fn begin_submission(
        &mut self,
        curriculum: &Curriculum,
        config: &GatingConfig,
    ) -> Result<QuizResult, GateError> {
        let lesson = self.current_lesson(curriculum)?.clone();
        let attempt = self.attempt_mut("submit")?;
        if attempt.is_submitting() {
            return Err(GateError::AlreadySubmitting);
        }
        let result = grading::grade(&lesson, &attempt.answers, config)?;
        attempt.pending = Some(result.clone());
        Ok(result)
    }

    /// The write for the pending submission failed. Answers are kept for a resubmit.
    ///
    /// # Errors
    ///
    /// Returns `GateError::NotSubmitting` if nothing was pending.
    pub fn submission_failed(&mut self) -> Result<(), GateError> {
        let attempt = self.attempt_mut("fail a submission")?;
        if attempt.pending.take().is_none() {
            return Err(GateError::NotSubmitting);
        }
        Ok(())
    }

    /// The write for the pending submission succeeded; `enrollment` is the
    /// refreshed record. Unlocking is decided against it, never against the
    /// local result alone.
    ///
    /// # Errors
    ///
    /// Returns `GateError::NotSubmitting` if nothing was pending.
    pub fn submission_succeeded(
        &mut self,
        curriculum: &Curriculum,
        enrollment: &Enrollment,
        config: &GatingConfig,
    ) -> Result<SubmissionOutcome, GateError> {
        let (result, intended) = {
            let attempt = self.attempt_mut("confirm a submission")?;
            let result = attempt.pending.take().ok_or(GateError::NotSubmitting)?;
            (result, attempt.intended)
        };
        self.last_result = Some(result.clone());

        let confirmed = result.passed && enrollment.is_completed(result.lesson_id);
        if !confirmed {
            if let GateState::QuizAttempt(attempt) = &mut self.state {
                attempt.answers.clear();
            }
            return Ok(SubmissionOutcome::Failed { result });
        }

        let Some(target) = intended else {
            self.state = GateState::Viewing;
            return Ok(SubmissionOutcome::Passed { result });
        };

        match lock::evaluate(curriculum, enrollment, config, target)? {
            lock::LockState::Locked(reason) => {
                self.state = GateState::Viewing;
                Ok(SubmissionOutcome::PassedBlocked {
                    result,
                    target,
                    reason,
                })
            }
            lock::LockState::Unlocked(_) => {
                self.state = GateState::Advancing { target };
                Ok(SubmissionOutcome::PassedAdvancing { result, target })
            }
        }
    }

    /// Finish an advance: a fresh `Viewing` visit for the target lesson.
    ///
    /// # Errors
    ///
    /// Returns `GateError::InvalidTransition` unless `Advancing`.
    pub fn finish_advance(&self, curriculum: &Curriculum) -> Result<LessonVisit, GateError> {
        match self.state {
            GateState::Advancing { target } => Self::open(curriculum, target),
            ref other => Err(GateError::InvalidTransition {
                state: other.name(),
                action: "finish advancing",
            }),
        }
    }

    /// Progress delta for "mark complete" on the current lesson.
    ///
    /// Completion does not imply a quiz pass: a quiz lesson marked complete
    /// still gates the next lesson until its score clears the threshold.
    ///
    /// # Errors
    ///
    /// Returns `GateError::InvalidTransition` while a quiz attempt is open.
    pub fn mark_complete(&self) -> Result<ProgressUpdate, GateError> {
        if let GateState::QuizAttempt(_) = self.state {
            return Err(GateError::InvalidTransition {
                state: self.state.name(),
                action: "mark the lesson complete",
            });
        }
        Ok(ProgressUpdate::new()
            .complete(self.lesson_id)
            .accessed(self.lesson_id))
    }

    fn current_lesson<'c>(&self, curriculum: &'c Curriculum) -> Result<&'c Lesson, GateError> {
        curriculum
            .get(self.lesson_id)
            .ok_or(GateError::Lock(LockError::UnknownLesson(self.lesson_id)))
    }

    fn expect_viewing(&self, action: &'static str) -> Result<(), GateError> {
        match self.state {
            GateState::Viewing => Ok(()),
            ref other => Err(GateError::InvalidTransition {
                state: other.name(),
                action,
            }),
        }
    }

    fn attempt_mut(&mut self, action: &'static str) -> Result<&mut QuizAttempt, GateError> {
        match &mut self.state {
            GateState::QuizAttempt(attempt) => Ok(attempt),
            other => Err(GateError::InvalidTransition {
                state: other.name(),
                action,
            }),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
