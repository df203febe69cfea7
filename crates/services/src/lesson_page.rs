use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use lesson_core::gate::{LessonVisit, NavigationDecision, SubmissionOutcome};
use lesson_core::lock::{self, LockState};
use lesson_core::model::{
    CourseId, Curriculum, Enrollment, LearnerId, Lesson, LessonId, ProgressUpdate,
};
use lesson_core::sidebar::{self, CourseProgressSummary, SidebarEntry};
use lesson_core::{Clock, GatingConfig};
use storage::repository::{LessonRepository, ProgressRepository, StorageError};

use crate::error::LessonPageError;

//
// ─── PAGE ──────────────────────────────────────────────────────────────────────
//

/// Everything one lesson page renders from: the sorted curriculum, the last
/// enrollment record read from storage, and the visit state machine.
#[derive(Debug, Clone)]
pub struct LessonPage {
    curriculum: Curriculum,
    enrollment: Enrollment,
    visit: LessonVisit,
    config: GatingConfig,
}

impl LessonPage {
    #[must_use]
    pub fn curriculum(&self) -> &Curriculum {
        &self.curriculum
    }

    #[must_use]
    pub fn enrollment(&self) -> &Enrollment {
        &self.enrollment
    }

    #[must_use]
    pub fn visit(&self) -> &LessonVisit {
        &self.visit
    }

    #[must_use]
    pub fn learner_id(&self) -> LearnerId {
        self.enrollment.learner_id()
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.curriculum.course_id()
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.visit.lesson_id()
    }

    /// The lesson currently open.
    #[must_use]
    pub fn lesson(&self) -> Option<&Lesson> {
        self.curriculum.get(self.visit.lesson_id())
    }

    #[must_use]
    pub fn sidebar(&self) -> Vec<SidebarEntry> {
        sidebar::sidebar(
            &self.curriculum,
            &self.enrollment,
            &self.config,
            Some(self.visit.lesson_id()),
        )
    }

    #[must_use]
    pub fn summary(&self) -> CourseProgressSummary {
        sidebar::summarize(&self.curriculum, &self.enrollment, &self.config)
    }

    /// # Errors
    ///
    /// Returns `LessonPageError::NotFound` for a lesson outside the course.
    pub fn lock_state(&self, lesson: LessonId) -> Result<LockState, LessonPageError> {
        Ok(lock::evaluate(
            &self.curriculum,
            &self.enrollment,
            &self.config,
            lesson,
        )?)
    }

    /// # Errors
    ///
    /// Returns `LessonPageError::Gate` if no quiz can be started from here.
    pub fn attempt_quiz(&mut self) -> Result<(), LessonPageError> {
        Ok(self.visit.attempt_quiz(&self.curriculum)?)
    }

    /// # Errors
    ///
    /// Returns `LessonPageError::Gate` unless the quiz prompt is showing.
    pub fn dismiss_prompt(&mut self) -> Result<(), LessonPageError> {
        Ok(self.visit.dismiss_prompt()?)
    }

    /// # Errors
    ///
    /// Returns `LessonPageError::AlreadySubmitting` while a write is pending.
    pub fn abandon_quiz(&mut self) -> Result<(), LessonPageError> {
        Ok(self.visit.abandon_quiz()?)
    }

    /// # Errors
    ///
    /// Returns `LessonPageError::Validation` for an unknown question or option.
    pub fn select_answer(&mut self, question: usize, option: usize) -> Result<(), LessonPageError> {
        Ok(self.visit.select_answer(&self.curriculum, question, option)?)
    }
}

//
// ─── IN-FLIGHT GUARD ───────────────────────────────────────────────────────────
//

type InFlight = Arc<Mutex<HashSet<(LearnerId, LessonId)>>>;

/// Held for the lifetime of one progress write; released on drop.
struct MutationGuard {
    in_flight: InFlight,
    key: (LearnerId, LessonId),
}

impl MutationGuard {
    fn acquire(in_flight: &InFlight, key: (LearnerId, LessonId)) -> Result<Self, LessonPageError> {
        let mut guard = in_flight
            .lock()
            .map_err(|e| LessonPageError::Storage(StorageError::Connection(e.to_string())))?;
        if !guard.insert(key) {
            return Err(LessonPageError::AlreadySubmitting);
        }
        Ok(Self {
            in_flight: Arc::clone(in_flight),
            key,
        })
    }
}

impl Drop for MutationGuard {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.in_flight.lock() {
            guard.remove(&self.key);
        }
    }
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Orchestrates a learner's lesson page against storage.
///
/// Progress writes run on a spawned task that owns its inputs, so a write
/// finishes even if the caller stops waiting for it. Lock state is only
/// re-evaluated after the write resolves and the record has been read back.
#[derive(Clone)]
pub struct LessonPageService {
    clock: Clock,
    config: GatingConfig,
    lessons: Arc<dyn LessonRepository>,
    progress: Arc<dyn ProgressRepository>,
    in_flight: InFlight,
}

impl LessonPageService {
    #[must_use]
    pub fn new(
        clock: Clock,
        config: GatingConfig,
        lessons: Arc<dyn LessonRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            config,
            lessons,
            progress,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    #[must_use]
    pub fn config(&self) -> GatingConfig {
        self.config
    }

    /// Fetch a course's lessons and sort them by order.
    ///
    /// # Errors
    ///
    /// Returns `LessonPageError::NotFound` for a course without lessons, or
    /// `LessonPageError::Curriculum` if the stored lessons are inconsistent.
    pub async fn load_curriculum(
        &self,
        course_id: CourseId,
    ) -> Result<Curriculum, LessonPageError> {
        let lessons = self.lessons.list_lessons(course_id).await?;
        if lessons.is_empty() {
            return Err(LessonPageError::NotFound);
        }
        Ok(Curriculum::new(course_id, lessons)?)
    }

    /// Open a lesson page, enrolling the learner if needed.
    ///
    /// Without an explicit lesson the page resumes at the last accessed lesson
    /// when it is still reachable, otherwise at the first unlocked lesson not
    /// yet completed.
    ///
    /// # Errors
    ///
    /// Returns `LessonPageError::NotFound` for a missing course or lesson,
    /// `LessonPageError::Locked` for a locked lesson, or storage errors.
    pub async fn open_page(
        &self,
        learner_id: LearnerId,
        course_id: CourseId,
        lesson_id: Option<LessonId>,
    ) -> Result<LessonPage, LessonPageError> {
        let curriculum = self.load_curriculum(course_id).await?;
        let now = self.clock.now();
        let mut enrollment = self.progress.enroll(learner_id, course_id, now).await?;
        enrollment.recompute(&curriculum.ordered_ids(), now);

        let target = match lesson_id {
            Some(id) => id,
            None => self.resume_target(&curriculum, &enrollment)?,
        };
        if let LockState::Locked(reason) =
            lock::evaluate(&curriculum, &enrollment, &self.config, target)?
        {
            return Err(LessonPageError::Locked {
                lesson: target,
                reason,
            });
        }

        let visit = LessonVisit::open(&curriculum, target)?;
        let mut page = LessonPage {
            curriculum,
            enrollment,
            visit,
            config: self.config,
        };
        self.record_access(&mut page).await;
        Ok(page)
    }

    /// Sidebar click or direct jump. An allowed move opens the target lesson.
    ///
    /// # Errors
    ///
    /// Returns `LessonPageError::Gate` outside the viewing state, or
    /// `LessonPageError::NotFound` for a target outside the course.
    pub async fn navigate(
        &self,
        page: &mut LessonPage,
        target: LessonId,
    ) -> Result<NavigationDecision, LessonPageError> {
        let decision = page.visit.request_navigation(
            &page.curriculum,
            &page.enrollment,
            &self.config,
            target,
        )?;
        if let NavigationDecision::Allow { .. } = decision {
            self.advance(page).await?;
        }
        Ok(decision)
    }

    /// "Next Lesson" button.
    ///
    /// # Errors
    ///
    /// As [`LessonPageService::navigate`], plus `LessonPageError::Gate` on the
    /// last lesson.
    pub async fn next(&self, page: &mut LessonPage) -> Result<NavigationDecision, LessonPageError> {
        let decision = page
            .visit
            .request_next(&page.curriculum, &page.enrollment, &self.config)?;
        if let NavigationDecision::Allow { .. } = decision {
            self.advance(page).await?;
        }
        Ok(decision)
    }

    /// Complete an advance started by navigation or a passed quiz.
    ///
    /// # Errors
    ///
    /// Returns `LessonPageError::Gate` unless the visit is advancing.
    pub async fn advance(&self, page: &mut LessonPage) -> Result<(), LessonPageError> {
        page.visit = page.visit.finish_advance(&page.curriculum)?;
        self.record_access(page).await;
        Ok(())
    }

    /// Mark the open lesson complete.
    ///
    /// # Errors
    ///
    /// Returns `LessonPageError::Mutation` if the write fails (the lesson stays
    /// incomplete), `LessonPageError::AlreadySubmitting` while another write for
    /// this lesson is in flight.
    pub async fn mark_complete(&self, page: &mut LessonPage) -> Result<(), LessonPageError> {
        let update = page.visit.mark_complete()?;
        let lesson = page.lesson_id();
        let guard = MutationGuard::acquire(&self.in_flight, (page.learner_id(), lesson))?;

        match self.persist(page, update, guard).await {
            Ok(fresh) => {
                tracing::info!(learner = %page.learner_id(), %lesson, "lesson marked complete");
                page.enrollment = fresh;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    learner = %page.learner_id(),
                    %lesson,
                    error = %err,
                    "mark complete failed"
                );
                Err(LessonPageError::Mutation(err))
            }
        }
    }

    /// Grade and persist the open quiz attempt.
    ///
    /// Answers are validated before anything is written. The outcome is decided
    /// against the enrollment read back after the write. A `PassedAdvancing`
    /// outcome leaves the visit advancing; call [`LessonPageService::advance`]
    /// to move on.
    ///
    /// # Errors
    ///
    /// Returns `LessonPageError::Validation` for incomplete or malformed answers,
    /// `LessonPageError::AlreadySubmitting` for a concurrent submit, and
    /// `LessonPageError::Mutation` if the write fails. Answers survive a failed
    /// write.
    pub async fn submit_quiz(
        &self,
        page: &mut LessonPage,
    ) -> Result<SubmissionOutcome, LessonPageError> {
        let lesson = page.lesson_id();
        let learner = page.learner_id();
        let guard = MutationGuard::acquire(&self.in_flight, (learner, lesson))?;
        let result = page.visit.begin_submission(&page.curriculum, &self.config)?;
        let update = result.progress_update().accessed(lesson);

        match self.persist(page, update, guard).await {
            Ok(fresh) => page.enrollment = fresh,
            Err(err) => {
                tracing::warn!(%learner, %lesson, error = %err, "quiz submission failed");
                if let Err(gate) = page.visit.submission_failed() {
                    tracing::error!(%learner, %lesson, error = %gate, "submission state lost");
                }
                return Err(LessonPageError::Mutation(err));
            }
        }

        let outcome = page.visit.submission_succeeded(
            &page.curriculum,
            &page.enrollment,
            &self.config,
        )?;
        tracing::info!(
            %learner,
            %lesson,
            score = %result.score,
            passed = result.passed,
            "quiz submission saved"
        );
        Ok(outcome)
    }

    async fn persist(
        &self,
        page: &LessonPage,
        update: ProgressUpdate,
        guard: MutationGuard,
    ) -> Result<Enrollment, StorageError> {
        let progress = Arc::clone(&self.progress);
        let learner = page.learner_id();
        let course = page.course_id();
        let now = self.clock.now();

        let task = tokio::spawn(async move {
            let _guard = guard;
            progress.update_progress(learner, course, &update, now).await?;
            progress.get_progress(learner, course).await
        });
        task.await
            .map_err(|e| StorageError::Connection(e.to_string()))?
    }

    /// Best-effort last-accessed bookkeeping; failures never block the page.
    async fn record_access(&self, page: &mut LessonPage) {
        let lesson = page.lesson_id();
        let update = ProgressUpdate::new().accessed(lesson);
        match self
            .progress
            .update_progress(page.learner_id(), page.course_id(), &update, self.clock.now())
            .await
        {
            Ok(fresh) => page.enrollment = fresh,
            Err(err) => {
                tracing::warn!(
                    learner = %page.learner_id(),
                    %lesson,
                    error = %err,
                    "could not record lesson access"
                );
            }
        }
    }

    fn resume_target(
        &self,
        curriculum: &Curriculum,
        enrollment: &Enrollment,
    ) -> Result<LessonId, LessonPageError> {
        if let Some(last) = enrollment.last_accessed() {
            if curriculum.contains(last)
                && !lock::is_locked(curriculum, enrollment, &self.config, last)?
            {
                return Ok(last);
            }
        }
        sidebar::summarize(curriculum, enrollment, &self.config)
            .resume_at
            .or_else(|| curriculum.first().map(Lesson::id))
            .ok_or(LessonPageError::NotFound)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use lesson_core::gate::GateState;
    use lesson_core::lock::LockReason;
    use lesson_core::model::{LessonDraft, QuestionDraft, QuizDraft};
    use lesson_core::time::fixed_clock;
    use storage::repository::InMemoryRepository;

    fn draft(id: u64, order: u32) -> LessonDraft {
        LessonDraft {
            id: LessonId::new(id),
            course_id: CourseId::new(1),
            order,
            title: format!("Lesson {id}"),
            is_preview: false,
            duration_minutes: None,
            quiz: None,
        }
    }

    fn with_quiz(mut d: LessonDraft) -> LessonDraft {
        d.quiz = Some(QuizDraft {
            questions: vec![QuestionDraft {
                question: "Pick a".into(),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_answer_index: 0,
            }],
            passing_score: None,
        });
        d
    }

    async fn service(drafts: Vec<LessonDraft>) -> (LessonPageService, InMemoryRepository) {
        let repo = InMemoryRepository::new();
        for d in drafts {
            repo.upsert_lesson(&d.validate().unwrap()).await.unwrap();
        }
        let svc = LessonPageService::new(
            fixed_clock(),
            GatingConfig::default(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        );
        (svc, repo)
    }

    #[tokio::test]
    async fn empty_course_is_not_found() {
        let (svc, _) = service(vec![]).await;
        let err = svc
            .open_page(LearnerId::new(1), CourseId::new(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LessonPageError::NotFound));
    }

    #[tokio::test]
    async fn open_enrolls_and_records_access() {
        let (svc, repo) = service(vec![draft(2, 2), draft(1, 1)]).await;
        let page = svc
            .open_page(LearnerId::new(1), CourseId::new(1), None)
            .await
            .unwrap();
        assert_eq!(page.lesson_id(), LessonId::new(1));

        let stored = repo
            .get_progress(LearnerId::new(1), CourseId::new(1))
            .await
            .unwrap();
        assert_eq!(stored.last_accessed(), Some(LessonId::new(1)));
    }

    #[tokio::test]
    async fn opening_locked_lesson_is_refused() {
        let (svc, _) = service(vec![draft(1, 1), draft(2, 2)]).await;
        let err = svc
            .open_page(LearnerId::new(1), CourseId::new(1), Some(LessonId::new(2)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LessonPageError::Locked {
                reason: LockReason::PreviousIncomplete { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unknown_lesson_is_not_found() {
        let (svc, _) = service(vec![draft(1, 1)]).await;
        let err = svc
            .open_page(LearnerId::new(1), CourseId::new(1), Some(LessonId::new(99)))
            .await
            .unwrap_err();
        assert!(matches!(err, LessonPageError::NotFound));
    }

    #[tokio::test]
    async fn resumes_at_last_accessed_lesson() {
        let (svc, _) = service(vec![draft(1, 1), draft(2, 2), draft(3, 3)]).await;
        let learner = LearnerId::new(1);
        let mut page = svc.open_page(learner, CourseId::new(1), None).await.unwrap();
        svc.mark_complete(&mut page).await.unwrap();
        svc.next(&mut page).await.unwrap();
        assert_eq!(page.lesson_id(), LessonId::new(2));

        let reopened = svc.open_page(learner, CourseId::new(1), None).await.unwrap();
        assert_eq!(reopened.lesson_id(), LessonId::new(2));
    }

    #[tokio::test]
    async fn incomplete_answers_never_reach_storage() {
        let mut quiz = with_quiz(draft(1, 1));
        if let Some(q) = quiz.quiz.as_mut() {
            let again = q.questions[0].clone();
            q.questions.push(again);
        }
        let (svc, repo) = service(vec![quiz, draft(2, 2)]).await;
        let learner = LearnerId::new(1);
        let mut page = svc.open_page(learner, CourseId::new(1), None).await.unwrap();
        page.attempt_quiz().unwrap();
        page.select_answer(0, 0).unwrap();

        let err = svc.submit_quiz(&mut page).await.unwrap_err();
        assert!(matches!(err, LessonPageError::Validation(_)));
        assert!(!page.visit().is_submitting());

        let stored = repo.get_progress(learner, CourseId::new(1)).await.unwrap();
        assert!(stored.quiz_scores().is_empty());

        // The guard was released: a complete resubmit goes through.
        page.select_answer(1, 0).unwrap();
        svc.submit_quiz(&mut page).await.unwrap();
    }

    #[tokio::test]
    async fn in_flight_guard_rejects_second_writer() {
        let (svc, _) = service(vec![draft(1, 1)]).await;
        let key = (LearnerId::new(1), LessonId::new(1));
        let held = MutationGuard::acquire(&svc.in_flight, key).unwrap();
        assert!(matches!(
            MutationGuard::acquire(&svc.in_flight, key),
            Err(LessonPageError::AlreadySubmitting)
        ));
        drop(held);
        assert!(MutationGuard::acquire(&svc.in_flight, key).is_ok());
    }

    #[tokio::test]
    async fn quiz_tab_pass_returns_to_viewing() {
        let (svc, _) = service(vec![with_quiz(draft(1, 1)), draft(2, 2)]).await;
        let mut page = svc
            .open_page(LearnerId::new(1), CourseId::new(1), None)
            .await
            .unwrap();
        page.attempt_quiz().unwrap();
        page.select_answer(0, 0).unwrap();

        let outcome = svc.submit_quiz(&mut page).await.unwrap();
        assert!(matches!(outcome, SubmissionOutcome::Passed { .. }));
        assert_eq!(page.visit().state(), &GateState::Viewing);
        assert!(!page.lock_state(LessonId::new(2)).unwrap().is_locked());
    }
}
