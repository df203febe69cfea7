use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lesson_core::gate::{GateState, NavigationDecision, SubmissionOutcome};
use lesson_core::lock::{LockReason, LockState};
use lesson_core::model::{
    CourseId, Enrollment, LearnerId, LessonDraft, LessonId, Percentage, ProgressUpdate,
    QuestionDraft, QuizDraft,
};
use lesson_core::sidebar::LessonStatus;
use lesson_core::time::{fixed_clock, fixed_now};
use services::{CurriculumService, GatingConfig, LessonPageError, LessonPageService};
use storage::repository::{InMemoryRepository, LessonRepository, ProgressRepository, StorageError};
use tokio::sync::Notify;

fn course() -> CourseId {
    CourseId::new(1)
}

fn learner() -> LearnerId {
    LearnerId::new(42)
}

fn lesson(id: u64) -> LessonId {
    LessonId::new(id)
}

fn draft(id: u64, order: u32) -> LessonDraft {
    LessonDraft {
        id: lesson(id),
        course_id: course(),
        order,
        title: format!("Lesson {id}"),
        is_preview: false,
        duration_minutes: Some(15),
        quiz: None,
    }
}

/// Quiz with `questions` questions; option 0 is always the right answer.
fn quiz_draft(id: u64, order: u32, questions: usize, passing: Option<u16>) -> LessonDraft {
    let mut d = draft(id, order);
    d.quiz = Some(QuizDraft {
        questions: (0..questions)
            .map(|i| QuestionDraft {
                question: format!("Question {i}"),
                options: vec!["yes".into(), "no".into(), "maybe".into(), "never".into()],
                correct_answer_index: 0,
            })
            .collect(),
        passing_score: passing,
    });
    d
}

async fn seed(repo: &InMemoryRepository, drafts: Vec<LessonDraft>) {
    for d in drafts {
        repo.upsert_lesson(&d.validate().unwrap()).await.unwrap();
    }
}

fn page_service(
    lessons: Arc<dyn LessonRepository>,
    progress: Arc<dyn ProgressRepository>,
) -> LessonPageService {
    LessonPageService::new(
        fixed_clock(),
        GatingConfig::default(),
        lessons,
        progress,
    )
}

async fn setup(drafts: Vec<LessonDraft>) -> (LessonPageService, InMemoryRepository) {
    let repo = InMemoryRepository::new();
    seed(&repo, drafts).await;
    let svc = page_service(Arc::new(repo.clone()), Arc::new(repo.clone()));
    (svc, repo)
}

fn pct(v: u16) -> Percentage {
    Percentage::new(v).unwrap()
}

/// Progress repository that can fail writes or hold them until released.
#[derive(Default)]
struct ControlledProgress {
    inner: InMemoryRepository,
    fail_writes: AtomicBool,
    hold_writes: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl ControlledProgress {
    fn new(inner: InMemoryRepository) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ProgressRepository for ControlledProgress {
    async fn enroll(
        &self,
        learner_id: LearnerId,
        course_id: CourseId,
        now: DateTime<Utc>,
    ) -> Result<Enrollment, StorageError> {
        self.inner.enroll(learner_id, course_id, now).await
    }

    async fn get_progress(
        &self,
        learner_id: LearnerId,
        course_id: CourseId,
    ) -> Result<Enrollment, StorageError> {
        self.inner.get_progress(learner_id, course_id).await
    }

    async fn update_progress(
        &self,
        learner_id: LearnerId,
        course_id: CourseId,
        update: &ProgressUpdate,
        now: DateTime<Utc>,
    ) -> Result<Enrollment, StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("connection reset".into()));
        }
        if self.hold_writes.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner
            .update_progress(learner_id, course_id, update, now)
            .await
    }
}

// Three lessons; lesson 1 has a 2-question quiz with passing score 75.
#[tokio::test]
async fn failed_quiz_keeps_next_lesson_locked_until_retake_passes() {
    let (svc, repo) = setup(vec![quiz_draft(1, 1, 2, Some(75)), draft(2, 2), draft(3, 3)]).await;
    let mut page = svc.open_page(learner(), course(), None).await.unwrap();
    assert_eq!(page.lesson_id(), lesson(1));

    svc.mark_complete(&mut page).await.unwrap();
    assert!(page.enrollment().is_completed(lesson(1)));
    assert!(page.lock_state(lesson(2)).unwrap().is_locked());

    let decision = svc.next(&mut page).await.unwrap();
    assert_eq!(decision, NavigationDecision::PromptQuiz { target: lesson(2) });
    assert_eq!(
        page.visit().state(),
        &GateState::QuizPromptBlocking { target: lesson(2) }
    );

    page.attempt_quiz().unwrap();
    page.select_answer(0, 0).unwrap();
    page.select_answer(1, 2).unwrap();
    let outcome = svc.submit_quiz(&mut page).await.unwrap();
    let result = match outcome {
        SubmissionOutcome::Failed { result } => result,
        other => panic!("expected a failed attempt, got {other:?}"),
    };
    assert_eq!(result.score, pct(50));
    assert_eq!(result.per_question, vec![true, false]);

    let stored = repo.get_progress(learner(), course()).await.unwrap();
    assert_eq!(stored.quiz_score(lesson(1)), Some(pct(50)));
    assert!(matches!(
        page.lock_state(lesson(2)).unwrap(),
        LockState::Locked(LockReason::QuizNotPassed { .. })
    ));
    assert_eq!(page.visit().answers().map(|a| a.len()), Some(0));

    // Leaving the attempt and trying to move on prompts again.
    page.abandon_quiz().unwrap();
    let decision = svc.navigate(&mut page, lesson(2)).await.unwrap();
    assert_eq!(decision, NavigationDecision::PromptQuiz { target: lesson(2) });

    page.attempt_quiz().unwrap();
    page.select_answer(0, 0).unwrap();
    page.select_answer(1, 0).unwrap();
    let outcome = svc.submit_quiz(&mut page).await.unwrap();
    assert!(matches!(
        outcome,
        SubmissionOutcome::PassedAdvancing { target, .. } if target == lesson(2)
    ));
    assert!(!page.lock_state(lesson(2)).unwrap().is_locked());

    let stored = repo.get_progress(learner(), course()).await.unwrap();
    assert!(stored.is_completed(lesson(1)));
    assert_eq!(stored.quiz_score(lesson(1)), Some(Percentage::FULL));

    svc.advance(&mut page).await.unwrap();
    assert_eq!(page.lesson_id(), lesson(2));
    assert_eq!(page.visit().state(), &GateState::Viewing);
}

#[tokio::test]
async fn content_only_lesson_unlocks_next_on_completion() {
    let (svc, repo) = setup(vec![draft(1, 1), draft(2, 2)]).await;
    let mut page = svc.open_page(learner(), course(), None).await.unwrap();
    assert!(matches!(
        page.lock_state(lesson(2)).unwrap(),
        LockState::Locked(LockReason::PreviousIncomplete { .. })
    ));

    svc.mark_complete(&mut page).await.unwrap();
    let stored = repo.get_progress(learner(), course()).await.unwrap();
    assert!(stored.is_completed(lesson(1)));
    assert!(stored.quiz_scores().is_empty());
    assert_eq!(stored.progress_percent(), pct(50));

    let decision = svc.next(&mut page).await.unwrap();
    assert_eq!(decision, NavigationDecision::Allow { target: lesson(2) });
    assert_eq!(page.lesson_id(), lesson(2));
}

#[tokio::test]
async fn retake_overwrites_previous_score() {
    let (svc, repo) = setup(vec![quiz_draft(1, 1, 4, None), draft(2, 2)]).await;
    let mut page = svc.open_page(learner(), course(), None).await.unwrap();

    page.attempt_quiz().unwrap();
    for q in 0..4 {
        page.select_answer(q, 0).unwrap();
    }
    let first = svc.submit_quiz(&mut page).await.unwrap();
    assert!(matches!(first, SubmissionOutcome::Passed { .. }));

    page.attempt_quiz().unwrap();
    page.select_answer(0, 0).unwrap();
    page.select_answer(1, 0).unwrap();
    page.select_answer(2, 1).unwrap();
    page.select_answer(3, 1).unwrap();
    let second = svc.submit_quiz(&mut page).await.unwrap();
    assert!(matches!(second, SubmissionOutcome::Failed { .. }));

    let stored = repo.get_progress(learner(), course()).await.unwrap();
    assert_eq!(stored.quiz_score(lesson(1)), Some(pct(50)));
    // Completion is add-only; the low retake score gates again.
    assert!(stored.is_completed(lesson(1)));
    assert!(page.lock_state(lesson(2)).unwrap().is_locked());
}

#[tokio::test]
async fn backward_navigation_never_prompts() {
    let (svc, _) = setup(vec![draft(1, 1), quiz_draft(2, 2, 1, None), draft(3, 3)]).await;
    let mut page = svc.open_page(learner(), course(), None).await.unwrap();
    svc.mark_complete(&mut page).await.unwrap();
    svc.next(&mut page).await.unwrap();
    assert_eq!(page.lesson_id(), lesson(2));

    let forward = svc.navigate(&mut page, lesson(3)).await.unwrap();
    assert_eq!(forward, NavigationDecision::PromptQuiz { target: lesson(3) });
    page.dismiss_prompt().unwrap();

    let back = svc.navigate(&mut page, lesson(1)).await.unwrap();
    assert_eq!(back, NavigationDecision::Allow { target: lesson(1) });
    assert_eq!(page.lesson_id(), lesson(1));
}

#[tokio::test]
async fn failed_write_keeps_answers_and_unlocks_nothing() {
    let repo = InMemoryRepository::new();
    seed(&repo, vec![quiz_draft(1, 1, 2, None), draft(2, 2)]).await;
    let progress = Arc::new(ControlledProgress::new(repo.clone()));
    let svc = page_service(Arc::new(repo.clone()), progress.clone());

    let mut page = svc.open_page(learner(), course(), None).await.unwrap();
    page.attempt_quiz().unwrap();
    page.select_answer(0, 0).unwrap();
    page.select_answer(1, 0).unwrap();

    progress.fail_writes.store(true, Ordering::SeqCst);
    let err = svc.submit_quiz(&mut page).await.unwrap_err();
    assert!(matches!(err, LessonPageError::Mutation(_)));
    assert!(err.is_retryable());
    assert_eq!(page.visit().answers().map(|a| a.len()), Some(2));
    assert!(!page.visit().is_submitting());
    assert!(page.lock_state(lesson(2)).unwrap().is_locked());

    let stored = repo.get_progress(learner(), course()).await.unwrap();
    assert!(stored.quiz_scores().is_empty());

    progress.fail_writes.store(false, Ordering::SeqCst);
    let outcome = svc.submit_quiz(&mut page).await.unwrap();
    assert!(matches!(outcome, SubmissionOutcome::Passed { .. }));
    assert!(!page.lock_state(lesson(2)).unwrap().is_locked());
}

#[tokio::test]
async fn second_submit_while_in_flight_is_rejected() {
    let repo = InMemoryRepository::new();
    seed(&repo, vec![quiz_draft(1, 1, 1, None), draft(2, 2)]).await;
    let progress = Arc::new(ControlledProgress::new(repo.clone()));
    let svc = page_service(Arc::new(repo.clone()), progress.clone());

    // Two tabs on the same lesson.
    let mut first = svc.open_page(learner(), course(), None).await.unwrap();
    let mut second = svc.open_page(learner(), course(), None).await.unwrap();
    for page in [&mut first, &mut second] {
        page.attempt_quiz().unwrap();
        page.select_answer(0, 0).unwrap();
    }

    progress.hold_writes.store(true, Ordering::SeqCst);
    let svc_first = svc.clone();
    let pending = tokio::spawn(async move {
        let outcome = svc_first.submit_quiz(&mut first).await;
        (outcome, first)
    });
    progress.entered.notified().await;

    let err = svc.submit_quiz(&mut second).await.unwrap_err();
    assert!(matches!(err, LessonPageError::AlreadySubmitting));
    assert_eq!(second.visit().answers().map(|a| a.len()), Some(1));

    progress.hold_writes.store(false, Ordering::SeqCst);
    progress.release.notify_one();
    let (outcome, first) = pending.await.unwrap();
    assert!(matches!(outcome, Ok(SubmissionOutcome::Passed { .. })));
    assert!(first.enrollment().is_completed(lesson(1)));
}

#[tokio::test]
async fn abandoned_caller_does_not_cancel_the_write() {
    let repo = InMemoryRepository::new();
    seed(&repo, vec![quiz_draft(1, 1, 1, None), draft(2, 2)]).await;
    let progress = Arc::new(ControlledProgress::new(repo.clone()));
    let svc = page_service(Arc::new(repo.clone()), progress.clone());

    let mut page = svc.open_page(learner(), course(), None).await.unwrap();
    page.attempt_quiz().unwrap();
    page.select_answer(0, 0).unwrap();

    progress.hold_writes.store(true, Ordering::SeqCst);
    let svc_bg = svc.clone();
    let caller = tokio::spawn(async move { svc_bg.submit_quiz(&mut page).await.is_ok() });
    progress.entered.notified().await;
    caller.abort();
    progress.hold_writes.store(false, Ordering::SeqCst);
    progress.release.notify_one();

    let mut saved = None;
    for _ in 0..1_000 {
        let stored = repo.get_progress(learner(), course()).await.unwrap();
        if stored.quiz_score(lesson(1)).is_some() {
            saved = Some(stored);
            break;
        }
        tokio::task::yield_now().await;
    }
    let saved = saved.expect("write finished after the caller went away");
    assert!(saved.is_completed(lesson(1)));
}

#[tokio::test]
async fn deleted_prerequisite_renders_as_stale_lock() {
    let (svc, repo) = setup(vec![draft(1, 1), draft(2, 2), draft(3, 3), draft(4, 4)]).await;
    repo.enroll(learner(), course(), fixed_now()).await.unwrap();
    repo.update_progress(
        learner(),
        course(),
        &ProgressUpdate::new().complete(lesson(1)).complete(lesson(3)),
        fixed_now(),
    )
    .await
    .unwrap();

    let curriculum = CurriculumService::new(Arc::new(repo.clone()));
    curriculum.delete_lesson(lesson(3)).await.unwrap();

    let page = svc.open_page(learner(), course(), None).await.unwrap();
    assert_eq!(page.lesson_id(), lesson(2));
    match page.lock_state(lesson(4)).unwrap() {
        LockState::Locked(LockReason::StaleDependency { previous, orphaned }) => {
            assert_eq!(previous, lesson(2));
            assert_eq!(orphaned, vec![lesson(3)]);
        }
        other => panic!("expected a stale lock, got {other:?}"),
    }

    let rows = page.sidebar();
    let statuses: Vec<LessonStatus> = rows.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            LessonStatus::Completed,
            LessonStatus::Current,
            LessonStatus::Locked
        ]
    );
    let summary = page.summary();
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.total, 3);
}

#[tokio::test]
async fn reorder_is_seen_by_the_next_page_load() {
    let (svc, repo) = setup(vec![draft(1, 1), draft(2, 2), draft(3, 3)]).await;
    let curriculum = CurriculumService::new(Arc::new(repo.clone()));
    curriculum
        .reorder(course(), &[lesson(3), lesson(1), lesson(2)])
        .await
        .unwrap();

    let page = svc.open_page(learner(), course(), None).await.unwrap();
    assert_eq!(page.lesson_id(), lesson(3));
    assert!(page.lock_state(lesson(1)).unwrap().is_locked());
}
