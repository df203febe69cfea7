use std::collections::BTreeMap;

use crate::config::GatingConfig;
use crate::model::{
    Lesson, LessonId, OPTIONS_PER_QUESTION, Percentage, ProgressUpdate, Quiz, QuizError,
};

//
// ─── ANSWERS ───────────────────────────────────────────────────────────────────
//

/// In-progress selections for one quiz attempt: question index to option index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuizAnswers(BTreeMap<usize, usize>);

impl QuizAnswers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select (or change) the option for a question.
    pub fn select(&mut self, question: usize, option: usize) {
        self.0.insert(question, option);
    }

    #[must_use]
    pub fn selected(&self, question: usize) -> Option<usize> {
        self.0.get(&question).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.0.iter().map(|(q, o)| (*q, *o))
    }
}

impl FromIterator<(usize, usize)> for QuizAnswers {
    fn from_iter<T: IntoIterator<Item = (usize, usize)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

//
// ─── SCORING ───────────────────────────────────────────────────────────────────
//

/// Validate `answers` against `quiz` without scoring.
///
/// # Errors
///
/// Returns `QuizError::UnknownQuestion` or `QuizError::OptionOutOfRange` for
/// malformed selections, and `QuizError::IncompleteAnswers` until every
/// question is answered.
pub fn validate_answers(quiz: &Quiz, answers: &QuizAnswers) -> Result<(), QuizError> {
    let questions = quiz.question_count();
    if questions == 0 {
        return Err(QuizError::NoQuestions);
    }
    for (index, option) in answers.iter() {
        if index >= questions {
            return Err(QuizError::UnknownQuestion { index });
        }
        if option >= OPTIONS_PER_QUESTION {
            return Err(QuizError::OptionOutOfRange { index, option });
        }
    }
    if answers.len() != questions {
        return Err(QuizError::IncompleteAnswers {
            answered: answers.len(),
            questions,
        });
    }
    Ok(())
}

/// `round(100 * correct / questions)`, halves rounding up.
///
/// # Errors
///
/// See [`validate_answers`].
pub fn score(quiz: &Quiz, answers: &QuizAnswers) -> Result<Percentage, QuizError> {
    Ok(mark(quiz, answers)?.0)
}

fn mark(quiz: &Quiz, answers: &QuizAnswers) -> Result<(Percentage, Vec<bool>), QuizError> {
    validate_answers(quiz, answers)?;
    let per_question: Vec<bool> = quiz
        .questions()
        .iter()
        .enumerate()
        .map(|(i, q)| answers.selected(i).is_some_and(|o| q.is_correct(o)))
        .collect();
    let correct = per_question.iter().filter(|c| **c).count();
    let pct = Percentage::of(correct, per_question.len()).ok_or(QuizError::NoQuestions)?;
    Ok((pct, per_question))
}

//
// ─── RESULT ────────────────────────────────────────────────────────────────────
//

/// Outcome of grading one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizResult {
    pub lesson_id: LessonId,
    pub score: Percentage,
    pub threshold: Percentage,
    pub passed: bool,
    /// Correctness per question, in question order.
    pub per_question: Vec<bool>,
}

impl QuizResult {
    #[must_use]
    pub fn correct_count(&self) -> usize {
        self.per_question.iter().filter(|c| **c).count()
    }

    /// The progress delta to persist for this submission.
    ///
    /// The score is always written, replacing any earlier attempt. A pass also
    /// completes the lesson.
    #[must_use]
    pub fn progress_update(&self) -> ProgressUpdate {
        let update = ProgressUpdate::new().score(self.lesson_id, self.score);
        if self.passed {
            update.complete(self.lesson_id)
        } else {
            update
        }
    }
}

/// Grade a submission for `lesson`'s quiz.
///
/// # Errors
///
/// Returns `QuizError::NoQuestions` if the lesson has no gating quiz, or any
/// validation error from [`validate_answers`].
pub fn grade(
    lesson: &Lesson,
    answers: &QuizAnswers,
    config: &GatingConfig,
) -> Result<QuizResult, QuizError> {
    let quiz = lesson.gating_quiz().ok_or(QuizError::NoQuestions)?;
    let (score, per_question) = mark(quiz, answers)?;
    let threshold = config.submission_threshold(quiz);
    Ok(QuizResult {
        lesson_id: lesson.id(),
        score,
        threshold,
        passed: score >= threshold,
        per_question,
    })
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{lesson, lesson_with_quiz, pct};

    fn answers(picks: &[usize]) -> QuizAnswers {
        picks.iter().copied().enumerate().collect()
    }

    #[test]
    fn scores_k_of_n() {
        let l = lesson_with_quiz(1, 1, 3, None);
        let quiz = l.quiz().unwrap();
        assert_eq!(score(quiz, &answers(&[0, 0, 0])).unwrap(), pct(100));
        assert_eq!(score(quiz, &answers(&[0, 1, 0])).unwrap(), pct(67));
        assert_eq!(score(quiz, &answers(&[0, 1, 1])).unwrap(), pct(33));
        assert_eq!(score(quiz, &answers(&[2, 1, 1])).unwrap(), pct(0));
    }

    #[test]
    fn half_rounds_up() {
        let l = lesson_with_quiz(1, 1, 8, None);
        let quiz = l.quiz().unwrap();
        // 1 of 8 = 12.5
        assert_eq!(
            score(quiz, &answers(&[0, 1, 1, 1, 1, 1, 1, 1])).unwrap(),
            pct(13)
        );
    }

    #[test]
    fn scoring_is_deterministic() {
        let l = lesson_with_quiz(1, 1, 4, None);
        let quiz = l.quiz().unwrap();
        let a = answers(&[0, 2, 0, 3]);
        let first = score(quiz, &a).unwrap();
        for _ in 0..10 {
            assert_eq!(score(quiz, &a).unwrap(), first);
        }
    }

    #[test]
    fn incomplete_answers_rejected() {
        let l = lesson_with_quiz(1, 1, 3, None);
        let err = score(l.quiz().unwrap(), &answers(&[0, 0])).unwrap_err();
        assert_eq!(
            err,
            QuizError::IncompleteAnswers {
                answered: 2,
                questions: 3
            }
        );
    }

    #[test]
    fn malformed_answers_fail_fast() {
        let l = lesson_with_quiz(1, 1, 2, None);
        let quiz = l.quiz().unwrap();

        let extra: QuizAnswers = [(0, 0), (5, 0)].into_iter().collect();
        assert_eq!(
            score(quiz, &extra).unwrap_err(),
            QuizError::UnknownQuestion { index: 5 }
        );

        let bad_option: QuizAnswers = [(0, 0), (1, 4)].into_iter().collect();
        assert_eq!(
            score(quiz, &bad_option).unwrap_err(),
            QuizError::OptionOutOfRange {
                index: 1,
                option: 4
            }
        );
    }

    #[test]
    fn grade_uses_quiz_threshold() {
        let l = lesson_with_quiz(7, 1, 2, Some(75));
        let failed = grade(&l, &answers(&[0, 1]), &GatingConfig::default()).unwrap();
        assert_eq!(failed.score, pct(50));
        assert_eq!(failed.threshold, pct(75));
        assert!(!failed.passed);
        assert_eq!(failed.per_question, vec![true, false]);

        let passed = grade(&l, &answers(&[0, 0]), &GatingConfig::default()).unwrap();
        assert!(passed.passed);
        assert_eq!(passed.correct_count(), 2);
    }

    #[test]
    fn grade_falls_back_to_quiz_default() {
        let l = lesson_with_quiz(1, 1, 10, None);
        let seven = answers(&[0, 0, 0, 0, 0, 0, 0, 1, 1, 1]);
        assert!(grade(&l, &seven, &GatingConfig::default()).unwrap().passed);
        let strict = GatingConfig::new(80, 80).unwrap();
        assert!(!grade(&l, &seven, &strict).unwrap().passed);
    }

    #[test]
    fn grade_without_quiz_is_rejected() {
        let l = lesson(1, 1);
        assert_eq!(
            grade(&l, &QuizAnswers::new(), &GatingConfig::default()).unwrap_err(),
            QuizError::NoQuestions
        );
    }

    #[test]
    fn pass_update_completes_fail_update_only_scores() {
        let l = lesson_with_quiz(3, 1, 2, Some(75));
        let fail = grade(&l, &answers(&[1, 0]), &GatingConfig::default()).unwrap();
        let update = fail.progress_update();
        assert!(update.completed.is_empty());
        assert_eq!(update.quiz_scores.get(&LessonId::new(3)), Some(&pct(50)));

        let pass = grade(&l, &answers(&[0, 0]), &GatingConfig::default()).unwrap();
        let update = pass.progress_update();
        assert!(update.completed.contains(&LessonId::new(3)));
        assert_eq!(update.quiz_scores.get(&LessonId::new(3)), Some(&pct(100)));
    }

    #[test]
    fn answers_track_completeness() {
        let l = lesson_with_quiz(1, 1, 2, None);
        let quiz = l.quiz().unwrap();
        let mut a = QuizAnswers::new();
        a.select(0, 1);
        assert!(validate_answers(quiz, &a).is_err());
        a.select(1, 0);
        a.select(0, 0);
        assert!(validate_answers(quiz, &a).is_ok());
        assert_eq!(a.selected(0), Some(0));
        a.clear();
        assert!(a.is_empty());
    }
}
