use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of options every quiz question offers.
pub const OPTIONS_PER_QUESTION: usize = 4;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("percentage must be between 0 and 100, got {0}")]
    InvalidPercentage(u16),

    #[error("question {index} has empty text")]
    EmptyQuestion { index: usize },

    #[error("question {index} must have exactly 4 options, got {got}")]
    WrongOptionCount { index: usize, got: usize },

    #[error("question {index} has an empty option")]
    EmptyOption { index: usize },

    #[error("question {index} correct answer {correct} is out of range")]
    CorrectAnswerOutOfRange { index: usize, correct: usize },

    #[error("quiz has {questions} questions but only {answered} were answered")]
    IncompleteAnswers { answered: usize, questions: usize },

    #[error("answer given for unknown question {index}")]
    UnknownQuestion { index: usize },

    #[error("option {option} is out of range for question {index}")]
    OptionOutOfRange { index: usize, option: usize },

    #[error("quiz has no questions to score")]
    NoQuestions,
}

//
// ─── PERCENTAGE ────────────────────────────────────────────────────────────────
//

/// Whole-number percentage in `0..=100`, used for quiz scores and passing thresholds.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Percentage(u8);

impl Percentage {
    pub const ZERO: Self = Self(0);
    pub const FULL: Self = Self(100);

    /// Creates a percentage.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::InvalidPercentage` if the value exceeds 100.
    pub fn new(value: u16) -> Result<Self, QuizError> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= 100)
            .map(Self)
            .ok_or(QuizError::InvalidPercentage(value))
    }

    /// `round(100 * part / whole)` with halves rounding up.
    ///
    /// Returns `None` when `whole` is zero or `part > whole`.
    #[must_use]
    pub fn of(part: usize, whole: usize) -> Option<Self> {
        if whole == 0 || part > whole {
            return None;
        }
        let part = part as u64;
        let whole = whole as u64;
        let rounded = (200 * part + whole) / (2 * whole);
        u8::try_from(rounded).ok().map(Self)
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u16> for Percentage {
    type Error = QuizError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Percentage> for u16 {
    fn from(value: Percentage) -> Self {
        u16::from(value.0)
    }
}

impl fmt::Debug for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

//
// ─── QUESTIONS ─────────────────────────────────────────────────────────────────
//

/// A single multiple-choice question. Its position inside the quiz is its index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizQuestion {
    text: String,
    options: [String; OPTIONS_PER_QUESTION],
    correct_option: usize,
}

impl QuizQuestion {
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[String; OPTIONS_PER_QUESTION] {
        &self.options
    }

    #[must_use]
    pub fn correct_option(&self) -> usize {
        self.correct_option
    }

    #[must_use]
    pub fn is_correct(&self, option: usize) -> bool {
        self.correct_option == option
    }
}

/// Unvalidated question as it arrives from content authoring or storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDraft {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer_index: usize,
}

impl QuestionDraft {
    fn validate(self, index: usize) -> Result<QuizQuestion, QuizError> {
        let text = self.question.trim().to_owned();
        if text.is_empty() {
            return Err(QuizError::EmptyQuestion { index });
        }
        let got = self.options.len();
        let options: [String; OPTIONS_PER_QUESTION] = self
            .options
            .try_into()
            .map_err(|_| QuizError::WrongOptionCount { index, got })?;
        if options.iter().any(|o| o.trim().is_empty()) {
            return Err(QuizError::EmptyOption { index });
        }
        if self.correct_answer_index >= OPTIONS_PER_QUESTION {
            return Err(QuizError::CorrectAnswerOutOfRange {
                index,
                correct: self.correct_answer_index,
            });
        }
        Ok(QuizQuestion {
            text,
            options,
            correct_option: self.correct_answer_index,
        })
    }
}

//
// ─── QUIZ ──────────────────────────────────────────────────────────────────────
//

/// Ordered questions attached to a lesson.
///
/// `passing_score` is the authoritative threshold when present. When absent,
/// the caller's `GatingConfig` supplies a fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quiz {
    questions: Vec<QuizQuestion>,
    passing_score: Option<Percentage>,
}

impl Quiz {
    #[must_use]
    pub fn questions(&self) -> &[QuizQuestion] {
        &self.questions
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn passing_score(&self) -> Option<Percentage> {
        self.passing_score
    }

    /// A quiz without questions never gates anything.
    #[must_use]
    pub fn is_gating(&self) -> bool {
        !self.questions.is_empty()
    }

    #[must_use]
    pub fn to_draft(&self) -> QuizDraft {
        QuizDraft {
            questions: self
                .questions
                .iter()
                .map(|q| QuestionDraft {
                    question: q.text.clone(),
                    options: q.options.to_vec(),
                    correct_answer_index: q.correct_option,
                })
                .collect(),
            passing_score: self.passing_score.map(|p| u16::from(p.value())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizDraft {
    #[serde(default)]
    pub questions: Vec<QuestionDraft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passing_score: Option<u16>,
}

impl QuizDraft {
    /// Validate every question and the optional passing score.
    ///
    /// # Errors
    ///
    /// Returns the first `QuizError` found, by question order.
    pub fn validate(self) -> Result<Quiz, QuizError> {
        let passing_score = self.passing_score.map(Percentage::new).transpose()?;
        let questions = self
            .questions
            .into_iter()
            .enumerate()
            .map(|(index, q)| q.validate(index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Quiz {
            questions,
            passing_score,
        })
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
