mod curriculum;
mod enrollment;
mod ids;
mod lesson;
mod question;
mod quiz;

pub use curriculum::{Curriculum, CurriculumError, sort_by_order};
pub use enrollment::{Enrollment, EnrollmentStatus, ProgressError, ProgressUpdate};
pub use ids::{CourseId, LearnerId, LessonId, ParseIdError, QuestionId};
pub use lesson::{Lesson, LessonDraft, LessonError};
pub use question::{LessonQuestion, LessonQuestionError, NewLessonQuestion};
pub use quiz::{
    OPTIONS_PER_QUESTION, Percentage, QuestionDraft, Quiz, QuizDraft, QuizError, QuizQuestion,
};
