//! Fixtures shared by unit tests in this crate.

use crate::model::{
    CourseId, Curriculum, Lesson, LessonDraft, LessonId, Percentage, QuestionDraft, QuizDraft,
};

pub(crate) fn lesson(id: u64, order: u32) -> Lesson {
    draft(id, order).validate().unwrap()
}

/// A lesson whose quiz has `questions` questions, each with option 0 correct.
pub(crate) fn lesson_with_quiz(
    id: u64,
    order: u32,
    questions: usize,
    passing: Option<u16>,
) -> Lesson {
    let mut d = draft(id, order);
    d.quiz = Some(QuizDraft {
        questions: (0..questions)
            .map(|i| QuestionDraft {
                question: format!("Question {i}"),
                options: vec!["right".into(), "wrong".into(), "wrong".into(), "wrong".into()],
                correct_answer_index: 0,
            })
            .collect(),
        passing_score: passing,
    });
    d.validate().unwrap()
}

pub(crate) fn course(lessons: Vec<Lesson>) -> Curriculum {
    Curriculum::new(CourseId::new(1), lessons).unwrap()
}

pub(crate) fn pct(v: u16) -> Percentage {
    Percentage::new(v).unwrap()
}

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
