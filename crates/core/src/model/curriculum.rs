use std::collections::HashSet;
use std::ops::RangeInclusive;

use thiserror::Error;

use crate::model::ids::{CourseId, LessonId};
use crate::model::lesson::Lesson;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CurriculumError {
    #[error("two lessons share order {order}")]
    DuplicateOrder { order: u32 },

    #[error("lesson {0} appears twice")]
    DuplicateLesson(LessonId),

    #[error("lesson {lesson} belongs to course {found}, expected {expected}")]
    ForeignLesson {
        lesson: LessonId,
        expected: CourseId,
        found: CourseId,
    },
}

/// Sort lessons by their `order` key.
///
/// Every prev/next computation goes through a curriculum built with this, never
/// through the position a lesson had in a fetched list.
pub fn sort_by_order(lessons: &mut [Lesson]) {
    lessons.sort_by_key(|l| (l.order(), l.id()));
}

/// The ordered, read-only lesson sequence of one course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Curriculum {
    course_id: CourseId,
    lessons: Vec<Lesson>,
}

impl Curriculum {
    /// Build a curriculum from lessons in any order.
    ///
    /// Gaps in the order sequence are tolerated (lessons may have been removed
    /// or renumbered by hand); duplicate order slots are not.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError` for duplicate ids, duplicate orders, or lessons
    /// from another course.
    pub fn new(course_id: CourseId, mut lessons: Vec<Lesson>) -> Result<Self, CurriculumError> {
        let mut ids = HashSet::with_capacity(lessons.len());
        for lesson in &lessons {
            if lesson.course_id() != course_id {
                return Err(CurriculumError::ForeignLesson {
                    lesson: lesson.id(),
                    expected: course_id,
                    found: lesson.course_id(),
                });
            }
            if !ids.insert(lesson.id()) {
                return Err(CurriculumError::DuplicateLesson(lesson.id()));
            }
        }

        sort_by_order(&mut lessons);
        if let Some(pair) = lessons.windows(2).find(|w| w[0].order() == w[1].order()) {
            return Err(CurriculumError::DuplicateOrder {
                order: pair[0].order(),
            });
        }

        let curriculum = Self { course_id, lessons };
        let gaps = curriculum.order_gaps();
        if !gaps.is_empty() {
            tracing::debug!(
                course = %course_id,
                ranges = gaps.len(),
                ?gaps,
                "curriculum has gaps in lesson order"
            );
        }
        Ok(curriculum)
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    /// Lessons sorted by `order`.
    #[must_use]
    pub fn lessons(&self) -> &[Lesson] {
        &self.lessons
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.lessons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lessons.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: LessonId) -> Option<&Lesson> {
        self.lessons.iter().find(|l| l.id() == id)
    }

    #[must_use]
    pub fn contains(&self, id: LessonId) -> bool {
        self.get(id).is_some()
    }

    /// Zero-based position of the lesson in order.
    #[must_use]
    pub fn position(&self, id: LessonId) -> Option<usize> {
        self.lessons.iter().position(|l| l.id() == id)
    }

    #[must_use]
    pub fn first(&self) -> Option<&Lesson> {
        self.lessons.first()
    }

    #[must_use]
    pub fn is_first(&self, id: LessonId) -> bool {
        self.first().is_some_and(|l| l.id() == id)
    }

    /// The lesson with the largest order strictly below the given lesson's order.
    #[must_use]
    pub fn previous(&self, id: LessonId) -> Option<&Lesson> {
        let idx = self.position(id)?;
        idx.checked_sub(1).map(|p| &self.lessons[p])
    }

    /// The lesson with the smallest order strictly above the given lesson's order.
    #[must_use]
    pub fn next(&self, id: LessonId) -> Option<&Lesson> {
        let idx = self.position(id)?;
        self.lessons.get(idx + 1)
    }

    /// Ids in order, the shape batch reordering consumes.
    #[must_use]
    pub fn ordered_ids(&self) -> Vec<LessonId> {
        self.lessons.iter().map(Lesson::id).collect()
    }

    /// Runs of empty order slots between 1 and the highest order, one range per
    /// gap. Cost follows the lesson count, not the size of the gaps.
    #[must_use]
    pub fn order_gaps(&self) -> Vec<RangeInclusive<u32>> {
        let Some(first) = self.lessons.first() else {
            return Vec::new();
        };
        let leading = (first.order() > 1).then(|| 1..=first.order() - 1);
        leading
            .into_iter()
            .chain(self.lessons.windows(2).filter_map(|w| {
                let (lo, hi) = (w[0].order(), w[1].order());
                (hi > lo + 1).then(|| lo + 1..=hi - 1)
            }))
            .collect()
    }
}
