use serde::Serialize;

use super::domain::{Course, Faculty};

pub const MAX_COURSES_PER_FACULTY: usize = 2;

/// Upper bound on concurrently held courses, shared by the batch pass and the overrides.
///
/// The bound can be tightened below [`MAX_COURSES_PER_FACULTY`] but never raised above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationPolicy {
    max_courses_per_faculty: usize,
}

impl AllocationPolicy {
    pub fn new(max_courses_per_faculty: usize) -> Self {
        let sanitized = if max_courses_per_faculty == 0 {
            MAX_COURSES_PER_FACULTY
        } else {
            max_courses_per_faculty.min(MAX_COURSES_PER_FACULTY)
        };

        Self {
            max_courses_per_faculty: sanitized,
        }
    }

    pub fn max_courses_per_faculty(&self) -> usize {
        self.max_courses_per_faculty
    }
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self::new(MAX_COURSES_PER_FACULTY)
    }
}

/// Reasons a faculty member cannot take on a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum CapacityViolation {
    #[error("{requested} courses exceed the limit of {limit} per faculty")]
    CourseLimit { requested: usize, limit: usize },
    #[error("{requested} hours per week exceed the faculty maximum of {max}")]
    HourLimit { requested: u32, max: u32 },
}

/// Course count and weekly hours currently held by one faculty member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Workload {
    pub courses: usize,
    pub hours: u32,
}

impl Workload {
    pub fn of<'a, I>(courses: I) -> Self
    where
        I: IntoIterator<Item = &'a Course>,
    {
        courses
            .into_iter()
            .fold(Self::default(), |load, course| {
                load.with_course(course.hours_required_per_week)
            })
    }

    pub fn with_course(self, hours: u32) -> Self {
        Self {
            courses: self.courses + 1,
            hours: self.hours.saturating_add(hours),
        }
    }

    pub fn remaining_hours(&self, faculty: &Faculty) -> u32 {
        faculty.max_hours_per_week.saturating_sub(self.hours)
    }

    pub fn within(&self, faculty: &Faculty, policy: &AllocationPolicy) -> Result<(), CapacityViolation> {
        let limit = policy.max_courses_per_faculty();
        if self.courses > limit {
            return Err(CapacityViolation::CourseLimit {
                requested: self.courses,
                limit,
            });
        }

        if self.hours > faculty.max_hours_per_week {
            return Err(CapacityViolation::HourLimit {
                requested: self.hours,
                max: faculty.max_hours_per_week,
            });
        }

        Ok(())
    }

    /// Checks whether one more course of `hours` still fits.
    pub fn admits(
        &self,
        faculty: &Faculty,
        hours: u32,
        policy: &AllocationPolicy,
    ) -> Result<(), CapacityViolation> {
        self.with_course(hours).within(faculty, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::allocation::domain::{CourseId, FacultyId};
    use std::collections::BTreeSet;

    fn faculty(max_hours_per_week: u32) -> Faculty {
        Faculty {
            id: FacultyId::new("fac-1"),
            name: "Dr. Kaur".to_string(),
            seniority_score: 1,
            mobility_score: 1,
            rating: 4.0,
            max_hours_per_week,
        }
    }

    fn course(id: &str, hours: u32) -> Course {
        Course {
            id: CourseId::new(id),
            code: id.to_uppercase(),
            name: format!("Course {id}"),
            hours_required_per_week: hours,
            taught_by: BTreeSet::new(),
        }
    }

    #[test]
    fn workload_sums_courses_and_hours() {
        let courses = [course("c1", 3), course("c2", 4)];
        let load = Workload::of(&courses);
        assert_eq!(load, Workload { courses: 2, hours: 7 });
        assert_eq!(load.remaining_hours(&faculty(10)), 3);
        assert_eq!(load.remaining_hours(&faculty(5)), 0);
    }

    #[test]
    fn third_course_is_rejected_by_default_policy() {
        let load = Workload::of(&[course("c1", 3), course("c2", 3)]);
        let err = load
            .admits(&faculty(40), 3, &AllocationPolicy::default())
            .expect_err("third course rejected");
        assert_eq!(
            err,
            CapacityViolation::CourseLimit {
                requested: 3,
                limit: 2
            }
        );
    }

    #[test]
    fn hours_may_reach_but_not_exceed_maximum() {
        let load = Workload::of(&[course("c1", 6)]);
        let policy = AllocationPolicy::default();
        assert!(load.admits(&faculty(10), 4, &policy).is_ok());
        assert_eq!(
            load.admits(&faculty(10), 5, &policy),
            Err(CapacityViolation::HourLimit {
                requested: 11,
                max: 10
            })
        );
    }

    #[test]
    fn course_limit_stays_within_two() {
        assert_eq!(AllocationPolicy::new(0).max_courses_per_faculty(), 2);
        assert_eq!(AllocationPolicy::new(1).max_courses_per_faculty(), 1);
        assert_eq!(AllocationPolicy::new(3).max_courses_per_faculty(), 2);
        assert_eq!(AllocationPolicy::new(usize::MAX).max_courses_per_faculty(), 2);
    }
}
