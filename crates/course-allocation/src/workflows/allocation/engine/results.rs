use serde::{Deserialize, Serialize};

use super::pass::AllocationPass;
use crate::workflows::allocation::domain::{Course, CourseId, Faculty, FacultyId};

/// Course summary attached to a faculty result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedCourse {
    pub course_id: CourseId,
    pub course_code: String,
    pub course_name: String,
    pub hours_required_per_week: u32,
}

impl From<&Course> for AssignedCourse {
    fn from(course: &Course) -> Self {
        Self {
            course_id: course.id.clone(),
            course_code: course.code.clone(),
            course_name: course.name.clone(),
            hours_required_per_week: course.hours_required_per_week,
        }
    }
}

/// Outcome of an allocation pass for one faculty member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacultyAssignment {
    pub faculty_id: FacultyId,
    pub faculty_name: String,
    pub assigned_courses: Vec<AssignedCourse>,
    /// Every course of the term the pass left unresolved, identical for all faculty.
    pub unassigned_course_ids: Vec<CourseId>,
}

/// One entry per participating faculty, including those who received nothing.
pub(crate) fn per_faculty<'a, I>(pass: &AllocationPass, participants: I) -> Vec<FacultyAssignment>
where
    I: IntoIterator<Item = &'a Faculty>,
{
    let unassigned = term_wide_unassigned(pass);

    participants
        .into_iter()
        .map(|faculty| FacultyAssignment {
            faculty_id: faculty.id.clone(),
            faculty_name: faculty.name.clone(),
            assigned_courses: pass
                .assigned_to(&faculty.id)
                .iter()
                .map(AssignedCourse::from)
                .collect(),
            unassigned_course_ids: unassigned.clone(),
        })
        .collect()
}

// The same term-wide list goes to every faculty entry.
fn term_wide_unassigned(pass: &AllocationPass) -> Vec<CourseId> {
    pass.unassigned().to_vec()
}
