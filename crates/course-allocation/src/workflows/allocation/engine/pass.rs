use std::collections::BTreeMap;

use crate::workflows::allocation::domain::{Course, CourseId, FacultyId};
use crate::workflows::allocation::workload::Workload;

/// Decisions accumulated during one allocation pass. Persisted rosters are reconciled
/// from here one course at a time, never read back mid-pass.
#[derive(Debug, Default)]
pub(crate) struct AllocationPass {
    by_faculty: BTreeMap<FacultyId, Vec<Course>>,
    assigned: BTreeMap<CourseId, FacultyId>,
    unassigned: Vec<CourseId>,
}

impl AllocationPass {
    pub(crate) fn workload(&self, faculty_id: &FacultyId) -> Workload {
        Workload::of(self.assigned_to(faculty_id))
    }

    pub(crate) fn is_assigned(&self, course_id: &CourseId) -> bool {
        self.assigned.contains_key(course_id)
    }

    pub(crate) fn assigned_to(&self, faculty_id: &FacultyId) -> &[Course] {
        self.by_faculty
            .get(faculty_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn record_assignment(&mut self, faculty_id: &FacultyId, course: &Course) {
        self.by_faculty
            .entry(faculty_id.clone())
            .or_default()
            .push(course.clone());
        self.assigned.insert(course.id.clone(), faculty_id.clone());
    }

    pub(crate) fn record_unassigned(&mut self, course_id: &CourseId) {
        self.unassigned.push(course_id.clone());
    }

    pub(crate) fn unassigned(&self) -> &[CourseId] {
        &self.unassigned
    }

    pub(crate) fn assigned_count(&self) -> usize {
        self.assigned.len()
    }
}
