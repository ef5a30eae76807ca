use std::sync::PoisonError;

use serde::Serialize;
use tracing::{info, warn};

use super::AllocationEngine;
use crate::workflows::allocation::domain::{Course, CourseId, FacultyId};
use crate::workflows::allocation::error::AllocationError;
use crate::workflows::allocation::ranking::distinct;
use crate::workflows::allocation::repository::{
    CatalogRepository, EscalationPublisher, PreferenceSetRepository,
};
use crate::workflows::allocation::workload::{CapacityViolation, Workload};

/// What happened to a recommendation returned by the external recommender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LlmResolution {
    NotRecommended,
    AlreadyAssigned,
    Assigned,
    /// Capacity limits left no room; nothing changed.
    Declined { reason: CapacityViolation },
}

impl<C, P, E> AllocationEngine<C, P, E>
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    /// Make `course_ids` the complete set of courses taught by the faculty member.
    pub fn update_faculty_assignments(
        &self,
        faculty_id: &FacultyId,
        course_ids: &[CourseId],
    ) -> Result<Vec<Course>, AllocationError> {
        let _roster = self.roster.lock().unwrap_or_else(PoisonError::into_inner);

        let faculty = self.load_faculty(faculty_id)?;
        let requested = distinct(course_ids);
        let courses = requested
            .iter()
            .map(|course_id| self.load_course(course_id))
            .collect::<Result<Vec<_>, _>>()?;

        Workload::of(&courses)
            .within(&faculty, &self.policy)
            .map_err(|violation| AllocationError::InvalidInput(violation.to_string()))?;

        let mut changed = Vec::new();
        for mut course in self.catalog.courses()? {
            let modified = if requested.contains(&course.id) {
                course.taught_by.insert(faculty_id.clone())
            } else {
                course.taught_by.remove(faculty_id)
            };
            if modified {
                changed.push(course);
            }
        }

        let touched = changed.len();
        self.catalog.save_courses(changed)?;
        info!(%faculty_id, courses = courses.len(), touched, "faculty assignments replaced");

        self.courses_taught_by(faculty_id)
    }

    /// Drop the faculty member from one course. Succeeds when they were not teaching it.
    pub fn remove_course_assignment(
        &self,
        faculty_id: &FacultyId,
        course_id: &CourseId,
    ) -> Result<(), AllocationError> {
        let _roster = self.roster.lock().unwrap_or_else(PoisonError::into_inner);

        let mut course = self.load_course(course_id)?;
        if course.taught_by.remove(faculty_id) {
            self.catalog.update_course(course)?;
            info!(%faculty_id, %course_id, "course assignment removed");
        }
        Ok(())
    }

    /// Apply an external recommendation on a best-effort basis.
    ///
    /// A recommendation that would break the course or hour limits is logged and ignored; the
    /// caller still sees success.
    pub fn process_llm_result(
        &self,
        faculty_id: &FacultyId,
        course_id: &CourseId,
        recommended: bool,
    ) -> Result<LlmResolution, AllocationError> {
        if !recommended {
            return Ok(LlmResolution::NotRecommended);
        }

        let _roster = self.roster.lock().unwrap_or_else(PoisonError::into_inner);

        let faculty = self.load_faculty(faculty_id)?;
        let mut course = self.load_course(course_id)?;
        if course.is_taught_by(faculty_id) {
            return Ok(LlmResolution::AlreadyAssigned);
        }

        let current = self.courses_taught_by(faculty_id)?;
        if let Err(violation) =
            Workload::of(&current).admits(&faculty, course.hours_required_per_week, &self.policy)
        {
            warn!(
                %faculty_id,
                %course_id,
                reason = %violation,
                "recommendation declined"
            );
            return Ok(LlmResolution::Declined { reason: violation });
        }

        course.taught_by.insert(faculty_id.clone());
        self.catalog.update_course(course)?;
        info!(%faculty_id, %course_id, "course assigned via recommendation");
        Ok(LlmResolution::Assigned)
    }
}
