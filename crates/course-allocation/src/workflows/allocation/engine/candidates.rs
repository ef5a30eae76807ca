use std::collections::BTreeMap;

use crate::workflows::allocation::domain::{
    Course, CourseId, Faculty, FacultyId, PreferenceSet, PreferenceSetId,
};

/// A faculty member who ranked a course, with the rank they gave it.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub(crate) faculty: Faculty,
    pub(crate) preference_set_id: PreferenceSetId,
    pub(crate) preference_rank: u32,
}

/// Course -> candidates index built from the CLOSED sets of one term.
#[derive(Debug, Default)]
pub(crate) struct CandidatePool {
    by_course: BTreeMap<CourseId, Vec<Candidate>>,
}

impl CandidatePool {
    /// `sets` must already be in a stable order; candidate lists keep that order.
    pub(crate) fn collect(sets: &[PreferenceSet], faculty: &BTreeMap<FacultyId, Faculty>) -> Self {
        let mut by_course: BTreeMap<CourseId, Vec<Candidate>> = BTreeMap::new();

        for set in sets {
            let Some(member) = faculty.get(&set.faculty_id) else {
                continue;
            };

            let mut preferences = set.preferences.clone();
            preferences.sort_by_key(|preference| preference.rank);

            for preference in preferences {
                by_course
                    .entry(preference.course_id)
                    .or_default()
                    .push(Candidate {
                        faculty: member.clone(),
                        preference_set_id: set.id.clone(),
                        preference_rank: preference.rank,
                    });
            }
        }

        Self { by_course }
    }

    pub(crate) fn course_ids(&self) -> impl Iterator<Item = &CourseId> {
        self.by_course.keys()
    }

    pub(crate) fn candidates_for(&self, course_id: &CourseId) -> &[Candidate] {
        self.by_course
            .get(course_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Lowest rank any candidate gave the course; `u32::MAX` when nobody ranked it.
    pub(crate) fn best_rank(&self, course_id: &CourseId) -> u32 {
        self.candidates_for(course_id)
            .iter()
            .map(|candidate| candidate.preference_rank)
            .min()
            .unwrap_or(u32::MAX)
    }

    /// Someone's first choice is resolved before anyone's second choice. Ties keep input order.
    pub(crate) fn processing_order(&self, mut courses: Vec<Course>) -> Vec<Course> {
        courses.sort_by_key(|course| self.best_rank(&course.id));
        courses
    }
}
