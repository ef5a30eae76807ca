//! Single-pass, greedy course allocation over the CLOSED preference sets of a term.
//!
//! Courses are visited from the most to the least contested first choice. Each course goes to
//! the best eligible candidate (fewer than the course limit, within weekly hours, not already
//! teaching it). A course nobody can take is escalated once per candidate to the external
//! recommender, whose answer comes back through [`AllocationEngine::process_llm_result`].

mod candidates;
mod overrides;
mod pass;
mod results;
mod selection;

pub use overrides::LlmResolution;
pub use results::{AssignedCourse, FacultyAssignment};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info, warn};

use super::domain::{Course, CourseId, Faculty, FacultyId, PreferenceSet, TermId};
use super::error::AllocationError;
use super::locks::{KeyedLocks, RosterLock};
use super::repository::{
    CatalogRepository, EscalationError, EscalationEvent, EscalationPublisher,
    PreferenceSetRepository,
};
use super::workload::AllocationPolicy;
use candidates::CandidatePool;
use pass::AllocationPass;

pub struct AllocationEngine<C, P, E> {
    catalog: Arc<C>,
    preference_sets: Arc<P>,
    escalations: Arc<E>,
    policy: AllocationPolicy,
    term_locks: KeyedLocks<TermId>,
    roster: RosterLock,
}

impl<C, P, E> AllocationEngine<C, P, E>
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
    E: EscalationPublisher + 'static,
{
    pub fn new(
        catalog: Arc<C>,
        preference_sets: Arc<P>,
        escalations: Arc<E>,
        policy: AllocationPolicy,
    ) -> Self {
        Self::with_roster(
            catalog,
            preference_sets,
            escalations,
            policy,
            Arc::new(Mutex::new(())),
        )
    }

    pub(crate) fn with_roster(
        catalog: Arc<C>,
        preference_sets: Arc<P>,
        escalations: Arc<E>,
        policy: AllocationPolicy,
        roster: RosterLock,
    ) -> Self {
        Self {
            catalog,
            preference_sets,
            escalations,
            policy,
            term_locks: KeyedLocks::default(),
            roster,
        }
    }

    pub fn policy(&self) -> AllocationPolicy {
        self.policy
    }

    /// Run one allocation pass for `term_id`.
    ///
    /// Passes for the same term are serialized. Each course decision is persisted as soon as
    /// it is made; a publish failure while escalating does not stop the remaining courses but
    /// fails the run once every course has been visited.
    pub fn run(&self, term_id: &TermId) -> Result<Vec<FacultyAssignment>, AllocationError> {
        let slot = self.term_locks.slot(term_id);
        let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        self.catalog
            .term(term_id)?
            .ok_or_else(|| AllocationError::not_found("academic term", term_id))?;

        let closed = self.closed_sets(term_id)?;
        if closed.is_empty() {
            return Err(AllocationError::InvalidInput(format!(
                "no closed preference sets found for term {term_id}"
            )));
        }

        let participants = self.participants(&closed)?;
        let pool = CandidatePool::collect(&closed, &participants);
        let courses = pool.processing_order(self.referenced_courses(pool.course_ids())?);

        let mut pass = AllocationPass::default();
        let mut failed_publishes = 0usize;
        let mut first_failure: Option<EscalationError> = None;

        for course in courses {
            if pass.is_assigned(&course.id) {
                continue;
            }

            let candidates = pool.candidates_for(&course.id);
            match selection::select(&course, candidates, &pass, &self.policy) {
                Some(chosen) => {
                    let faculty_id = chosen.faculty.id.clone();
                    pass.record_assignment(&faculty_id, &course);
                    info!(
                        course = %course.code,
                        %faculty_id,
                        rank = chosen.preference_rank,
                        "course assigned"
                    );

                    self.commit_assignment(&course.id, faculty_id)?;
                }
                None => {
                    for candidate in candidates {
                        let event = EscalationEvent {
                            faculty_id: candidate.faculty.id.clone(),
                            course_id: course.id.clone(),
                            term_id: term_id.clone(),
                            preference_rank: candidate.preference_rank,
                        };

                        match self.escalations.publish(event) {
                            Ok(()) => debug!(
                                course = %course.code,
                                faculty_id = %candidate.faculty.id,
                                set_id = %candidate.preference_set_id,
                                "escalation published"
                            ),
                            Err(err) => {
                                error!(
                                    course = %course.code,
                                    faculty_id = %candidate.faculty.id,
                                    error = %err,
                                    "escalation publish failed"
                                );
                                failed_publishes += 1;
                                first_failure.get_or_insert(err);
                            }
                        }
                    }

                    warn!(
                        course = %course.code,
                        candidates = candidates.len(),
                        "no eligible faculty, course escalated"
                    );
                    pass.record_unassigned(&course.id);
                }
            }
        }

        if let Some(source) = first_failure {
            return Err(AllocationError::Escalation {
                failed: failed_publishes,
                source,
            });
        }

        info!(
            %term_id,
            assigned = pass.assigned_count(),
            unassigned = pass.unassigned().len(),
            "allocation pass complete"
        );
        Ok(results::per_faculty(&pass, participants.values()))
    }

    /// Courses ranked in a CLOSED set of the term that nobody teaches yet.
    pub fn unassigned_courses(&self, term_id: &TermId) -> Result<Vec<Course>, AllocationError> {
        let closed = self.closed_sets(term_id)?;
        let mut referenced: Vec<&CourseId> = closed
            .iter()
            .flat_map(|set| set.preferences.iter().map(|preference| &preference.course_id))
            .collect();
        referenced.sort();
        referenced.dedup();

        let mut courses = self.referenced_courses(referenced.into_iter())?;
        courses.retain(|course| course.taught_by.is_empty());
        Ok(courses)
    }

    /// Courses currently taught by a faculty member who holds a preference set for the term.
    pub fn faculty_assignments(
        &self,
        faculty_id: &FacultyId,
        term_id: &TermId,
    ) -> Result<Vec<Course>, AllocationError> {
        if self
            .preference_sets
            .find_by_faculty_and_term(faculty_id, term_id)?
            .is_none()
        {
            return Ok(Vec::new());
        }

        if self.catalog.faculty(faculty_id)?.is_none() {
            return Ok(Vec::new());
        }

        self.courses_taught_by(faculty_id)
    }

    // Overrides, LLM results and catalog edits write the same rosters under this lock.
    fn commit_assignment(
        &self,
        course_id: &CourseId,
        faculty_id: FacultyId,
    ) -> Result<(), AllocationError> {
        let _roster = self.roster.lock().unwrap_or_else(PoisonError::into_inner);
        let mut course = self.load_course(course_id)?;
        if course.taught_by.insert(faculty_id) {
            self.catalog.update_course(course)?;
        }
        Ok(())
    }

    fn closed_sets(&self, term_id: &TermId) -> Result<Vec<PreferenceSet>, AllocationError> {
        let mut sets = self.preference_sets.by_term(term_id)?;
        sets.retain(PreferenceSet::is_closed);
        sets.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sets)
    }

    fn participants(
        &self,
        closed: &[PreferenceSet],
    ) -> Result<BTreeMap<FacultyId, Faculty>, AllocationError> {
        let mut participants = BTreeMap::new();
        for set in closed {
            if participants.contains_key(&set.faculty_id) {
                continue;
            }
            let faculty = self
                .catalog
                .faculty(&set.faculty_id)?
                .ok_or_else(|| AllocationError::not_found("faculty", &set.faculty_id))?;
            participants.insert(faculty.id.clone(), faculty);
        }
        Ok(participants)
    }

    fn referenced_courses<'a, I>(&self, course_ids: I) -> Result<Vec<Course>, AllocationError>
    where
        I: Iterator<Item = &'a CourseId>,
    {
        let mut courses = Vec::new();
        for course_id in course_ids {
            match self.catalog.course(course_id)? {
                Some(course) => courses.push(course),
                None => warn!(%course_id, "ranked course no longer in catalog, skipping"),
            }
        }
        Ok(courses)
    }

    fn courses_taught_by(&self, faculty_id: &FacultyId) -> Result<Vec<Course>, AllocationError> {
        let mut courses = self.catalog.courses()?;
        courses.retain(|course| course.is_taught_by(faculty_id));
        Ok(courses)
    }

    fn load_faculty(&self, faculty_id: &FacultyId) -> Result<Faculty, AllocationError> {
        self.catalog
            .faculty(faculty_id)?
            .ok_or_else(|| AllocationError::not_found("faculty", faculty_id))
    }

    fn load_course(&self, course_id: &CourseId) -> Result<Course, AllocationError> {
        self.catalog
            .course(course_id)?
            .ok_or_else(|| AllocationError::not_found("course", course_id))
    }
}
