use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};

use chrono::Utc;
use tracing::{debug, info};

use super::domain::{
    AcademicTerm, CourseId, FacultyId, PreferenceSet, PreferenceSetId, PreferenceSetStatus,
    PreferenceSetView, TermId,
};
use super::error::AllocationError;
use super::locks::KeyedLocks;
use super::ranking::{distinct, rank_courses, ranks_are_contiguous, RankingViolation};
use super::repository::{CatalogRepository, PreferenceSetRepository, RepositoryError};

/// Owns the DRAFT -> OPEN -> CLOSED lifecycle and the ranking rules of preference sets.
pub struct PreferenceLifecycleService<C, P> {
    catalog: Arc<C>,
    sets: Arc<P>,
    set_locks: KeyedLocks<PreferenceSetId>,
}

static PREFERENCE_SET_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_preference_set_id() -> PreferenceSetId {
    let id = PREFERENCE_SET_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    PreferenceSetId(format!("pset-{id:06}"))
}

impl<C, P> PreferenceLifecycleService<C, P>
where
    C: CatalogRepository + 'static,
    P: PreferenceSetRepository + 'static,
{
    pub fn new(catalog: Arc<C>, sets: Arc<P>) -> Self {
        Self {
            catalog,
            sets,
            set_locks: KeyedLocks::default(),
        }
    }

    /// Create a DRAFT set holding the given candidate courses.
    pub fn create(
        &self,
        faculty_id: &FacultyId,
        term_id: &TermId,
        candidate_course_ids: &[CourseId],
    ) -> Result<PreferenceSetId, AllocationError> {
        self.catalog
            .faculty(faculty_id)?
            .ok_or_else(|| AllocationError::not_found("faculty", faculty_id))?;
        self.load_term(term_id)?;

        if self
            .sets
            .find_by_faculty_and_term(faculty_id, term_id)?
            .is_some()
        {
            return Err(AllocationError::Conflict(format!(
                "preference set already exists for faculty {faculty_id} and term {term_id}"
            )));
        }

        let candidates = self.validated_candidates(candidate_course_ids)?;
        let now = Utc::now();
        let set = PreferenceSet {
            id: next_preference_set_id(),
            faculty_id: faculty_id.clone(),
            term_id: term_id.clone(),
            status: PreferenceSetStatus::Draft,
            candidate_course_ids: candidates,
            preferences: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let stored = self.sets.insert(set).map_err(|err| match err {
            RepositoryError::Conflict => AllocationError::Conflict(format!(
                "preference set already exists for faculty {faculty_id} and term {term_id}"
            )),
            other => other.into(),
        })?;

        info!(set_id = %stored.id, %faculty_id, %term_id, "preference set created");
        Ok(stored.id)
    }

    /// Replace the candidate list. Courses already ranked in a submission must stay.
    pub fn update_candidates(
        &self,
        set_id: &PreferenceSetId,
        candidate_course_ids: &[CourseId],
    ) -> Result<PreferenceSetView, AllocationError> {
        let slot = self.set_locks.slot(set_id);
        let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let mut set = self.load_set(set_id)?;
        if set.is_closed() {
            return Err(AllocationError::Conflict(format!(
                "preference set {set_id} is CLOSED; candidates can no longer change"
            )));
        }

        let candidates = self.validated_candidates(candidate_course_ids)?;
        if let Some(dropped) = set
            .preferences
            .iter()
            .find(|preference| !candidates.contains(&preference.course_id))
        {
            return Err(AllocationError::Conflict(format!(
                "course {} is part of the submitted ranking and cannot be removed",
                dropped.course_id
            )));
        }

        set.candidate_course_ids = candidates;
        set.touch();
        self.sets.update(set.clone())?;

        debug!(%set_id, candidates = set.candidate_course_ids.len(), "candidates replaced");
        self.view_of(&set)
    }

    pub fn open(&self, set_id: &PreferenceSetId) -> Result<PreferenceSetView, AllocationError> {
        self.transition(set_id, PreferenceSetStatus::Open)
    }

    pub fn close(&self, set_id: &PreferenceSetId) -> Result<PreferenceSetView, AllocationError> {
        self.transition(set_id, PreferenceSetStatus::Closed)
    }

    /// Replace the ranking of an OPEN set; rank is the 1-based position in `ranked_course_ids`.
    pub fn submit_preferences(
        &self,
        set_id: &PreferenceSetId,
        faculty_id: &FacultyId,
        ranked_course_ids: &[CourseId],
    ) -> Result<PreferenceSetView, AllocationError> {
        let slot = self.set_locks.slot(set_id);
        let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let mut set = self.load_set(set_id)?;
        if &set.faculty_id != faculty_id {
            return Err(AllocationError::AuthorizationViolation {
                faculty_id: faculty_id.clone(),
                set_id: set_id.clone(),
            });
        }

        if set.status != PreferenceSetStatus::Open {
            return Err(AllocationError::Conflict(format!(
                "preference set {set_id} is {}, submissions require OPEN",
                set.status.label()
            )));
        }

        let preferences = rank_courses(ranked_course_ids, &set.candidate_course_ids)
            .map_err(|violation: RankingViolation| {
                AllocationError::InvalidInput(violation.to_string())
            })?;
        debug_assert!(ranks_are_contiguous(&preferences));

        set.preferences = preferences;
        set.touch();
        self.sets.update(set.clone())?;

        info!(%set_id, %faculty_id, ranked = set.preferences.len(), "preferences submitted");
        self.view_of(&set)
    }

    pub fn view(&self, set_id: &PreferenceSetId) -> Result<PreferenceSetView, AllocationError> {
        let set = self.load_set(set_id)?;
        self.view_of(&set)
    }

    pub fn view_for(
        &self,
        faculty_id: &FacultyId,
        term_id: &TermId,
    ) -> Result<PreferenceSetView, AllocationError> {
        let set = self
            .sets
            .find_by_faculty_and_term(faculty_id, term_id)?
            .ok_or_else(|| {
                AllocationError::not_found("preference set", format!("{faculty_id}/{term_id}"))
            })?;
        self.view_of(&set)
    }

    /// OPEN sets of one faculty member, i.e. the sets awaiting a submission.
    pub fn open_sets_for(
        &self,
        faculty_id: &FacultyId,
    ) -> Result<Vec<PreferenceSetView>, AllocationError> {
        let mut sets = self.sets.by_faculty(faculty_id)?;
        sets.retain(|set| set.status == PreferenceSetStatus::Open);
        sets.sort_by(|a, b| a.id.cmp(&b.id));
        sets.iter().map(|set| self.view_of(set)).collect()
    }

    // Transitions are unguarded: any status may move to `target`, repeats included.
    fn transition(
        &self,
        set_id: &PreferenceSetId,
        target: PreferenceSetStatus,
    ) -> Result<PreferenceSetView, AllocationError> {
        let slot = self.set_locks.slot(set_id);
        let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let mut set = self.load_set(set_id)?;
        let previous = set.status;
        set.status = target;
        set.touch();
        self.sets.update(set.clone())?;

        info!(
            %set_id,
            from = previous.label(),
            to = target.label(),
            "preference set status changed"
        );
        self.view_of(&set)
    }

    fn validated_candidates(
        &self,
        candidate_course_ids: &[CourseId],
    ) -> Result<Vec<CourseId>, AllocationError> {
        let candidates = distinct(candidate_course_ids);
        for course_id in &candidates {
            if self.catalog.course(course_id)?.is_none() {
                return Err(AllocationError::not_found("course", course_id));
            }
        }
        Ok(candidates)
    }

    fn load_set(&self, set_id: &PreferenceSetId) -> Result<PreferenceSet, AllocationError> {
        self.sets
            .fetch(set_id)?
            .ok_or_else(|| AllocationError::not_found("preference set", set_id))
    }

    fn load_term(&self, term_id: &TermId) -> Result<AcademicTerm, AllocationError> {
        self.catalog
            .term(term_id)?
            .ok_or_else(|| AllocationError::not_found("academic term", term_id))
    }

    fn view_of(&self, set: &PreferenceSet) -> Result<PreferenceSetView, AllocationError> {
        let term = self.load_term(&set.term_id)?;
        Ok(set.view(&term))
    }
}
