use course_allocation::workflows::allocation::{
    AcademicTerm, CatalogRepository, Course, CourseId, EscalationError, EscalationEvent,
    EscalationPublisher, Faculty, FacultyId, PreferenceSet, PreferenceSetId,
    PreferenceSetRepository, RepositoryError, Season, TermId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("in-memory store poisoned".to_string()))
}

#[derive(Default)]
pub(crate) struct InMemoryCatalog {
    faculty: Mutex<BTreeMap<FacultyId, Faculty>>,
    courses: Mutex<BTreeMap<CourseId, Course>>,
    terms: Mutex<BTreeMap<TermId, AcademicTerm>>,
}

impl CatalogRepository for InMemoryCatalog {
    fn faculty(&self, id: &FacultyId) -> Result<Option<Faculty>, RepositoryError> {
        Ok(lock(&self.faculty)?.get(id).cloned())
    }

    fn all_faculty(&self) -> Result<Vec<Faculty>, RepositoryError> {
        Ok(lock(&self.faculty)?.values().cloned().collect())
    }

    fn insert_faculty(&self, faculty: Faculty) -> Result<Faculty, RepositoryError> {
        let mut guard = lock(&self.faculty)?;
        if guard.contains_key(&faculty.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(faculty.id.clone(), faculty.clone());
        Ok(faculty)
    }

    fn update_faculty(&self, faculty: Faculty) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.faculty)?;
        match guard.get_mut(&faculty.id) {
            Some(slot) => {
                *slot = faculty;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError> {
        Ok(lock(&self.courses)?.get(id).cloned())
    }

    fn course_by_code(&self, code: &str) -> Result<Option<Course>, RepositoryError> {
        Ok(lock(&self.courses)?
            .values()
            .find(|course| course.code == code)
            .cloned())
    }

    fn courses(&self) -> Result<Vec<Course>, RepositoryError> {
        Ok(lock(&self.courses)?.values().cloned().collect())
    }

    fn insert_course(&self, course: Course) -> Result<Course, RepositoryError> {
        let mut guard = lock(&self.courses)?;
        if guard.values().any(|existing| existing.code == course.code) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(course.id.clone(), course.clone());
        Ok(course)
    }

    fn update_course(&self, course: Course) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.courses)?;
        match guard.get_mut(&course.id) {
            Some(slot) => {
                *slot = course;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn save_courses(&self, courses: Vec<Course>) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.courses)?;
        if let Some(missing) = courses.iter().find(|course| !guard.contains_key(&course.id)) {
            return Err(RepositoryError::Unavailable(format!(
                "course {} vanished during batch write",
                missing.id
            )));
        }
        for course in courses {
            guard.insert(course.id.clone(), course);
        }
        Ok(())
    }

    fn term(&self, id: &TermId) -> Result<Option<AcademicTerm>, RepositoryError> {
        Ok(lock(&self.terms)?.get(id).cloned())
    }

    fn term_by_season(
        &self,
        year: i32,
        season: Season,
    ) -> Result<Option<AcademicTerm>, RepositoryError> {
        Ok(lock(&self.terms)?
            .values()
            .find(|term| term.year == year && term.season == season)
            .cloned())
    }

    fn insert_term(&self, term: AcademicTerm) -> Result<AcademicTerm, RepositoryError> {
        let mut guard = lock(&self.terms)?;
        if guard
            .values()
            .any(|existing| existing.year == term.year && existing.season == term.season)
        {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(term.id.clone(), term.clone());
        Ok(term)
    }
}

#[derive(Default)]
pub(crate) struct InMemoryPreferenceSets {
    records: Mutex<BTreeMap<PreferenceSetId, PreferenceSet>>,
}

impl PreferenceSetRepository for InMemoryPreferenceSets {
    fn insert(&self, set: PreferenceSet) -> Result<PreferenceSet, RepositoryError> {
        let mut guard = lock(&self.records)?;
        if guard
            .values()
            .any(|existing| existing.faculty_id == set.faculty_id && existing.term_id == set.term_id)
        {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(set.id.clone(), set.clone());
        Ok(set)
    }

    fn update(&self, set: PreferenceSet) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records)?;
        match guard.get_mut(&set.id) {
            Some(slot) => {
                *slot = set;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &PreferenceSetId) -> Result<Option<PreferenceSet>, RepositoryError> {
        Ok(lock(&self.records)?.get(id).cloned())
    }

    fn find_by_faculty_and_term(
        &self,
        faculty_id: &FacultyId,
        term_id: &TermId,
    ) -> Result<Option<PreferenceSet>, RepositoryError> {
        Ok(lock(&self.records)?
            .values()
            .find(|set| &set.faculty_id == faculty_id && &set.term_id == term_id)
            .cloned())
    }

    fn by_term(&self, term_id: &TermId) -> Result<Vec<PreferenceSet>, RepositoryError> {
        Ok(lock(&self.records)?
            .values()
            .filter(|set| &set.term_id == term_id)
            .cloned()
            .collect())
    }

    fn by_faculty(&self, faculty_id: &FacultyId) -> Result<Vec<PreferenceSet>, RepositoryError> {
        Ok(lock(&self.records)?
            .values()
            .filter(|set| &set.faculty_id == faculty_id)
            .cloned()
            .collect())
    }
}

/// Hands escalation events to whoever holds the receiving half, standing in for the
/// `course-assignment-llm` broker topic.
#[derive(Clone)]
pub(crate) struct ChannelEscalationPublisher {
    sender: UnboundedSender<EscalationEvent>,
}

impl ChannelEscalationPublisher {
    pub(crate) fn channel() -> (Self, UnboundedReceiver<EscalationEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EscalationPublisher for ChannelEscalationPublisher {
    fn publish(&self, event: EscalationEvent) -> Result<(), EscalationError> {
        self.sender
            .send(event)
            .map_err(|_| EscalationError::Transport("escalation channel closed".to_string()))
    }
}
