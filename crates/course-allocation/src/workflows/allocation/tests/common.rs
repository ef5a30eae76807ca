use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::Utc;
use serde_json::Value;

use crate::workflows::allocation::domain::{
    AcademicTerm, Course, CourseId, Faculty, FacultyId, PreferenceSet, PreferenceSetId,
    PreferenceSetStatus, RankedPreference, Season, TermId,
};
use crate::workflows::allocation::repository::{
    CatalogRepository, EscalationError, EscalationEvent, EscalationPublisher,
    PreferenceSetRepository, RepositoryError,
};
use crate::workflows::allocation::{
    AllocationEngine, AllocationPolicy, AllocationServices, PreferenceLifecycleService,
};

pub(super) const TERM: &str = "term-fall-2025";

pub(super) fn faculty(id: &str, seniority: u8, rating: f64, max_hours: u32) -> Faculty {
    Faculty {
        id: FacultyId::new(id),
        name: format!("Prof. {id}"),
        seniority_score: seniority,
        mobility_score: 1,
        rating,
        max_hours_per_week: max_hours,
    }
}

pub(super) fn course(id: &str, hours: u32) -> Course {
    Course {
        id: CourseId::new(id),
        code: id.to_uppercase(),
        name: format!("Course {id}"),
        hours_required_per_week: hours,
        taught_by: BTreeSet::new(),
    }
}

pub(super) fn term() -> AcademicTerm {
    AcademicTerm {
        id: TermId::new(TERM),
        year: 2025,
        season: Season::Fall,
    }
}

pub(super) fn course_ids(raw: &[&str]) -> Vec<CourseId> {
    raw.iter().map(|id| CourseId::new(*id)).collect()
}

#[derive(Default)]
pub(super) struct MemoryCatalog {
    faculty: Mutex<BTreeMap<FacultyId, Faculty>>,
    courses: Mutex<BTreeMap<CourseId, Course>>,
    terms: Mutex<BTreeMap<TermId, AcademicTerm>>,
    batch_writes: Mutex<usize>,
}

impl MemoryCatalog {
    pub(super) fn with(faculty: Vec<Faculty>, courses: Vec<Course>) -> Self {
        let catalog = Self::default();
        for member in faculty {
            catalog.insert_faculty(member).expect("seed faculty");
        }
        for entry in courses {
            catalog.insert_course(entry).expect("seed course");
        }
        catalog.insert_term(term()).expect("seed term");
        catalog
    }

    pub(super) fn roster(&self, course_id: &str) -> BTreeSet<FacultyId> {
        self.courses
            .lock()
            .expect("catalog mutex poisoned")
            .get(&CourseId::new(course_id))
            .map(|entry| entry.taught_by.clone())
            .unwrap_or_default()
    }

    pub(super) fn courses_of(&self, faculty_id: &str) -> Vec<CourseId> {
        let id = FacultyId::new(faculty_id);
        self.courses
            .lock()
            .expect("catalog mutex poisoned")
            .values()
            .filter(|entry| entry.is_taught_by(&id))
            .map(|entry| entry.id.clone())
            .collect()
    }

    pub(super) fn batch_writes(&self) -> usize {
        *self.batch_writes.lock().expect("catalog mutex poisoned")
    }
}

impl CatalogRepository for MemoryCatalog {
    fn faculty(&self, id: &FacultyId) -> Result<Option<Faculty>, RepositoryError> {
        let guard = self.faculty.lock().expect("catalog mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn all_faculty(&self) -> Result<Vec<Faculty>, RepositoryError> {
        let guard = self.faculty.lock().expect("catalog mutex poisoned");
        Ok(guard.values().cloned().collect())
    }

    fn insert_faculty(&self, faculty: Faculty) -> Result<Faculty, RepositoryError> {
        let mut guard = self.faculty.lock().expect("catalog mutex poisoned");
        if guard.contains_key(&faculty.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(faculty.id.clone(), faculty.clone());
        Ok(faculty)
    }

    fn update_faculty(&self, faculty: Faculty) -> Result<(), RepositoryError> {
        let mut guard = self.faculty.lock().expect("catalog mutex poisoned");
        guard.insert(faculty.id.clone(), faculty);
        Ok(())
    }

    fn course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError> {
        let guard = self.courses.lock().expect("catalog mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn course_by_code(&self, code: &str) -> Result<Option<Course>, RepositoryError> {
        let guard = self.courses.lock().expect("catalog mutex poisoned");
        Ok(guard.values().find(|entry| entry.code == code).cloned())
    }

    fn courses(&self) -> Result<Vec<Course>, RepositoryError> {
        let guard = self.courses.lock().expect("catalog mutex poisoned");
        Ok(guard.values().cloned().collect())
    }

    fn insert_course(&self, course: Course) -> Result<Course, RepositoryError> {
        let mut guard = self.courses.lock().expect("catalog mutex poisoned");
        if guard.values().any(|entry| entry.code == course.code) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(course.id.clone(), course.clone());
        Ok(course)
    }

    fn update_course(&self, course: Course) -> Result<(), RepositoryError> {
        let mut guard = self.courses.lock().expect("catalog mutex poisoned");
        if !guard.contains_key(&course.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(course.id.clone(), course);
        Ok(())
    }

    fn save_courses(&self, courses: Vec<Course>) -> Result<(), RepositoryError> {
        let mut guard = self.courses.lock().expect("catalog mutex poisoned");
        for entry in courses {
            guard.insert(entry.id.clone(), entry);
        }
        *self.batch_writes.lock().expect("catalog mutex poisoned") += 1;
        Ok(())
    }

    fn term(&self, id: &TermId) -> Result<Option<AcademicTerm>, RepositoryError> {
        let guard = self.terms.lock().expect("catalog mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn term_by_season(
        &self,
        year: i32,
        season: Season,
    ) -> Result<Option<AcademicTerm>, RepositoryError> {
        let guard = self.terms.lock().expect("catalog mutex poisoned");
        Ok(guard
            .values()
            .find(|entry| entry.year == year && entry.season == season)
            .cloned())
    }

    fn insert_term(&self, term: AcademicTerm) -> Result<AcademicTerm, RepositoryError> {
        let mut guard = self.terms.lock().expect("catalog mutex poisoned");
        if guard
            .values()
            .any(|entry| entry.year == term.year && entry.season == term.season)
        {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(term.id.clone(), term.clone());
        Ok(term)
    }
}

#[derive(Default)]
pub(super) struct MemorySets {
    records: Mutex<BTreeMap<PreferenceSetId, PreferenceSet>>,
}

impl MemorySets {
    /// Stores a CLOSED set directly, ranking `ranked` in order.
    pub(super) fn closed(&self, set_id: &str, faculty_id: &str, ranked: &[&str]) {
        let now = Utc::now();
        let set = PreferenceSet {
            id: PreferenceSetId::new(set_id),
            faculty_id: FacultyId::new(faculty_id),
            term_id: TermId::new(TERM),
            status: PreferenceSetStatus::Closed,
            candidate_course_ids: course_ids(ranked),
            preferences: ranked
                .iter()
                .zip(1u32..)
                .map(|(course_id, rank)| RankedPreference {
                    course_id: CourseId::new(*course_id),
                    rank,
                })
                .collect(),
            created_at: now,
            updated_at: now,
        };
        self.insert(set).expect("seed preference set");
    }

    pub(super) fn stored(&self, set_id: &PreferenceSetId) -> PreferenceSet {
        self.records
            .lock()
            .expect("set mutex poisoned")
            .get(set_id)
            .cloned()
            .expect("stored set")
    }
}

impl PreferenceSetRepository for MemorySets {
    fn insert(&self, set: PreferenceSet) -> Result<PreferenceSet, RepositoryError> {
        let mut guard = self.records.lock().expect("set mutex poisoned");
        if guard
            .values()
            .any(|entry| entry.faculty_id == set.faculty_id && entry.term_id == set.term_id)
        {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(set.id.clone(), set.clone());
        Ok(set)
    }

    fn update(&self, set: PreferenceSet) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("set mutex poisoned");
        guard.insert(set.id.clone(), set);
        Ok(())
    }

    fn fetch(&self, id: &PreferenceSetId) -> Result<Option<PreferenceSet>, RepositoryError> {
        let guard = self.records.lock().expect("set mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_by_faculty_and_term(
        &self,
        faculty_id: &FacultyId,
        term_id: &TermId,
    ) -> Result<Option<PreferenceSet>, RepositoryError> {
        let guard = self.records.lock().expect("set mutex poisoned");
        Ok(guard
            .values()
            .find(|entry| &entry.faculty_id == faculty_id && &entry.term_id == term_id)
            .cloned())
    }

    fn by_term(&self, term_id: &TermId) -> Result<Vec<PreferenceSet>, RepositoryError> {
        let guard = self.records.lock().expect("set mutex poisoned");
        Ok(guard
            .values()
            .filter(|entry| &entry.term_id == term_id)
            .cloned()
            .collect())
    }

    fn by_faculty(&self, faculty_id: &FacultyId) -> Result<Vec<PreferenceSet>, RepositoryError> {
        let guard = self.records.lock().expect("set mutex poisoned");
        Ok(guard
            .values()
            .filter(|entry| &entry.faculty_id == faculty_id)
            .cloned()
            .collect())
    }
}

pub(super) struct UnavailableSets;

impl PreferenceSetRepository for UnavailableSets {
    fn insert(&self, _set: PreferenceSet) -> Result<PreferenceSet, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _set: PreferenceSet) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &PreferenceSetId) -> Result<Option<PreferenceSet>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_by_faculty_and_term(
        &self,
        _faculty_id: &FacultyId,
        _term_id: &TermId,
    ) -> Result<Option<PreferenceSet>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn by_term(&self, _term_id: &TermId) -> Result<Vec<PreferenceSet>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn by_faculty(&self, _faculty_id: &FacultyId) -> Result<Vec<PreferenceSet>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryEscalations {
    events: Arc<Mutex<Vec<EscalationEvent>>>,
}

impl MemoryEscalations {
    pub(super) fn events(&self) -> Vec<EscalationEvent> {
        self.events.lock().expect("escalation mutex poisoned").clone()
    }
}

impl EscalationPublisher for MemoryEscalations {
    fn publish(&self, event: EscalationEvent) -> Result<(), EscalationError> {
        self.events
            .lock()
            .expect("escalation mutex poisoned")
            .push(event);
        Ok(())
    }
}

pub(super) struct OfflineEscalations;

impl EscalationPublisher for OfflineEscalations {
    fn publish(&self, _event: EscalationEvent) -> Result<(), EscalationError> {
        Err(EscalationError::Transport("broker offline".to_string()))
    }
}

pub(super) type MemoryEngine = AllocationEngine<MemoryCatalog, MemorySets, MemoryEscalations>;

pub(super) fn build_engine(
    catalog: MemoryCatalog,
) -> (
    MemoryEngine,
    Arc<MemoryCatalog>,
    Arc<MemorySets>,
    Arc<MemoryEscalations>,
) {
    let catalog = Arc::new(catalog);
    let sets = Arc::new(MemorySets::default());
    let escalations = Arc::new(MemoryEscalations::default());
    let engine = AllocationEngine::new(
        catalog.clone(),
        sets.clone(),
        escalations.clone(),
        AllocationPolicy::default(),
    );
    (engine, catalog, sets, escalations)
}

pub(super) fn build_lifecycle(
    catalog: MemoryCatalog,
) -> (
    PreferenceLifecycleService<MemoryCatalog, MemorySets>,
    Arc<MemoryCatalog>,
    Arc<MemorySets>,
) {
    let catalog = Arc::new(catalog);
    let sets = Arc::new(MemorySets::default());
    let service = PreferenceLifecycleService::new(catalog.clone(), sets.clone());
    (service, catalog, sets)
}

pub(super) type MemoryServices = AllocationServices<MemoryCatalog, MemorySets, MemoryEscalations>;

pub(super) fn build_services(
    catalog: MemoryCatalog,
) -> (Arc<MemoryServices>, Arc<MemoryCatalog>, Arc<MemorySets>) {
    let catalog = Arc::new(catalog);
    let sets = Arc::new(MemorySets::default());
    let services = AllocationServices::new(
        catalog.clone(),
        sets.clone(),
        Arc::new(MemoryEscalations::default()),
        AllocationPolicy::default(),
    );
    (Arc::new(services), catalog, sets)
}

/// Two faculty and three 3-hour courses in the fall term.
pub(super) fn department() -> MemoryCatalog {
    MemoryCatalog::with(
        vec![faculty("fac-f", 1, 5.0, 20), faculty("fac-g", 2, 5.0, 20)],
        vec![course("c1", 3), course("c2", 3), course("c3", 3)],
    )
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
