use serde::{Deserialize, Serialize};

use super::domain::{
    AcademicTerm, Course, CourseId, Faculty, FacultyId, PreferenceSet, PreferenceSetId, Season,
    TermId,
};

/// Storage of faculty, courses, and terms. Course writes carry the `taught_by` roster.
pub trait CatalogRepository: Send + Sync {
    fn faculty(&self, id: &FacultyId) -> Result<Option<Faculty>, RepositoryError>;
    fn all_faculty(&self) -> Result<Vec<Faculty>, RepositoryError>;
    fn insert_faculty(&self, faculty: Faculty) -> Result<Faculty, RepositoryError>;
    fn update_faculty(&self, faculty: Faculty) -> Result<(), RepositoryError>;

    fn course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError>;
    fn course_by_code(&self, code: &str) -> Result<Option<Course>, RepositoryError>;
    fn courses(&self) -> Result<Vec<Course>, RepositoryError>;
    /// Fails with `Conflict` when the course code is already taken.
    fn insert_course(&self, course: Course) -> Result<Course, RepositoryError>;
    fn update_course(&self, course: Course) -> Result<(), RepositoryError>;
    /// Persists several course rosters as one write.
    fn save_courses(&self, courses: Vec<Course>) -> Result<(), RepositoryError>;

    fn term(&self, id: &TermId) -> Result<Option<AcademicTerm>, RepositoryError>;
    fn term_by_season(&self, year: i32, season: Season)
        -> Result<Option<AcademicTerm>, RepositoryError>;
    /// Fails with `Conflict` when the `(year, season)` pair already exists.
    fn insert_term(&self, term: AcademicTerm) -> Result<AcademicTerm, RepositoryError>;
}

/// Storage of preference sets including their candidate list and ranking.
pub trait PreferenceSetRepository: Send + Sync {
    /// Fails with `Conflict` when the faculty already holds a set for the term.
    fn insert(&self, set: PreferenceSet) -> Result<PreferenceSet, RepositoryError>;
    /// Replaces the stored set, candidate list and ranking together.
    fn update(&self, set: PreferenceSet) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &PreferenceSetId) -> Result<Option<PreferenceSet>, RepositoryError>;
    fn find_by_faculty_and_term(
        &self,
        faculty_id: &FacultyId,
        term_id: &TermId,
    ) -> Result<Option<PreferenceSet>, RepositoryError>;
    fn by_term(&self, term_id: &TermId) -> Result<Vec<PreferenceSet>, RepositoryError>;
    fn by_faculty(&self, faculty_id: &FacultyId) -> Result<Vec<PreferenceSet>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound sink for courses the rule-based pass could not place.
pub trait EscalationPublisher: Send + Sync {
    fn publish(&self, event: EscalationEvent) -> Result<(), EscalationError>;
}

/// One unresolved (faculty, course) pairing handed to the external recommender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub faculty_id: FacultyId,
    pub course_id: CourseId,
    pub term_id: TermId,
    pub preference_rank: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    #[error("escalation transport unavailable: {0}")]
    Transport(String),
}
