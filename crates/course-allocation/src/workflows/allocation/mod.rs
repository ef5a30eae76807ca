//! Faculty course allocation: preference collection per academic term, the rule-based
//! assignment pass over CLOSED preference sets, and the administrative overrides applied
//! afterwards.

pub mod catalog;
pub mod domain;
pub mod engine;
pub mod error;
pub mod import;
pub(crate) mod locks;
pub mod preferences;
pub mod ranking;
pub mod repository;
pub mod router;
pub mod workload;

#[cfg(test)]
mod tests;

pub use catalog::{CatalogService, CourseUpdate, FacultyUpdate, NewCourse, NewFaculty};
pub use domain::{
    AcademicTerm, Course, CourseId, Faculty, FacultyId, PreferenceSet, PreferenceSetId,
    PreferenceSetStatus, PreferenceSetView, RankedPreference, Season, TermId, TermView,
    DEFAULT_COURSE_HOURS, DEFAULT_MAX_HOURS_PER_WEEK,
};
pub use engine::{AllocationEngine, AssignedCourse, FacultyAssignment, LlmResolution};
pub use error::AllocationError;
pub use import::{CatalogImportError, CatalogImporter};
pub use preferences::PreferenceLifecycleService;
pub use ranking::RankingViolation;
pub use repository::{
    CatalogRepository, EscalationError, EscalationEvent, EscalationPublisher,
    PreferenceSetRepository, RepositoryError,
};
pub use router::{allocation_router, AllocationServices, Principal};
pub use workload::{AllocationPolicy, CapacityViolation, Workload, MAX_COURSES_PER_FACULTY};
