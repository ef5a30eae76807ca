use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Deserialize;
use tracing::info;

use super::domain::{
    AcademicTerm, Course, CourseId, Faculty, FacultyId, Season, TermId, DEFAULT_COURSE_HOURS,
    DEFAULT_MAX_HOURS_PER_WEEK,
};
use super::error::AllocationError;
use super::locks::RosterLock;
use super::repository::{CatalogRepository, RepositoryError};
use super::workload::{AllocationPolicy, CapacityViolation, Workload};

static FACULTY_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static COURSE_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static TERM_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_id(sequence: &AtomicU64, prefix: &str) -> String {
    let id = sequence.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{id:06}")
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewFaculty {
    pub name: String,
    #[serde(default)]
    pub seniority_score: Option<u8>,
    #[serde(default)]
    pub mobility_score: Option<u8>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub max_hours_per_week: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FacultyUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub seniority_score: Option<u8>,
    #[serde(default)]
    pub mobility_score: Option<u8>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub max_hours_per_week: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCourse {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub hours_required_per_week: Option<u32>,
    #[serde(default)]
    pub taught_by: Vec<FacultyId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseUpdate {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hours_required_per_week: Option<u32>,
    #[serde(default)]
    pub taught_by: Option<Vec<FacultyId>>,
}

/// Administrative maintenance of faculty, courses, and academic terms.
///
/// Roster and capacity edits are held to the same course and hour limits as the allocation
/// engine, and are serialized with the engine's own roster writes.
pub struct CatalogService<C> {
    catalog: Arc<C>,
    policy: AllocationPolicy,
    roster: RosterLock,
}

impl<C> CatalogService<C>
where
    C: CatalogRepository + 'static,
{
    pub fn new(catalog: Arc<C>, policy: AllocationPolicy) -> Self {
        Self::with_roster(catalog, policy, Arc::new(Mutex::new(())))
    }

    pub(crate) fn with_roster(catalog: Arc<C>, policy: AllocationPolicy, roster: RosterLock) -> Self {
        Self {
            catalog,
            policy,
            roster,
        }
    }

    pub fn create_faculty(&self, request: NewFaculty) -> Result<Faculty, AllocationError> {
        let faculty = Faculty {
            id: FacultyId(next_id(&FACULTY_SEQUENCE, "fac")),
            name: request.name.trim().to_string(),
            seniority_score: request.seniority_score.unwrap_or(1),
            mobility_score: request.mobility_score.unwrap_or(1),
            rating: request.rating.unwrap_or(1.0),
            max_hours_per_week: request
                .max_hours_per_week
                .unwrap_or(DEFAULT_MAX_HOURS_PER_WEEK),
        };
        validate_faculty(&faculty)?;

        let stored = self.catalog.insert_faculty(faculty)?;
        info!(faculty_id = %stored.id, name = %stored.name, "faculty created");
        Ok(stored)
    }

    /// Apply a partial update. Lowering `max_hours_per_week` below the hours the member
    /// already teaches is rejected.
    pub fn update_faculty(
        &self,
        faculty_id: &FacultyId,
        update: FacultyUpdate,
    ) -> Result<Faculty, AllocationError> {
        let _roster = self.roster.lock().unwrap_or_else(PoisonError::into_inner);
        let mut faculty = self.faculty_member(faculty_id)?;

        if let Some(name) = update.name {
            faculty.name = name.trim().to_string();
        }
        if let Some(seniority) = update.seniority_score {
            faculty.seniority_score = seniority;
        }
        if let Some(mobility) = update.mobility_score {
            faculty.mobility_score = mobility;
        }
        if let Some(rating) = update.rating {
            faculty.rating = rating;
        }
        if let Some(max_hours) = update.max_hours_per_week {
            faculty.max_hours_per_week = max_hours;
        }
        validate_faculty(&faculty)?;

        if update.max_hours_per_week.is_some() {
            let held = self.courses_taught_by(faculty_id, None)?;
            Workload::of(&held)
                .within(&faculty, &self.policy)
                .map_err(|violation| capacity_error(faculty_id, violation))?;
        }

        self.catalog.update_faculty(faculty.clone())?;
        info!(%faculty_id, "faculty updated");
        Ok(faculty)
    }

    pub fn create_course(&self, request: NewCourse) -> Result<Course, AllocationError> {
        let code = request.code.trim().to_string();
        self.ensure_code_available(&code)?;

        let _roster = self.roster.lock().unwrap_or_else(PoisonError::into_inner);
        let members = self.roster_members(&request.taught_by)?;
        let course = Course {
            id: CourseId(next_id(&COURSE_SEQUENCE, "crs")),
            code,
            name: request.name.trim().to_string(),
            hours_required_per_week: request
                .hours_required_per_week
                .unwrap_or(DEFAULT_COURSE_HOURS),
            taught_by: members.iter().map(|member| member.id.clone()).collect(),
        };
        validate_course(&course)?;
        self.ensure_roster_fits(&course, &members)?;

        let stored = self.catalog.insert_course(course).map_err(|err| match err {
            RepositoryError::Conflict => code_conflict(&request.code),
            other => other.into(),
        })?;
        info!(course_id = %stored.id, code = %stored.code, "course created");
        Ok(stored)
    }

    /// Apply a partial update. A new roster or a change of weekly hours must leave every
    /// teaching faculty member within the course and hour limits.
    pub fn update_course(
        &self,
        course_id: &CourseId,
        update: CourseUpdate,
    ) -> Result<Course, AllocationError> {
        let _roster = self.roster.lock().unwrap_or_else(PoisonError::into_inner);
        let mut course = self.course(course_id)?;
        let reassess = update.hours_required_per_week.is_some() || update.taught_by.is_some();

        if let Some(code) = update.code {
            let code = code.trim().to_string();
            if code != course.code {
                self.ensure_code_available(&code)?;
                course.code = code;
            }
        }
        if let Some(name) = update.name {
            course.name = name.trim().to_string();
        }
        if let Some(hours) = update.hours_required_per_week {
            course.hours_required_per_week = hours;
        }
        let members = match update.taught_by {
            Some(taught_by) => self.roster_members(&taught_by)?,
            None => self.roster_members(&course.taught_by)?,
        };
        course.taught_by = members.iter().map(|member| member.id.clone()).collect();
        validate_course(&course)?;

        if reassess {
            self.ensure_roster_fits(&course, &members)?;
        }

        self.catalog.update_course(course.clone())?;
        info!(%course_id, code = %course.code, "course updated");
        Ok(course)
    }

    pub fn create_term(&self, year: i32, season: Season) -> Result<AcademicTerm, AllocationError> {
        if self.catalog.term_by_season(year, season)?.is_some() {
            return Err(term_conflict(year, season));
        }

        let term = AcademicTerm {
            id: TermId(next_id(&TERM_SEQUENCE, "term")),
            year,
            season,
        };
        let stored = self.catalog.insert_term(term).map_err(|err| match err {
            RepositoryError::Conflict => term_conflict(year, season),
            other => other.into(),
        })?;
        info!(term_id = %stored.id, year, season = season.label(), "academic term created");
        Ok(stored)
    }

    pub fn courses(&self) -> Result<Vec<Course>, AllocationError> {
        Ok(self.catalog.courses()?)
    }

    pub fn course(&self, course_id: &CourseId) -> Result<Course, AllocationError> {
        self.catalog
            .course(course_id)?
            .ok_or_else(|| AllocationError::not_found("course", course_id))
    }

    pub fn faculty(&self) -> Result<Vec<Faculty>, AllocationError> {
        Ok(self.catalog.all_faculty()?)
    }

    pub fn faculty_member(&self, faculty_id: &FacultyId) -> Result<Faculty, AllocationError> {
        self.catalog
            .faculty(faculty_id)?
            .ok_or_else(|| AllocationError::not_found("faculty", faculty_id))
    }

    fn ensure_code_available(&self, code: &str) -> Result<(), AllocationError> {
        if self.catalog.course_by_code(code)?.is_some() {
            return Err(code_conflict(code));
        }
        Ok(())
    }

    // Distinct members in id order; unknown ids are NotFound.
    fn roster_members<'a, I>(&self, ids: I) -> Result<Vec<Faculty>, AllocationError>
    where
        I: IntoIterator<Item = &'a FacultyId>,
    {
        let distinct: BTreeSet<&FacultyId> = ids.into_iter().collect();
        distinct
            .into_iter()
            .map(|faculty_id| self.faculty_member(faculty_id))
            .collect()
    }

    fn ensure_roster_fits(&self, course: &Course, members: &[Faculty]) -> Result<(), AllocationError> {
        for member in members {
            let held = self.courses_taught_by(&member.id, Some(&course.id))?;
            Workload::of(&held)
                .admits(member, course.hours_required_per_week, &self.policy)
                .map_err(|violation| capacity_error(&member.id, violation))?;
        }
        Ok(())
    }

    fn courses_taught_by(
        &self,
        faculty_id: &FacultyId,
        excluding: Option<&CourseId>,
    ) -> Result<Vec<Course>, AllocationError> {
        let mut courses = self.catalog.courses()?;
        courses.retain(|course| course.is_taught_by(faculty_id) && Some(&course.id) != excluding);
        Ok(courses)
    }
}

fn capacity_error(faculty_id: &FacultyId, violation: CapacityViolation) -> AllocationError {
    AllocationError::InvalidInput(format!("faculty {faculty_id}: {violation}"))
}

fn code_conflict(code: &str) -> AllocationError {
    AllocationError::Conflict(format!("course with code {} already exists", code.trim()))
}

fn term_conflict(year: i32, season: Season) -> AllocationError {
    AllocationError::Conflict(format!(
        "academic term {} {year} already exists",
        season.label()
    ))
}

fn validate_faculty(faculty: &Faculty) -> Result<(), AllocationError> {
    if faculty.name.is_empty() {
        return Err(AllocationError::InvalidInput(
            "faculty name must not be blank".to_string(),
        ));
    }
    if !(1..=5).contains(&faculty.seniority_score) {
        return Err(AllocationError::InvalidInput(
            "seniority score must be between 1 and 5".to_string(),
        ));
    }
    if !(1..=3).contains(&faculty.mobility_score) {
        return Err(AllocationError::InvalidInput(
            "mobility score must be between 1 and 3".to_string(),
        ));
    }
    if !(1.0..=5.0).contains(&faculty.rating) {
        return Err(AllocationError::InvalidInput(
            "rating must be between 1.0 and 5.0".to_string(),
        ));
    }
    if faculty.max_hours_per_week < 1 {
        return Err(AllocationError::InvalidInput(
            "max hours per week must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_course(course: &Course) -> Result<(), AllocationError> {
    if course.code.is_empty() || course.name.is_empty() {
        return Err(AllocationError::InvalidInput(
            "course code and name must not be blank".to_string(),
        ));
    }
    if course.hours_required_per_week < 1 {
        return Err(AllocationError::InvalidInput(
            "hours required per week must be at least 1".to_string(),
        ));
    }
    Ok(())
}
