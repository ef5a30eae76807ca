use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

identifier!(
    /// Identifier wrapper for faculty members.
    FacultyId
);
identifier!(
    /// Identifier wrapper for catalog courses.
    CourseId
);
identifier!(
    /// Identifier wrapper for academic terms.
    TermId
);
identifier!(
    /// Identifier wrapper for per-term preference sets.
    PreferenceSetId
);

pub const DEFAULT_COURSE_HOURS: u32 = 3;
pub const DEFAULT_MAX_HOURS_PER_WEEK: u32 = 20;

/// Teaching staff member with the attributes the allocation rules rank on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faculty {
    pub id: FacultyId,
    pub name: String,
    /// 1 is the most senior, 5 the least. Lower wins.
    pub seniority_score: u8,
    /// 1 to 3. Carried for administration, not consulted by allocation.
    pub mobility_score: u8,
    /// 1.0 to 5.0. Higher wins.
    pub rating: f64,
    pub max_hours_per_week: u32,
}

/// Catalog course and the faculty currently teaching it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub code: String,
    pub name: String,
    pub hours_required_per_week: u32,
    pub taught_by: BTreeSet<FacultyId>,
}

impl Course {
    pub fn is_taught_by(&self, faculty_id: &FacultyId) -> bool {
        self.taught_by.contains(faculty_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Season {
    Spring,
    Summer,
    Fall,
    Winter,
}

impl Season {
    pub const fn label(self) -> &'static str {
        match self {
            Season::Spring => "SPRING",
            Season::Summer => "SUMMER",
            Season::Fall => "FALL",
            Season::Winter => "WINTER",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SPRING" => Some(Season::Spring),
            "SUMMER" => Some(Season::Summer),
            "FALL" => Some(Season::Fall),
            "WINTER" => Some(Season::Winter),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcademicTerm {
    pub id: TermId,
    pub year: i32,
    pub season: Season,
}

/// Lifecycle of a preference set: DRAFT while candidates are prepared, OPEN for submissions,
/// CLOSED once allocation may read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreferenceSetStatus {
    Draft,
    Open,
    Closed,
}

impl PreferenceSetStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PreferenceSetStatus::Draft => "DRAFT",
            PreferenceSetStatus::Open => "OPEN",
            PreferenceSetStatus::Closed => "CLOSED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedPreference {
    pub course_id: CourseId,
    pub rank: u32,
}

/// One faculty member's candidate list and submitted ranking for a term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceSet {
    pub id: PreferenceSetId,
    pub faculty_id: FacultyId,
    pub term_id: TermId,
    pub status: PreferenceSetStatus,
    pub candidate_course_ids: Vec<CourseId>,
    /// Ordered by rank ascending; ranks are 1..=len.
    pub preferences: Vec<RankedPreference>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PreferenceSet {
    pub fn is_closed(&self) -> bool {
        self.status == PreferenceSetStatus::Closed
    }

    pub fn has_candidate(&self, course_id: &CourseId) -> bool {
        self.candidate_course_ids.contains(course_id)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn view(&self, term: &AcademicTerm) -> PreferenceSetView {
        PreferenceSetView {
            id: self.id.clone(),
            faculty_id: self.faculty_id.clone(),
            term: TermView {
                year: term.year,
                season: term.season,
            },
            candidate_course_ids: self.candidate_course_ids.clone(),
            preferences: self.preferences.clone(),
            status: self.status,
        }
    }
}

/// Read-only projection returned by preference queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceSetView {
    pub id: PreferenceSetId,
    pub faculty_id: FacultyId,
    pub term: TermView,
    pub candidate_course_ids: Vec<CourseId>,
    pub preferences: Vec<RankedPreference>,
    pub status: PreferenceSetStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermView {
    pub year: i32,
    pub season: Season,
}
