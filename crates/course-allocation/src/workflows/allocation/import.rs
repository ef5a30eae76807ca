use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::catalog::{CatalogService, NewCourse, NewFaculty};
use super::domain::{Course, Faculty};
use super::error::AllocationError;
use super::repository::CatalogRepository;

#[derive(Debug)]
pub enum CatalogImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Catalog(AllocationError),
}

impl std::fmt::Display for CatalogImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogImportError::Io(err) => write!(f, "failed to read catalog seed: {}", err),
            CatalogImportError::Csv(err) => write!(f, "invalid catalog CSV data: {}", err),
            CatalogImportError::Catalog(err) => {
                write!(f, "could not apply catalog seed row: {}", err)
            }
        }
    }
}

impl std::error::Error for CatalogImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogImportError::Io(err) => Some(err),
            CatalogImportError::Csv(err) => Some(err),
            CatalogImportError::Catalog(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for CatalogImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for CatalogImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<AllocationError> for CatalogImportError {
    fn from(err: AllocationError) -> Self {
        Self::Catalog(err)
    }
}

#[derive(Debug, Deserialize)]
struct FacultyRow {
    name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    seniority_score: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    mobility_score: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    rating: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    max_hours_per_week: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CourseRow {
    code: String,
    name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    hours_required_per_week: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn parse_column<T: std::str::FromStr>(
    line: usize,
    column: &str,
    value: Option<&str>,
) -> Result<Option<T>, CatalogImportError> {
    value
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|_| {
                CatalogImportError::Catalog(AllocationError::InvalidInput(format!(
                    "line {line}: {column} is not a valid number: {raw}"
                )))
            })
        })
        .transpose()
}

/// Seeds the catalog from CSV exports with a header row.
///
/// Faculty columns: `name, seniority_score, mobility_score, rating, max_hours_per_week`.
/// Course columns: `code, name, hours_required_per_week`. Blank cells take the catalog
/// defaults. Rows are applied in file order and the first invalid row stops the import.
pub struct CatalogImporter;

impl CatalogImporter {
    pub fn faculty_from_path<C, P>(
        catalog: &CatalogService<C>,
        path: P,
    ) -> Result<Vec<Faculty>, CatalogImportError>
    where
        C: CatalogRepository + 'static,
        P: AsRef<Path>,
    {
        let file = std::fs::File::open(path)?;
        Self::faculty_from_reader(catalog, file)
    }

    pub fn faculty_from_reader<C, R>(
        catalog: &CatalogService<C>,
        reader: R,
    ) -> Result<Vec<Faculty>, CatalogImportError>
    where
        C: CatalogRepository + 'static,
        R: Read,
    {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut created = Vec::new();
        for (index, row) in csv_reader.deserialize::<FacultyRow>().enumerate() {
            let row = row?;
            let line = index + 2;
            let request = NewFaculty {
                name: row.name,
                seniority_score: parse_column(line, "seniority_score", row.seniority_score.as_deref())?,
                mobility_score: parse_column(line, "mobility_score", row.mobility_score.as_deref())?,
                rating: parse_column(line, "rating", row.rating.as_deref())?,
                max_hours_per_week: parse_column(
                    line,
                    "max_hours_per_week",
                    row.max_hours_per_week.as_deref(),
                )?,
            };
            created.push(catalog.create_faculty(request)?);
        }

        info!(rows = created.len(), "faculty seed imported");
        Ok(created)
    }

    pub fn courses_from_path<C, P>(
        catalog: &CatalogService<C>,
        path: P,
    ) -> Result<Vec<Course>, CatalogImportError>
    where
        C: CatalogRepository + 'static,
        P: AsRef<Path>,
    {
        let file = std::fs::File::open(path)?;
        Self::courses_from_reader(catalog, file)
    }

    pub fn courses_from_reader<C, R>(
        catalog: &CatalogService<C>,
        reader: R,
    ) -> Result<Vec<Course>, CatalogImportError>
    where
        C: CatalogRepository + 'static,
        R: Read,
    {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut created = Vec::new();
        for (index, row) in csv_reader.deserialize::<CourseRow>().enumerate() {
            let row = row?;
            let line = index + 2;
            let request = NewCourse {
                code: row.code,
                name: row.name,
                hours_required_per_week: parse_column(
                    line,
                    "hours_required_per_week",
                    row.hours_required_per_week.as_deref(),
                )?,
                taught_by: Vec::new(),
            };
            created.push(catalog.create_course(request)?);
        }

        info!(rows = created.len(), "course seed imported");
        Ok(created)
    }
}
