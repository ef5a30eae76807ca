use axum::http::StatusCode;

use super::domain::{FacultyId, PreferenceSetId};
use super::repository::{EscalationError, RepositoryError};

/// Error raised by the preference lifecycle, the allocation engine, and the catalog.
#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("faculty {faculty_id} cannot submit preferences for set {set_id}")]
    AuthorizationViolation {
        faculty_id: FacultyId,
        set_id: PreferenceSetId,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("failed to publish {failed} escalation event(s): {source}")]
    Escalation {
        failed: usize,
        #[source]
        source: EscalationError,
    },
}

impl AllocationError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AllocationError::NotFound { .. } => StatusCode::NOT_FOUND,
            AllocationError::Conflict(_) => StatusCode::CONFLICT,
            AllocationError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AllocationError::AuthorizationViolation { .. } => StatusCode::FORBIDDEN,
            AllocationError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            AllocationError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
            AllocationError::Repository(RepositoryError::Unavailable(_))
            | AllocationError::Escalation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
