//! Error types for validation orchestration.

use censo_core::SubjectId;
use censo_db::DatabaseError;
use censo_scheduler::QueueError;
use thiserror::Error;

/// Errors that can occur while orchestrating validations.
#[derive(Debug, Error)]
pub enum ValidatorError {
    /// Storage failure
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Job queue failure
    #[error("job queue error: {0}")]
    Queue(#[from] QueueError),

    /// Invalid input, e.g. a malformed cedula
    #[error("validation error: {0}")]
    Validation(#[from] censo_core::CensoError),

    /// No subject with this id
    #[error("subject not found: {0}")]
    SubjectNotFound(SubjectId),

    /// Subject exists but has no validation record
    #[error("validation record not found for subject {0}")]
    RecordNotFound(SubjectId),
}

impl From<sqlx::Error> for ValidatorError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(DatabaseError::from(err))
    }
}

/// Result type for validator operations.
pub type Result<T> = std::result::Result<T, ValidatorError>;
