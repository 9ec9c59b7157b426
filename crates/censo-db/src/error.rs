//! Database error types.
//!
//! Provides comprehensive error handling for database operations using `thiserror`.

use censo_scheduler::QueueError;
use thiserror::Error;

/// Database-specific errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to open or create database connection.
    #[error("failed to open database: {0}")]
    Open(String),

    /// Migration execution failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// Requested record was not found.
    #[error("record not found")]
    NotFound,

    /// Database record with provided identifier not found.
    #[error("{0}")]
    NotFoundWithMessage(String),

    /// Failed to decode database value.
    #[error("decode error: {0}")]
    Decode(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Underlying `SQLx` error.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl From<DatabaseError> for QueueError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Decode(msg) | DatabaseError::SerializationError(msg) => {
                QueueError::InvalidPayload(msg)
            }
            other => QueueError::Backend(other.to_string()),
        }
    }
}

/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
