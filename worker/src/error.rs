//! Error types for the worker shell.

use censo_core::ConfigError;
use censo_db::DatabaseError;
use censo_scheduler::QueueError;
use censo_validator::ValidatorError;
use thiserror::Error;

/// Failures while starting or running the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Configuration could not be loaded or is inconsistent
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database could not be opened or migrated
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Job queue failure
    #[error("job queue error: {0}")]
    Queue(#[from] QueueError),

    /// Attempt failed outside the lookup itself
    #[error("validation error: {0}")]
    Validator(#[from] ValidatorError),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;
