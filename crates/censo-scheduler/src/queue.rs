//! Durable job queue abstraction.

use crate::jobs::{JobRequest, QueuedJob};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Job queue errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Storage failure in the queue backend
    #[error("queue backend error: {0}")]
    Backend(String),

    /// A stored payload could not be decoded
    #[error("invalid job payload: {0}")]
    InvalidPayload(String),
}

/// Result type alias for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// A queue of named, time-scheduled jobs.
///
/// `enqueue` is idempotent on the job name: while a job with the same name is
/// still queued, further requests are dropped.
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    /// Queue a job. Returns false if a queued job with this name already exists.
    async fn enqueue(&self, request: JobRequest) -> Result<bool>;

    /// Atomically claim the oldest job due at `now`, marking it running.
    async fn claim_next_due(&self, now: DateTime<Utc>) -> Result<Option<QueuedJob>>;

    /// Mark a claimed job as finished.
    async fn complete(&self, job_id: i64) -> Result<()>;

    /// Mark a claimed job as failed with an error message.
    async fn fail(&self, job_id: i64, error: &str) -> Result<()>;
}
