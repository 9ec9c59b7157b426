//! Subject registration.
//!
//! The subject and its `PENDING` record are written in one transaction. The
//! first validation job is returned to the caller instead of being enqueued
//! inside the transaction, so a rolled-back registration never leaves a job
//! behind.

use crate::error::Result;
use censo_core::{Cedula, SubjectId, ValidationRecord};
use censo_db::{subjects, validation_records, Subject};
use censo_scheduler::{JobQueue, JobRequest};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// A committed registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// The new subject
    pub subject: Subject,
    /// Its freshly created `PENDING` record
    pub record: ValidationRecord,
    /// Jobs to enqueue now that the transaction has committed
    pub post_commit: Vec<JobRequest>,
}

/// Register a subject and create its validation record.
pub async fn register_subject(
    pool: &SqlitePool,
    cedula: Cedula,
    now: DateTime<Utc>,
) -> Result<Registration> {
    let subject = Subject {
        id: SubjectId::generate(),
        cedula,
        created_at: now,
    };
    let record = ValidationRecord::new_pending(subject.id.clone(), subject.cedula.clone(), now);

    let mut tx = pool.begin().await?;
    subjects::insert_subject(&mut *tx, &subject).await?;
    validation_records::insert_record(&mut *tx, &record).await?;
    tx.commit().await?;

    tracing::info!(subject_id = %subject.id, "Subject registered");

    let post_commit = vec![JobRequest::validate_cedula(subject.id.clone(), 1, now)];
    Ok(Registration {
        subject,
        record,
        post_commit,
    })
}

/// Enqueue the post-commit jobs of a registration.
///
/// Returns how many were newly queued.
pub async fn run_post_commit(queue: &dyn JobQueue, jobs: Vec<JobRequest>) -> Result<usize> {
    let mut queued = 0;
    for job in jobs {
        if queue.enqueue(job).await? {
            queued += 1;
        }
    }
    Ok(queued)
}
