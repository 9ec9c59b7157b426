//! Validation attempt runner.
//!
//! The `ValidationOrchestrator` runs one attempt for one subject: it flips the
//! record to `PROCESSING`, performs the census lookup, applies the outcome
//! through [`plan_attempt`] and enqueues the follow-up attempt when one is
//! due. It is the only component that retries.

use crate::error::{Result, ValidatorError};
use censo_core::{SubjectId, ValidationRecord, ValidationStatus};
use censo_db::{subjects, validation_records, DatabaseError};
use censo_lookup::CensusLookup;
use censo_scheduler::{plan_attempt, FollowUp, JobQueue, JobRequest, JobType, QueuedJob, RetryPolicy};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Why an attempt did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The subject was deleted before or during the attempt
    SubjectGone,
    /// The record is no longer pending or processing
    NotInFlight(ValidationStatus),
    /// A manual refresh restarted the run; this retry belongs to the old one
    Superseded,
}

/// What an attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptReport {
    /// Nothing was looked up or written
    Skipped(SkipReason),
    /// The outcome was applied to the record
    Completed {
        /// Record status after the attempt
        status: ValidationStatus,
        /// Next attempt, if one was scheduled
        follow_up: Option<FollowUp>,
    },
}

/// Runs validation attempts against the census lookup.
pub struct ValidationOrchestrator {
    /// Record storage
    pool: SqlitePool,
    /// Census lookup (browser-backed in production)
    lookup: Arc<dyn CensusLookup>,
    /// Queue for follow-up attempts
    queue: Arc<dyn JobQueue>,
    /// Retry cap and backoff
    policy: RetryPolicy,
    clock: Clock,
}

impl ValidationOrchestrator {
    /// Create a new orchestrator with the default retry policy.
    #[must_use]
    pub fn new(pool: SqlitePool, lookup: Arc<dyn CensusLookup>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            pool,
            lookup,
            queue,
            policy: RetryPolicy::default(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the clock used to timestamp outcomes and schedule retries.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// The retry policy in effect.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the attempt described by a claimed job.
    pub async fn handle_job(&self, job: &QueuedJob) -> Result<AttemptReport> {
        match &job.job_type {
            JobType::ValidateCedula {
                subject_id,
                attempt,
            } => self.run_attempt(subject_id, *attempt).await,
        }
    }

    /// Run attempt `attempt` (1-indexed) for a subject.
    ///
    /// Lost races (deleted subject, record already settled, superseded retry)
    /// are reported as [`AttemptReport::Skipped`], not as errors.
    pub async fn run_attempt(&self, subject_id: &SubjectId, attempt: u8) -> Result<AttemptReport> {
        let Some(mut record) = self.load(subject_id).await? else {
            tracing::debug!(subject_id = %subject_id, attempt, "Subject gone, skipping attempt");
            return Ok(AttemptReport::Skipped(SkipReason::SubjectGone));
        };

        if !record.is_in_flight() {
            tracing::debug!(
                subject_id = %subject_id,
                attempt,
                status = %record.status,
                "Record already settled, skipping attempt"
            );
            return Ok(AttemptReport::Skipped(SkipReason::NotInFlight(record.status)));
        }

        if attempt > 1 && u16::from(record.retry_count) + 1 != u16::from(attempt) {
            tracing::debug!(
                subject_id = %subject_id,
                attempt,
                retry_count = record.retry_count,
                "Retry superseded by a newer run"
            );
            return Ok(AttemptReport::Skipped(SkipReason::Superseded));
        }

        record.mark_processing();
        if !self.save(&record).await? {
            return Ok(AttemptReport::Skipped(SkipReason::SubjectGone));
        }

        tracing::info!(subject_id = %subject_id, attempt, "Starting census lookup");
        tracing::debug!(subject_id = %subject_id, cedula = %record.cedula, "Lookup target");

        let outcome = self.lookup.lookup(&record.cedula).await;
        let now = (self.clock)();
        let plan = plan_attempt(&record, attempt, &outcome, now, &self.policy);

        if !self.save(&plan.record).await? {
            tracing::debug!(subject_id = %subject_id, attempt, "Subject deleted during lookup");
            return Ok(AttemptReport::Skipped(SkipReason::SubjectGone));
        }

        if let Some(follow_up) = plan.follow_up {
            let request =
                JobRequest::validate_cedula(subject_id.clone(), follow_up.attempt, follow_up.run_at);
            let queued = self.queue.enqueue(request).await?;
            tracing::info!(
                subject_id = %subject_id,
                attempt,
                outcome = outcome.label(),
                next_attempt = follow_up.attempt,
                run_at = %follow_up.run_at,
                queued,
                "Attempt failed, retry scheduled"
            );
        } else {
            tracing::info!(
                subject_id = %subject_id,
                attempt,
                outcome = outcome.label(),
                status = %plan.record.status,
                "Validation finished"
            );
        }

        Ok(AttemptReport::Completed {
            status: plan.record.status,
            follow_up: plan.follow_up,
        })
    }

    async fn load(&self, subject_id: &SubjectId) -> Result<Option<ValidationRecord>> {
        if subjects::get_subject(&self.pool, subject_id).await?.is_none() {
            return Ok(None);
        }
        Ok(validation_records::get_record(&self.pool, subject_id).await?)
    }

    /// Persist a record. Returns false when its row has been deleted.
    async fn save(&self, record: &ValidationRecord) -> Result<bool> {
        match validation_records::save_record(&self.pool, record).await {
            Ok(()) => Ok(true),
            Err(DatabaseError::NotFoundWithMessage(_)) => Ok(false),
            Err(e) => Err(ValidatorError::Database(e)),
        }
    }
}
