//! Manual and bulk refresh.
//!
//! A refresh restarts validation from attempt 1. It is rate limited per
//! record by a cooldown measured from `fetched_at` and never runs while an
//! attempt is in progress.

use crate::error::{Result, ValidatorError};
use censo_core::{RefreshConfig, SubjectId, ValidationRecord, ValidationStatus};
use censo_db::validation_records;
use censo_scheduler::{JobQueue, JobRequest};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Result of a single refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Record flipped to `PROCESSING` and attempt 1 enqueued
    Accepted,
    /// Refreshed too recently
    CoolingDown {
        /// Time left before a refresh is allowed
        retry_after: Duration,
    },
    /// An attempt is already running or scheduled
    InProgress,
}

/// Why a bulk refresh left a record alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No such subject or record
    Missing,
    /// Outcome is final and will not change
    Permanent(ValidationStatus),
    /// An attempt is already running or scheduled
    InProgress,
    /// Refreshed too recently
    CoolingDown,
}

/// Per-record result of a bulk refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkEntry {
    /// Refresh accepted
    Refreshed,
    /// Record skipped
    Skipped(SkipReason),
}

/// Report of a bulk refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkRefreshReport {
    /// One entry per processed id, in request order
    pub entries: Vec<(SubjectId, BulkEntry)>,
    /// Number of records actually refreshed
    pub refreshed: usize,
}

/// Applies refresh requests to records and the job queue.
pub struct RefreshService {
    pool: SqlitePool,
    queue: Arc<dyn JobQueue>,
    cooldown: Duration,
    bulk_batch_size: usize,
}

impl RefreshService {
    /// Create a refresh service with the given cooldown and bulk limit.
    #[must_use]
    pub fn new(pool: SqlitePool, queue: Arc<dyn JobQueue>, config: &RefreshConfig) -> Self {
        Self {
            pool,
            queue,
            cooldown: Duration::seconds(i64::try_from(config.cooldown_secs).unwrap_or(i64::MAX / 1000)),
            bulk_batch_size: config.bulk_batch_size,
        }
    }

    /// Cooldown between refreshes of one record.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Refresh one subject's record.
    pub async fn refresh(&self, subject_id: &SubjectId, now: DateTime<Utc>) -> Result<RefreshOutcome> {
        let record = validation_records::get_record(&self.pool, subject_id)
            .await?
            .ok_or_else(|| ValidatorError::RecordNotFound(subject_id.clone()))?;

        if let Some(rejection) = self.precheck(&record, now) {
            tracing::debug!(subject_id = %subject_id, ?rejection, "Refresh rejected");
            return Ok(rejection);
        }

        self.claim_and_enqueue(subject_id, now).await
    }

    /// Refresh up to the configured batch size of records.
    ///
    /// Permanent records, records with an attempt in flight and records in
    /// cooldown are skipped. Ids past the batch size are ignored.
    pub async fn bulk_refresh(
        &self,
        subject_ids: &[SubjectId],
        now: DateTime<Utc>,
    ) -> Result<BulkRefreshReport> {
        if subject_ids.len() > self.bulk_batch_size {
            tracing::warn!(
                requested = subject_ids.len(),
                limit = self.bulk_batch_size,
                "Bulk refresh truncated"
            );
        }

        let mut report = BulkRefreshReport::default();

        for subject_id in subject_ids.iter().take(self.bulk_batch_size) {
            let entry = match validation_records::get_record(&self.pool, subject_id).await? {
                None => BulkEntry::Skipped(SkipReason::Missing),
                Some(record) if record.status.is_permanent() => {
                    BulkEntry::Skipped(SkipReason::Permanent(record.status))
                }
                Some(record) => match self.precheck(&record, now) {
                    Some(RefreshOutcome::InProgress) => BulkEntry::Skipped(SkipReason::InProgress),
                    Some(_) => BulkEntry::Skipped(SkipReason::CoolingDown),
                    None => match self.claim_and_enqueue(subject_id, now).await? {
                        RefreshOutcome::Accepted => BulkEntry::Refreshed,
                        RefreshOutcome::InProgress => BulkEntry::Skipped(SkipReason::InProgress),
                        RefreshOutcome::CoolingDown { .. } => {
                            BulkEntry::Skipped(SkipReason::CoolingDown)
                        }
                    },
                },
            };

            if entry == BulkEntry::Refreshed {
                report.refreshed += 1;
            }
            report.entries.push((subject_id.clone(), entry));
        }

        tracing::info!(refreshed = report.refreshed, "Bulk refresh done");
        Ok(report)
    }

    fn precheck(&self, record: &ValidationRecord, now: DateTime<Utc>) -> Option<RefreshOutcome> {
        if record.status == ValidationStatus::Processing {
            return Some(RefreshOutcome::InProgress);
        }
        record
            .cooldown_remaining(now, self.cooldown)
            .map(|retry_after| RefreshOutcome::CoolingDown { retry_after })
    }

    async fn claim_and_enqueue(
        &self,
        subject_id: &SubjectId,
        now: DateTime<Utc>,
    ) -> Result<RefreshOutcome> {
        let claimed =
            validation_records::claim_for_refresh(&self.pool, subject_id, now, self.cooldown).await?;
        if !claimed {
            // Lost the race to another refresh or attempt; re-read to report why
            let record = validation_records::get_record(&self.pool, subject_id)
                .await?
                .ok_or_else(|| ValidatorError::RecordNotFound(subject_id.clone()))?;
            return Ok(self
                .precheck(&record, now)
                .unwrap_or(RefreshOutcome::InProgress));
        }

        self.queue
            .enqueue(JobRequest::validate_cedula(subject_id.clone(), 1, now))
            .await?;
        tracing::info!(subject_id = %subject_id, "Refresh accepted");
        Ok(RefreshOutcome::Accepted)
    }
}
