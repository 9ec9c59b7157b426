//! Staleness reaper.
//!
//! Pull-based: whoever reads a record for display runs it through
//! [`Reaper::reset_if_stale`] first, so a crashed or lost attempt surfaces as
//! a retryable `ERROR` instead of polling forever.

use crate::error::Result;
use censo_core::{SubjectId, ValidationRecord};
use censo_db::validation_records;
use censo_scheduler::{StalenessPolicy, STALE_MESSAGE};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// A record as shown to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CensusStatus {
    /// Current record, after the staleness check
    pub record: ValidationRecord,
    /// Status label for display
    pub label: &'static str,
    /// Whether the caller should poll again
    pub is_polling: bool,
}

/// Resets records stuck in flight.
pub struct Reaper {
    pool: SqlitePool,
    policy: StalenessPolicy,
}

impl Reaper {
    /// Create a reaper with the given timeouts.
    #[must_use]
    pub fn new(pool: SqlitePool, policy: StalenessPolicy) -> Self {
        Self { pool, policy }
    }

    /// Force a stale record into `ERROR` and persist it.
    ///
    /// Returns true if the record was reset.
    pub async fn reset_if_stale(&self, record: &mut ValidationRecord, now: DateTime<Utc>) -> Result<bool> {
        if !self.policy.is_stale(record, now) {
            return Ok(false);
        }

        tracing::warn!(
            subject_id = %record.subject_id,
            status = %record.status,
            "Validation record stuck in flight, resetting to ERROR"
        );
        record.force_error(STALE_MESSAGE);
        validation_records::save_record(&self.pool, record).await?;
        Ok(true)
    }

    /// Load a subject's record for display, reaping it if stale.
    pub async fn census_status(
        &self,
        subject_id: &SubjectId,
        now: DateTime<Utc>,
    ) -> Result<Option<CensusStatus>> {
        let Some(mut record) = validation_records::get_record(&self.pool, subject_id).await? else {
            return Ok(None);
        };

        self.reset_if_stale(&mut record, now).await?;
        let label = record.status.display_label();
        let is_polling = record.is_in_flight();
        Ok(Some(CensusStatus {
            record,
            label,
            is_polling,
        }))
    }
}
