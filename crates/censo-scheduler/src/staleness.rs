//! Staleness rules for records stuck in flight.

use censo_core::{StalenessConfig, ValidationRecord, ValidationStatus};
use chrono::{DateTime, Duration, Utc};

/// Message shown to the user when a stuck record is reset.
pub const STALE_MESSAGE: &str =
    "Verification timed out. The lookup service may be unavailable; please try again.";

/// Timeouts after which an in-flight record counts as stuck.
#[derive(Debug, Clone, Copy)]
pub struct StalenessPolicy {
    /// Maximum age of a `PENDING` record
    pub pending_timeout: Duration,
    /// Maximum quiet time of a `PROCESSING` record
    pub processing_timeout: Duration,
}

impl StalenessPolicy {
    /// Build the policy from the `[staleness]` config section.
    #[must_use]
    pub fn from_config(config: &StalenessConfig) -> Self {
        Self {
            pending_timeout: secs(config.pending_timeout_secs),
            processing_timeout: secs(config.processing_timeout_secs),
        }
    }

    /// `PENDING` longer than the pending timeout since the subject was
    /// created, or `PROCESSING` longer than the processing timeout since the
    /// latest of creation, last fetch and the scheduled retry's due time.
    ///
    /// A record waiting out its backoff is measured from when the retry is
    /// due, so a long backoff alone never makes it stale.
    #[must_use]
    pub fn is_stale(&self, record: &ValidationRecord, now: DateTime<Utc>) -> bool {
        match record.status {
            ValidationStatus::Pending => now - record.created_at > self.pending_timeout,
            ValidationStatus::Processing => {
                now - processing_anchor(record) > self.processing_timeout
            }
            _ => false,
        }
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::from_config(&StalenessConfig::default())
    }
}

fn processing_anchor(record: &ValidationRecord) -> DateTime<Utc> {
    [record.fetched_at, record.next_attempt_at]
        .into_iter()
        .flatten()
        .fold(record.created_at, |latest, at| latest.max(at))
}

fn secs(value: u64) -> Duration {
    Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX / 1000))
}
