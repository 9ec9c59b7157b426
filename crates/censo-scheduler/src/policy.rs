//! Retry/backoff decisions.
//!
//! [`plan_attempt`] is the only place that decides what an attempt's outcome
//! does to a record and whether another attempt follows. It does no I/O;
//! the caller persists the record and enqueues the follow-up.

use censo_core::{Outcome, RetryConfig, ValidationRecord};
use chrono::{DateTime, Duration, Utc};

/// Attempt cap and backoff schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per run, the first one included
    pub max_attempts: u8,
    /// `backoff[n - 1]` is the delay between attempt `n` and attempt `n + 1`.
    pub backoff: Vec<Duration>,
}

impl RetryPolicy {
    /// Build the policy from the `[retry]` config section.
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff: config
                .backoff_secs
                .iter()
                .map(|&secs| Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000)))
                .collect(),
        }
    }

    /// Delay before the attempt following `attempt`. Past the end of the
    /// schedule the last entry repeats.
    #[must_use]
    pub fn backoff_after(&self, attempt: u8) -> Duration {
        let index = usize::from(attempt.max(1) - 1);
        self.backoff
            .get(index)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or_else(Duration::zero)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// The next attempt to schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUp {
    /// Attempt number of the follow-up
    pub attempt: u8,
    /// When it becomes due
    pub run_at: DateTime<Utc>,
}

/// Result of applying one attempt's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptPlan {
    /// Updated record, to be persisted by the caller
    pub record: ValidationRecord,
    /// Next attempt, if the run continues
    pub follow_up: Option<FollowUp>,
}

/// Apply the outcome of attempt `attempt` (1-indexed) to `record`.
///
/// Permanent outcomes finish the run. Transient outcomes schedule attempt
/// `attempt + 1` after `backoff[attempt - 1]` while under the cap, and land
/// the record in its exhausted status otherwise.
#[must_use]
pub fn plan_attempt(
    record: &ValidationRecord,
    attempt: u8,
    outcome: &Outcome,
    now: DateTime<Utc>,
    policy: &RetryPolicy,
) -> AttemptPlan {
    let mut record = record.clone();

    let follow_up = match outcome {
        Outcome::Found(location) => {
            record.record_found(location.clone(), now);
            None
        }
        Outcome::Cancelled { kind, details } => {
            record.record_cancelled(*kind, details.clone(), now);
            None
        }
        Outcome::NotFound => {
            record.record_not_found(now);
            None
        }
        Outcome::Transient(failure) if attempt < policy.max_attempts => {
            let run_at = now + policy.backoff_after(attempt);
            record.record_retry(attempt, failure, policy.max_attempts, run_at);
            Some(FollowUp {
                attempt: attempt + 1,
                run_at,
            })
        }
        Outcome::Transient(failure) => {
            record.record_exhausted(attempt, failure, policy.max_attempts, now);
            None
        }
    };

    AttemptPlan { record, follow_up }
}
