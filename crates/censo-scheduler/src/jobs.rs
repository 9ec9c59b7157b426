//! Job type definitions.

use censo_core::SubjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Work a queued job performs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobType {
    /// Run validation attempt `attempt` for a subject's cedula.
    ValidateCedula {
        /// Subject whose record is validated
        subject_id: SubjectId,
        /// 1-indexed attempt number within the current run
        attempt: u8,
    },
}

/// Idempotency name of a validation job.
///
/// The first attempt of a run is `validate_cedula_<subject_id>`; retries carry
/// their attempt number so they never collide with a fresh first attempt.
#[must_use]
pub fn validate_job_name(subject_id: &SubjectId, attempt: u8) -> String {
    if attempt <= 1 {
        format!("validate_cedula_{subject_id}")
    } else {
        format!("validate_cedula_{subject_id}_attempt_{attempt}")
    }
}

/// A job to be enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    /// Idempotency name
    pub name: String,
    /// Work to perform
    pub job_type: JobType,
    /// Earliest time the job may run
    pub run_at: DateTime<Utc>,
}

impl JobRequest {
    /// Validation attempt `attempt` for `subject_id`, due at `run_at`.
    #[must_use]
    pub fn validate_cedula(subject_id: SubjectId, attempt: u8, run_at: DateTime<Utc>) -> Self {
        Self {
            name: validate_job_name(&subject_id, attempt),
            job_type: JobType::ValidateCedula {
                subject_id,
                attempt,
            },
            run_at,
        }
    }
}

/// Lifecycle state of a queued job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum JobState {
    /// Waiting for its `run_at`
    Queued,
    /// Claimed by a worker
    Running,
    /// Finished, whatever the validation outcome
    Done,
    /// The handler returned an error
    Failed,
}

impl JobState {
    /// Database representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::Running => "Running",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Queued" => Ok(Self::Queued),
            "Running" => Ok(Self::Running),
            "Done" => Ok(Self::Done),
            "Failed" => Ok(Self::Failed),
            other => Err(format!("Invalid job state '{other}'")),
        }
    }
}

/// A job as stored in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    /// Row id
    pub id: i64,
    /// Idempotency name
    pub name: String,
    /// Decoded payload
    pub job_type: JobType,
    /// Due time, as stored
    pub run_at: String,
    /// Current state
    pub state: JobState,
    /// Enqueue time
    pub created_at: String,
    /// Claim time
    pub started_at: Option<String>,
    /// Completion or failure time
    pub finished_at: Option<String>,
    /// Handler error of a failed job
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> SubjectId {
        SubjectId::new("550e8400-e29b-41d4-a716-446655440000").unwrap()
    }

    #[test]
    fn test_job_names() {
        assert_eq!(
            validate_job_name(&subject(), 1),
            "validate_cedula_550e8400-e29b-41d4-a716-446655440000"
        );
        assert_eq!(
            validate_job_name(&subject(), 3),
            "validate_cedula_550e8400-e29b-41d4-a716-446655440000_attempt_3"
        );
    }

    #[test]
    fn test_job_type_payload() {
        let job = JobType::ValidateCedula {
            subject_id: subject(),
            attempt: 2,
        };
        let json = serde_json::to_string(&job).unwrap();
        assert_eq!(
            json,
            r#"{"type":"validate_cedula","subject_id":"550e8400-e29b-41d4-a716-446655440000","attempt":2}"#
        );
        assert_eq!(serde_json::from_str::<JobType>(&json).unwrap(), job);
    }

    #[test]
    fn test_job_state_parse() {
        assert_eq!("Running".parse::<JobState>().unwrap(), JobState::Running);
        assert!("Paused".parse::<JobState>().is_err());
    }
}
