//! Outcome of a single lookup attempt.
//!
//! The lookup executor and classifier reduce everything that can happen
//! during an attempt to an [`Outcome`] value. The scheduler branches only on
//! these values, never on errors.

use crate::record::{CancellationDetails, ValidationStatus, VotingLocation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a cedula was cancelled in the census.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationKind {
    /// Cancelled because the holder died
    Deceased,
    /// Any other cancellation reason
    Other,
}

impl CancellationKind {
    /// Terminal record status for this cancellation kind.
    #[must_use]
    pub fn status(self) -> ValidationStatus {
        match self {
            Self::Deceased => ValidationStatus::CancelledDeceased,
            Self::Other => ValidationStatus::CancelledOther,
        }
    }
}

/// Kind of a transient (retryable) failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Navigation or DOM wait timed out
    Timeout,
    /// Connection or browser-level failure
    NetworkError,
    /// The CAPTCHA provider could not produce a usable token
    CaptchaFailed,
    /// The result page did not match any known structure
    ParseError,
    /// The site served an anti-automation or access-denied page
    Blocked,
}

impl FailureKind {
    /// Short machine-readable label, used in error messages and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::NetworkError => "network_error",
            Self::CaptchaFailed => "captcha_failed",
            Self::ParseError => "parse_error",
            Self::Blocked => "blocked",
        }
    }

    /// Status a record lands in once attempts are exhausted with this failure.
    #[must_use]
    pub fn exhausted_status(self) -> ValidationStatus {
        match self {
            Self::Timeout => ValidationStatus::Timeout,
            Self::Blocked => ValidationStatus::Blocked,
            Self::NetworkError | Self::CaptchaFailed | Self::ParseError => ValidationStatus::Error,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure that may go away on retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransientFailure {
    /// Failure kind
    pub kind: FailureKind,
    /// Human-readable detail
    pub detail: String,
    /// Page snapshot, when one was captured
    pub raw_response: Option<String>,
}

impl TransientFailure {
    /// Create a failure without a page snapshot.
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            raw_response: None,
        }
    }

    /// Attach a page snapshot.
    #[must_use]
    pub fn with_raw_response(mut self, raw: impl Into<String>) -> Self {
        self.raw_response = Some(raw.into());
        self
    }
}

/// Result of one lookup attempt after classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Cedula is active, with its voting location
    Found(VotingLocation),
    /// Cedula is cancelled
    Cancelled {
        /// Deceased or other
        kind: CancellationKind,
        /// Fields from the cancellation row
        details: CancellationDetails,
    },
    /// Cedula is not in the census
    NotFound,
    /// Infrastructure failure, eligible for retry
    Transient(TransientFailure),
}

impl Outcome {
    /// Whether retrying would not change this outcome.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !matches!(self, Self::Transient(_))
    }

    /// Short label for logging.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Found(_) => "found",
            Self::Cancelled { .. } => "cancelled",
            Self::NotFound => "not_found",
            Self::Transient(failure) => failure.kind.as_str(),
        }
    }
}
