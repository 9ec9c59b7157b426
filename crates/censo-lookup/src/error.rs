//! Error types for the lookup subsystem.

use censo_core::FailureKind;
use std::time::Duration;
use thiserror::Error;

/// Ways a single lookup can fail before a page is classified.
///
/// These never escape the executor as errors; they are folded into a
/// [`RawOutcome::Failed`](crate::RawOutcome::Failed) and then into a
/// transient [`Outcome`](censo_core::Outcome).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The lookup page did not load in time
    #[error("navigation timed out: {0}")]
    NavigationTimeout(String),

    /// A DOM wait (form input, result region) or the overall ceiling expired
    #[error("result timed out: {0}")]
    ResultTimeout(String),

    /// The reCAPTCHA challenge could not be solved or the token injected
    #[error("challenge solve failed: {0}")]
    ChallengeSolveFailed(String),

    /// Browser or connection level failure
    #[error("network error: {0}")]
    NetworkError(String),

    /// The page rendered but matched no known structure
    #[error("parse error: {0}")]
    ParseError(String),

    /// The site served an access-denied page
    #[error("blocked: {0}")]
    Blocked(String),
}

impl LookupError {
    /// Transient failure kind this error is reported as.
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::NavigationTimeout(_) | Self::ResultTimeout(_) => FailureKind::Timeout,
            Self::ChallengeSolveFailed(_) => FailureKind::CaptchaFailed,
            Self::NetworkError(_) => FailureKind::NetworkError,
            Self::ParseError(_) => FailureKind::ParseError,
            Self::Blocked(_) => FailureKind::Blocked,
        }
    }
}

/// Errors from a CAPTCHA provider.
#[derive(Error, Debug)]
pub enum CaptchaError {
    /// No provider is configured
    #[error("no CAPTCHA provider configured")]
    Disabled,

    /// HTTP transport failure
    #[error("CAPTCHA provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with an error code
    #[error("CAPTCHA provider rejected the request: {0}")]
    Rejected(String),

    /// The provider answered with something that is not its JSON envelope
    #[error("unexpected CAPTCHA provider response: {0}")]
    InvalidResponse(String),

    /// No token within the solve window
    #[error("CAPTCHA not solved within {0:?}")]
    Timeout(Duration),
}

/// Result type for CAPTCHA operations.
pub type Result<T> = std::result::Result<T, CaptchaError>;
