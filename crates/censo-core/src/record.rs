//! Validation record model and status lifecycle.
//!
//! A [`ValidationRecord`] is created `Pending` together with its subject and
//! is advanced only through the transition methods below, which keep the
//! location and cancellation field groups mutually exclusive.

use crate::outcome::{CancellationKind, TransientFailure};
use crate::types::{Cedula, SubjectId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a validation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    /// Created, no attempt has started yet
    Pending,
    /// An attempt is running or a retry is scheduled
    Processing,
    /// Found in the census with a voting location
    Active,
    /// Not in the census
    NotFound,
    /// Cancelled because the holder died
    CancelledDeceased,
    /// Cancelled for another reason
    CancelledOther,
    /// Attempts exhausted with a generic failure
    Error,
    /// Attempts exhausted on timeouts
    Timeout,
    /// Attempts exhausted on anti-automation blocks
    Blocked,
}

impl ValidationStatus {
    /// All statuses, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Pending,
        Self::Processing,
        Self::Active,
        Self::NotFound,
        Self::CancelledDeceased,
        Self::CancelledOther,
        Self::Error,
        Self::Timeout,
        Self::Blocked,
    ];

    /// Database/wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Active => "ACTIVE",
            Self::NotFound => "NOT_FOUND",
            Self::CancelledDeceased => "CANCELLED_DECEASED",
            Self::CancelledOther => "CANCELLED_OTHER",
            Self::Error => "ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Blocked => "BLOCKED",
        }
    }

    /// Spanish label shown to users.
    #[must_use]
    pub fn display_label(self) -> &'static str {
        match self {
            Self::Pending => "Pendiente",
            Self::Processing => "Procesando",
            Self::Active => "Activo",
            Self::NotFound => "No encontrado",
            Self::CancelledDeceased => "Cancelada - Fallecido",
            Self::CancelledOther => "Cancelada - Otro",
            Self::Error => "Error",
            Self::Timeout => "Timeout",
            Self::Blocked => "Bloqueado",
        }
    }

    /// Outcome will not change on retry.
    #[must_use]
    pub fn is_permanent(self) -> bool {
        matches!(
            self,
            Self::Active | Self::NotFound | Self::CancelledDeceased | Self::CancelledOther
        )
    }

    /// Terminal for now, retryable only by a manual trigger.
    #[must_use]
    pub fn is_retryable_error(self) -> bool {
        matches!(self, Self::Error | Self::Timeout | Self::Blocked)
    }

    /// A job is queued or running for this record.
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown validation status '{s}'"))
    }
}

/// Polling place assignment of an active cedula.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingLocation {
    /// Department
    pub departamento: String,
    /// Municipality
    pub municipio: String,
    /// Polling station
    pub puesto: String,
    /// Polling station address
    pub direccion: String,
    /// Table number
    pub mesa: String,
}

impl VotingLocation {
    /// True when every field is empty.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        [
            &self.departamento,
            &self.municipio,
            &self.puesto,
            &self.direccion,
            &self.mesa,
        ]
        .iter()
        .all(|field| field.is_empty())
    }
}

/// Cancellation row of a cancelled cedula.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationDetails {
    /// Cancellation note, e.g. "Cancelada por Muerte"
    pub novedad: String,
    /// Resolution number
    pub resolucion: String,
    /// Date of the cancellation, as printed by the registry
    pub fecha_novedad: String,
}

impl CancellationDetails {
    /// True when every field is empty.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.novedad.is_empty() && self.resolucion.is_empty() && self.fecha_novedad.is_empty()
    }
}

/// Persisted verification state of one subject's cedula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// Owning subject
    pub subject_id: SubjectId,
    /// Cedula being validated
    pub cedula: Cedula,
    /// Current status
    pub status: ValidationStatus,
    /// Populated only when `status` is `Active`
    pub location: VotingLocation,
    /// Populated only when `status` is one of the cancelled kinds
    pub cancellation: CancellationDetails,
    /// Last completed attempt; also the manual-refresh cooldown anchor
    pub fetched_at: Option<DateTime<Utc>>,
    /// Last failure detail, empty on success
    pub error_message: String,
    /// Page snapshot kept for non-permanent outcomes
    pub raw_response: Option<String>,
    /// Attempts consumed so far
    pub retry_count: u8,
    /// Due time of the scheduled retry while one is pending
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Creation time of the owning subject
    pub created_at: DateTime<Utc>,
}

impl ValidationRecord {
    /// New `Pending` record for a freshly created subject.
    #[must_use]
    pub fn new_pending(subject_id: SubjectId, cedula: Cedula, created_at: DateTime<Utc>) -> Self {
        Self {
            subject_id,
            cedula,
            status: ValidationStatus::Pending,
            location: VotingLocation::default(),
            cancellation: CancellationDetails::default(),
            fetched_at: None,
            error_message: String::new(),
            raw_response: None,
            retry_count: 0,
            next_attempt_at: None,
            created_at,
        }
    }

    /// Whether the UI should keep polling this record.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.status.is_in_flight()
    }

    /// Flip to `Processing` before an attempt runs.
    pub fn mark_processing(&mut self) {
        self.status = ValidationStatus::Processing;
    }

    /// Apply a found outcome.
    pub fn record_found(&mut self, location: VotingLocation, now: DateTime<Utc>) {
        self.status = ValidationStatus::Active;
        self.location = location;
        self.cancellation = CancellationDetails::default();
        self.finish_permanent(now);
    }

    /// Apply a cancelled outcome.
    pub fn record_cancelled(
        &mut self,
        kind: CancellationKind,
        details: CancellationDetails,
        now: DateTime<Utc>,
    ) {
        self.status = kind.status();
        self.location = VotingLocation::default();
        self.cancellation = details;
        self.finish_permanent(now);
    }

    /// Apply a not-found outcome.
    pub fn record_not_found(&mut self, now: DateTime<Utc>) {
        self.status = ValidationStatus::NotFound;
        self.location = VotingLocation::default();
        self.cancellation = CancellationDetails::default();
        self.finish_permanent(now);
    }

    fn finish_permanent(&mut self, now: DateTime<Utc>) {
        self.fetched_at = Some(now);
        self.next_attempt_at = None;
        self.error_message.clear();
        self.raw_response = None;
    }

    /// Apply a transient failure that will be retried at `next_attempt_at`.
    ///
    /// The record stays `Processing`; `retry_count` is incremented but never
    /// pushed past `cap`.
    pub fn record_retry(
        &mut self,
        attempt: u8,
        failure: &TransientFailure,
        cap: u8,
        next_attempt_at: DateTime<Utc>,
    ) {
        self.status = ValidationStatus::Processing;
        self.retry_count = self.retry_count.saturating_add(1).min(cap);
        self.next_attempt_at = Some(next_attempt_at);
        self.error_message = attempt_message(attempt, failure);
        if let Some(raw) = &failure.raw_response {
            self.raw_response = Some(raw.clone());
        }
    }

    /// Apply the final transient failure once attempts are exhausted.
    pub fn record_exhausted(
        &mut self,
        attempt: u8,
        failure: &TransientFailure,
        cap: u8,
        now: DateTime<Utc>,
    ) {
        self.status = failure.kind.exhausted_status();
        self.retry_count = cap;
        self.location = VotingLocation::default();
        self.cancellation = CancellationDetails::default();
        self.error_message = attempt_message(attempt, failure);
        self.fetched_at = Some(now);
        self.next_attempt_at = None;
        if let Some(raw) = &failure.raw_response {
            self.raw_response = Some(raw.clone());
        }
    }

    /// Force the record into `Error` with a user-facing message.
    pub fn force_error(&mut self, message: impl Into<String>) {
        self.status = ValidationStatus::Error;
        self.location = VotingLocation::default();
        self.cancellation = CancellationDetails::default();
        self.next_attempt_at = None;
        self.error_message = message.into();
    }

    /// Time left before a manual refresh is allowed, if any.
    #[must_use]
    pub fn cooldown_remaining(&self, now: DateTime<Utc>, cooldown: Duration) -> Option<Duration> {
        let fetched_at = self.fetched_at?;
        let ready_at = fetched_at + cooldown;
        (now < ready_at).then(|| ready_at - now)
    }

    /// Reset for a manual re-trigger: `Processing`, fresh attempt budget,
    /// cooldown clock restarted.
    pub fn reset_for_refresh(&mut self, now: DateTime<Utc>) {
        self.status = ValidationStatus::Processing;
        self.fetched_at = Some(now);
        self.retry_count = 0;
        self.next_attempt_at = None;
    }
}

fn attempt_message(attempt: u8, failure: &TransientFailure) -> String {
    format!("attempt {attempt}: {} - {}", failure.kind, failure.detail)
}
