//! Censo Validator - validation orchestration.
//!
//! This crate ties the census lookup, the retry policy and the record store
//! together. It runs validation attempts, handles manual and bulk refresh
//! requests, reaps records stuck in flight and registers new subjects.
//!
//! # Features
//!
//! - One attempt per job, with follow-up attempts scheduled through the job queue
//! - Silent abort when a subject is deleted or a retry has been superseded
//! - Per-record refresh cooldown enforced by an atomic conditional update
//! - Pull-based staleness reset for records stuck `PENDING` or `PROCESSING`
//!
//! # Example
//!
//! ```rust,ignore
//! use censo_validator::{registration, ValidationOrchestrator};
//! use std::sync::Arc;
//!
//! let registration = registration::register_subject(db.pool(), cedula, Utc::now()).await?;
//! registration::run_post_commit(queue.as_ref(), registration.post_commit).await?;
//!
//! let orchestrator = ValidationOrchestrator::new(db.pool().clone(), lookup, queue);
//! while let Some(job) = queue.claim_next_due(Utc::now()).await? {
//!     orchestrator.handle_job(&job).await?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod orchestrator;
pub mod reaper;
pub mod refresh;
pub mod registration;

pub use error::{Result, ValidatorError};
pub use orchestrator::{AttemptReport, Clock, SkipReason, ValidationOrchestrator};
pub use reaper::{CensusStatus, Reaper};
pub use refresh::{BulkEntry, BulkRefreshReport, RefreshOutcome, RefreshService};
pub use registration::{register_subject, run_post_commit, Registration};
