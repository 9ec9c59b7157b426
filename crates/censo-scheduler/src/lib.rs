//! Censo Scheduler
//!
//! Job definitions and the timing rules of a validation run: which attempt
//! comes next and when, and when an in-flight record counts as stuck.
//!
//! # Architecture
//!
//! - **Jobs**: [`JobRequest`] and [`QueuedJob`], named so enqueueing is idempotent
//! - **Queue**: the [`JobQueue`] trait; the `SQLite` backend lives in `censo-db`
//! - **Retry policy**: [`plan_attempt`] applies an outcome and schedules the follow-up
//! - **Staleness**: [`StalenessPolicy`] decides when the reaper resets a record
//!
//! Nothing here does I/O apart from the queue trait, so the policies are
//! tested as plain functions.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod jobs;
pub mod policy;
pub mod queue;
pub mod scheduler;
pub mod staleness;

pub use jobs::{validate_job_name, JobRequest, JobState, JobType, QueuedJob};
pub use policy::{plan_attempt, AttemptPlan, FollowUp, RetryPolicy};
pub use queue::{JobQueue, QueueError};
pub use scheduler::{format_timestamp, parse_timestamp};
pub use staleness::{StalenessPolicy, STALE_MESSAGE};
