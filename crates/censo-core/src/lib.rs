//! Censo Core - Foundation crate for the census validation pipeline.
//!
//! This crate provides shared types, error handling, configuration management
//! and the validation record model that all other Censo crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Shared newtypes (`Cedula`, `SubjectId`)
//! - [`record`] - The persisted `ValidationRecord` and its status lifecycle
//! - [`outcome`] - Outcome of one lookup attempt, as seen by the scheduler
//!
//! # Example
//!
//! ```rust
//! use censo_core::{AppConfig, Cedula};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! assert_eq!(config.retry.max_attempts, 3);
//!
//! let cedula = Cedula::new("1234567890")?;
//! println!("Validating {cedula}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod outcome;
pub mod record;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, BrowserConfig, CaptchaConfig, CaptchaProvider, DatabaseConfig, LookupConfig,
    RefreshConfig, RetryConfig, SiteSelectors, StalenessConfig, WorkerConfig,
};
pub use error::{CensoError, ConfigError, ConfigResult, Result};
pub use outcome::{CancellationKind, FailureKind, Outcome, TransientFailure};
pub use record::{CancellationDetails, ValidationRecord, ValidationStatus, VotingLocation};
pub use types::{Cedula, SubjectId};
