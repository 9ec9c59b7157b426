//! Censo Lookup - One census query, end to end.
//!
//! This crate turns a [`Cedula`](censo_core::Cedula) into an
//! [`Outcome`](censo_core::Outcome): it drives the census lookup form in an
//! isolated browser session, solves the reCAPTCHA challenge when one is
//! present, and classifies the rendered page.
//!
//! # Architecture
//!
//! - **Executor** ([`executor`]): throttled, time-bounded form flow that never
//!   raises; every failure becomes a [`RawOutcome::Failed`]
//! - **Classifier** ([`classifier`]): pure HTML to [`Outcome`](censo_core::Outcome)
//!   mapping with a fixed priority order
//! - **CAPTCHA** ([`captcha`]): solver trait, 2captcha provider and site-key
//!   discovery helpers
//! - **Errors** ([`error`]): the lookup failure taxonomy
//!
//! # Example
//!
//! ```rust
//! use censo_core::Outcome;
//! use censo_lookup::classify;
//!
//! let html = "<p>La cédula no se encuentra en el censo para esta elección</p>";
//! assert_eq!(classify(html), Outcome::NotFound);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod captcha;
pub mod classifier;
pub mod error;
pub mod executor;

pub use captcha::{solver_from_config, CaptchaSolver, DisabledSolver, TwoCaptchaSolver};
pub use classifier::classify;
pub use error::{CaptchaError, LookupError, Result};
pub use executor::{CensusLookup, LookupExecutor, LookupFlow, RawOutcome};
