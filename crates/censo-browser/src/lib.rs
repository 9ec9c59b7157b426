//! Browser automation for the census lookup.
//!
//! Owns one lazily launched Chromium process per worker process and hands
//! out isolated sessions (one browser context each) to lookups, plus the
//! process-wide rate limiter that spaces those lookups out.

pub mod actions;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod rate_limit;
pub mod session;

pub use actions::BrowserActions;
pub use engine::BrowserEngine;
pub use error::{BrowserError, Result};
pub use fingerprint::FingerprintConfig;
pub use rate_limit::RateLimiter;
pub use session::BrowserSession;
