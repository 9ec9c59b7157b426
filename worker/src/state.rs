//! Application state management.

use crate::error::Result;
use censo_browser::{BrowserEngine, RateLimiter};
use censo_core::AppConfig;
use censo_db::{Database, SqliteJobQueue};
use censo_lookup::{solver_from_config, LookupExecutor};
use censo_scheduler::RetryPolicy;
use censo_validator::ValidationOrchestrator;
use std::sync::Arc;

/// Everything the workers share.
pub struct AppState {
    /// Loaded configuration
    pub config: AppConfig,

    /// Record store
    pub db: Database,

    /// Durable job queue over the same database
    pub queue: Arc<SqliteJobQueue>,

    /// Process-wide browser; launched on the first lookup.
    pub browser_engine: Arc<BrowserEngine>,

    /// Attempt runner
    pub orchestrator: Arc<ValidationOrchestrator>,
}

impl AppState {
    /// Open the database and wire the lookup pipeline.
    ///
    /// Jobs left running by a previous process are put back in the queue.
    pub async fn new(config: AppConfig) -> Result<Self> {
        if let Some(parent) = config.database.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::new(&config.database.path, config.database.max_connections).await?;
        db.run_migrations().await?;
        tracing::info!("Database ready at {}", config.database.path.display());

        let queue = Arc::new(db.job_queue());
        let requeued = queue.requeue_running().await?;
        if requeued > 0 {
            tracing::warn!("Requeued {} job(s) interrupted by a previous run", requeued);
        }

        let browser_engine = Arc::new(BrowserEngine::new(config.browser.clone()));
        let limiter = Arc::new(RateLimiter::new(config.lookup.rate_limit()));
        let lookup = Arc::new(LookupExecutor::new(
            browser_engine.clone(),
            limiter,
            solver_from_config(&config.captcha),
            config.lookup.clone(),
        ));

        let orchestrator = Arc::new(
            ValidationOrchestrator::new(db.pool().clone(), lookup, queue.clone())
                .with_policy(RetryPolicy::from_config(&config.retry)),
        );

        Ok(Self {
            config,
            db,
            queue,
            browser_engine,
            orchestrator,
        })
    }
}
