//! Censo worker shell.
//!
//! Thin process around the `censo-*` crates: loads configuration, opens the
//! database, starts the worker pool and tears the browser down on exit.

pub mod error;
pub mod pool;
pub mod state;

use censo_core::AppConfig;
use pool::WorkerPool;
use state::AppState;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use error::{Result, WorkerError};

/// Initialize tracing subscriber for logging
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,censo=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

/// Run the worker until `shutdown` is cancelled.
pub async fn run(config: AppConfig, shutdown: CancellationToken) -> Result<()> {
    info!("Starting Censo worker v{}", env!("CARGO_PKG_VERSION"));

    let state = AppState::new(config).await?;
    let pool = WorkerPool::new(
        state.queue.clone(),
        state.orchestrator.clone(),
        state.config.worker.pool_size,
        Duration::from_millis(state.config.worker.poll_interval_ms),
    );

    pool.run(shutdown).await;

    state.browser_engine.shutdown().await;
    state.db.close().await;
    info!("Censo worker stopped");
    Ok(())
}
