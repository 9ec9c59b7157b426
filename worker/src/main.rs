use anyhow::Context;
use censo_core::AppConfig;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    censo_worker::init_tracing();

    let config = AppConfig::load_with_env().context("failed to load configuration")?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown requested, finishing current jobs"),
            Err(e) => tracing::error!("Failed to listen for ctrl-c: {}", e),
        }
        signal.cancel();
    });

    censo_worker::run(config, shutdown).await?;
    Ok(())
}
