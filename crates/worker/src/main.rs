use anyhow::{Context, Result};
use courier_worker::telemetry::{init_telemetry, TelemetryConfig};
use courier_worker::{build_registry, connect_store, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Configure via environment variables:
    // - RUST_LOG or LOG_LEVEL: Log filter (default: "info")
    // - LOG_FORMAT: "json" for structured output
    init_telemetry(&TelemetryConfig::from_env());

    tracing::info!("courier-worker starting...");

    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    for task_type in &config.task_types {
        tracing::info!(
            task_type = %task_type.task.task_type,
            enabled = task_type.task.enabled,
            house_numbers = ?task_type.task.house_numbers,
            executor = ?task_type.executor,
            "Configured task type"
        );
    }

    let store = connect_store(&config).await?;
    let registry = build_registry(&config, store)?;

    tracing::info!(task_types = ?registry.task_types(), "Worker running");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Received shutdown signal");

    if let Err(e) = registry.stop_all().await {
        tracing::warn!(error = %e, "Graceful shutdown incomplete");
    }

    tracing::info!("Worker shutdown complete");
    Ok(())
}
