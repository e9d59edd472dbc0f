use std::sync::Arc;

use anyhow::{Context, Result};
use pulseboard_core::telemetry::{init_telemetry, TelemetryConfig};
use pulseboard_durable::PostgresJobStore;
use pulseboard_storage::{Database, StorageBackend};
use pulseboard_worker::{mailer_from_config, WorkerConfig, WorkerRuntime};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Configure via RUST_LOG or LOG_LEVEL (default: "pulseboard_worker=debug,pulseboard_durable=info,info")
    init_telemetry(TelemetryConfig::from_env(
        "pulseboard-worker",
        "pulseboard_worker=debug,pulseboard_durable=info,info",
    ));

    tracing::info!("pulseboard-worker starting...");

    // The standalone worker shares its queue and events with the server, so
    // it needs PostgreSQL; in-memory mode only makes sense inside the server.
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set for the standalone worker")?;

    let db = Database::from_url(&database_url)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to run migrations")?;

    let jobs = Arc::new(PostgresJobStore::new(db.pool().clone()));
    let storage = Arc::new(StorageBackend::Postgres(db));

    let config = WorkerConfig::from_env();
    tracing::info!(
        worker_id = %config.worker_id,
        concurrency = config.concurrency,
        alert_threshold = config.alert_threshold,
        retention_days = config.retention_days,
        "Starting worker runtime"
    );

    let mailer = mailer_from_config(&config.mail).context("Failed to set up mail delivery")?;
    let runtime = WorkerRuntime::new(jobs, storage.clone(), storage, mailer, &config);

    runtime.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Received shutdown signal");

    runtime.shutdown().await?;
    tracing::info!("Worker shutdown complete");
    Ok(())
}
