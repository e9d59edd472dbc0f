// PulseBoard API server
// Decision: No DATABASE_URL means dev mode: storage, broker and job queue all in-process
// Decision: Workers run in this process unless RUN_WORKERS=false

use std::sync::Arc;

use anyhow::{Context, Result};
use pulseboard_control_plane::auth::{AuthConfig, AuthState, JwtService};
use pulseboard_control_plane::broker::{Broker, InMemoryBroker, PgBroker};
use pulseboard_control_plane::config::ServerConfig;
use pulseboard_control_plane::{
    build_router, shutdown_on, AppState, IngestService, RealtimeService,
};
use pulseboard_core::telemetry::{init_telemetry, TelemetryConfig};
use pulseboard_durable::{InMemoryJobStore, JobStore, PostgresJobStore};
use pulseboard_storage::models::{CreateProjectRow, CreateUserRow};
use pulseboard_storage::{generate_api_key, StorageBackend};
use pulseboard_worker::{mailer_from_config, WorkerConfig, WorkerRuntime};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Configure via RUST_LOG or LOG_LEVEL
    init_telemetry(TelemetryConfig::from_env(
        "pulseboard-control-plane",
        "pulseboard_control_plane=debug,pulseboard_worker=info,tower_http=debug,info",
    ));

    tracing::info!("pulseboard-control-plane starting...");

    let config = ServerConfig::from_env();
    let worker_config = WorkerConfig::from_env();

    // Storage
    let storage = match &config.database_url {
        Some(url) => {
            let storage = StorageBackend::postgres(url)
                .await
                .context("Failed to connect to database")?;
            storage.migrate().await.context("Failed to run migrations")?;
            tracing::info!("Connected to database");
            storage
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running in dev mode with in-memory storage");
            StorageBackend::in_memory()
        }
    };
    let storage = Arc::new(storage);

    // Job queue
    let jobs: Arc<dyn JobStore> = match storage.pool() {
        Some(pool) => Arc::new(PostgresJobStore::new(pool.clone())),
        None => Arc::new(InMemoryJobStore::new()),
    };

    // Broker
    let broker: Arc<dyn Broker> = match &config.broker_url {
        Some(url) => {
            let broker = PgBroker::connect(url, config.subscriber_buffer)
                .await
                .context("Failed to connect broker")?;
            tracing::info!("Using PostgreSQL LISTEN/NOTIFY broker");
            Arc::new(broker)
        }
        None => Arc::new(InMemoryBroker::new(config.subscriber_buffer)),
    };

    // Authentication
    let auth_config = AuthConfig::from_env();
    let auth_state = AuthState::new(&auth_config);

    // Workers
    let runtime = if config.run_workers {
        let runtime = WorkerRuntime::new(
            jobs.clone(),
            storage.clone(),
            storage.clone(),
            mailer_from_config(&worker_config.mail).context("Failed to set up mail delivery")?,
            &worker_config,
        );
        runtime.start().await?;
        tracing::info!(worker_id = %worker_config.worker_id, "Worker runtime started in-process");
        Some(Arc::new(runtime))
    } else {
        if config.is_dev_mode() {
            tracing::warn!("RUN_WORKERS=false in dev mode: queued jobs will never run");
        }
        None
    };

    if storage.is_dev_mode() {
        seed_dev_data(&storage, &auth_state.jwt_service).await?;
    }

    let state = AppState {
        ingest: Arc::new(IngestService::new(
            storage.clone(),
            storage.clone(),
            broker.clone(),
            jobs,
            worker_config.retry_policy.clone(),
        )),
        realtime: Arc::new(RealtimeService::new(storage.clone(), broker.clone())),
        auth: auth_state,
        storage_kind: storage.kind(),
    };

    if !config.api_prefix.is_empty() {
        tracing::info!(prefix = %config.api_prefix, "API prefix configured");
    }
    if config.cors_origins.is_empty() {
        tracing::info!("CORS not configured (same-origin requests only)");
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS origins configured");
    }

    let app = build_router(state, config.cors_origins.clone(), &config.api_prefix);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_on(shutdown_signal(), broker, runtime))
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}

/// Create a demo user and project so the in-memory server is usable at once
async fn seed_dev_data(storage: &StorageBackend, jwt: &JwtService) -> Result<()> {
    let user = storage
        .create_user(CreateUserRow {
            email: "demo@pulseboard.dev".to_string(),
            name: "Demo User".to_string(),
        })
        .await?;
    let project = storage
        .create_project(CreateProjectRow {
            name: "Demo Project".to_string(),
            api_key: generate_api_key(),
            owner_user_id: user.id,
        })
        .await?;
    let token = jwt
        .generate_access_token(user.id, &user.email)
        .context("Failed to sign demo access token")?;

    tracing::info!(
        project_id = %project.id,
        api_key = %project.api_key,
        "Seeded demo project"
    );
    tracing::info!(user_id = %user.id, access_token = %token, "Seeded demo user");
    Ok(())
}
