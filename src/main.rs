use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use fanpulse::api::{create_router, AppState};
use fanpulse::config::load_config;
use fanpulse::douyin::{AuthFlow, MetricsClient};
use fanpulse::store::{
    Database, EmployeeStore, SettingsStore, SnapshotStore, SyncRecordStore, TokenStore, VideoStore,
};
use fanpulse::sync::SyncOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fanpulse=info".into()),
        )
        .init();

    let config_path =
        std::env::var("FANPULSE_CONFIG").unwrap_or_else(|_| "fanpulse.toml".to_string());
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    let encryption_key = std::env::var("FANPULSE_ENCRYPTION_KEY").context(
        "FANPULSE_ENCRYPTION_KEY must be set (base64-encoded 32-byte key for token storage)",
    )?;

    info!(db_path = %config.database.path, "Opening database");
    let database = Database::open(&config.database.path)?;

    let employees = EmployeeStore::new(database.clone());
    let tokens = TokenStore::new(database.clone(), &encryption_key)?;
    let snapshots = SnapshotStore::new(database.clone());
    let videos = VideoStore::new(database.clone());
    let sync_records = SyncRecordStore::new(database.clone());
    let settings = SettingsStore::new(database.clone());

    let auth = AuthFlow::new(config.douyin.clone());
    let metrics = MetricsClient::new(&config.douyin.api_base, config.sync.date_type);

    let orchestrator = Arc::new(SyncOrchestrator::new(
        employees.clone(),
        tokens.clone(),
        snapshots.clone(),
        videos.clone(),
        sync_records.clone(),
        settings.clone(),
        auth.clone(),
        metrics.clone(),
        config.sync.clone(),
    ));

    let state = AppState {
        employees,
        tokens,
        snapshots,
        videos,
        sync_records,
        settings,
        auth,
        metrics,
        orchestrator,
        database,
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "fanpulse listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
