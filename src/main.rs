mod config;
mod error;
mod models;
mod remote;
mod routes;
mod runtime;
mod services;
mod state;

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::models::workload::WorkloadSpec;
use crate::remote::s3::S3Bucket;
use crate::remote::{RemoteBucket, RemoteConfig};
use crate::runtime::docker::DockerConnector;
use crate::services::archive_store::ArchiveStore;
use crate::services::engine::BackupReconciliationEngine;
use crate::services::lifecycle::LifecycleManager;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .init();

    tracing::info!("Starting craftwarden on port {}", config.port);

    // Ensure data directories exist
    std::fs::create_dir_all(&config.live_data_dir)?;
    std::fs::create_dir_all(&config.archive_dir)?;

    let workload = WorkloadSpec::from_config(&config);
    let lifecycle = Arc::new(LifecycleManager::new(Arc::new(DockerConnector), workload));

    // Remote reconciliation is optional; sync requests fail until both
    // bucket settings are present.
    let remote: Option<Arc<dyn RemoteBucket>> =
        match (config.bucket.clone(), config.bucket_region.clone()) {
            (Some(bucket), Some(region)) => {
                tracing::info!(%bucket, %region, "remote bucket configured");
                Some(Arc::new(S3Bucket::connect(RemoteConfig { bucket, region }).await))
            }
            _ => {
                tracing::warn!("remote bucket not configured, sync is disabled");
                None
            }
        };

    let engine = BackupReconciliationEngine::new(
        ArchiveStore::new(&config.archive_dir),
        config.live_data_dir.clone(),
        lifecycle.clone(),
        remote,
        config.max_concurrent_transfers,
    );

    let cancel = CancellationToken::new();
    let state = Arc::new(AppState::new(config, lifecycle, engine, cancel.clone()));

    // Build router
    let app = routes::create_router(state.clone());

    // Start HTTP server
    let addr = format!("0.0.0.0:{}", state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    // Graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    tracing::info!("Shutting down...");
    cancel.cancel();
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    cancel.cancel();
}
