mod api;
mod config;
mod error;
mod generator;
mod storage;

use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;
use crate::api::state::AppState;
use crate::config::AppConfig;
use crate::generator::backend::build_backend;
use crate::generator::store::MemoryJobStore;
use crate::generator::JobTracker;
use crate::storage::{FsImageSource, FsResultSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;

    for dir in [&config.storage_dir, &config.upload_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let backend = build_backend(&config);
    let backend_name = backend.name().to_string();

    let tracker = Arc::new(JobTracker::new(
        &config,
        backend,
        Arc::new(MemoryJobStore::new()),
        Arc::new(FsImageSource::new(&config.upload_dir, &config.assets_dir)),
        Arc::new(FsResultSink::new(&config.storage_dir)),
    )?);

    let state = Arc::new(AppState::new(tracker.clone(), &config.upload_dir, backend_name));
    let app = api::router(state, &config.storage_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Running jobs are never aborted
    tracker.drain().await;
    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested, finishing in-flight jobs");
}
