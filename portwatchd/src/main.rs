mod config;
mod controller;
mod cycle;
mod import;
mod probe;
mod registry;
mod registry_manager;
mod api;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::controller::{interval_from_secs, Controller, LoopSettings};
use crate::probe::TcpProber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("portwatchd=info"))
        )
        .init();

    tracing::info!("Starting portwatchd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/portwatch/portwatchd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Start registry task
    let (registry, view_rx, hash_rx) = registry_manager::spawn_empty();

    let controller = Arc::new(Controller::new(
        registry.clone(),
        view_rx,
        Arc::new(TcpProber),
        LoopSettings::from(&config.monitor),
    ));

    // Initial service list
    if let Some(path) = &config.monitor.services_file {
        let parsed = import::from_path(path)?;
        let imported = controller.import(parsed.records).await?;
        tracing::info!(
            "Imported {} services from {}, {} rows skipped",
            imported,
            path.display(),
            parsed.skipped
        );
    }

    if config.monitor.autostart {
        controller
            .start(interval_from_secs(config.monitor.interval_secs))
            .await;
    }

    // Build API router
    let app_state = api::routes::AppState {
        controller: controller.clone(),
        hash_rx,
    };
    let app = api::routes::router(app_state);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Let an in-flight probe finish before tearing down
    controller.stop().await;

    cancel.cancel();
    let _ = server_handle.await;

    if let Err(e) = registry.shutdown().await {
        tracing::error!("Failed to shutdown registry: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
