mod config;
mod export;
mod poller;
mod site;
mod store;
mod api;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::site::{HttpMetricsSource, MetricsSource};
use crate::store::AggregateStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("metrics_aggregatord=info"))
        )
        .init();

    tracing::info!("Starting metrics-aggregatord");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/cats/metrics-aggregatord.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    let sites = Arc::new(config.aggregator.site_descriptors()?);
    if sites.is_empty() {
        tracing::warn!("No sites configured, check aggregator.sites");
    }
    for (i, site) in sites.iter().enumerate() {
        tracing::info!("Site {}: {} (key {})", i + 1, site.base_url(), site.key());
    }
    tracing::info!(
        "Monitoring {} sites every {:?}",
        sites.len(),
        config.aggregator.poll_interval()
    );

    let store = Arc::new(AggregateStore::new());
    let source: Arc<dyn MetricsSource> =
        Arc::new(HttpMetricsSource::new(config.aggregator.fetch_timeout())?);

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Spawn poller task
    let poller_handle = tokio::spawn(poller::run(
        store.clone(),
        sites.clone(),
        source,
        config.aggregator.poll_interval(),
        cancel.clone(),
    ));

    // Build API router
    let app = api::routes::router(api::routes::AppState {
        store,
        sites,
    });

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
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

    cancel.cancel();

    let _ = tokio::join!(poller_handle, server_handle);

    tracing::info!("Shutdown complete");
    Ok(())
}
