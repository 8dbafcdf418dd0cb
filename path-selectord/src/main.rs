mod config;
mod auth;
mod cache;
mod error;
mod refresh;
mod selector;
mod api;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::auth::ApiKeys;
use crate::cache::SelectionCache;
use crate::config::Config;
use crate::refresh::{ExportSource, HttpExportSource, RefreshController, RetryPolicy};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("path_selectord=info"))
        )
        .init();

    tracing::info!("Starting path-selectord");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/cats/path-selectord.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    let api_keys = ApiKeys::new(config.auth.api_keys.iter().cloned());
    if api_keys.is_empty() {
        tracing::warn!("No API keys configured, every routing request will be rejected");
    }

    let sync_url = config.selector.sync_url();
    let source: Arc<dyn ExportSource> = Arc::new(HttpExportSource::new(
        sync_url.clone(),
        config.selector.fetch_timeout(),
    )?);
    let cache = Arc::new(SelectionCache::new(config.selector.cache_ttl()));
    let refresher = Arc::new(RefreshController::new(
        source,
        cache.clone(),
        RetryPolicy {
            max_attempts: config.selector.max_sync_attempts,
            interval: config.selector.retry_interval(),
        },
    ));

    tracing::info!(
        "Aggregator export at {}, cache ttl {:?}",
        sync_url,
        config.selector.cache_ttl()
    );

    // Preload so the first request is usually served from cache
    match refresher.refresh_once().await {
        Ok(services) => tracing::info!("Preloaded {} services", services),
        Err(e) => tracing::warn!("Preload failed, first request will retry: {}", e),
    }

    // Build API router
    let app = api::routes::router(api::routes::AppState {
        cache,
        refresher,
        api_keys,
    });

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

    cancel.cancel();
    let _ = server_handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
