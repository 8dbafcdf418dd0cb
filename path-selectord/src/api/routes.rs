use std::collections::HashMap;
use std::sync::Arc;
use axum::{
    extract::{rejection::JsonRejection, State},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use shared::protocol::{format_now, REQUEST_SERVICE_PATH, TIME_FORMAT};
use shared::types::{ClientRequest, Instance, RouteResult};
use crate::auth::{api_key_auth, ApiKeys};
use crate::cache::SelectionCache;
use crate::error::SelectError;
use crate::refresh::RefreshController;
use crate::selector;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<SelectionCache>,
    pub refresher: Arc<RefreshController>,
    pub api_keys: ApiKeys,
}

#[derive(Serialize)]
pub struct RouteResponse {
    pub success: bool,
    pub message: &'static str,
    pub result: RouteResult,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub message: &'static str,
    pub service_count: usize,
    pub last_sync: String,
}

#[derive(Serialize)]
pub struct CachedMetricsResponse {
    pub success: bool,
    pub last_sync_time: String,
    pub cache_expire: String,
    pub service_count: usize,
    pub total_instances: usize,
    pub cached_data: HashMap<String, Vec<Instance>>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub status: &'static str,
    pub service: &'static str,
    pub time: String,
    pub cached_services: usize,
}

pub fn router(state: AppState) -> Router {
    let auth = middleware::from_fn_with_state(state.api_keys.clone(), api_key_auth);

    Router::new()
        .route(REQUEST_SERVICE_PATH, post(request_service).layer(auth))
        .route("/refresh-metrics", get(refresh_metrics))
        .route("/cached-metrics", get(cached_metrics))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn request_service(
    State(state): State<AppState>,
    payload: Result<Json<ClientRequest>, JsonRejection>,
) -> Result<Json<RouteResponse>, SelectError> {
    let Json(req) = payload
        .map_err(|e| SelectError::Validation(format!("malformed request: {}", e.body_text())))?;
    selector::validate(&req)?;

    state.refresher.ensure_fresh(&req.service_id).await?;

    let instances = state.cache.instances(&req.service_id);
    let result = selector::route(&req, &instances)?;

    tracing::debug!(
        "Routed {} to {} (cost {}, delay {})",
        result.service_id,
        result.csci_id,
        result.cost,
        result.delay
    );

    Ok(Json(RouteResponse {
        success: true,
        message: "route selected",
        result,
    }))
}

async fn refresh_metrics(State(state): State<AppState>) -> Result<Json<RefreshResponse>, SelectError> {
    let service_count = state
        .refresher
        .refresh_once()
        .await
        .map_err(SelectError::DataUnavailable)?;

    Ok(Json(RefreshResponse {
        success: true,
        message: "cache refreshed",
        service_count,
        last_sync: last_sync(&state.cache),
    }))
}

async fn cached_metrics(State(state): State<AppState>) -> Json<CachedMetricsResponse> {
    let entry = state.cache.current();

    Json(CachedMetricsResponse {
        success: true,
        last_sync_time: entry
            .synced_at
            .map(|at| at.format(TIME_FORMAT).to_string())
            .unwrap_or_default(),
        cache_expire: format!("{}s", state.cache.ttl().as_secs()),
        service_count: entry.data.len(),
        total_instances: entry.total_instances(),
        cached_data: entry.data.clone(),
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        status: "healthy",
        service: "path-selector",
        time: format_now(),
        cached_services: state.cache.current().data.len(),
    })
}

fn last_sync(cache: &SelectionCache) -> String {
    cache
        .current()
        .synced_at
        .map(|at| at.format(TIME_FORMAT).to_string())
        .unwrap_or_default()
}
