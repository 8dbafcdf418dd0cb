use std::collections::HashMap;
use std::sync::Arc;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use shared::protocol::{format_now, SYNC_PATH, TIME_FORMAT};
use shared::types::{Instance, SyncResponse};
use crate::export;
use crate::site::SiteDescriptor;
use crate::store::AggregateStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AggregateStore>,
    pub sites: Arc<Vec<SiteDescriptor>>,
}

#[derive(Serialize)]
pub struct CurrentMetricsResponse {
    pub success: bool,
    pub last_update_time: String,
    pub monitored_sites: usize,
    pub service_count: usize,
    pub total_instances: usize,
    pub aggregated_data: HashMap<String, Vec<Instance>>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub status: &'static str,
    pub service: &'static str,
    pub time: String,
    pub monitored_sites: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(SYNC_PATH, get(get_sync))
        .route("/current-metrics", get(get_current_metrics))
        .route("/health", get(get_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn get_sync(State(state): State<AppState>) -> Json<SyncResponse> {
    let snapshot = state.store.snapshot();
    Json(export::sync_response(snapshot, state.sites.len()))
}

async fn get_current_metrics(State(state): State<AppState>) -> Json<CurrentMetricsResponse> {
    let aggregated_data = state.store.snapshot();
    let last_update_time = state
        .store
        .last_cycle()
        .map(|at| at.format(TIME_FORMAT).to_string())
        .unwrap_or_default();

    Json(CurrentMetricsResponse {
        success: true,
        last_update_time,
        monitored_sites: state.sites.len(),
        service_count: aggregated_data.len(),
        total_instances: aggregated_data.values().map(Vec::len).sum(),
        aggregated_data,
    })
}

async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.sites.is_empty() { "degraded" } else { "healthy" };

    Json(HealthResponse {
        success: true,
        status,
        service: "metrics-aggregator",
        time: format_now(),
        monitored_sites: state.sites.len(),
    })
}
