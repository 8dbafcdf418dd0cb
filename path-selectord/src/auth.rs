//! Static API key check for client-facing routes.

use std::collections::HashSet;
use std::sync::Arc;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use shared::protocol::API_KEY_HEADER;
use crate::error::SelectError;

/// Keys accepted in the `X-API-Key` header
#[derive(Clone, Debug, Default)]
pub struct ApiKeys(Arc<HashSet<String>>);

impl ApiKeys {
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        Self(Arc::new(keys.into_iter().collect()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Middleware function to check the API key
pub async fn api_key_auth(
    State(keys): State<ApiKeys>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, SelectError> {
    let provided_key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided_key {
        Some(key) if keys.contains(key) => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!("Invalid API key provided");
            Err(SelectError::Unauthorized("invalid API key"))
        }
        None => {
            tracing::debug!("No API key provided in X-API-Key header");
            Err(SelectError::Unauthorized("missing X-API-Key header"))
        }
    }
}
