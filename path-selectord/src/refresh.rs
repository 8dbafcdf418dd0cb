use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use anyhow::Context;
use async_trait::async_trait;
use shared::types::{Instance, SyncResponse};
use crate::cache::SelectionCache;
use crate::error::{ExportFetchError, SelectError};

/// Anything that can produce the aggregator's export
#[async_trait]
pub trait ExportSource: Send + Sync {
    async fn fetch_export(&self) -> Result<HashMap<String, Vec<Instance>>, ExportFetchError>;
}

/// Fetches `GET <aggregator>/sync` over HTTP
pub struct HttpExportSource {
    client: reqwest::Client,
    sync_url: String,
}

impl HttpExportSource {
    pub fn new(sync_url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, sync_url })
    }
}

#[async_trait]
impl ExportSource for HttpExportSource {
    async fn fetch_export(&self) -> Result<HashMap<String, Vec<Instance>>, ExportFetchError> {
        let response = self.client.get(&self.sync_url).send().await?;

        if !response.status().is_success() {
            return Err(ExportFetchError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        decode_sync_response(&body)
    }
}

/// Decode a `/sync` body into the cache's service mapping
pub fn decode_sync_response(body: &[u8]) -> Result<HashMap<String, Vec<Instance>>, ExportFetchError> {
    let resp: SyncResponse = serde_json::from_slice(body)?;
    if !resp.success {
        return Err(ExportFetchError::Rejected(resp.message));
    }

    Ok(resp
        .data
        .into_iter()
        .map(|summary| (summary.service_id, summary.instances))
        .collect())
}

/// Bounded retry with a fixed pause between attempts
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            interval: Duration::from_secs(2),
        }
    }
}

/// Keeps the selection cache fed from the aggregator
pub struct RefreshController {
    source: Arc<dyn ExportSource>,
    cache: Arc<SelectionCache>,
    policy: RetryPolicy,
}

impl RefreshController {
    pub fn new(source: Arc<dyn ExportSource>, cache: Arc<SelectionCache>, policy: RetryPolicy) -> Self {
        Self { source, cache, policy }
    }

    /// One fetch; on success the cache is replaced and the service count returned.
    /// On failure the cache is left as it was.
    pub async fn refresh_once(&self) -> Result<usize, ExportFetchError> {
        let data = self.source.fetch_export().await?;
        let services = data.len();
        let instances: usize = data.values().map(Vec::len).sum();

        self.cache.replace(data, Instant::now());
        tracing::info!("Synced from aggregator: {} services, {} instances", services, instances);

        Ok(services)
    }

    /// Up to `max_attempts` fetches, pausing `interval` between them
    pub async fn refresh_with_retry(&self) -> Result<usize, ExportFetchError> {
        let mut attempt = 1;
        loop {
            match self.refresh_once().await {
                Ok(services) => return Ok(services),
                Err(e) if attempt >= self.policy.max_attempts => {
                    tracing::warn!(
                        "Refresh attempt {}/{} failed, giving up: {}",
                        attempt,
                        self.policy.max_attempts,
                        e
                    );
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        "Refresh attempt {}/{} failed: {}",
                        attempt,
                        self.policy.max_attempts,
                        e
                    );
                    tokio::time::sleep(self.policy.interval).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Make sure the cache can answer for `service_id`, refreshing if it is
    /// stale or has nothing for that service
    pub async fn ensure_fresh(&self, service_id: &str) -> Result<(), SelectError> {
        if self.cache.is_usable(service_id, Instant::now()) {
            return Ok(());
        }

        tracing::info!("Cache stale or empty for {}, refreshing", service_id);
        self.refresh_with_retry()
            .await
            .map(|_| ())
            .map_err(SelectError::DataUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use shared::protocol::SYNC_PATH;

    /// Replays scripted outcomes; `None` means a failed fetch
    #[derive(Default)]
    struct ScriptedSource {
        script: Mutex<VecDeque<Option<HashMap<String, Vec<Instance>>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Option<HashMap<String, Vec<Instance>>>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExportSource for ScriptedSource {
        async fn fetch_export(&self) -> Result<HashMap<String, Vec<Instance>>, ExportFetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.lock().pop_front().flatten() {
                Some(data) => Ok(data),
                None => Err(ExportFetchError::Status(503)),
            }
        }
    }

    fn export(service_id: &str, count: u32) -> HashMap<String, Vec<Instance>> {
        let instances = (0..count)
            .map(|n| Instance {
                service_id: service_id.to_string(),
                gas: 1,
                cost: n + 1,
                csci_id: format!("http://10.0.0.1:8081/{}-{}", service_id, n),
                delay: 10,
            })
            .collect();
        HashMap::from([(service_id.to_string(), instances)])
    }

    fn controller(source: Arc<ScriptedSource>) -> (RefreshController, Arc<SelectionCache>) {
        let cache = Arc::new(SelectionCache::new(Duration::from_secs(300)));
        let policy = RetryPolicy {
            max_attempts: 3,
            interval: Duration::ZERO,
        };
        (RefreshController::new(source, cache.clone(), policy), cache)
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_fetch() {
        let source = ScriptedSource::new(vec![]);
        let (refresher, cache) = controller(source.clone());
        cache.replace(export("AR1", 1), Instant::now());

        refresher.ensure_fresh("AR1").await.unwrap();
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_service_triggers_refresh() {
        let source = ScriptedSource::new(vec![Some(export("AR1", 2))]);
        let (refresher, cache) = controller(source.clone());

        refresher.ensure_fresh("AR1").await.unwrap();
        assert_eq!(source.calls(), 1);
        assert_eq!(cache.instances("AR1").len(), 2);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let source = ScriptedSource::new(vec![None, None, Some(export("AR1", 1))]);
        let (refresher, cache) = controller(source.clone());

        refresher.ensure_fresh("AR1").await.unwrap();
        assert_eq!(source.calls(), 3);
        assert_eq!(cache.instances("AR1").len(), 1);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_keeps_cache() {
        let source = ScriptedSource::new(vec![None, None, None, None]);
        let (refresher, cache) = controller(source.clone());
        cache.replace(export("AR1", 1), Instant::now());

        let err = refresher.ensure_fresh("FACE").await.unwrap_err();
        assert!(matches!(err, SelectError::DataUnavailable(_)));
        assert_eq!(source.calls(), 3);
        assert_eq!(cache.instances("AR1").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_between_attempts_only() {
        let source = ScriptedSource::new(vec![None, None, None]);
        let cache = Arc::new(SelectionCache::new(Duration::from_secs(300)));
        let refresher = RefreshController::new(source.clone(), cache, RetryPolicy::default());

        let start = tokio::time::Instant::now();
        assert!(refresher.refresh_with_retry().await.is_err());
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_refresh_drops_vanished_services() {
        let source = ScriptedSource::new(vec![Some(export("VOICE", 1))]);
        let (refresher, cache) = controller(source);
        cache.replace(export("AR1", 1), Instant::now());

        assert_eq!(refresher.refresh_once().await.unwrap(), 1);
        assert!(cache.instances("AR1").is_empty());
        assert_eq!(cache.instances("VOICE").len(), 1);
    }

    #[test]
    fn test_decode_business_failure() {
        let err = decode_sync_response(br#"{"success":false,"message":"not ready"}"#).unwrap_err();
        assert!(matches!(err, ExportFetchError::Rejected(msg) if msg == "not ready"));
    }

    #[test]
    fn test_decode_export() {
        let body = br#"{"success":true,"sync_time":"2025-01-01 00:00:00","service_num":1,"site_num":2,
            "data":[{"service_id":"AR1","instances":[
                {"service_id":"AR1","gas":3,"cost":4,"csci_id":"http://10.0.0.1:8081/AR1-a","delay":15}
            ],"total_gas":3,"min_delay":15,"max_delay":15}]}"#;
        let data = decode_sync_response(body).unwrap();
        assert_eq!(data["AR1"][0].cost, 4);
    }

    /// Serve `app` on an ephemeral local port, returning its `/sync` URL
    async fn spawn_aggregator(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}{}", addr, SYNC_PATH)
    }

    fn export_body() -> Value {
        json!({
            "success": true,
            "sync_time": "2025-01-01 00:00:00",
            "service_num": 1,
            "site_num": 1,
            "data": [{
                "service_id": "AR1",
                "instances": [
                    {"service_id": "AR1", "gas": 3, "cost": 4, "csci_id": "http://127.0.0.1/AR1-1", "delay": 15}
                ],
                "total_gas": 3, "min_delay": 15, "max_delay": 15
            }]
        })
    }

    async fn failing_sync(State(hits): State<Arc<AtomicUsize>>) -> (StatusCode, Json<Value>) {
        hits.fetch_add(1, Ordering::SeqCst);
        (StatusCode::INTERNAL_SERVER_ERROR, Json(export_body()))
    }

    #[tokio::test]
    async fn test_http_export_success() {
        let url = spawn_aggregator(Router::new().route(SYNC_PATH, get(|| async { Json(export_body()) }))).await;
        let source = HttpExportSource::new(url, Duration::from_secs(5)).unwrap();

        let data = source.fetch_export().await.unwrap();
        assert_eq!(data["AR1"][0].cost, 4);
    }

    #[tokio::test]
    async fn test_http_error_status_is_failure_despite_body() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(SYNC_PATH, get(failing_sync))
            .with_state(hits);
        let url = spawn_aggregator(app).await;
        let source = HttpExportSource::new(url, Duration::from_secs(5)).unwrap();

        let err = source.fetch_export().await.unwrap_err();
        assert!(matches!(err, ExportFetchError::Status(500)));
    }

    #[tokio::test]
    async fn test_http_slow_aggregator_times_out() {
        let app = Router::new().route(
            SYNC_PATH,
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(export_body())
            }),
        );
        let url = spawn_aggregator(app).await;
        let source = HttpExportSource::new(url, Duration::from_millis(200)).unwrap();

        let err = source.fetch_export().await.unwrap_err();
        assert!(matches!(err, ExportFetchError::Transport(ref e) if e.is_timeout()));
    }

    #[tokio::test]
    async fn test_http_retry_exhaustion_hits_aggregator_each_attempt() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(SYNC_PATH, get(failing_sync))
            .with_state(hits.clone());
        let url = spawn_aggregator(app).await;
        let source = Arc::new(HttpExportSource::new(url, Duration::from_secs(5)).unwrap());
        let cache = Arc::new(SelectionCache::new(Duration::from_secs(300)));
        cache.replace(export("AR1", 1), Instant::now());
        let refresher = RefreshController::new(
            source,
            cache.clone(),
            RetryPolicy {
                max_attempts: 3,
                interval: Duration::ZERO,
            },
        );

        let err = refresher.refresh_with_retry().await.unwrap_err();
        assert!(matches!(err, ExportFetchError::Status(500)));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(cache.instances("AR1").len(), 1);
    }
}
