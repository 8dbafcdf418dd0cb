use std::fmt;
use std::time::Duration;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use shared::protocol::METRICS_PATH;
use shared::types::{Instance, SiteMetricsResponse};

/// Identity of a site inside the aggregate: the `host:port` of its base URL.
/// Derived once when the site list is assembled and carried with every
/// instance the site contributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteKey(String);

impl SiteKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monitored site as configured at startup
#[derive(Debug, Clone)]
pub struct SiteDescriptor {
    base_url: String,
    key: SiteKey,
}

impl SiteDescriptor {
    pub fn parse(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        let url = Url::parse(base_url).context("Failed to parse URL")?;
        let host = url
            .host_str()
            .with_context(|| format!("URL has no host: {}", base_url))?;
        let key = match url.port_or_known_default() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Self {
            base_url: base_url.to_string(),
            key: SiteKey::new(key),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn key(&self) -> &SiteKey {
        &self.key
    }

    pub fn metrics_url(&self) -> String {
        format!("{}{}", self.base_url, METRICS_PATH)
    }
}

/// Result of one successful site fetch
#[derive(Debug, Clone)]
pub struct SiteSnapshot {
    /// Identifier the site reports for itself; informational only
    pub site_id: String,
    pub instances: Vec<Instance>,
}

#[derive(Debug, thiserror::Error)]
pub enum SiteFetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status code {0}")]
    Status(u16),
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("site reported failure: {0}")]
    Rejected(String),
}

/// Anything that can produce a metrics snapshot for a site
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch(&self, site: &SiteDescriptor) -> Result<SiteSnapshot, SiteFetchError>;
}

/// Fetches `GET <site>/metrics` over HTTP
#[derive(Clone)]
pub struct HttpMetricsSource {
    client: reqwest::Client,
}

impl HttpMetricsSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MetricsSource for HttpMetricsSource {
    async fn fetch(&self, site: &SiteDescriptor) -> Result<SiteSnapshot, SiteFetchError> {
        let response = self.client.get(site.metrics_url()).send().await?;

        if !response.status().is_success() {
            return Err(SiteFetchError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        decode_site_response(&body)
    }
}

/// Decode a `/metrics` body, treating `success=false` as a failure
pub fn decode_site_response(body: &[u8]) -> Result<SiteSnapshot, SiteFetchError> {
    let resp: SiteMetricsResponse = serde_json::from_slice(body)?;
    if !resp.success {
        return Err(SiteFetchError::Rejected(resp.message));
    }

    Ok(SiteSnapshot {
        site_id: resp.site_id,
        instances: resp.metrics,
    })
}
