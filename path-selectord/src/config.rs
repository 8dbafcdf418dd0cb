use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::SYNC_PATH;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    /// Base URL of metrics-aggregatord
    #[serde(default = "default_aggregator_url")]
    pub aggregator_url: String,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_max_sync_attempts")]
    pub max_sync_attempts: u32,
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Keys accepted in the X-API-Key header
    #[serde(default)]
    pub api_keys: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_aggregator_url() -> String {
    "http://127.0.0.1:8083".to_string()
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_max_sync_attempts() -> u32 {
    3
}

fn default_retry_interval() -> u64 {
    2000
}

fn default_fetch_timeout() -> u64 {
    5
}

fn default_listen() -> String {
    "0.0.0.0:8084".to_string()
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            aggregator_url: default_aggregator_url(),
            cache_ttl_secs: default_cache_ttl(),
            max_sync_attempts: default_max_sync_attempts(),
            retry_interval_ms: default_retry_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl SelectorConfig {
    pub fn sync_url(&self) -> String {
        format!("{}{}", self.aggregator_url.trim_end_matches('/'), SYNC_PATH)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        if config.selector.max_sync_attempts == 0 {
            anyhow::bail!("selector.max_sync_attempts must be at least 1");
        }
        if config.selector.fetch_timeout_secs == 0 {
            anyhow::bail!("selector.fetch_timeout_secs must be greater than 0");
        }
        Ok(config)
    }
}
