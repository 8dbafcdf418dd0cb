use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use anyhow::{Context, Result};
use crate::site::SiteDescriptor;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    /// Base URLs of the monitored sites, e.g. "http://192.168.235.48:8081"
    #[serde(default)]
    pub sites: Vec<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_poll_interval() -> u64 {
    10
}

fn default_fetch_timeout() -> u64 {
    5
}

fn default_listen() -> String {
    "0.0.0.0:8083".to_string()
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            sites: Vec::new(),
            poll_interval_secs: default_poll_interval(),
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

impl AggregatorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Resolve the configured site URLs into descriptors, failing on the first bad URL
    pub fn site_descriptors(&self) -> Result<Vec<SiteDescriptor>> {
        self.sites
            .iter()
            .map(|url| {
                SiteDescriptor::parse(url)
                    .with_context(|| format!("Invalid site URL in config: {}", url))
            })
            .collect()
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
        if config.aggregator.poll_interval_secs == 0 {
            anyhow::bail!("aggregator.poll_interval_secs must be greater than 0");
        }
        if config.aggregator.fetch_timeout_secs == 0 {
            anyhow::bail!("aggregator.fetch_timeout_secs must be greater than 0");
        }
        Ok(config)
    }
}
