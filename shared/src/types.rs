use serde::{Deserialize, Deserializer, Serialize};

/// One deployed, reachable instance of a service as reported by a site.
/// This is the canonical data model shared by the aggregator, the selector and clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Service identifier, e.g. "AR1"
    pub service_id: String,

    /// Capacity: how many concurrent requests the deployment can serve
    pub gas: u32,

    /// Cost of one invocation, in site resource units
    pub cost: u32,

    /// Address clients use to reach the instance, e.g. "http://192.168.1.100:8080/ar1"
    pub csci_id: String,

    /// Expected delay in milliseconds
    pub delay: u32,
}

/// Body of `GET <site>/metrics`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteMetricsResponse {
    pub success: bool,
    #[serde(default)]
    pub site_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metrics: Vec<Instance>,
    #[serde(default)]
    pub message: String,
}

/// Per-service summary carried by `GET /sync`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub service_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub instances: Vec<Instance>,
    #[serde(default)]
    pub total_gas: u64,
    #[serde(default)]
    pub min_delay: u32,
    #[serde(default)]
    pub max_delay: u32,
}

/// Body of `GET /sync`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub success: bool,
    #[serde(default)]
    pub sync_time: String,
    #[serde(default)]
    pub service_num: usize,
    #[serde(default)]
    pub site_num: usize,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<ServiceSummary>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Body of `POST /request-service`.
///
/// Bounds are signed so that non-positive values reach validation instead of
/// failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRequest {
    pub service_id: String,
    pub max_accept_cost: i64,
    pub max_accept_delay: i64,
}

/// The `result` object of a successful routing decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteResult {
    pub service_id: String,
    pub csci_id: String,
    pub cost: u32,
    pub delay: u32,
    pub available_gas: u32,
    pub decision_time: String,
}

/// Sites built on other stacks encode empty lists as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
