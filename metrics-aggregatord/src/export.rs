use std::collections::HashMap;
use shared::protocol::format_now;
use shared::types::{Instance, ServiceSummary, SyncResponse};

/// Summarize one service. An empty list yields zero delays.
pub fn summarize(service_id: String, instances: Vec<Instance>) -> ServiceSummary {
    let total_gas = instances.iter().map(|i| u64::from(i.gas)).sum();
    let min_delay = instances.iter().map(|i| i.delay).min().unwrap_or(0);
    let max_delay = instances.iter().map(|i| i.delay).max().unwrap_or(0);

    ServiceSummary {
        service_id,
        instances,
        total_gas,
        min_delay,
        max_delay,
    }
}

/// Summaries for every service in a store snapshot, ordered by service id
pub fn build_export(snapshot: HashMap<String, Vec<Instance>>) -> Vec<ServiceSummary> {
    let mut data: Vec<ServiceSummary> = snapshot
        .into_iter()
        .map(|(service_id, instances)| summarize(service_id, instances))
        .collect();
    data.sort_by(|a, b| a.service_id.cmp(&b.service_id));
    data
}

pub fn sync_response(snapshot: HashMap<String, Vec<Instance>>, site_num: usize) -> SyncResponse {
    let data = build_export(snapshot);
    SyncResponse {
        success: true,
        sync_time: format_now(),
        service_num: data.len(),
        site_num,
        data,
        message: String::new(),
    }
}
