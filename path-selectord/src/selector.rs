use shared::protocol::format_now;
use shared::types::{ClientRequest, Instance, RouteResult};
use crate::error::SelectError;

/// Reject requests with an empty service id or non-positive bounds
pub fn validate(req: &ClientRequest) -> Result<(), SelectError> {
    if req.service_id.trim().is_empty() {
        return Err(SelectError::Validation("service_id must not be empty".to_string()));
    }
    if req.max_accept_cost <= 0 {
        return Err(SelectError::Validation("max_accept_cost must be greater than 0".to_string()));
    }
    if req.max_accept_delay <= 0 {
        return Err(SelectError::Validation("max_accept_delay must be greater than 0".to_string()));
    }
    Ok(())
}

/// Instances within both bounds, inclusive
pub fn filter(instances: &[Instance], max_cost: i64, max_delay: i64) -> Vec<Instance> {
    instances
        .iter()
        .filter(|i| i64::from(i.cost) <= max_cost && i64::from(i.delay) <= max_delay)
        .cloned()
        .collect()
}

/// Cheapest instance, then lowest delay. Exact ties keep input order.
pub fn select_best(mut qualified: Vec<Instance>) -> Option<Instance> {
    qualified.sort_by_key(|i| (i.cost, i.delay));
    qualified.into_iter().next()
}

/// Pick the instance to route `req` to from the cached `instances` of its service
pub fn route(req: &ClientRequest, instances: &[Instance]) -> Result<RouteResult, SelectError> {
    let qualified = filter(instances, req.max_accept_cost, req.max_accept_delay);
    let best = select_best(qualified)
        .ok_or_else(|| SelectError::NoQualifyingInstance(req.service_id.clone()))?;

    Ok(RouteResult {
        service_id: best.service_id,
        csci_id: best.csci_id,
        cost: best.cost,
        delay: best.delay,
        available_gas: best.gas,
        decision_time: format_now(),
    })
}
