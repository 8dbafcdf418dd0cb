use std::sync::Arc;
use std::time::Duration;
use chrono::Local;
use futures::future::join_all;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use crate::site::{MetricsSource, SiteDescriptor};
use crate::store::AggregateStore;

/// Outcome of one poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub sites_ok: usize,
    pub sites_failed: usize,
    pub services: usize,
    pub instances: usize,
}

/// Fetch every site concurrently and fold the successful snapshots into the store.
///
/// A failing site is logged and skipped; whatever it contributed in earlier
/// cycles stays in the store. The store's update time only moves when at
/// least one site delivered data. Returns once every fetch has finished.
pub async fn poll_cycle(
    store: &AggregateStore,
    sites: &[SiteDescriptor],
    source: &dyn MetricsSource,
) -> CycleSummary {
    tracing::info!("Polling metrics from {} sites", sites.len());

    let fetches = sites.iter().map(|site| async move {
        match source.fetch(site).await {
            Ok(snapshot) => {
                let count = snapshot.instances.len();
                store.apply_site_snapshot(site.key(), snapshot.instances);
                tracing::info!(
                    "Fetched site {}: {} instances (site id: {})",
                    site.base_url(),
                    count,
                    snapshot.site_id
                );
                true
            }
            Err(e) => {
                tracing::warn!("Failed to fetch site {}: {}", site.base_url(), e);
                false
            }
        }
    });

    let results = join_all(fetches).await;
    let sites_ok = results.iter().filter(|ok| **ok).count();

    if sites_ok > 0 {
        store.record_cycle(Local::now());
    }
    let counts = store.counts();

    let summary = CycleSummary {
        sites_ok,
        sites_failed: results.len() - sites_ok,
        services: counts.services,
        instances: counts.instances,
    };

    tracing::info!(
        "Poll cycle complete: {}/{} sites ok, {} services, {} instances",
        summary.sites_ok,
        sites.len(),
        summary.services,
        summary.instances
    );

    summary
}

/// Poller event loop - runs a cycle immediately, then once per interval
pub async fn run(
    store: Arc<AggregateStore>,
    sites: Arc<Vec<SiteDescriptor>>,
    source: Arc<dyn MetricsSource>,
    interval: Duration,
    cancel: CancellationToken,
) {
    if sites.is_empty() {
        tracing::warn!("No sites configured, poller not started");
        return;
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                poll_cycle(&store, &sites, source.as_ref()).await;
            }
            _ = cancel.cancelled() => {
                tracing::info!("Poller shutting down");
                break;
            }
        }
    }
}
