use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use chrono::{DateTime, Local};
use parking_lot::RwLock;
use shared::types::Instance;

/// One successful export, as held by the cache
#[derive(Debug, Default)]
pub struct CacheEntry {
    pub data: HashMap<String, Vec<Instance>>,
    /// Monotonic refresh time, used for staleness
    pub fetched_at: Option<Instant>,
    /// Wall-clock refresh time, used for display
    pub synced_at: Option<DateTime<Local>>,
}

impl CacheEntry {
    /// Usable for `service_id` iff younger than `ttl` and holding at least one instance
    pub fn is_usable(&self, service_id: &str, ttl: Duration, now: Instant) -> bool {
        let fresh = self
            .fetched_at
            .is_some_and(|at| now.saturating_duration_since(at) < ttl);
        let populated = self
            .data
            .get(service_id)
            .is_some_and(|instances| !instances.is_empty());
        fresh && populated
    }

    pub fn total_instances(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }
}

/// The selector's copy of the last successful export.
///
/// Readers clone the current `Arc<CacheEntry>` under the read lock; a refresh
/// swaps in a whole new entry under the write lock. Entries are never mutated.
#[derive(Debug)]
pub struct SelectionCache {
    ttl: Duration,
    current: RwLock<Arc<CacheEntry>>,
}

impl SelectionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            current: RwLock::new(Arc::new(CacheEntry::default())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn current(&self) -> Arc<CacheEntry> {
        self.current.read().clone()
    }

    /// Replace the whole cache; services missing from `data` disappear
    pub fn replace(&self, data: HashMap<String, Vec<Instance>>, now: Instant) {
        let entry = Arc::new(CacheEntry {
            data,
            fetched_at: Some(now),
            synced_at: Some(Local::now()),
        });
        *self.current.write() = entry;
    }

    pub fn is_usable(&self, service_id: &str, now: Instant) -> bool {
        self.current().is_usable(service_id, self.ttl, now)
    }

    pub fn instances(&self, service_id: &str) -> Vec<Instance> {
        self.current().data.get(service_id).cloned().unwrap_or_default()
    }
}
