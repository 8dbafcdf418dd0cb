use std::collections::HashMap;
use chrono::{DateTime, Local};
use parking_lot::RwLock;
use shared::types::Instance;
use crate::site::SiteKey;

/// An instance together with the site that contributed it
#[derive(Debug, Clone)]
struct SiteInstance {
    site: SiteKey,
    instance: Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    pub services: usize,
    pub instances: usize,
}

/// Union of the latest successful snapshot of every site, keyed by service id.
///
/// Locking: `apply_site_snapshot` takes the write lock for the whole
/// remove-then-append, `snapshot` takes the read lock for the copy. Neither is
/// held across an await point.
#[derive(Debug, Default)]
pub struct AggregateStore {
    services: RwLock<HashMap<String, Vec<SiteInstance>>>,
    last_cycle: RwLock<Option<DateTime<Local>>>,
}

impl AggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything `site` contributed with `instances`.
    ///
    /// Instances the site no longer reports are dropped, not superseded.
    /// Service entries left empty are kept and export with zeroed figures.
    pub fn apply_site_snapshot(&self, site: &SiteKey, instances: Vec<Instance>) {
        let mut services = self.services.write();

        for list in services.values_mut() {
            list.retain(|entry| &entry.site != site);
        }

        for instance in instances {
            services
                .entry(instance.service_id.clone())
                .or_default()
                .push(SiteInstance {
                    site: site.clone(),
                    instance,
                });
        }
    }

    /// Copy of the current mapping. Later polls are not reflected in it.
    pub fn snapshot(&self) -> HashMap<String, Vec<Instance>> {
        self.services
            .read()
            .iter()
            .map(|(service_id, list)| {
                let instances = list.iter().map(|entry| entry.instance.clone()).collect();
                (service_id.clone(), instances)
            })
            .collect()
    }

    pub fn counts(&self) -> StoreCounts {
        let services = self.services.read();
        StoreCounts {
            services: services.len(),
            instances: services.values().map(Vec::len).sum(),
        }
    }

    /// Note a poll cycle in which at least one site delivered data
    pub fn record_cycle(&self, at: DateTime<Local>) {
        *self.last_cycle.write() = Some(at);
    }

    pub fn last_cycle(&self) -> Option<DateTime<Local>> {
        *self.last_cycle.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(service_id: &str, site: &str, n: u32, cost: u32, delay: u32) -> Instance {
        Instance {
            service_id: service_id.to_string(),
            gas: n,
            cost,
            csci_id: format!("http://{}/{}-{}", site, service_id, n),
            delay,
        }
    }

    fn addresses(store: &AggregateStore, service_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = store
            .snapshot()
            .get(service_id)
            .map(|list| list.iter().map(|i| i.csci_id.clone()).collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    #[test]
    fn test_apply_inserts_instances() {
        let store = AggregateStore::new();
        let site = SiteKey::new("10.0.0.1:8081");

        store.apply_site_snapshot(
            &site,
            vec![
                instance("AR1", "10.0.0.1:8081", 1, 4, 15),
                instance("FACE", "10.0.0.1:8081", 2, 2, 12),
            ],
        );

        let counts = store.counts();
        assert_eq!(counts, StoreCounts { services: 2, instances: 2 });
    }

    #[test]
    fn test_replace_not_accumulate() {
        let store = AggregateStore::new();
        let site = SiteKey::new("10.0.0.1:8081");

        store.apply_site_snapshot(
            &site,
            vec![
                instance("AR1", "10.0.0.1:8081", 1, 4, 15),
                instance("AR1", "10.0.0.1:8081", 2, 5, 12),
            ],
        );
        store.apply_site_snapshot(&site, vec![instance("AR1", "10.0.0.1:8081", 3, 6, 11)]);

        assert_eq!(addresses(&store, "AR1"), vec!["http://10.0.0.1:8081/AR1-3"]);
        assert_eq!(store.counts().instances, 1);
    }

    #[test]
    fn test_same_snapshot_twice_is_idempotent() {
        let store = AggregateStore::new();
        let site = SiteKey::new("10.0.0.1:8081");
        let batch = vec![instance("AR1", "10.0.0.1:8081", 1, 4, 15)];

        store.apply_site_snapshot(&site, batch.clone());
        store.apply_site_snapshot(&site, batch);

        assert_eq!(store.counts().instances, 1);
    }

    #[test]
    fn test_other_sites_untouched() {
        let store = AggregateStore::new();
        let a = SiteKey::new("10.0.0.1:8081");
        let b = SiteKey::new("10.0.0.2:8085");

        store.apply_site_snapshot(&a, vec![instance("AR1", "10.0.0.1:8081", 1, 4, 15)]);
        store.apply_site_snapshot(&b, vec![instance("AR1", "10.0.0.2:8085", 1, 6, 5)]);
        store.apply_site_snapshot(&a, vec![]);

        assert_eq!(addresses(&store, "AR1"), vec!["http://10.0.0.2:8085/AR1-1"]);
    }

    #[test]
    fn test_emptied_service_kept() {
        let store = AggregateStore::new();
        let site = SiteKey::new("10.0.0.1:8081");

        store.apply_site_snapshot(&site, vec![instance("AR1", "10.0.0.1:8081", 1, 4, 15)]);
        store.apply_site_snapshot(&site, vec![instance("FACE", "10.0.0.1:8081", 1, 2, 9)]);

        let snapshot = store.snapshot();
        assert!(snapshot.get("AR1").unwrap().is_empty());
        assert_eq!(snapshot.get("FACE").unwrap().len(), 1);
    }

    #[test]
    fn test_site_identity_is_not_address_substring() {
        // The instance address mentions site b, but site a contributed it
        let store = AggregateStore::new();
        let a = SiteKey::new("10.0.0.1:8081");
        let b = SiteKey::new("10.0.0.2:8085");

        store.apply_site_snapshot(&a, vec![instance("AR1", "10.0.0.2:8085", 1, 4, 15)]);
        store.apply_site_snapshot(&b, vec![]);

        assert_eq!(store.counts().instances, 1);
    }

    #[test]
    fn test_snapshot_detached_from_later_updates() {
        let store = AggregateStore::new();
        let site = SiteKey::new("10.0.0.1:8081");
        store.apply_site_snapshot(&site, vec![instance("AR1", "10.0.0.1:8081", 1, 4, 15)]);

        let before = store.snapshot();
        store.apply_site_snapshot(&site, vec![]);

        assert_eq!(before.get("AR1").unwrap().len(), 1);
        assert!(store.snapshot().get("AR1").unwrap().is_empty());
    }
}
