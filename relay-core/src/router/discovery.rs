//! The pluggable discovery store backing the remote router (§4.2.2): a
//! key/value space used to advertise `"<domain>-<service>->rpcAddr"`
//! registrations. Grounded on the same pluggable-backend shape as the
//! framework's cache layer (a trait plus an in-memory default behind a
//! process-wide singleton).

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

/// A key/value discovery backend. A networked implementation (etcd, Redis,
/// Consul...) can be substituted without changing router code.
pub trait DiscoveryStore: Send + Sync {
    fn put(&self, key: &str, value: &str);
    fn list_by_prefix(&self, prefix: &str) -> Vec<(String, String)>;
    fn delete(&self, key: &str);
}

/// Process-local, single-node discovery store — the default for dev/test
/// and for single-binary deployments.
#[derive(Default)]
pub struct InMemoryDiscoveryStore {
    entries: DashMap<String, String>,
}

impl InMemoryDiscoveryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiscoveryStore for InMemoryDiscoveryStore {
    fn put(&self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn list_by_prefix(&self, prefix: &str) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    fn delete(&self, key: &str) {
        self.entries.remove(key);
    }
}

static DEFAULT_STORE: OnceLock<Arc<dyn DiscoveryStore>> = OnceLock::new();

/// The package-level default store, retained for convenience per the
/// framework's design notes ("retain package-level defaults for
/// convenience but make them injectable") — `RemoteRouter::new` takes an
/// explicit store and does not depend on this singleton.
pub fn default_store() -> Arc<dyn DiscoveryStore> {
    DEFAULT_STORE
        .get_or_init(|| Arc::new(InMemoryDiscoveryStore::new()) as Arc<dyn DiscoveryStore>)
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_by_prefix_and_delete() {
        let store = InMemoryDiscoveryStore::new();
        store.put("dom-Hello->10.0.0.1:9000", "10.0.0.1:9000");
        store.put("dom-Hello->10.0.0.2:9000", "10.0.0.2:9000");
        store.put("dom-Other->10.0.0.3:9000", "10.0.0.3:9000");

        let hits = store.list_by_prefix("dom-Hello->");
        assert_eq!(hits.len(), 2);

        store.delete("dom-Hello->10.0.0.1:9000");
        assert_eq!(store.list_by_prefix("dom-Hello->").len(), 1);
    }
}
