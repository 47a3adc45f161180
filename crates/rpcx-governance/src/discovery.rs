//! Service discovery watcher (§4.5, external by contract).
//!
//! The real backends (etcd/consul/zookeeper/static) are explicitly out of
//! scope (§1) — only the contract and one concrete, dependency-free
//! implementation (`StaticDiscovery`) are provided here, the way `rpcx-share`
//! models `Message` as a concrete stand-in for the external wire codec.

use std::sync::Mutex as StdMutex;

use tokio::sync::{broadcast, mpsc};

/// One `(endpoint-key, metadata-query-string)` pair as delivered by discovery.
pub type ServicePair = (String, String);

/// A predicate discovery can apply to filter its output before delivery,
/// installed via [`Discovery::set_filter`].
pub type DiscoveryFilter = Box<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Service discovery contract (§4.5).
pub trait Discovery: Send + Sync {
    /// Current, un-filtered snapshot of known endpoints.
    fn snapshot(&self) -> Vec<ServicePair>;

    /// Subscribes to fresh snapshots; each delivery is the full, replaced
    /// server set (not a diff), mirroring the Go client's `WatchService`.
    fn watch(&self) -> mpsc::Receiver<Vec<ServicePair>>;

    /// Drops a previously registered watch channel.
    fn unwatch(&self, id: u64);

    /// Scopes this discovery handle down to one service path.
    fn clone_scoped(&self, service_path: &str) -> Box<dyn Discovery>;

    /// Installs a predicate filtering every entry before it reaches callers.
    fn set_filter(&self, filter: DiscoveryFilter);

    fn close(&self);
}

/// A fixed, in-memory discovery backend plus an optional update channel —
/// enough to exercise the governance client's selection/breaker/retry logic
/// end-to-end without a real etcd/consul/zookeeper dependency.
pub struct StaticDiscovery {
    service_path: String,
    servers: StdMutex<Vec<ServicePair>>,
    filter: StdMutex<Option<DiscoveryFilter>>,
    updates: broadcast::Sender<Vec<ServicePair>>,
}

impl StaticDiscovery {
    pub fn new(service_path: impl Into<String>, servers: Vec<ServicePair>) -> Self {
        let (updates, _) = broadcast::channel(16);
        StaticDiscovery {
            service_path: service_path.into(),
            servers: StdMutex::new(servers),
            filter: StdMutex::new(None),
            updates,
        }
    }

    /// Replaces the snapshot and notifies every active watcher, simulating a
    /// discovery-backend push.
    pub fn push(&self, servers: Vec<ServicePair>) {
        *self.servers.lock().unwrap() = servers.clone();
        let _ = self.updates.send(servers);
    }
}

impl Discovery for StaticDiscovery {
    fn snapshot(&self) -> Vec<ServicePair> {
        let filter = self.filter.lock().unwrap();
        let servers = self.servers.lock().unwrap();
        match &*filter {
            Some(f) => servers.iter().filter(|(k, v)| f(k, v)).cloned().collect(),
            None => servers.clone(),
        }
    }

    fn watch(&self) -> mpsc::Receiver<Vec<ServicePair>> {
        let (tx, rx) = mpsc::channel(16);
        let mut updates = self.updates.subscribe();
        tokio::spawn(async move {
            while let Ok(servers) = updates.recv().await {
                if tx.send(servers).await.is_err() {
                    break;
                }
            }
        });
        rx
    }

    fn unwatch(&self, _id: u64) {}

    fn clone_scoped(&self, service_path: &str) -> Box<dyn Discovery> {
        Box::new(StaticDiscovery::new(service_path, self.servers.lock().unwrap().clone()))
    }

    fn set_filter(&self, filter: DiscoveryFilter) {
        *self.filter.lock().unwrap() = Some(filter);
    }

    fn close(&self) {}
}

impl std::fmt::Debug for StaticDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticDiscovery")
            .field("service_path", &self.service_path)
            .finish()
    }
}
