//! Informer-style in-memory store of nodes and pods.
//!
//! Snapshots are built from this store at the start of every scheduling
//! attempt. It is refreshed by listing the orchestrator periodically and can
//! also be fed individual add/update/remove notifications.

use crate::api_client::ClusterLister;
use crate::error::{Result, RuntimeError};
use corral_core::{node_name, pod_phase, Node, Pod, WorkloadKey};
use corral_scheduler::ClusterStateProvider;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Default)]
struct Store {
    nodes: BTreeMap<String, Node>,
    pods: BTreeMap<String, Pod>,
}

pub struct ClusterCache {
    store: RwLock<Store>,
    synced: watch::Sender<bool>,
}

impl Default for ClusterCache {
    fn default() -> Self {
        Self::new()
    }
}

fn assigned_node(pod: &Pod) -> Option<&str> {
    pod.spec.as_ref().and_then(|s| s.node_name.as_deref())
}

fn is_terminated(pod: &Pod) -> bool {
    matches!(pod_phase(pod), "Succeeded" | "Failed")
}

impl ClusterCache {
    pub fn new() -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            store: RwLock::new(Store::default()),
            synced,
        }
    }

    pub fn upsert_node(&self, node: Node) {
        let name = node_name(&node).to_string();
        self.store.write().nodes.insert(name, node);
    }

    pub fn remove_node(&self, name: &str) {
        self.store.write().nodes.remove(name);
    }

    pub fn upsert_pod(&self, pod: Pod) -> Result<()> {
        let key = WorkloadKey::from_pod(&pod)?;
        self.store.write().pods.insert(key.to_string(), pod);
        Ok(())
    }

    pub fn remove_pod(&self, key: &WorkloadKey) {
        self.store.write().pods.remove(&key.to_string());
    }

    /// Replace the whole store with fresh listings and mark the cache synced
    pub fn replace(&self, nodes: Vec<Node>, pods: Vec<Pod>) {
        let mut store = Store::default();
        for node in nodes {
            store.nodes.insert(node_name(&node).to_string(), node);
        }
        for pod in pods {
            match WorkloadKey::from_pod(&pod) {
                Ok(key) => {
                    store.pods.insert(key.to_string(), pod);
                }
                Err(e) => warn!("Skipping pod without a usable key: {}", e),
            }
        }

        debug!(nodes = store.nodes.len(), pods = store.pods.len(), "Cluster cache replaced");
        *self.store.write() = store;
        self.synced.send_replace(true);
    }

    /// List everything from `lister` and replace the store with the result
    pub async fn sync_from(&self, lister: &dyn ClusterLister) -> Result<()> {
        let nodes = lister.list_nodes().await?;
        let pods = lister.list_pods().await?;
        self.replace(nodes, pods);
        Ok(())
    }

    pub fn is_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Wait until the first successful sync, or fail after `timeout`
    pub async fn wait_for_sync(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.synced.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|synced| *synced))
            .await
            .map_err(|_| RuntimeError::CacheSyncTimeout {
                seconds: timeout.as_secs(),
            })?
            .map_err(|_| RuntimeError::internal_error("cache sync channel closed"))?;
        Ok(())
    }

    /// Pods that have not been assigned a node, are not finished, and ask for
    /// the scheduler called `scheduler_name`
    pub fn pending_pods(&self, scheduler_name: &str) -> Vec<Pod> {
        self.store
            .read()
            .pods
            .values()
            .filter(|p| assigned_node(p).is_none() && !is_terminated(p))
            .filter(|p| {
                p.spec.as_ref().and_then(|s| s.scheduler_name.as_deref()) == Some(scheduler_name)
            })
            .cloned()
            .collect()
    }

    /// Refresh from `lister` every `interval` until cancelled
    pub async fn run(self: Arc<Self>, lister: Arc<dyn ClusterLister>, interval: Duration, token: CancellationToken) {
        info!("Starting cluster cache refresh (interval: {:?})", interval);

        loop {
            if let Err(e) = self.sync_from(lister.as_ref()).await {
                warn!("Cluster cache refresh failed: {}", e);
            }

            tokio::select! {
                _ = token.cancelled() => {
                    info!("Cluster cache refresh shutting down");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

impl ClusterStateProvider for ClusterCache {
    fn list_nodes(&self) -> Vec<Node> {
        self.store.read().nodes.values().cloned().collect()
    }

    fn list_workloads_on_node(&self, node: &str) -> Vec<Pod> {
        self.store
            .read()
            .pods
            .values()
            .filter(|p| assigned_node(p) == Some(node) && !is_terminated(p))
            .cloned()
            .collect()
    }
}
