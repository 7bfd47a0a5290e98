use super::snapshot::Snapshot;
use crate::cluster::{OrchestratorApi, VolumeBinder};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Default number of placements after which usage counters start over
pub const DEFAULT_USAGE_RESET_THRESHOLD: u64 = 10_000;

/// Counts recent placements per node so repeated choices can be penalized
#[derive(Debug)]
pub struct NodeUsageTracker {
    inner: Mutex<UsageCounts>,
    reset_threshold: u64,
}

#[derive(Debug)]
struct UsageCounts {
    counts: HashMap<String, u64>,
    highest: u64,
}

impl UsageCounts {
    fn fresh() -> Self {
        Self {
            counts: HashMap::new(),
            highest: 1,
        }
    }
}

impl NodeUsageTracker {
    pub fn new(reset_threshold: u64) -> Self {
        Self {
            inner: Mutex::new(UsageCounts::fresh()),
            reset_threshold,
        }
    }

    /// Record one placement on `node`
    pub fn increase(&self, node: &str) {
        let mut usage = self.inner.lock();
        let count = usage.counts.entry(node.to_string()).or_insert(0);
        *count += 1;
        let count = *count;
        if count > usage.highest {
            usage.highest = count;
        }
        if usage.highest > self.reset_threshold {
            *usage = UsageCounts::fresh();
        }
    }

    /// Highest placement count on any node, never zero
    pub fn highest(&self) -> u64 {
        self.inner.lock().highest
    }

    /// `(placements on node, highest count on any node)`
    pub fn factor(&self, node: &str) -> (u64, u64) {
        let usage = self.inner.lock();
        (usage.counts.get(node).copied().unwrap_or(0), usage.highest)
    }
}

impl Default for NodeUsageTracker {
    fn default() -> Self {
        Self::new(DEFAULT_USAGE_RESET_THRESHOLD)
    }
}

/// Shared state plugins reach through: orchestrator client, latest snapshot,
/// volume binder and node usage counters
pub struct FrameworkHandle {
    client: Arc<dyn OrchestratorApi>,
    snapshot: RwLock<Arc<Snapshot>>,
    volume_binder: Arc<dyn VolumeBinder>,
    usage: NodeUsageTracker,
}

impl FrameworkHandle {
    pub fn new(
        client: Arc<dyn OrchestratorApi>,
        snapshot: Arc<Snapshot>,
        volume_binder: Arc<dyn VolumeBinder>,
    ) -> Self {
        Self {
            client,
            snapshot: RwLock::new(snapshot),
            volume_binder,
            usage: NodeUsageTracker::default(),
        }
    }

    pub fn with_usage_reset_threshold(mut self, threshold: u64) -> Self {
        self.usage = NodeUsageTracker::new(threshold);
        self
    }

    pub fn client(&self) -> &Arc<dyn OrchestratorApi> {
        &self.client
    }

    /// The most recently published snapshot.
    ///
    /// Plugins that need the snapshot of their own attempt read it from the
    /// cycle state instead.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    pub fn set_snapshot(&self, snapshot: Arc<Snapshot>) {
        *self.snapshot.write() = snapshot;
    }

    pub fn volume_binder(&self) -> &Arc<dyn VolumeBinder> {
        &self.volume_binder
    }

    pub fn increase_node_usage_factor(&self, node: &str) {
        self.usage.increase(node);
    }

    pub fn node_usage_factor(&self, node: &str) -> (u64, u64) {
        self.usage.factor(node)
    }

    pub fn highest_usage_factor(&self) -> u64 {
        self.usage.highest()
    }
}
