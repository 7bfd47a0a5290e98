use corral_core::Pod;
use std::collections::BTreeMap;

/// Weighted score of one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeScore {
    pub name: String,
    pub score: i64,
}

pub type NodeScoreList = Vec<NodeScore>;

/// Per plugin, the weighted score of every node in input order
pub type PluginToNodeScores = BTreeMap<String, NodeScoreList>;

/// Outcome of a successful scheduling decision
#[derive(Debug, Clone)]
pub struct ScheduleResult {
    /// Node the workload should be bound to
    pub suggested_host: String,
    /// Set when the node only fits after this workload is evicted
    pub nominated_victim: Option<Pod>,
}

impl ScheduleResult {
    pub fn bind(host: impl Into<String>) -> Self {
        Self {
            suggested_host: host.into(),
            nominated_victim: None,
        }
    }

    pub fn preempt(host: impl Into<String>, victim: Pod) -> Self {
        Self {
            suggested_host: host.into(),
            nominated_victim: Some(victim),
        }
    }

    pub fn requires_preemption(&self) -> bool {
        self.nominated_victim.is_some()
    }
}
