use super::cycle_state::CycleState;
use super::node_info::NodeInfo;
use super::status::Status;
use corral_core::Pod;
use std::sync::Arc;

/// Highest score a Score plugin may return
pub const MAX_NODE_SCORE: i64 = 100;

/// Lowest score a Score plugin may return
pub const MIN_NODE_SCORE: i64 = 0;

/// A named scheduling plugin.
///
/// A plugin advertises the extension points it supports by overriding the
/// matching `as_*` method to return itself.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn as_pre_filter(self: Arc<Self>) -> Option<Arc<dyn PreFilterPlugin>> {
        None
    }

    fn as_filter(self: Arc<Self>) -> Option<Arc<dyn FilterPlugin>> {
        None
    }

    fn as_pre_score(self: Arc<Self>) -> Option<Arc<dyn PreScorePlugin>> {
        None
    }

    fn as_score(self: Arc<Self>) -> Option<Arc<dyn ScorePlugin>> {
        None
    }
}

/// Runs once per (pod, node) evaluation before the filters, to precompute cycle state
pub trait PreFilterPlugin: Plugin {
    fn pre_filter(&self, state: &CycleState, pod: &Pod) -> Status;
}

/// Decides whether a node can host the pod
pub trait FilterPlugin: Plugin {
    fn filter(&self, state: &CycleState, pod: &Pod, node_info: &NodeInfo) -> Status;
}

/// Runs once per attempt over the viable nodes, before scoring
pub trait PreScorePlugin: Plugin {
    fn pre_score(&self, state: &CycleState, pod: &Pod, nodes: &[Arc<NodeInfo>]) -> Status;
}

/// Ranks a viable node; the score must lie in `MIN_NODE_SCORE..=MAX_NODE_SCORE`
pub trait ScorePlugin: Plugin {
    fn score(&self, state: &CycleState, pod: &Pod, node_info: &NodeInfo) -> Result<i64, Status>;
}
