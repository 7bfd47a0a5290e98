use crate::framework::{
    CycleState, FrameworkHandle, NodeInfo, Plugin, ScorePlugin, Status, MAX_NODE_SCORE,
};
use corral_core::Pod;
use std::sync::Arc;

/// Penalizes nodes that were chosen often recently, relative to the most
/// chosen node, to spread consecutive placements
pub struct RepeatPriority {
    handle: Arc<FrameworkHandle>,
}

impl RepeatPriority {
    pub const NAME: &'static str = "RepeatPriority";

    pub fn new(handle: Arc<FrameworkHandle>) -> Self {
        Self { handle }
    }
}

impl Plugin for RepeatPriority {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn as_score(self: Arc<Self>) -> Option<Arc<dyn ScorePlugin>> {
        Some(self)
    }
}

impl ScorePlugin for RepeatPriority {
    fn score(&self, _state: &CycleState, _pod: &Pod, node_info: &NodeInfo) -> Result<i64, Status> {
        let (count, highest) = self.handle.node_usage_factor(node_info.name());
        let ratio = count as f64 / highest.max(1) as f64;
        Ok((MAX_NODE_SCORE as f64 * (-5.0 * ratio).exp()) as i64)
    }
}
