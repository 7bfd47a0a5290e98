use crate::framework::{CycleState, NodeInfo, Plugin, ScorePlugin, Status, MAX_NODE_SCORE};
use corral_core::Pod;
use std::sync::Arc;

/// Favors nodes with a low share of memory already requested.
///
/// The score decays exponentially with the requested/capacity ratio, so an
/// empty node scores 100 and a full one scores close to 0.
pub struct ResourcePriority;

impl ResourcePriority {
    pub const NAME: &'static str = "ResourcePriority";
}

impl Plugin for ResourcePriority {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn as_score(self: Arc<Self>) -> Option<Arc<dyn ScorePlugin>> {
        Some(self)
    }
}

impl ScorePlugin for ResourcePriority {
    fn score(&self, _state: &CycleState, _pod: &Pod, node_info: &NodeInfo) -> Result<i64, Status> {
        let capacity = node_info.capacity().memory_bytes;
        if capacity <= 0 {
            return Ok(0);
        }
        let ratio = node_info.non_zero_requested().memory_bytes as f64 / capacity as f64;
        let score = (MAX_NODE_SCORE as f64 * (-5.0 * ratio).exp()) as i64;
        Ok(score.clamp(0, MAX_NODE_SCORE))
    }
}
