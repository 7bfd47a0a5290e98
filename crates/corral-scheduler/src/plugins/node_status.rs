use crate::framework::{CycleState, FilterPlugin, NodeInfo, Plugin, Status};
use corral_core::{node_conditions, Pod};
use std::sync::Arc;

const ERR_REASON_NOT_READY: &str = "node(s) were not ready";

/// Rejects nodes whose Ready condition is not True
pub struct NodeStatus;

impl NodeStatus {
    pub const NAME: &'static str = "NodeStatus";
}

impl Plugin for NodeStatus {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn as_filter(self: Arc<Self>) -> Option<Arc<dyn FilterPlugin>> {
        Some(self)
    }
}

impl FilterPlugin for NodeStatus {
    fn filter(&self, _state: &CycleState, _pod: &Pod, node_info: &NodeInfo) -> Status {
        let ready = node_conditions(node_info.node())
            .iter()
            .any(|c| c.type_ == "Ready" && c.status == "True");
        if ready {
            Status::success()
        } else {
            Status::unresolvable(ERR_REASON_NOT_READY)
        }
    }
}
