use crate::framework::{CycleState, FilterPlugin, NodeInfo, Plugin, Status};
use corral_core::Pod;
use std::sync::Arc;

const ERR_REASON: &str = "node(s) didn't match the requested node name";

/// Honors an explicit `spec.nodeName` on the pod
pub struct NodeName;

impl NodeName {
    pub const NAME: &'static str = "NodeName";
}

impl Plugin for NodeName {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn as_filter(self: Arc<Self>) -> Option<Arc<dyn FilterPlugin>> {
        Some(self)
    }
}

impl FilterPlugin for NodeName {
    fn filter(&self, _state: &CycleState, pod: &Pod, node_info: &NodeInfo) -> Status {
        match pod.spec.as_ref().and_then(|s| s.node_name.as_deref()) {
            Some(wanted) if !wanted.is_empty() && wanted != node_info.name() => {
                Status::unresolvable(ERR_REASON)
            }
            _ => Status::success(),
        }
    }
}
