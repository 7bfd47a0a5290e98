use super::helper::{pod_tolerations, tolerates_taint};
use crate::framework::{CycleState, FilterPlugin, NodeInfo, Plugin, Status};
use corral_core::k8s_openapi::api::core::v1::Taint;
use corral_core::Pod;
use std::sync::Arc;

/// Taint the control plane associates with cordoned nodes
pub const TAINT_NODE_UNSCHEDULABLE: &str = "node.kubernetes.io/unschedulable";

const ERR_REASON: &str = "node(s) were unschedulable";

/// Rejects cordoned nodes unless the pod tolerates the unschedulable taint
pub struct NodeUnschedulable;

impl NodeUnschedulable {
    pub const NAME: &'static str = "NodeUnschedulable";
}

impl Plugin for NodeUnschedulable {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn as_filter(self: Arc<Self>) -> Option<Arc<dyn FilterPlugin>> {
        Some(self)
    }
}

impl FilterPlugin for NodeUnschedulable {
    fn filter(&self, _state: &CycleState, pod: &Pod, node_info: &NodeInfo) -> Status {
        let cordoned = node_info
            .node()
            .spec
            .as_ref()
            .and_then(|s| s.unschedulable)
            .unwrap_or(false);
        if !cordoned {
            return Status::success();
        }

        let taint = Taint {
            key: TAINT_NODE_UNSCHEDULABLE.to_string(),
            effect: "NoSchedule".to_string(),
            ..Default::default()
        };
        if pod_tolerations(pod).iter().any(|t| tolerates_taint(t, &taint)) {
            Status::success()
        } else {
            Status::unresolvable(ERR_REASON)
        }
    }
}
