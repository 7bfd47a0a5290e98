use crate::framework::node_info::{pod_host_ports, HostPort};
use crate::framework::{CycleState, FilterPlugin, NodeInfo, Plugin, PreFilterPlugin, Status};
use corral_core::Pod;
use std::sync::Arc;

const PRE_FILTER_STATE_KEY: &str = "PreFilterNodePorts";
const ERR_REASON: &str = "node(s) didn't have free ports for the requested pod ports";

/// Rejects nodes where a requested host port is already taken
pub struct NodePorts;

impl NodePorts {
    pub const NAME: &'static str = "NodePorts";
}

struct PreFilterState {
    wanted: Vec<HostPort>,
}

impl Plugin for NodePorts {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn as_pre_filter(self: Arc<Self>) -> Option<Arc<dyn PreFilterPlugin>> {
        Some(self)
    }

    fn as_filter(self: Arc<Self>) -> Option<Arc<dyn FilterPlugin>> {
        Some(self)
    }
}

impl PreFilterPlugin for NodePorts {
    fn pre_filter(&self, state: &CycleState, pod: &Pod) -> Status {
        state.write(
            PRE_FILTER_STATE_KEY,
            PreFilterState {
                wanted: pod_host_ports(pod),
            },
        );
        Status::success()
    }
}

impl FilterPlugin for NodePorts {
    fn filter(&self, state: &CycleState, _pod: &Pod, node_info: &NodeInfo) -> Status {
        let Some(pre) = state.read::<PreFilterState>(PRE_FILTER_STATE_KEY) else {
            return Status::error(format!("reading {} from cycle state", PRE_FILTER_STATE_KEY));
        };

        let conflict = pre
            .wanted
            .iter()
            .any(|w| node_info.used_ports().iter().any(|u| w.conflicts_with(u)));
        if conflict {
            Status::unschedulable(ERR_REASON)
        } else {
            Status::success()
        }
    }
}
