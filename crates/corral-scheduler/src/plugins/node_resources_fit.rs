use crate::framework::{CycleState, FilterPlugin, NodeInfo, Plugin, PreFilterPlugin, Status};
use corral_core::{pod_resource_request, Pod, ResourceQuantities};
use std::sync::Arc;

const PRE_FILTER_STATE_KEY: &str = "PreFilterNodeResourcesFit";

/// Checks that the node has room for the pod's requests, counting capacity
/// already reserved for in-flight preemptions as used
pub struct NodeResourcesFit;

impl NodeResourcesFit {
    pub const NAME: &'static str = "NodeResourcesFit";
}

/// Pod request computed once per cycle
struct PreFilterState {
    request: ResourceQuantities,
}

impl Plugin for NodeResourcesFit {
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

impl PreFilterPlugin for NodeResourcesFit {
    fn pre_filter(&self, state: &CycleState, pod: &Pod) -> Status {
        state.write(
            PRE_FILTER_STATE_KEY,
            PreFilterState {
                request: pod_resource_request(pod),
            },
        );
        Status::success()
    }
}

impl FilterPlugin for NodeResourcesFit {
    fn filter(&self, state: &CycleState, _pod: &Pod, node_info: &NodeInfo) -> Status {
        let Some(pre) = state.read::<PreFilterState>(PRE_FILTER_STATE_KEY) else {
            return Status::error(format!("reading {} from cycle state", PRE_FILTER_STATE_KEY));
        };

        let insufficient = insufficient_resources(&pre.request, node_info);
        if insufficient.is_empty() {
            Status::success()
        } else {
            Status::with_reasons(crate::framework::Code::Unschedulable, insufficient)
        }
    }
}

/// Reasons the node cannot hold `request`; empty when it fits
pub fn insufficient_resources(request: &ResourceQuantities, node_info: &NodeInfo) -> Vec<String> {
    let mut reasons = Vec::new();

    let allowed_pods = node_info.allocatable().allowed_pods;
    if allowed_pods > 0 && node_info.pods().len() as i64 + 1 > allowed_pods {
        reasons.push("Too many pods".to_string());
    }

    if request.is_zero() && request.scalar.values().all(|v| *v == 0) {
        return reasons;
    }

    let free = node_info.free();
    if request.cpu_millicores > free.cpu_millicores {
        reasons.push("Insufficient cpu".to_string());
    }
    if request.memory_bytes > free.memory_bytes {
        reasons.push("Insufficient memory".to_string());
    }
    if request.ephemeral_storage_bytes > free.ephemeral_storage_bytes {
        reasons.push("Insufficient ephemeral-storage".to_string());
    }
    for (name, wanted) in &request.scalar {
        if *wanted > free.scalar.get(name).copied().unwrap_or(0) {
            reasons.push(format!("Insufficient {}", name));
        }
    }

    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::{Code, Snapshot};
    use crate::test_util::{condition, make_node, make_pod};
    use corral_core::PREEMPTION_CONDITION;

    fn run(pod: &Pod, info: &NodeInfo) -> Status {
        let state = CycleState::new(Arc::new(Snapshot::empty()));
        assert!(NodeResourcesFit.pre_filter(&state, pod).is_success());
        NodeResourcesFit.filter(&state, pod, info)
    }

    #[test]
    fn test_fits_and_insufficient() {
        let existing = make_pod("existing", "default", "3", "6Gi");
        let info = NodeInfo::new(make_node("n1", "4", "8Gi"), vec![existing]);

        assert!(run(&make_pod("small", "default", "1", "2Gi"), &info).is_success());

        let status = run(&make_pod("big", "default", "2", "4Gi"), &info);
        assert_eq!(status.code(), Code::Unschedulable);
        assert_eq!(status.reasons(), ["Insufficient cpu", "Insufficient memory"]);
    }

    #[test]
    fn test_reservation_counts_as_used() {
        let mut node = make_node("n1", "4", "8Gi");
        node.status
            .as_mut()
            .unwrap()
            .conditions
            .as_mut()
            .unwrap()
            .push(condition(
                PREEMPTION_CONDITION,
                "True",
                &format!("0,{},0", 6i64 * 1024 * 1024 * 1024),
                "default/victim",
            ));
        let info = NodeInfo::new(node, vec![]);

        let status = run(&make_pod("p", "default", "1", "4Gi"), &info);
        assert_eq!(status.reasons(), ["Insufficient memory"]);
        assert!(run(&make_pod("q", "default", "1", "2Gi"), &info).is_success());
    }

    #[test]
    fn test_pod_count_limit() {
        let mut node = make_node("n1", "4", "8Gi");
        node.status
            .as_mut()
            .unwrap()
            .allocatable
            .as_mut()
            .unwrap()
            .insert("pods".to_string(), corral_core::k8s_openapi::apimachinery::pkg::api::resource::Quantity("1".to_string()));
        let info = NodeInfo::new(node, vec![make_pod("a", "default", "", "")]);

        let status = run(&make_pod("b", "default", "", ""), &info);
        assert_eq!(status.reasons(), ["Too many pods"]);
    }

    #[test]
    fn test_missing_pre_filter_state_is_error() {
        let state = CycleState::new(Arc::new(Snapshot::empty()));
        let info = NodeInfo::new(make_node("n1", "4", "8Gi"), vec![]);
        let status = NodeResourcesFit.filter(&state, &make_pod("p", "default", "1", "1Gi"), &info);
        assert_eq!(status.code(), Code::Error);
    }
}
