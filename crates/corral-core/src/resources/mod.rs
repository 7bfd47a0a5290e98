pub mod quantities;

pub use quantities::{ResourceList, ResourceQuantities};

use k8s_openapi::api::core::v1::{Node, NodeCondition, Pod};

/// Phase of a pod that is running on its node
pub const POD_PHASE_RUNNING: &str = "Running";

/// Condition type used on nodes to reserve capacity for an in-flight preemption
pub const PREEMPTION_CONDITION: &str = "Preemption";

/// Preemption policy value that opts a pod out of preempting others
pub const PREEMPT_NEVER: &str = "Never";

/// Default CPU request assumed for containers that declare none (100m)
pub const DEFAULT_MILLI_CPU_REQUEST: i64 = 100;

/// Default memory request assumed for containers that declare none (200Mi)
pub const DEFAULT_MEMORY_REQUEST: i64 = 200 * 1024 * 1024;

/// Compute the effective resource request of a pod.
///
/// Container requests are summed, each init container raises the total to at
/// least its own request, and pod overhead is added on top.
pub fn pod_resource_request(pod: &Pod) -> ResourceQuantities {
    let mut result = ResourceQuantities::default();
    let Some(spec) = &pod.spec else {
        return result;
    };

    for container in &spec.containers {
        if let Some(requests) = container.resources.as_ref().and_then(|r| r.requests.as_ref()) {
            result.add_resource_list(requests);
        }
    }

    for container in spec.init_containers.iter().flatten() {
        if let Some(requests) = container.resources.as_ref().and_then(|r| r.requests.as_ref()) {
            result.set_max_resource_list(requests);
        }
    }

    if let Some(overhead) = &spec.overhead {
        result.add_resource_list(overhead);
    }

    result
}

/// Like [`pod_resource_request`] for CPU and memory, but containers that omit a
/// request count with the scheduler defaults so empty pods still spread.
pub fn pod_non_zero_request(pod: &Pod) -> ResourceQuantities {
    let mut result = ResourceQuantities::default();
    let Some(spec) = &pod.spec else {
        return result;
    };

    for container in &spec.containers {
        let requests = container.resources.as_ref().and_then(|r| r.requests.as_ref());
        let single = requests
            .map(ResourceQuantities::from_k8s_resource_map)
            .unwrap_or_default();
        result.cpu_millicores += if single.cpu_millicores == 0 {
            DEFAULT_MILLI_CPU_REQUEST
        } else {
            single.cpu_millicores
        };
        result.memory_bytes += if single.memory_bytes == 0 {
            DEFAULT_MEMORY_REQUEST
        } else {
            single.memory_bytes
        };
    }

    result
}

/// Priority of a pod; pods without a priority have priority zero
pub fn pod_priority(pod: &Pod) -> i32 {
    pod.spec.as_ref().and_then(|s| s.priority).unwrap_or(0)
}

/// Whether the pod's preemption policy allows it to evict other pods
pub fn pod_can_preempt(pod: &Pod) -> bool {
    pod.spec
        .as_ref()
        .and_then(|s| s.preemption_policy.as_deref())
        .map(|p| p != PREEMPT_NEVER)
        .unwrap_or(true)
}

/// Current phase of a pod ("" when unknown)
pub fn pod_phase(pod: &Pod) -> &str {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .unwrap_or("")
}

/// Name of a node ("" when unset)
pub fn node_name(node: &Node) -> &str {
    node.metadata.name.as_deref().unwrap_or("")
}

/// Conditions of a node, empty when the node reports none
pub fn node_conditions(node: &Node) -> &[NodeCondition] {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or(&[])
}

/// Preemption reservations currently recorded on a node
pub fn preemption_conditions(node: &Node) -> impl Iterator<Item = &NodeCondition> {
    node_conditions(node)
        .iter()
        .filter(|c| c.type_ == PREEMPTION_CONDITION)
}
