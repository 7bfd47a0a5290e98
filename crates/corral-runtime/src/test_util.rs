use corral_core::k8s_openapi::api::core::v1::{
    Container, NodeCondition, NodeStatus, PodSpec, PodStatus, ResourceRequirements,
};
use corral_core::k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use corral_core::{Node, Pod};
use std::collections::BTreeMap;

/// A Ready node with 4 CPUs and 8Gi of memory
pub fn make_node(name: &str) -> Node {
    let resources = BTreeMap::from([
        ("cpu".to_string(), Quantity("4".to_string())),
        ("memory".to_string(), Quantity("8Gi".to_string())),
        ("pods".to_string(), Quantity("110".to_string())),
    ]);

    let mut node = Node::default();
    node.metadata.name = Some(name.to_string());
    node.status = Some(NodeStatus {
        allocatable: Some(resources.clone()),
        capacity: Some(resources),
        conditions: Some(vec![NodeCondition {
            type_: "Ready".to_string(),
            status: "True".to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    });
    node
}

/// A pod requesting one CPU and 1Gi, handled by `scheduler_name` when non-empty
pub fn make_pod(name: &str, namespace: &str, scheduler_name: &str) -> Pod {
    let requests = BTreeMap::from([
        ("cpu".to_string(), Quantity("1".to_string())),
        ("memory".to_string(), Quantity("1Gi".to_string())),
    ]);

    let mut pod = Pod::default();
    pod.metadata.name = Some(name.to_string());
    pod.metadata.namespace = Some(namespace.to_string());
    pod.metadata.uid = Some(format!("uid-{}-{}", namespace, name));
    pod.spec = Some(PodSpec {
        containers: vec![Container {
            name: "main".to_string(),
            image: Some("busybox".to_string()),
            resources: Some(ResourceRequirements {
                requests: Some(requests),
                ..Default::default()
            }),
            ..Default::default()
        }],
        scheduler_name: (!scheduler_name.is_empty()).then(|| scheduler_name.to_string()),
        ..Default::default()
    });
    pod
}

pub fn with_memory(mut pod: Pod, memory: &str) -> Pod {
    if let Some(requests) = pod
        .spec
        .as_mut()
        .and_then(|s| s.containers[0].resources.as_mut())
        .and_then(|r| r.requests.as_mut())
    {
        requests.insert("memory".to_string(), Quantity(memory.to_string()));
    }
    pod
}

pub fn with_priority(mut pod: Pod, priority: i32) -> Pod {
    if let Some(spec) = pod.spec.as_mut() {
        spec.priority = Some(priority);
    }
    pod
}

pub fn running_on(mut pod: Pod, node: &str) -> Pod {
    if let Some(spec) = pod.spec.as_mut() {
        spec.node_name = Some(node.to_string());
    }
    pod.status = Some(PodStatus {
        phase: Some("Running".to_string()),
        ..Default::default()
    });
    pod
}
