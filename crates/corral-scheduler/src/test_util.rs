//! Builders for nodes and pods used across the unit tests

use corral_core::k8s_openapi::api::core::v1::{
    Container, ContainerImage, ContainerPort, NodeSpec, NodeStatus, PodSpec, PodStatus,
    ResourceRequirements, Taint,
};
use corral_core::k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use corral_core::{Node, NodeCondition, Pod};
use std::collections::BTreeMap;

pub fn condition(type_: &str, status: &str, reason: &str, message: &str) -> NodeCondition {
    NodeCondition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        ..Default::default()
    }
}

/// A Ready node with the given allocatable (and capacity) CPU and memory
pub fn make_node(name: &str, cpu: &str, memory: &str) -> Node {
    let resources = BTreeMap::from([
        ("cpu".to_string(), Quantity(cpu.to_string())),
        ("memory".to_string(), Quantity(memory.to_string())),
        ("ephemeral-storage".to_string(), Quantity("100Gi".to_string())),
        ("pods".to_string(), Quantity("110".to_string())),
    ]);

    let mut node = Node::default();
    node.metadata.name = Some(name.to_string());
    node.metadata.resource_version = Some("1".to_string());
    node.metadata.labels = Some(BTreeMap::from([(
        "kubernetes.io/hostname".to_string(),
        name.to_string(),
    )]));
    node.spec = Some(NodeSpec::default());
    node.status = Some(NodeStatus {
        allocatable: Some(resources.clone()),
        capacity: Some(resources),
        conditions: Some(vec![condition("Ready", "True", "KubeletReady", "")]),
        ..Default::default()
    });
    node
}

pub fn with_labels(mut node: Node, labels: &[(&str, &str)]) -> Node {
    let map = node.metadata.labels.get_or_insert_with(BTreeMap::new);
    for (k, v) in labels {
        map.insert(k.to_string(), v.to_string());
    }
    node
}

pub fn with_taint(mut node: Node, key: &str, value: &str, effect: &str) -> Node {
    node.spec
        .get_or_insert_with(Default::default)
        .taints
        .get_or_insert_with(Vec::new)
        .push(Taint {
            key: key.to_string(),
            value: Some(value.to_string()),
            effect: effect.to_string(),
            ..Default::default()
        });
    node
}

pub fn with_image(mut node: Node, image: &str, size: i64) -> Node {
    node.status
        .get_or_insert_with(Default::default)
        .images
        .get_or_insert_with(Vec::new)
        .push(ContainerImage {
            names: Some(vec![image.to_string()]),
            size_bytes: Some(size),
        });
    node
}

/// A pod with one container requesting `cpu` and `memory` (empty strings omit the request)
pub fn make_pod(name: &str, namespace: &str, cpu: &str, memory: &str) -> Pod {
    let mut requests = BTreeMap::new();
    if !cpu.is_empty() {
        requests.insert("cpu".to_string(), Quantity(cpu.to_string()));
    }
    if !memory.is_empty() {
        requests.insert("memory".to_string(), Quantity(memory.to_string()));
    }

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
        ..Default::default()
    });
    pod
}

pub fn with_pod_labels(mut pod: Pod, labels: &[(&str, &str)]) -> Pod {
    let map = pod.metadata.labels.get_or_insert_with(BTreeMap::new);
    for (k, v) in labels {
        map.insert(k.to_string(), v.to_string());
    }
    pod
}

pub fn with_host_port(mut pod: Pod, ip: &str, port: i32) -> Pod {
    if let Some(spec) = pod.spec.as_mut() {
        spec.containers[0].ports = Some(vec![ContainerPort {
            container_port: port,
            host_port: Some(port),
            host_ip: (!ip.is_empty()).then(|| ip.to_string()),
            ..Default::default()
        }]);
    }
    pod
}

pub fn with_priority(mut pod: Pod, priority: i32) -> Pod {
    if let Some(spec) = pod.spec.as_mut() {
        spec.priority = Some(priority);
    }
    pod
}

/// Place the pod on a node in the Running phase
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
