use corral_core::{
    node_name, pod_non_zero_request, pod_resource_request, preemption_conditions, Node, Pod,
    ResourceQuantities, WorkloadKey,
};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Wildcard host IP; a port bound here conflicts with every address
pub const DEFAULT_BIND_ALL_HOST_IP: &str = "0.0.0.0";

/// A host port claimed by a container
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostPort {
    pub protocol: String,
    pub ip: String,
    pub port: i32,
}

impl HostPort {
    /// Whether two claims cannot coexist on one host
    pub fn conflicts_with(&self, other: &HostPort) -> bool {
        self.port == other.port
            && self.protocol == other.protocol
            && (self.ip == other.ip
                || self.ip == DEFAULT_BIND_ALL_HOST_IP
                || other.ip == DEFAULT_BIND_ALL_HOST_IP)
    }
}

/// Host ports requested by every container of a pod
pub fn pod_host_ports(pod: &Pod) -> Vec<HostPort> {
    let Some(spec) = &pod.spec else {
        return Vec::new();
    };

    spec.containers
        .iter()
        .flat_map(|c| c.ports.iter().flatten())
        .filter_map(|p| {
            let port = p.host_port.filter(|port| *port > 0)?;
            Some(HostPort {
                protocol: p.protocol.clone().unwrap_or_else(|| "TCP".to_string()),
                ip: p
                    .host_ip
                    .clone()
                    .filter(|ip| !ip.is_empty())
                    .unwrap_or_else(|| DEFAULT_BIND_ALL_HOST_IP.to_string()),
                port,
            })
        })
        .collect()
}

/// Normalize an image reference so that `nginx` and `nginx:latest` compare equal
pub fn normalize_image_name(image: &str) -> String {
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    if image.contains('@') || last_segment.contains(':') {
        image.to_string()
    } else {
        format!("{}:latest", image)
    }
}

/// Aggregated, read-only view of one node and the pods placed on it
#[derive(Debug, Clone)]
pub struct NodeInfo {
    node: Node,
    name: String,
    pods: Vec<Pod>,
    requested: ResourceQuantities,
    non_zero_requested: ResourceQuantities,
    allocatable: ResourceQuantities,
    capacity: ResourceQuantities,
    reserved: ResourceQuantities,
    reserved_for: HashSet<String>,
    used_ports: Vec<HostPort>,
    image_sizes: HashMap<String, i64>,
}

impl NodeInfo {
    pub fn new(node: Node, pods: Vec<Pod>) -> Self {
        let name = node_name(&node).to_string();

        let mut requested = ResourceQuantities::default();
        let mut non_zero_requested = ResourceQuantities::default();
        let mut used_ports = Vec::new();
        for pod in &pods {
            requested.add(&pod_resource_request(pod));
            non_zero_requested.add(&pod_non_zero_request(pod));
            used_ports.extend(pod_host_ports(pod));
        }

        let status = node.status.as_ref();
        let allocatable = status
            .and_then(|s| s.allocatable.as_ref())
            .map(ResourceQuantities::from_k8s_resource_map)
            .unwrap_or_default();
        let capacity = status
            .and_then(|s| s.capacity.as_ref())
            .map(ResourceQuantities::from_k8s_resource_map)
            .unwrap_or_default();

        let mut reserved = ResourceQuantities::default();
        let mut reserved_for = HashSet::new();
        for condition in preemption_conditions(&node) {
            let reason = condition.reason.as_deref().unwrap_or("");
            match ResourceQuantities::from_reservation(reason) {
                Ok(quantities) => reserved.add(&quantities),
                Err(e) => warn!(node = %name, "Ignoring malformed preemption reservation: {}", e),
            }
            if let Some(message) = condition.message.as_deref() {
                reserved_for.insert(message.to_string());
            }
        }

        let mut image_sizes = HashMap::new();
        for image in status.and_then(|s| s.images.as_ref()).into_iter().flatten() {
            let size = image.size_bytes.unwrap_or(0);
            for name in image.names.iter().flatten() {
                image_sizes.insert(normalize_image_name(name), size);
            }
        }

        Self {
            node,
            name,
            pods,
            requested,
            non_zero_requested,
            allocatable,
            capacity,
            reserved,
            reserved_for,
            used_ports,
            image_sizes,
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pods(&self) -> &[Pod] {
        &self.pods
    }

    /// Sum of the effective requests of every pod on the node
    pub fn requested(&self) -> &ResourceQuantities {
        &self.requested
    }

    /// Requests with scheduler defaults applied to containers that declare none
    pub fn non_zero_requested(&self) -> &ResourceQuantities {
        &self.non_zero_requested
    }

    pub fn allocatable(&self) -> &ResourceQuantities {
        &self.allocatable
    }

    pub fn capacity(&self) -> &ResourceQuantities {
        &self.capacity
    }

    /// Capacity held back for in-flight preemptions
    pub fn reserved(&self) -> &ResourceQuantities {
        &self.reserved
    }

    /// Whether a preemption on this node already names `key` as its victim
    pub fn is_reserved_victim(&self, key: &WorkloadKey) -> bool {
        self.reserved_for.contains(&key.to_string())
    }

    /// Allocatable minus requested, clamped at zero. Reservations are not subtracted
    pub fn headroom(&self) -> ResourceQuantities {
        self.allocatable.saturating_sub(&self.requested)
    }

    /// Allocatable minus requested minus reserved, clamped at zero
    pub fn free(&self) -> ResourceQuantities {
        self.headroom().saturating_sub(&self.reserved)
    }

    pub fn used_ports(&self) -> &[HostPort] {
        &self.used_ports
    }

    /// Size of an image cached on the node, if present
    pub fn image_size(&self, image: &str) -> Option<i64> {
        self.image_sizes.get(&normalize_image_name(image)).copied()
    }

    pub(crate) fn image_names(&self) -> impl Iterator<Item = &String> {
        self.image_sizes.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{condition, make_node, make_pod};
    use corral_core::PREEMPTION_CONDITION;

    #[test]
    fn test_aggregates_requests_and_reservations() {
        let mut node = make_node("node1", "4", "8Gi");
        node.status
            .as_mut()
            .unwrap()
            .conditions
            .as_mut()
            .unwrap()
            .push(condition(PREEMPTION_CONDITION, "True", "1000,1073741824,0", "default/victim"));

        let pods = vec![
            make_pod("a", "default", "1", "2Gi"),
            make_pod("b", "default", "500m", "1Gi"),
        ];
        let info = NodeInfo::new(node, pods);

        assert_eq!(info.name(), "node1");
        assert_eq!(info.pods().len(), 2);
        assert_eq!(info.requested().cpu_millicores, 1500);
        assert_eq!(info.requested().memory_bytes, 3 * 1024 * 1024 * 1024);
        assert_eq!(info.reserved().cpu_millicores, 1000);
        assert_eq!(info.free().cpu_millicores, 1500);
        assert_eq!(info.free().memory_bytes, 4 * 1024 * 1024 * 1024);
        assert_eq!(info.headroom().cpu_millicores, 2500);
        assert!(info.is_reserved_victim(&WorkloadKey::new("default", "victim")));
        assert!(!info.is_reserved_victim(&WorkloadKey::new("default", "a")));
    }

    #[test]
    fn test_malformed_reservation_ignored() {
        let mut node = make_node("node1", "4", "8Gi");
        node.status
            .as_mut()
            .unwrap()
            .conditions
            .as_mut()
            .unwrap()
            .push(condition(PREEMPTION_CONDITION, "True", "garbage", "default/victim"));

        let info = NodeInfo::new(node, vec![]);
        assert!(info.reserved().is_zero());
        assert!(info.is_reserved_victim(&WorkloadKey::new("default", "victim")));
    }

    #[test]
    fn test_host_port_conflicts() {
        let wildcard = HostPort {
            protocol: "TCP".to_string(),
            ip: DEFAULT_BIND_ALL_HOST_IP.to_string(),
            port: 8080,
        };
        let specific = HostPort {
            protocol: "TCP".to_string(),
            ip: "10.0.0.1".to_string(),
            port: 8080,
        };
        let udp = HostPort {
            protocol: "UDP".to_string(),
            ..specific.clone()
        };
        assert!(wildcard.conflicts_with(&specific));
        assert!(specific.conflicts_with(&wildcard));
        assert!(!specific.conflicts_with(&udp));
    }

    #[test]
    fn test_normalize_image_name() {
        assert_eq!(normalize_image_name("nginx"), "nginx:latest");
        assert_eq!(normalize_image_name("nginx:1.25"), "nginx:1.25");
        assert_eq!(
            normalize_image_name("registry:5000/app"),
            "registry:5000/app:latest"
        );
        assert_eq!(normalize_image_name("app@sha256:abc"), "app@sha256:abc");
    }
}
