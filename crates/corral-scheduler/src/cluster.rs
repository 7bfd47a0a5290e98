use crate::framework::{NodeInfo, Snapshot};
use async_trait::async_trait;
use corral_core::{Event, Node, Pod, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Read-only view of the cluster, kept fresh by an informer-style cache
pub trait ClusterStateProvider: Send + Sync {
    /// All nodes currently known
    fn list_nodes(&self) -> Vec<Node>;

    /// Pods assigned to the named node
    fn list_workloads_on_node(&self, node_name: &str) -> Vec<Pod>;

    /// Build an immutable snapshot of the current state
    fn build_snapshot(&self) -> Snapshot {
        let node_infos = self
            .list_nodes()
            .into_iter()
            .map(|node| {
                let pods = self.list_workloads_on_node(corral_core::node_name(&node));
                Arc::new(NodeInfo::new(node, pods))
            })
            .collect();
        Snapshot::new(node_infos)
    }
}

/// How dependents of a deleted object are cleaned up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropagationPolicy {
    Background,
    Foreground,
    Orphan,
}

impl PropagationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Background => "Background",
            Self::Foreground => "Foreground",
            Self::Orphan => "Orphan",
        }
    }
}

/// Options for deleting a workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOptions {
    pub grace_period_seconds: i64,
    pub propagation_policy: PropagationPolicy,
}

/// Mutations the scheduler requests from the orchestrator.
///
/// Implementations report optimistic-concurrency failures as
/// `CorralError::Conflict` and missing objects as `CorralError::NotFound`.
#[async_trait]
pub trait OrchestratorApi: Send + Sync {
    /// Fetch a workload
    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Pod>;

    /// Replace the status of a workload
    async fn update_workload_status(&self, pod: &Pod) -> Result<Pod>;

    /// Bind a workload to a node. Annotations on the pod are carried on the binding
    async fn bind(&self, pod: &Pod, node_name: &str) -> Result<()>;

    /// Delete a workload
    async fn delete_workload(&self, namespace: &str, name: &str, options: &DeleteOptions) -> Result<()>;

    /// Fetch a node
    async fn get_node(&self, name: &str) -> Result<Node>;

    /// Replace the status of a node (conditions included)
    async fn update_node_status(&self, node: &Node) -> Result<Node>;

    /// Record an event
    async fn create_event(&self, event: &Event) -> Result<()>;
}

/// Checks whether a pod's persistent volume claims can be satisfied on a node
pub trait VolumeBinder: Send + Sync {
    /// Returns the conflict reasons; an empty list means the volumes fit
    fn find_pod_volumes(&self, pod: &Pod, node: &Node) -> Result<Vec<String>>;
}

/// Volume binder that treats every claim as bindable
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveVolumeBinder;

impl VolumeBinder for PermissiveVolumeBinder {
    fn find_pod_volumes(&self, _pod: &Pod, _node: &Node) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}
