//! In-memory orchestrator for tests and local runs.
//!
//! Implements both the mutation API and the cluster state view, tracks
//! resource versions so stale node updates fail with a conflict, and can be
//! told to inject failures.

use crate::cluster::{ClusterStateProvider, DeleteOptions, OrchestratorApi};
use async_trait::async_trait;
use corral_core::{node_name, pod_phase, CorralError, Event, Node, Pod, Result, WorkloadKey};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Default)]
struct MockState {
    nodes: BTreeMap<String, Node>,
    pods: BTreeMap<String, Pod>,
    /// Deleted pods that stay visible to `get_workload` for a number of reads
    lingering: HashMap<String, (Pod, u32)>,
    bindings: Vec<(String, String)>,
    deletions: Vec<(String, DeleteOptions)>,
    events: Vec<Event>,
    resource_version: u64,
    node_conflicts: u32,
    read_failures: u32,
    linger_reads: u32,
    fail_binds: bool,
    fail_deletes: bool,
}

impl MockState {
    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }
}

/// In-memory orchestrator
#[derive(Default)]
pub struct MockOrchestrator {
    state: Mutex<MockState>,
}

fn pod_key(pod: &Pod) -> Result<String> {
    WorkloadKey::from_pod(pod).map(|k| k.to_string())
}

impl MockOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&self, mut node: Node) {
        let mut state = self.state.lock();
        node.metadata.resource_version = Some(state.next_version());
        state.nodes.insert(node_name(&node).to_string(), node);
    }

    pub fn add_pod(&self, mut pod: Pod) -> Result<()> {
        let key = pod_key(&pod)?;
        let mut state = self.state.lock();
        pod.metadata.resource_version = Some(state.next_version());
        state.pods.insert(key, pod);
        Ok(())
    }

    pub fn node(&self, name: &str) -> Option<Node> {
        self.state.lock().nodes.get(name).cloned()
    }

    pub fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.state
            .lock()
            .pods
            .get(&format!("{}/{}", namespace, name))
            .cloned()
    }

    /// `(pod key, node)` for every bind call that succeeded
    pub fn bindings(&self) -> Vec<(String, String)> {
        self.state.lock().bindings.clone()
    }

    /// `(pod key, options)` for every delete call that succeeded
    pub fn deletions(&self) -> Vec<(String, DeleteOptions)> {
        self.state.lock().deletions.clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().events.clone()
    }

    /// Fail the next `count` node status updates with a conflict
    pub fn inject_node_conflicts(&self, count: u32) {
        self.state.lock().node_conflicts = count;
    }

    /// Fail the next `count` workload reads with a transient error
    pub fn inject_read_failures(&self, count: u32) {
        self.state.lock().read_failures = count;
    }

    /// Keep deleted pods readable for `reads` calls to `get_workload`
    pub fn set_delete_linger(&self, reads: u32) {
        self.state.lock().linger_reads = reads;
    }

    pub fn fail_binds(&self, fail: bool) {
        self.state.lock().fail_binds = fail;
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.state.lock().fail_deletes = fail;
    }
}

#[async_trait]
impl OrchestratorApi for MockOrchestrator {
    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Pod> {
        let key = format!("{}/{}", namespace, name);
        let mut state = self.state.lock();
        if state.read_failures > 0 {
            state.read_failures -= 1;
            return Err(CorralError::transport_error(format!("reading {}: 503 Service Unavailable", key), None));
        }
        if let Some(pod) = state.pods.get(&key) {
            return Ok(pod.clone());
        }

        if let Some((pod, remaining)) = state.lingering.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(pod.clone());
            }
        }
        Err(CorralError::not_found(key))
    }

    async fn update_workload_status(&self, pod: &Pod) -> Result<Pod> {
        let key = pod_key(pod)?;
        let mut state = self.state.lock();
        let version = state.next_version();
        let stored = state
            .pods
            .get_mut(&key)
            .ok_or_else(|| CorralError::not_found(key.clone()))?;
        stored.status = pod.status.clone();
        stored.metadata.resource_version = Some(version);
        Ok(stored.clone())
    }

    async fn bind(&self, pod: &Pod, node: &str) -> Result<()> {
        let key = pod_key(pod)?;
        let mut state = self.state.lock();
        if state.fail_binds {
            return Err(CorralError::internal_error(format!("binding {} refused", key)));
        }
        if !state.nodes.contains_key(node) {
            return Err(CorralError::not_found(node.to_string()));
        }
        let version = state.next_version();
        let stored = state
            .pods
            .get_mut(&key)
            .ok_or_else(|| CorralError::not_found(key.clone()))?;
        stored.spec.get_or_insert_with(Default::default).node_name = Some(node.to_string());
        if let Some(annotations) = &pod.metadata.annotations {
            stored
                .metadata
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .extend(annotations.clone());
        }
        stored.metadata.resource_version = Some(version);
        state.bindings.push((key.clone(), node.to_string()));
        debug!(pod = %key, node, "Mock bind");
        Ok(())
    }

    async fn delete_workload(&self, namespace: &str, name: &str, options: &DeleteOptions) -> Result<()> {
        let key = format!("{}/{}", namespace, name);
        let mut state = self.state.lock();
        if state.fail_deletes {
            return Err(CorralError::internal_error(format!("deleting {} refused", key)));
        }
        let pod = state
            .pods
            .remove(&key)
            .ok_or_else(|| CorralError::not_found(key.clone()))?;
        let linger = state.linger_reads;
        if linger > 0 {
            state.lingering.insert(key.clone(), (pod, linger));
        }
        state.deletions.push((key, options.clone()));
        Ok(())
    }

    async fn get_node(&self, name: &str) -> Result<Node> {
        self.state
            .lock()
            .nodes
            .get(name)
            .cloned()
            .ok_or_else(|| CorralError::not_found(name.to_string()))
    }

    async fn update_node_status(&self, node: &Node) -> Result<Node> {
        let name = node_name(node).to_string();
        let mut state = self.state.lock();
        if state.node_conflicts > 0 {
            state.node_conflicts -= 1;
            return Err(CorralError::conflict(name, "injected conflict"));
        }

        let current = state
            .nodes
            .get(&name)
            .ok_or_else(|| CorralError::not_found(name.clone()))?;
        if node.metadata.resource_version.is_some()
            && node.metadata.resource_version != current.metadata.resource_version
        {
            return Err(CorralError::conflict(
                name,
                "the object has been modified; please apply your changes to the latest version",
            ));
        }

        let version = state.next_version();
        let stored = state
            .nodes
            .get_mut(&name)
            .ok_or_else(|| CorralError::not_found(name.clone()))?;
        stored.status = node.status.clone();
        stored.metadata.resource_version = Some(version);
        Ok(stored.clone())
    }

    async fn create_event(&self, event: &Event) -> Result<()> {
        self.state.lock().events.push(event.clone());
        Ok(())
    }
}

impl ClusterStateProvider for MockOrchestrator {
    fn list_nodes(&self) -> Vec<Node> {
        self.state.lock().nodes.values().cloned().collect()
    }

    fn list_workloads_on_node(&self, node: &str) -> Vec<Pod> {
        self.state
            .lock()
            .pods
            .values()
            .filter(|p| p.spec.as_ref().and_then(|s| s.node_name.as_deref()) == Some(node))
            .filter(|p| !matches!(pod_phase(p), "Succeeded" | "Failed"))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::PropagationPolicy;
    use crate::test_util::{make_node, make_pod, running_on};

    #[tokio::test]
    async fn test_node_update_conflicts() {
        let mock = MockOrchestrator::new();
        mock.add_node(make_node("n1", "4", "8Gi"));

        let node = mock.get_node("n1").await.unwrap();
        let updated = mock.update_node_status(&node).await.unwrap();
        assert_ne!(updated.metadata.resource_version, node.metadata.resource_version);

        // The first copy is now stale
        let err = mock.update_node_status(&node).await.unwrap_err();
        assert!(err.is_conflict());

        mock.inject_node_conflicts(1);
        assert!(mock.update_node_status(&updated).await.unwrap_err().is_conflict());
        assert!(mock.update_node_status(&updated).await.is_ok());
    }

    #[tokio::test]
    async fn test_bind_delete_and_listing() {
        let mock = MockOrchestrator::new();
        mock.add_node(make_node("n1", "4", "8Gi"));
        mock.add_pod(make_pod("web", "default", "1", "1Gi")).unwrap();
        mock.add_pod(running_on(make_pod("db", "default", "1", "1Gi"), "n1")).unwrap();
        assert_eq!(mock.list_workloads_on_node("n1").len(), 1);

        let mut pod = mock.get_workload("default", "web").await.unwrap();
        pod.metadata.annotations = Some(BTreeMap::from([("a".to_string(), "b".to_string())]));
        mock.bind(&pod, "n1").await.unwrap();
        assert_eq!(mock.bindings(), vec![("default/web".to_string(), "n1".to_string())]);
        assert_eq!(mock.list_workloads_on_node("n1").len(), 2);
        assert!(mock.bind(&pod, "missing").await.unwrap_err().is_not_found());

        mock.set_delete_linger(1);
        let options = DeleteOptions {
            grace_period_seconds: 30,
            propagation_policy: PropagationPolicy::Background,
        };
        mock.delete_workload("default", "db", &options).await.unwrap();
        assert!(mock.get_workload("default", "db").await.is_ok());
        assert!(mock.get_workload("default", "db").await.unwrap_err().is_not_found());
        assert!(mock
            .delete_workload("default", "db", &options)
            .await
            .unwrap_err()
            .is_not_found());
    }
}
