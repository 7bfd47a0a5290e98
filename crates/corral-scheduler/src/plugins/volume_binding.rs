use crate::framework::{Code, CycleState, FilterPlugin, FrameworkHandle, NodeInfo, Plugin, Status};
use corral_core::Pod;
use std::sync::Arc;

/// Asks the volume binder whether the pod's persistent volume claims can be
/// satisfied on the node
pub struct VolumeBinding {
    handle: Arc<FrameworkHandle>,
}

impl VolumeBinding {
    pub const NAME: &'static str = "VolumeBinding";

    pub fn new(handle: Arc<FrameworkHandle>) -> Self {
        Self { handle }
    }
}

fn has_claims(pod: &Pod) -> bool {
    pod.spec
        .as_ref()
        .and_then(|s| s.volumes.as_ref())
        .is_some_and(|volumes| volumes.iter().any(|v| v.persistent_volume_claim.is_some()))
}

impl Plugin for VolumeBinding {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn as_filter(self: Arc<Self>) -> Option<Arc<dyn FilterPlugin>> {
        Some(self)
    }
}

impl FilterPlugin for VolumeBinding {
    fn filter(&self, _state: &CycleState, pod: &Pod, node_info: &NodeInfo) -> Status {
        if !has_claims(pod) {
            return Status::success();
        }

        match self.handle.volume_binder().find_pod_volumes(pod, node_info.node()) {
            Ok(reasons) if reasons.is_empty() => Status::success(),
            Ok(reasons) => Status::with_reasons(Code::UnschedulableAndUnresolvable, reasons),
            Err(e) => Status::error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::VolumeBinder;
    use crate::framework::Snapshot;
    use crate::mock::MockOrchestrator;
    use crate::test_util::{make_node, make_pod};
    use corral_core::k8s_openapi::api::core::v1::{PersistentVolumeClaimVolumeSource, Volume};
    use corral_core::{node_name, CorralError, Node};

    struct ZoneBinder;

    impl VolumeBinder for ZoneBinder {
        fn find_pod_volumes(&self, _pod: &Pod, node: &Node) -> corral_core::Result<Vec<String>> {
            match node_name(node) {
                "n1" => Ok(vec![]),
                "n2" => Ok(vec!["node(s) had volume node affinity conflict".to_string()]),
                _ => Err(CorralError::internal_error("claim lookup failed")),
            }
        }
    }

    #[test]
    fn test_delegates_to_binder() {
        let handle = Arc::new(FrameworkHandle::new(
            Arc::new(MockOrchestrator::new()),
            Arc::new(Snapshot::empty()),
            Arc::new(ZoneBinder),
        ));
        let plugin = VolumeBinding::new(handle);
        let state = CycleState::new(Arc::new(Snapshot::empty()));

        let mut pod = make_pod("p", "default", "1", "1Gi");
        let n3 = NodeInfo::new(make_node("n3", "4", "8Gi"), vec![]);
        assert!(plugin.filter(&state, &pod, &n3).is_success());

        pod.spec.as_mut().unwrap().volumes = Some(vec![Volume {
            name: "data".to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: "data".to_string(),
                read_only: None,
            }),
            ..Default::default()
        }]);

        let n1 = NodeInfo::new(make_node("n1", "4", "8Gi"), vec![]);
        let n2 = NodeInfo::new(make_node("n2", "4", "8Gi"), vec![]);
        assert!(plugin.filter(&state, &pod, &n1).is_success());
        assert_eq!(
            plugin.filter(&state, &pod, &n2).code(),
            Code::UnschedulableAndUnresolvable
        );
        assert_eq!(plugin.filter(&state, &pod, &n3).code(), Code::Error);
    }
}
