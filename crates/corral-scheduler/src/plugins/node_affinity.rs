use super::helper::{labels, node_matches_any_term, node_selector_term_matches};
use crate::framework::{
    CycleState, FilterPlugin, NodeInfo, Plugin, ScorePlugin, Status, MAX_NODE_SCORE,
};
use corral_core::k8s_openapi::api::core::v1::NodeAffinity as NodeAffinitySpec;
use corral_core::{Node, Pod};
use std::sync::Arc;

const ERR_REASON: &str = "node(s) didn't match Pod's node affinity/selector";

/// Enforces `nodeSelector` and required node affinity, and scores preferred
/// node affinity terms
pub struct NodeAffinity;

impl NodeAffinity {
    pub const NAME: &'static str = "NodeAffinity";
}

fn node_affinity(pod: &Pod) -> Option<&NodeAffinitySpec> {
    pod.spec
        .as_ref()
        .and_then(|s| s.affinity.as_ref())
        .and_then(|a| a.node_affinity.as_ref())
}

/// Whether the node satisfies the pod's node selector and required affinity
pub fn pod_matches_node(pod: &Pod, node: &Node) -> bool {
    let node_labels = labels(&node.metadata);
    let selector_ok = pod
        .spec
        .as_ref()
        .and_then(|s| s.node_selector.as_ref())
        .into_iter()
        .flatten()
        .all(|(k, v)| node_labels.get(k) == Some(v));
    if !selector_ok {
        return false;
    }

    match node_affinity(pod).and_then(|a| a.required_during_scheduling_ignored_during_execution.as_ref()) {
        Some(required) => node_matches_any_term(&required.node_selector_terms, node),
        None => true,
    }
}

impl Plugin for NodeAffinity {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn as_filter(self: Arc<Self>) -> Option<Arc<dyn FilterPlugin>> {
        Some(self)
    }

    fn as_score(self: Arc<Self>) -> Option<Arc<dyn ScorePlugin>> {
        Some(self)
    }
}

impl FilterPlugin for NodeAffinity {
    fn filter(&self, _state: &CycleState, pod: &Pod, node_info: &NodeInfo) -> Status {
        if pod_matches_node(pod, node_info.node()) {
            Status::success()
        } else {
            Status::unresolvable(ERR_REASON)
        }
    }
}

impl ScorePlugin for NodeAffinity {
    fn score(&self, _state: &CycleState, pod: &Pod, node_info: &NodeInfo) -> Result<i64, Status> {
        let preferred = node_affinity(pod)
            .and_then(|a| a.preferred_during_scheduling_ignored_during_execution.as_deref())
            .unwrap_or(&[]);

        let total: i64 = preferred.iter().map(|p| i64::from(p.weight.max(0))).sum();
        if total == 0 {
            return Ok(0);
        }

        let matched: i64 = preferred
            .iter()
            .filter(|p| node_selector_term_matches(&p.preference, node_info.node()))
            .map(|p| i64::from(p.weight.max(0)))
            .sum();
        Ok(MAX_NODE_SCORE * matched / total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::Snapshot;
    use crate::test_util::{make_node, make_pod, with_labels};
    use corral_core::k8s_openapi::api::core::v1::{
        Affinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm, PreferredSchedulingTerm,
    };
    use std::collections::BTreeMap;

    fn term(key: &str, value: &str) -> NodeSelectorTerm {
        NodeSelectorTerm {
            match_expressions: Some(vec![NodeSelectorRequirement {
                key: key.to_string(),
                operator: "In".to_string(),
                values: Some(vec![value.to_string()]),
            }]),
            match_fields: None,
        }
    }

    fn state() -> CycleState {
        CycleState::new(Arc::new(Snapshot::empty()))
    }

    #[test]
    fn test_node_selector() {
        let ssd = NodeInfo::new(with_labels(make_node("n1", "4", "8Gi"), &[("disk", "ssd")]), vec![]);
        let hdd = NodeInfo::new(with_labels(make_node("n2", "4", "8Gi"), &[("disk", "hdd")]), vec![]);

        let mut pod = make_pod("p", "default", "1", "1Gi");
        pod.spec.as_mut().unwrap().node_selector =
            Some(BTreeMap::from([("disk".to_string(), "ssd".to_string())]));

        assert!(NodeAffinity.filter(&state(), &pod, &ssd).is_success());
        assert!(NodeAffinity.filter(&state(), &pod, &hdd).is_unschedulable());
    }

    #[test]
    fn test_required_and_preferred_affinity() {
        let zone_a = NodeInfo::new(
            with_labels(make_node("n1", "4", "8Gi"), &[("zone", "a"), ("gpu", "yes")]),
            vec![],
        );
        let zone_b = NodeInfo::new(with_labels(make_node("n2", "4", "8Gi"), &[("zone", "b")]), vec![]);

        let mut pod = make_pod("p", "default", "1", "1Gi");
        pod.spec.as_mut().unwrap().affinity = Some(Affinity {
            node_affinity: Some(NodeAffinitySpec {
                required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                    node_selector_terms: vec![term("zone", "a"), term("zone", "b")],
                }),
                preferred_during_scheduling_ignored_during_execution: Some(vec![
                    PreferredSchedulingTerm {
                        weight: 3,
                        preference: term("zone", "a"),
                    },
                    PreferredSchedulingTerm {
                        weight: 1,
                        preference: term("gpu", "yes"),
                    },
                ]),
            }),
            ..Default::default()
        });

        assert!(NodeAffinity.filter(&state(), &pod, &zone_a).is_success());
        assert!(NodeAffinity.filter(&state(), &pod, &zone_b).is_success());
        assert_eq!(NodeAffinity.score(&state(), &pod, &zone_a).unwrap(), 100);
        assert_eq!(NodeAffinity.score(&state(), &pod, &zone_b).unwrap(), 0);

        let plain = make_pod("q", "default", "1", "1Gi");
        assert_eq!(NodeAffinity.score(&state(), &plain, &zone_a).unwrap(), 0);
    }
}
