use super::helper::{find_untolerated_taint, node_taints, pod_tolerations, tolerates_taint};
use crate::framework::{
    CycleState, FilterPlugin, NodeInfo, Plugin, PreScorePlugin, ScorePlugin, Status,
    MAX_NODE_SCORE,
};
use corral_core::k8s_openapi::api::core::v1::{Taint, Toleration};
use corral_core::Pod;
use std::sync::Arc;

const PRE_SCORE_STATE_KEY: &str = "PreScoreTaintToleration";

const EFFECT_NO_SCHEDULE: &str = "NoSchedule";
const EFFECT_NO_EXECUTE: &str = "NoExecute";
const EFFECT_PREFER_NO_SCHEDULE: &str = "PreferNoSchedule";

/// Tolerations that can match a PreferNoSchedule taint
struct PreScoreState {
    tolerations: Vec<Toleration>,
}

/// Keeps pods off nodes whose taints they do not tolerate, and prefers nodes
/// with fewer untolerated PreferNoSchedule taints
pub struct TaintToleration;

impl TaintToleration {
    pub const NAME: &'static str = "TaintToleration";
}

impl Plugin for TaintToleration {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn as_filter(self: Arc<Self>) -> Option<Arc<dyn FilterPlugin>> {
        Some(self)
    }

    fn as_pre_score(self: Arc<Self>) -> Option<Arc<dyn PreScorePlugin>> {
        Some(self)
    }

    fn as_score(self: Arc<Self>) -> Option<Arc<dyn ScorePlugin>> {
        Some(self)
    }
}

impl FilterPlugin for TaintToleration {
    fn filter(&self, _state: &CycleState, pod: &Pod, node_info: &NodeInfo) -> Status {
        let taints = node_taints(node_info.node());
        let hard = |t: &Taint| t.effect == EFFECT_NO_SCHEDULE || t.effect == EFFECT_NO_EXECUTE;
        match find_untolerated_taint(taints, pod_tolerations(pod), hard) {
            None => Status::success(),
            Some(taint) => Status::unresolvable(format!(
                "node(s) had untolerated taint {{{}: {}}}",
                taint.key,
                taint.value.as_deref().unwrap_or("")
            )),
        }
    }
}

impl PreScorePlugin for TaintToleration {
    fn pre_score(&self, state: &CycleState, pod: &Pod, _nodes: &[Arc<NodeInfo>]) -> Status {
        let tolerations = pod_tolerations(pod)
            .iter()
            .filter(|t| {
                let effect = t.effect.as_deref().unwrap_or("");
                effect.is_empty() || effect == EFFECT_PREFER_NO_SCHEDULE
            })
            .cloned()
            .collect();
        state.write(PRE_SCORE_STATE_KEY, PreScoreState { tolerations });
        Status::success()
    }
}

impl ScorePlugin for TaintToleration {
    fn score(&self, state: &CycleState, _pod: &Pod, node_info: &NodeInfo) -> Result<i64, Status> {
        let pre = state
            .read::<PreScoreState>(PRE_SCORE_STATE_KEY)
            .ok_or_else(|| Status::error(format!("reading {} from cycle state", PRE_SCORE_STATE_KEY)))?;

        let soft: Vec<&Taint> = node_taints(node_info.node())
            .iter()
            .filter(|t| t.effect == EFFECT_PREFER_NO_SCHEDULE)
            .collect();
        if soft.is_empty() {
            return Ok(MAX_NODE_SCORE);
        }

        let tolerated = soft
            .iter()
            .filter(|t| pre.tolerations.iter().any(|tol| tolerates_taint(tol, t)))
            .count() as i64;
        Ok(MAX_NODE_SCORE * tolerated / soft.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::{Code, Snapshot};
    use crate::test_util::{make_node, make_pod, with_taint};

    fn state() -> CycleState {
        CycleState::new(Arc::new(Snapshot::empty()))
    }

    #[test]
    fn test_filter_hard_taints() {
        let pod = make_pod("p", "default", "1", "1Gi");
        let tainted = NodeInfo::new(
            with_taint(make_node("n1", "4", "8Gi"), "dedicated", "db", EFFECT_NO_SCHEDULE),
            vec![],
        );
        let status = TaintToleration.filter(&state(), &pod, &tainted);
        assert_eq!(status.code(), Code::UnschedulableAndUnresolvable);
        assert_eq!(status.message(), "node(s) had untolerated taint {dedicated: db}");

        let soft = NodeInfo::new(
            with_taint(make_node("n2", "4", "8Gi"), "spot", "true", EFFECT_PREFER_NO_SCHEDULE),
            vec![],
        );
        assert!(TaintToleration.filter(&state(), &pod, &soft).is_success());

        let mut tolerant = pod.clone();
        tolerant.spec.as_mut().unwrap().tolerations = Some(vec![Toleration {
            key: Some("dedicated".to_string()),
            operator: Some("Equal".to_string()),
            value: Some("db".to_string()),
            effect: Some(EFFECT_NO_SCHEDULE.to_string()),
            ..Default::default()
        }]);
        assert!(TaintToleration.filter(&state(), &tolerant, &tainted).is_success());
    }

    #[test]
    fn test_score_prefers_fewer_soft_taints() {
        let pod = make_pod("p", "default", "1", "1Gi");
        let state = state();
        let clean = NodeInfo::new(make_node("n1", "4", "8Gi"), vec![]);
        let soft = NodeInfo::new(
            with_taint(make_node("n2", "4", "8Gi"), "spot", "true", EFFECT_PREFER_NO_SCHEDULE),
            vec![],
        );

        assert!(TaintToleration.score(&state, &pod, &clean).is_err());

        assert!(TaintToleration.pre_score(&state, &pod, &[]).is_success());
        assert_eq!(TaintToleration.score(&state, &pod, &clean).unwrap(), 100);
        assert_eq!(TaintToleration.score(&state, &pod, &soft).unwrap(), 0);

        let mut tolerant = pod.clone();
        tolerant.spec.as_mut().unwrap().tolerations = Some(vec![Toleration {
            key: Some("spot".to_string()),
            operator: Some("Exists".to_string()),
            ..Default::default()
        }]);
        let state = CycleState::new(Arc::new(Snapshot::empty()));
        TaintToleration.pre_score(&state, &tolerant, &[]);
        assert_eq!(TaintToleration.score(&state, &tolerant, &soft).unwrap(), 100);
    }
}
