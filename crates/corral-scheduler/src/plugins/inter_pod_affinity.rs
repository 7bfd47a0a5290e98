use super::helper::{label_selector_matches, labels};
use crate::framework::{
    CycleState, FilterPlugin, NodeInfo, Plugin, PreFilterPlugin, PreScorePlugin, ScorePlugin,
    Snapshot, Status, MAX_NODE_SCORE,
};
use corral_core::k8s_openapi::api::core::v1::{PodAffinityTerm, WeightedPodAffinityTerm};
use corral_core::Pod;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const PRE_FILTER_STATE_KEY: &str = "PreFilterInterPodAffinity";
const PRE_SCORE_STATE_KEY: &str = "PreScoreInterPodAffinity";

const ERR_REASON_EXISTING_ANTI_AFFINITY: &str =
    "node(s) didn't satisfy existing pods anti-affinity rules";
const ERR_REASON_ANTI_AFFINITY: &str = "node(s) didn't match pod anti-affinity rules";
const ERR_REASON_AFFINITY: &str = "node(s) didn't match pod affinity rules";

/// A `(topology key, label value)` pair identifying a topology domain
type TopologyPair = (String, String);

/// Enforces and scores pod affinity and anti-affinity between the incoming
/// pod and pods already placed, across topology domains defined by node labels
pub struct InterPodAffinity;

impl InterPodAffinity {
    pub const NAME: &'static str = "InterPodAffinity";
}

struct PreFilterState {
    /// Per required affinity term, domains holding at least one matching pod
    affinity_domains: Vec<HashSet<TopologyPair>>,
    /// Domains holding a pod matched by a required anti-affinity term
    anti_affinity_domains: HashSet<TopologyPair>,
    /// Domains where an existing pod's required anti-affinity rejects the incoming pod
    existing_anti_affinity_domains: HashSet<TopologyPair>,
}

struct PreScoreState {
    scores: HashMap<String, i64>,
}

fn pod_namespace(pod: &Pod) -> &str {
    pod.metadata.namespace.as_deref().unwrap_or("default")
}

/// Whether `term`, declared by a pod in `owner_namespace`, selects `candidate`
fn term_matches(term: &PodAffinityTerm, owner_namespace: &str, candidate: &Pod) -> bool {
    let namespace = pod_namespace(candidate);
    let all_namespaces = term
        .namespace_selector
        .as_ref()
        .is_some_and(|s| s.match_labels.is_none() && s.match_expressions.is_none());
    let namespaces = term.namespaces.as_deref().unwrap_or(&[]);
    let namespace_ok = if all_namespaces {
        true
    } else if namespaces.is_empty() {
        namespace == owner_namespace
    } else {
        namespaces.iter().any(|n| n == namespace)
    };

    namespace_ok
        && term
            .label_selector
            .as_ref()
            .is_some_and(|s| label_selector_matches(s, labels(&candidate.metadata)))
}

fn required_affinity_terms(pod: &Pod) -> &[PodAffinityTerm] {
    pod.spec
        .as_ref()
        .and_then(|s| s.affinity.as_ref())
        .and_then(|a| a.pod_affinity.as_ref())
        .and_then(|a| a.required_during_scheduling_ignored_during_execution.as_deref())
        .unwrap_or(&[])
}

fn required_anti_affinity_terms(pod: &Pod) -> &[PodAffinityTerm] {
    pod.spec
        .as_ref()
        .and_then(|s| s.affinity.as_ref())
        .and_then(|a| a.pod_anti_affinity.as_ref())
        .and_then(|a| a.required_during_scheduling_ignored_during_execution.as_deref())
        .unwrap_or(&[])
}

fn preferred_affinity_terms(pod: &Pod) -> &[WeightedPodAffinityTerm] {
    pod.spec
        .as_ref()
        .and_then(|s| s.affinity.as_ref())
        .and_then(|a| a.pod_affinity.as_ref())
        .and_then(|a| a.preferred_during_scheduling_ignored_during_execution.as_deref())
        .unwrap_or(&[])
}

fn preferred_anti_affinity_terms(pod: &Pod) -> &[WeightedPodAffinityTerm] {
    pod.spec
        .as_ref()
        .and_then(|s| s.affinity.as_ref())
        .and_then(|a| a.pod_anti_affinity.as_ref())
        .and_then(|a| a.preferred_during_scheduling_ignored_during_execution.as_deref())
        .unwrap_or(&[])
}

fn domain_of(node_info: &NodeInfo, topology_key: &str) -> Option<TopologyPair> {
    labels(&node_info.node().metadata)
        .get(topology_key)
        .map(|v| (topology_key.to_string(), v.clone()))
}

fn build_pre_filter_state(snapshot: &Snapshot, pod: &Pod) -> PreFilterState {
    let namespace = pod_namespace(pod);
    let affinity = required_affinity_terms(pod);
    let anti_affinity = required_anti_affinity_terms(pod);

    let mut state = PreFilterState {
        affinity_domains: vec![HashSet::new(); affinity.len()],
        anti_affinity_domains: HashSet::new(),
        existing_anti_affinity_domains: HashSet::new(),
    };

    for node_info in snapshot.list() {
        for existing in node_info.pods() {
            for (i, term) in affinity.iter().enumerate() {
                if term_matches(term, namespace, existing) {
                    if let Some(domain) = domain_of(node_info, &term.topology_key) {
                        state.affinity_domains[i].insert(domain);
                    }
                }
            }
            for term in anti_affinity {
                if term_matches(term, namespace, existing) {
                    if let Some(domain) = domain_of(node_info, &term.topology_key) {
                        state.anti_affinity_domains.insert(domain);
                    }
                }
            }
            for term in required_anti_affinity_terms(existing) {
                if term_matches(term, pod_namespace(existing), pod) {
                    if let Some(domain) = domain_of(node_info, &term.topology_key) {
                        state.existing_anti_affinity_domains.insert(domain);
                    }
                }
            }
        }
    }

    state
}

impl Plugin for InterPodAffinity {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn as_pre_filter(self: Arc<Self>) -> Option<Arc<dyn PreFilterPlugin>> {
        Some(self)
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

impl PreFilterPlugin for InterPodAffinity {
    fn pre_filter(&self, state: &CycleState, pod: &Pod) -> Status {
        let computed = build_pre_filter_state(state.snapshot(), pod);
        state.write(PRE_FILTER_STATE_KEY, computed);
        Status::success()
    }
}

impl FilterPlugin for InterPodAffinity {
    fn filter(&self, state: &CycleState, pod: &Pod, node_info: &NodeInfo) -> Status {
        let Some(pre) = state.read::<PreFilterState>(PRE_FILTER_STATE_KEY) else {
            return Status::error(format!("reading {} from cycle state", PRE_FILTER_STATE_KEY));
        };

        let node_labels = labels(&node_info.node().metadata);
        let in_existing_anti = node_labels
            .iter()
            .any(|(k, v)| pre.existing_anti_affinity_domains.contains(&(k.clone(), v.clone())));
        if in_existing_anti {
            return Status::unschedulable(ERR_REASON_EXISTING_ANTI_AFFINITY);
        }

        let in_anti = required_anti_affinity_terms(pod).iter().any(|term| {
            domain_of(node_info, &term.topology_key)
                .is_some_and(|d| pre.anti_affinity_domains.contains(&d))
        });
        if in_anti {
            return Status::unschedulable(ERR_REASON_ANTI_AFFINITY);
        }

        let terms = required_affinity_terms(pod);
        if terms.is_empty() {
            return Status::success();
        }

        let satisfied = terms.iter().zip(&pre.affinity_domains).all(|(term, domains)| {
            domain_of(node_info, &term.topology_key).is_some_and(|d| domains.contains(&d))
        });
        if satisfied {
            return Status::success();
        }

        // The first pod of a group that selects itself may go anywhere the
        // topology keys exist
        let no_matches_anywhere = pre.affinity_domains.iter().all(HashSet::is_empty);
        let self_matching = terms
            .iter()
            .all(|t| term_matches(t, pod_namespace(pod), pod));
        let has_keys = terms
            .iter()
            .all(|t| node_labels.contains_key(&t.topology_key));
        if no_matches_anywhere && self_matching && has_keys {
            return Status::success();
        }

        Status::unresolvable(ERR_REASON_AFFINITY)
    }
}

impl PreScorePlugin for InterPodAffinity {
    fn pre_score(&self, state: &CycleState, pod: &Pod, nodes: &[Arc<NodeInfo>]) -> Status {
        let namespace = pod_namespace(pod);
        let affinity = preferred_affinity_terms(pod);
        let anti_affinity = preferred_anti_affinity_terms(pod);

        let mut domain_scores: HashMap<TopologyPair, i64> = HashMap::new();
        let mut add = |node_info: &NodeInfo, term: &WeightedPodAffinityTerm, sign: i64| {
            if let Some(domain) = domain_of(node_info, &term.pod_affinity_term.topology_key) {
                *domain_scores.entry(domain).or_insert(0) += sign * i64::from(term.weight);
            }
        };

        for node_info in state.snapshot().list() {
            for existing in node_info.pods() {
                for term in affinity {
                    if term_matches(&term.pod_affinity_term, namespace, existing) {
                        add(node_info, term, 1);
                    }
                }
                for term in anti_affinity {
                    if term_matches(&term.pod_affinity_term, namespace, existing) {
                        add(node_info, term, -1);
                    }
                }
                let existing_ns = pod_namespace(existing);
                for term in preferred_affinity_terms(existing) {
                    if term_matches(&term.pod_affinity_term, existing_ns, pod) {
                        add(node_info, term, 1);
                    }
                }
                for term in preferred_anti_affinity_terms(existing) {
                    if term_matches(&term.pod_affinity_term, existing_ns, pod) {
                        add(node_info, term, -1);
                    }
                }
            }
        }

        let raw: Vec<(String, i64)> = nodes
            .iter()
            .map(|n| {
                let total = labels(&n.node().metadata)
                    .iter()
                    .filter_map(|(k, v)| domain_scores.get(&(k.clone(), v.clone())))
                    .sum::<i64>();
                (n.name().to_string(), total)
            })
            .collect();

        let max = raw.iter().map(|(_, s)| *s).max().unwrap_or(0);
        let min = raw.iter().map(|(_, s)| *s).min().unwrap_or(0);
        let spread = max - min;
        let scores = raw
            .into_iter()
            .map(|(name, s)| {
                let normalized = if spread > 0 {
                    MAX_NODE_SCORE * (s - min) / spread
                } else {
                    0
                };
                (name, normalized)
            })
            .collect();

        state.write(PRE_SCORE_STATE_KEY, PreScoreState { scores });
        Status::success()
    }
}

impl ScorePlugin for InterPodAffinity {
    fn score(&self, state: &CycleState, _pod: &Pod, node_info: &NodeInfo) -> Result<i64, Status> {
        let pre = state
            .read::<PreScoreState>(PRE_SCORE_STATE_KEY)
            .ok_or_else(|| Status::error(format!("reading {} from cycle state", PRE_SCORE_STATE_KEY)))?;
        Ok(pre.scores.get(node_info.name()).copied().unwrap_or(0))
    }
}
