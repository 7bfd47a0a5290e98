use crate::cluster::{ClusterStateProvider, OrchestratorApi, VolumeBinder};
use crate::error::{Result, SchedulerError};
use crate::framework::{
    CycleState, Framework, FrameworkHandle, NodeInfo, PluginSet, PluginToStatus, Registry,
    Snapshot, DEFAULT_USAGE_RESET_THRESHOLD,
};
use crate::plugins::NodeResourcesFit;
use crate::preemption::{select_victim, PreemptionSettings};
use crate::retry::RetryConfig;
use crate::types::{NodeScore, ScheduleResult};
use corral_core::{pod_can_preempt, pod_priority, Pod, WorkloadKey};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Share of nodes (percent) to find before stopping in sampled mode
    pub sampling_percentage: u32,
    /// Clusters with more nodes than this are sampled instead of fully evaluated
    pub large_cluster_threshold: usize,
    /// Placement count after which node usage counters start over
    pub usage_reset_threshold: u64,
    /// Fixed seed for shuffling and tie-breaks; random when unset
    pub seed: Option<u64>,
    /// Never nominate victims
    pub disable_preemption: bool,
    pub preemption: PreemptionSettings,
    pub retry: RetryConfig,
    /// Plugins enabled at each extension point
    pub plugins: PluginSet,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            sampling_percentage: 10,
            large_cluster_threshold: 50,
            usage_reset_threshold: DEFAULT_USAGE_RESET_THRESHOLD,
            seed: None,
            disable_preemption: false,
            preemption: PreemptionSettings::default(),
            retry: RetryConfig::default(),
            plugins: PluginSet::default(),
        }
    }
}

/// Decides where a workload should run, or which workload must make room for it
pub struct Scheduler {
    framework: Arc<Framework>,
    cluster: Arc<dyn ClusterStateProvider>,
    settings: SchedulerSettings,
    rng: Mutex<Pcg64>,
}

type Admission = fn(&PluginToStatus) -> bool;

fn fits(statuses: &PluginToStatus) -> bool {
    statuses.is_empty()
}

/// A node can be freed by eviction only when resource fit is its sole problem
pub fn is_preemption_candidate(statuses: &PluginToStatus) -> bool {
    statuses.len() == 1
        && statuses
            .get(NodeResourcesFit::NAME)
            .is_some_and(|s| s.is_unschedulable())
}

/// Pick the highest scoring node, breaking ties uniformly at random
pub fn select_host(rng: &mut impl Rng, mut scores: Vec<NodeScore>) -> Option<String> {
    scores.sort_by(|a, b| b.score.cmp(&a.score));
    let top = scores.first()?.score;
    let ties = scores.iter().take_while(|s| s.score == top).count();
    let index = if ties == 1 {
        0
    } else {
        rng.random_range(0..ties)
    };
    Some(scores.swap_remove(index).name)
}

impl Scheduler {
    /// Create a scheduler around an existing framework
    pub fn new(
        framework: Arc<Framework>,
        cluster: Arc<dyn ClusterStateProvider>,
        settings: SchedulerSettings,
    ) -> Self {
        let rng = match settings.seed {
            Some(seed) => Pcg64::seed_from_u64(seed),
            None => Pcg64::from_rng(&mut rand::rng()),
        };
        Self {
            framework,
            cluster,
            settings,
            rng: Mutex::new(rng),
        }
    }

    /// Build the framework from a registry and the configured plugin set, then
    /// create the scheduler
    pub fn build(
        registry: &Registry,
        client: Arc<dyn OrchestratorApi>,
        cluster: Arc<dyn ClusterStateProvider>,
        volume_binder: Arc<dyn VolumeBinder>,
        settings: SchedulerSettings,
    ) -> Result<Self> {
        let handle = Arc::new(
            FrameworkHandle::new(client, Arc::new(Snapshot::empty()), volume_binder)
                .with_usage_reset_threshold(settings.usage_reset_threshold),
        );
        let framework = Framework::with_plugins(registry, handle, &settings.plugins)?;
        Ok(Self::new(Arc::new(framework), cluster, settings))
    }

    pub fn framework(&self) -> &Arc<Framework> {
        &self.framework
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Run one scheduling attempt for `pod`.
    ///
    /// Returns the chosen host, or a host plus a victim when the pod only fits
    /// after an eviction. Fails with an unschedulable error when neither is
    /// possible.
    pub async fn schedule(&self, pod: &Pod) -> Result<ScheduleResult> {
        let key = WorkloadKey::from_pod(pod)?;
        let snapshot = Arc::new(self.cluster.build_snapshot());
        self.framework.handle().set_snapshot(snapshot.clone());

        if snapshot.is_empty() {
            return Err(SchedulerError::unschedulable(key.to_string(), "no nodes available"));
        }

        let pod = Arc::new(pod.clone());
        let mut nodes = snapshot.list().to_vec();
        let target = if nodes.len() > self.settings.large_cluster_threshold {
            nodes.shuffle(&mut *self.rng.lock());
            Some(self.sample_size(nodes.len()))
        } else {
            None
        };

        let viable = self.evaluate_nodes(&snapshot, &pod, &nodes, target, fits).await;
        debug!(
            pod = %key,
            nodes = nodes.len(),
            viable = viable.len(),
            sampled = target.is_some(),
            "Filtered nodes"
        );

        if viable.is_empty() {
            return self.find_preemption(&key, &snapshot, &pod, &nodes, target).await;
        }

        let scores = self.prioritize_nodes(&snapshot, &pod, &viable).await?;
        let host = {
            let mut rng = self.rng.lock();
            select_host(&mut *rng, scores)
        }
        .ok_or_else(|| SchedulerError::internal_error("no score produced for viable nodes"))?;

        let handle = self.framework.handle().clone();
        let chosen = host.clone();
        tokio::spawn(async move { handle.increase_node_usage_factor(&chosen) });

        info!(pod = %key, node = %host, "Selected node");
        Ok(ScheduleResult::bind(host))
    }

    fn sample_size(&self, total: usize) -> usize {
        let percentage = self.settings.sampling_percentage.clamp(1, 100) as usize;
        (total * percentage).div_ceil(100).max(1)
    }

    /// Run PreFilter and Filter for every candidate in its own task and keep
    /// those the admission predicate accepts.
    ///
    /// With a target, candidates are drawn from the end of `nodes` in batches
    /// of twice the target and collection stops once the target is reached.
    /// Without one, every node is evaluated and the result keeps the order of
    /// `nodes`.
    async fn evaluate_nodes(
        &self,
        snapshot: &Arc<Snapshot>,
        pod: &Arc<Pod>,
        nodes: &[Arc<NodeInfo>],
        target: Option<usize>,
        admit: Admission,
    ) -> Vec<Arc<NodeInfo>> {
        let Some(target) = target else {
            let (tx, mut rx) = mpsc::unbounded_channel();
            for (index, node) in nodes.iter().enumerate() {
                self.spawn_evaluation(&tx, snapshot, pod, index, node.clone(), admit);
            }
            drop(tx);

            let mut admitted = Vec::new();
            while let Some((index, node, ok)) = rx.recv().await {
                if ok {
                    admitted.push((index, node));
                }
            }
            admitted.sort_by_key(|(index, _)| *index);
            return admitted.into_iter().map(|(_, node)| node).collect();
        };

        let mut pool: Vec<(usize, Arc<NodeInfo>)> = nodes.iter().cloned().enumerate().collect();
        let mut admitted = Vec::with_capacity(target);
        while admitted.len() < target && !pool.is_empty() {
            let batch = pool.split_off(pool.len().saturating_sub(target * 2));
            let (tx, mut rx) = mpsc::unbounded_channel();
            for (index, node) in batch {
                self.spawn_evaluation(&tx, snapshot, pod, index, node, admit);
            }
            drop(tx);

            // Tasks still running after the target is reached finish on their
            // own; their results are dropped with the channel.
            while let Some((_, node, ok)) = rx.recv().await {
                if ok {
                    admitted.push(node);
                    if admitted.len() >= target {
                        break;
                    }
                }
            }
        }
        admitted
    }

    fn spawn_evaluation(
        &self,
        tx: &mpsc::UnboundedSender<(usize, Arc<NodeInfo>, bool)>,
        snapshot: &Arc<Snapshot>,
        pod: &Arc<Pod>,
        index: usize,
        node: Arc<NodeInfo>,
        admit: Admission,
    ) {
        let framework = self.framework.clone();
        let snapshot = snapshot.clone();
        let pod = pod.clone();
        let tx = tx.clone();

        tokio::spawn(async move {
            let state = CycleState::new(snapshot);
            let pre = framework.run_pre_filter_plugins(&state, &pod);
            let ok = if pre.is_success() {
                let statuses = framework.run_filter_plugins(&state, &pod, &node);
                if !statuses.is_empty() {
                    debug!(node = node.name(), "Node rejected: {:?}", statuses);
                }
                admit(&statuses)
            } else {
                false
            };
            let _ = tx.send((index, node, ok));
        });
    }

    async fn prioritize_nodes(
        &self,
        snapshot: &Arc<Snapshot>,
        pod: &Arc<Pod>,
        nodes: &[Arc<NodeInfo>],
    ) -> Result<Vec<NodeScore>> {
        let state = Arc::new(CycleState::new(snapshot.clone()));

        let status = self.framework.run_pre_score_plugins(&state, pod, nodes);
        if !status.is_success() {
            return Err(SchedulerError::plugin_error(status.message()));
        }

        let per_plugin = self
            .framework
            .run_score_plugins(state, pod.clone(), nodes)
            .await
            .map_err(|status| SchedulerError::plugin_error(status.message()))?;

        let mut totals: Vec<NodeScore> = nodes
            .iter()
            .map(|n| NodeScore {
                name: n.name().to_string(),
                score: 0,
            })
            .collect();
        for scores in per_plugin.values() {
            for (total, score) in totals.iter_mut().zip(scores) {
                total.score += score.score;
            }
        }

        Ok(totals)
    }

    async fn find_preemption(
        &self,
        key: &WorkloadKey,
        snapshot: &Arc<Snapshot>,
        pod: &Arc<Pod>,
        nodes: &[Arc<NodeInfo>],
        target: Option<usize>,
    ) -> Result<ScheduleResult> {
        let unschedulable = |why: &str| {
            SchedulerError::unschedulable(
                key.to_string(),
                format!("0/{} nodes are available: {}", nodes.len(), why),
            )
        };

        if self.settings.disable_preemption {
            return Err(unschedulable("preemption is disabled"));
        }
        if pod_priority(pod) == 0 {
            return Err(unschedulable("no schedulable node and pod has no priority to preempt with"));
        }
        if !pod_can_preempt(pod) {
            return Err(unschedulable("no schedulable node and pod preemption policy is Never"));
        }

        let candidates = self
            .evaluate_nodes(snapshot, pod, nodes, target, is_preemption_candidate)
            .await;
        if candidates.is_empty() {
            return Err(SchedulerError::preemption_exhausted(
                key.to_string(),
                "no node is rejected by resource fit alone",
            ));
        }

        for node in &candidates {
            if let Some(victim) = select_victim(node, pod) {
                let victim_key = WorkloadKey::from_pod(&victim)
                    .map(|k| k.to_string())
                    .unwrap_or_default();
                info!(pod = %key, node = node.name(), victim = %victim_key, "Nominated preemption victim");
                return Ok(ScheduleResult::preempt(node.name(), victim));
            }
        }

        warn!(pod = %key, candidates = candidates.len(), "No eligible preemption victim");
        Err(SchedulerError::preemption_exhausted(
            key.to_string(),
            format!("no eligible victim on {} candidate node(s)", candidates.len()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::PermissiveVolumeBinder;
    use crate::framework::{FilterPlugin, Plugin, PluginConfig, Status};
    use crate::mock::MockOrchestrator;
    use crate::plugins::{
        in_tree_registry, ImageLocality, InterPodAffinity, NodeAffinity, RepeatPriority, ResourcePriority,
        TaintToleration,
    };
    use crate::test_util::{
        condition, make_node, make_pod, running_on, with_image, with_priority, with_taint,
    };
    use corral_core::PREEMPTION_CONDITION;
    use std::collections::HashMap;

    /// Rejects every node whose name starts with the prefix
    struct RejectPrefix(&'static str);

    impl Plugin for RejectPrefix {
        fn name(&self) -> &str {
            "RejectPrefix"
        }
        fn as_filter(self: Arc<Self>) -> Option<Arc<dyn FilterPlugin>> {
            Some(self)
        }
    }

    impl FilterPlugin for RejectPrefix {
        fn filter(&self, _: &CycleState, _: &Pod, node: &NodeInfo) -> Status {
            if node.name().starts_with(self.0) {
                Status::unschedulable("rejected by prefix")
            } else {
                Status::success()
            }
        }
    }

    fn resources_only() -> PluginSet {
        PluginSet {
            pre_filter: vec![PluginConfig::new(NodeResourcesFit::NAME)],
            filter: vec![PluginConfig::new(NodeResourcesFit::NAME)],
            ..PluginSet::empty()
        }
    }

    fn scheduler(mock: &Arc<MockOrchestrator>, settings: SchedulerSettings) -> Scheduler {
        scheduler_with(in_tree_registry(), mock, settings)
    }

    fn scheduler_with(registry: Registry, mock: &Arc<MockOrchestrator>, settings: SchedulerSettings) -> Scheduler {
        Scheduler::build(
            &registry,
            mock.clone(),
            mock.clone(),
            Arc::new(PermissiveVolumeBinder),
            settings,
        )
        .unwrap()
    }

    fn seeded(plugins: PluginSet) -> SchedulerSettings {
        SchedulerSettings {
            seed: Some(42),
            plugins,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_schedules_onto_fitting_node() {
        let mock = Arc::new(MockOrchestrator::new());
        mock.add_node(make_node("small", "1", "1Gi"));
        mock.add_node(make_node("large", "8", "16Gi"));

        let s = scheduler(&mock, seeded(PluginSet::default()));
        let result = s.schedule(&make_pod("web", "default", "2", "4Gi")).await.unwrap();
        assert_eq!(result.suggested_host, "large");
        assert!(!result.requires_preemption());
    }

    #[tokio::test]
    async fn test_no_nodes_is_unschedulable() {
        let mock = Arc::new(MockOrchestrator::new());
        let s = scheduler(&mock, seeded(PluginSet::default()));
        let err = s.schedule(&make_pod("web", "default", "1", "1Gi")).await.unwrap_err();
        assert!(err.is_unschedulable());
    }

    #[tokio::test]
    async fn test_tainted_single_node_priority_zero() {
        let mock = Arc::new(MockOrchestrator::new());
        mock.add_node(with_taint(make_node("n1", "4", "8Gi"), "dedicated", "db", "NoSchedule"));
        mock.add_pod(running_on(make_pod("low", "default", "1", "1Gi"), "n1")).unwrap();

        let s = scheduler(&mock, seeded(PluginSet::default()));
        let err = s.schedule(&make_pod("web", "default", "1", "1Gi")).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Unschedulable { .. }));
        assert!(mock.deletions().is_empty());
    }

    #[tokio::test]
    async fn test_three_node_memory_scenario() {
        let mock = Arc::new(MockOrchestrator::new());
        mock.add_node(make_node("a", "4", "1Gi"));
        mock.add_node(make_node("b", "4", "4Gi"));
        mock.add_node(make_node("c", "4", "4Gi"));

        let s = scheduler(&mock, seeded(resources_only()));
        let pod = make_pod("web", "default", "", "2Gi");
        let mut counts: HashMap<String, u32> = HashMap::new();
        for _ in 0..400 {
            let result = s.schedule(&pod).await.unwrap();
            *counts.entry(result.suggested_host).or_insert(0) += 1;
        }

        assert!(!counts.contains_key("a"));
        assert!(counts["b"] > 140, "b chosen {} times", counts["b"]);
        assert!(counts["c"] > 140, "c chosen {} times", counts["c"]);
    }

    #[test]
    fn test_tie_break_uniformity() {
        let mut rng = Pcg64::seed_from_u64(7);
        let scores = |names: &[&str], best: i64| -> Vec<NodeScore> {
            names
                .iter()
                .enumerate()
                .map(|(i, n)| NodeScore {
                    name: n.to_string(),
                    score: if i < 4 { best } else { best - 1 },
                })
                .collect()
        };

        let mut counts: HashMap<String, u32> = HashMap::new();
        let trials = 20_000;
        for _ in 0..trials {
            let host = select_host(&mut rng, scores(&["n1", "n2", "n3", "n4", "n5"], 300)).unwrap();
            *counts.entry(host).or_insert(0) += 1;
        }

        assert!(!counts.contains_key("n5"));
        for name in ["n1", "n2", "n3", "n4"] {
            let share = f64::from(counts[name]) / f64::from(trials);
            assert!((0.22..0.28).contains(&share), "{} share {}", name, share);
        }
    }

    #[test]
    fn test_strict_leader_wins() {
        let mut rng = Pcg64::seed_from_u64(1);
        let scores = vec![
            NodeScore { name: "a".to_string(), score: 10 },
            NodeScore { name: "b".to_string(), score: 30 },
            NodeScore { name: "c".to_string(), score: 20 },
        ];
        assert_eq!(select_host(&mut rng, scores).as_deref(), Some("b"));
        assert_eq!(select_host(&mut rng, vec![]), None);
    }

    #[tokio::test]
    async fn test_filter_monotonicity() {
        let mock = Arc::new(MockOrchestrator::new());
        for i in 0..10 {
            mock.add_node(make_node(&format!("node-{}", i), "4", "8Gi"));
            mock.add_node(make_node(&format!("edge-{}", i), "4", "8Gi"));
        }
        let pod = Arc::new(make_pod("web", "default", "1", "1Gi"));

        let base = scheduler(&mock, seeded(resources_only()));
        let snapshot = Arc::new(mock.build_snapshot());
        let all = base
            .evaluate_nodes(&snapshot, &pod, snapshot.list(), None, fits)
            .await;

        let mut registry = in_tree_registry();
        registry
            .register("RejectPrefix", |_| Ok(Arc::new(RejectPrefix("edge")) as Arc<dyn Plugin>))
            .unwrap();
        let mut plugins = resources_only();
        plugins.filter.push(PluginConfig::new("RejectPrefix"));
        let stricter = scheduler_with(registry, &mock, seeded(plugins));
        let fewer = stricter
            .evaluate_nodes(&snapshot, &pod, snapshot.list(), None, fits)
            .await;

        assert_eq!(all.len(), 20);
        assert_eq!(fewer.len(), 10);
        assert!(fewer.iter().all(|n| all.iter().any(|m| m.name() == n.name())));
    }

    #[tokio::test]
    async fn test_sampling_large_cluster() {
        let mock = Arc::new(MockOrchestrator::new());
        for i in 0..100 {
            mock.add_node(make_node(&format!("node-{:03}", i), "4", "8Gi"));
        }
        let s = scheduler(&mock, seeded(resources_only()));
        assert_eq!(s.sample_size(100), 10);
        assert_eq!(s.sample_size(51), 6);

        let snapshot = Arc::new(mock.build_snapshot());
        let pod = Arc::new(make_pod("web", "default", "1", "1Gi"));
        let viable = s
            .evaluate_nodes(&snapshot, &pod, snapshot.list(), Some(10), fits)
            .await;
        assert_eq!(viable.len(), 10);

        assert!(s.schedule(&pod).await.is_ok());
    }

    #[tokio::test]
    async fn test_sampling_drains_pool_when_few_fit() {
        let mock = Arc::new(MockOrchestrator::new());
        for i in 0..97 {
            mock.add_node(make_node(&format!("tiny-{:03}", i), "1", "512Mi"));
        }
        for name in ["big-a", "big-b", "big-c"] {
            mock.add_node(make_node(name, "8", "16Gi"));
        }

        let s = scheduler(&mock, seeded(resources_only()));
        let snapshot = Arc::new(mock.build_snapshot());
        let pod = Arc::new(make_pod("web", "default", "2", "4Gi"));
        let viable = s
            .evaluate_nodes(&snapshot, &pod, snapshot.list(), Some(10), fits)
            .await;

        let mut names: Vec<_> = viable.iter().map(|n| n.name().to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["big-a", "big-b", "big-c"]);
    }

    fn preemption_cluster() -> Arc<MockOrchestrator> {
        let mock = Arc::new(MockOrchestrator::new());
        mock.add_node(make_node("n1", "4", "4Gi"));
        mock.add_node(with_taint(make_node("n2", "4", "4Gi"), "dedicated", "db", "NoSchedule"));
        mock.add_node(make_node("n3", "4", "4Gi"));

        let pods = [
            ("mid", "n1", 50, "3Gi"),
            ("low", "n1", 10, "3Gi"),
            ("other", "n2", 0, "3Gi"),
            ("busy", "n3", 10, "3Gi"),
        ];
        for (name, node, priority, memory) in pods {
            let pod = with_priority(make_pod(name, "default", "", memory), priority);
            mock.add_pod(running_on(pod, node)).unwrap();
        }
        mock
    }

    #[tokio::test]
    async fn test_preemption_nominates_lowest_priority_victim() {
        let mock = preemption_cluster();
        let s = scheduler(&mock, seeded(PluginSet::default()));
        let preemptor = with_priority(make_pod("urgent", "default", "", "2Gi"), 100);

        let result = s.schedule(&preemptor).await.unwrap();
        assert_eq!(result.suggested_host, "n1");
        let victim = result.nominated_victim.unwrap();
        assert_eq!(victim.metadata.name.as_deref(), Some("low"));

        // Same state, same answer
        for _ in 0..5 {
            let again = s.schedule(&preemptor).await.unwrap();
            assert_eq!(again.suggested_host, "n1");
            assert_eq!(
                again.nominated_victim.unwrap().metadata.name.as_deref(),
                Some("low")
            );
        }
    }

    #[tokio::test]
    async fn test_preemption_gated_by_priority_and_policy() {
        let mock = preemption_cluster();
        let s = scheduler(&mock, seeded(PluginSet::default()));

        let zero = make_pod("zero", "default", "", "2Gi");
        assert!(matches!(
            s.schedule(&zero).await.unwrap_err(),
            SchedulerError::Unschedulable { .. }
        ));

        let mut never = with_priority(make_pod("never", "default", "", "2Gi"), 100);
        never.spec.as_mut().unwrap().preemption_policy = Some("Never".to_string());
        assert!(matches!(
            s.schedule(&never).await.unwrap_err(),
            SchedulerError::Unschedulable { .. }
        ));

        let disabled = scheduler(
            &mock,
            SchedulerSettings {
                disable_preemption: true,
                ..seeded(PluginSet::default())
            },
        );
        let urgent = with_priority(make_pod("urgent", "default", "", "2Gi"), 100);
        assert!(disabled.schedule(&urgent).await.unwrap_err().is_unschedulable());
    }

    #[tokio::test]
    async fn test_preemption_exhausted_when_no_victim_qualifies() {
        let mock = preemption_cluster();
        let s = scheduler(&mock, seeded(PluginSet::default()));

        // Other namespace: no victims are in "prod"
        let foreign = with_priority(make_pod("urgent", "prod", "", "2Gi"), 100);
        assert!(matches!(
            s.schedule(&foreign).await.unwrap_err(),
            SchedulerError::PreemptionExhausted { .. }
        ));

        // Too large for any single eviction
        let huge = with_priority(make_pod("huge", "default", "", "16Gi"), 100);
        assert!(matches!(
            s.schedule(&huge).await.unwrap_err(),
            SchedulerError::PreemptionExhausted { .. }
        ));
    }

    #[tokio::test]
    async fn test_reservation_visible_to_next_attempt() {
        let mock = preemption_cluster();
        let mut n1 = mock.node("n1").unwrap();
        n1.status
            .as_mut()
            .unwrap()
            .conditions
            .as_mut()
            .unwrap()
            .push(condition(PREEMPTION_CONDITION, "True", "0,2147483648,0", "default/low"));
        mock.update_node_status(&n1).await.unwrap();

        let s = scheduler(&mock, seeded(PluginSet::default()));
        let other = with_priority(make_pod("second", "default", "", "2Gi"), 100);
        let result = s.schedule(&other).await.unwrap();
        let victim = result.nominated_victim.unwrap();
        assert_ne!(victim.metadata.name.as_deref(), Some("low"));
    }

    #[tokio::test]
    async fn test_score_aggregation_ignores_node_order() {
        let mock = Arc::new(MockOrchestrator::new());
        mock.add_node(with_image(make_node("n1", "4", "8Gi"), "nginx:1.27", 300 * 1024 * 1024));
        mock.add_node(with_taint(make_node("n2", "8", "16Gi"), "spot", "true", "PreferNoSchedule"));
        mock.add_node(make_node("n3", "2", "4Gi"));
        mock.add_pod(running_on(make_pod("db", "default", "1", "2Gi"), "n3")).unwrap();

        let s = scheduler(&mock, seeded(PluginSet::default()));
        let snapshot = Arc::new(mock.build_snapshot());
        let mut pod = make_pod("web", "default", "500m", "1Gi");
        pod.spec.as_mut().unwrap().containers[0].image = Some("nginx:1.27".to_string());
        let pod = Arc::new(pod);

        let forward = snapshot.list().to_vec();
        let mut backward = forward.clone();
        backward.reverse();

        let mut a = s.prioritize_nodes(&snapshot, &pod, &forward).await.unwrap();
        let mut b = s.prioritize_nodes(&snapshot, &pod, &backward).await.unwrap();
        a.sort_by(|x, y| x.name.cmp(&y.name));
        b.sort_by(|x, y| x.name.cmp(&y.name));
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[tokio::test]
    async fn test_score_aggregation_ignores_plugin_order() {
        let mock = Arc::new(MockOrchestrator::new());
        mock.add_node(with_image(make_node("n1", "4", "8Gi"), "nginx:1.27", 300 * 1024 * 1024));
        mock.add_node(with_taint(make_node("n2", "8", "16Gi"), "spot", "true", "PreferNoSchedule"));
        mock.add_node(make_node("n3", "2", "4Gi"));
        mock.add_pod(running_on(make_pod("db", "default", "1", "2Gi"), "n3")).unwrap();

        let weighted = [
            PluginConfig::weighted(TaintToleration::NAME, 3),
            PluginConfig::weighted(NodeAffinity::NAME, 1),
            PluginConfig::weighted(ImageLocality::NAME, 2),
            PluginConfig::weighted(ResourcePriority::NAME, 5),
            PluginConfig::weighted(RepeatPriority::NAME, 1),
            PluginConfig::weighted(InterPodAffinity::NAME, 2),
        ];
        let forward = PluginSet {
            score: weighted.to_vec(),
            ..PluginSet::default()
        };
        let mut backward = forward.clone();
        backward.score.reverse();
        backward.pre_score.reverse();

        let a = scheduler(&mock, seeded(forward));
        let b = scheduler(&mock, seeded(backward));
        let snapshot = Arc::new(mock.build_snapshot());
        let mut pod = make_pod("web", "default", "500m", "1Gi");
        pod.spec.as_mut().unwrap().containers[0].image = Some("nginx:1.27".to_string());
        let pod = Arc::new(pod);

        let mut totals_a = a.prioritize_nodes(&snapshot, &pod, snapshot.list()).await.unwrap();
        let mut totals_b = b.prioritize_nodes(&snapshot, &pod, snapshot.list()).await.unwrap();
        totals_a.sort_by(|x, y| x.name.cmp(&y.name));
        totals_b.sort_by(|x, y| x.name.cmp(&y.name));
        assert_eq!(totals_a, totals_b);
        assert_eq!(totals_a.len(), 3);
        assert!(totals_a.iter().any(|n| n.score > 0));
    }
}
