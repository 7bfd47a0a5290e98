//! Plugin framework: extension point traits, registry, cycle state and the
//! runners that drive plugins over a pod and its candidate nodes.

pub mod cycle_state;
pub mod handle;
pub mod interface;
pub mod node_info;
pub mod registry;
pub mod snapshot;
pub mod status;

pub use cycle_state::CycleState;
pub use handle::{FrameworkHandle, NodeUsageTracker, DEFAULT_USAGE_RESET_THRESHOLD};
pub use interface::{
    FilterPlugin, Plugin, PreFilterPlugin, PreScorePlugin, ScorePlugin, MAX_NODE_SCORE,
    MIN_NODE_SCORE,
};
pub use node_info::NodeInfo;
pub use registry::{PluginFactory, Registry};
pub use snapshot::Snapshot;
pub use status::{merge_statuses, Code, PluginToStatus, Status};

use crate::cluster::{OrchestratorApi, VolumeBinder};
use crate::error::{Result, SchedulerError};
use crate::types::{NodeScore, PluginToNodeScores};
use corral_core::{Pod, WorkloadKey};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

fn default_weight() -> i64 {
    1
}

/// A plugin enabled at an extension point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginConfig {
    pub name: String,
    /// Multiplier for Score plugins; ignored elsewhere
    #[serde(default = "default_weight")]
    pub weight: i64,
}

impl PluginConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight: default_weight(),
        }
    }

    pub fn weighted(name: impl Into<String>, weight: i64) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }
}

/// Ordered plugin lists per extension point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSet {
    pub pre_filter: Vec<PluginConfig>,
    pub filter: Vec<PluginConfig>,
    pub pre_score: Vec<PluginConfig>,
    pub score: Vec<PluginConfig>,
}

impl PluginSet {
    pub fn empty() -> Self {
        Self {
            pre_filter: Vec::new(),
            filter: Vec::new(),
            pre_score: Vec::new(),
            score: Vec::new(),
        }
    }
}

struct WeightedScorePlugin {
    plugin: Arc<dyn ScorePlugin>,
    weight: i64,
}

/// Holds the instantiated plugins for each extension point and runs them
pub struct Framework {
    handle: Arc<FrameworkHandle>,
    pre_filter_plugins: Vec<Arc<dyn PreFilterPlugin>>,
    filter_plugins: Vec<Arc<dyn FilterPlugin>>,
    pre_score_plugins: Vec<Arc<dyn PreScorePlugin>>,
    score_plugins: Arc<[WeightedScorePlugin]>,
}

impl Framework {
    /// Build a framework with the default plugin set
    pub fn new(
        registry: &Registry,
        client: Arc<dyn OrchestratorApi>,
        snapshot: Arc<Snapshot>,
        volume_binder: Arc<dyn VolumeBinder>,
    ) -> Result<Self> {
        let handle = Arc::new(FrameworkHandle::new(client, snapshot, volume_binder));
        Self::with_plugins(registry, handle, &PluginSet::default())
    }

    /// Build a framework from an explicit plugin set.
    ///
    /// Fails if a configured plugin is not registered, does not implement the
    /// extension point it is listed under, or is listed twice at one point.
    pub fn with_plugins(
        registry: &Registry,
        handle: Arc<FrameworkHandle>,
        plugins: &PluginSet,
    ) -> Result<Self> {
        let wanted: HashSet<&str> = [
            &plugins.pre_filter,
            &plugins.filter,
            &plugins.pre_score,
            &plugins.score,
        ]
        .into_iter()
        .flatten()
        .map(|p| p.name.as_str())
        .collect();

        let mut instances: BTreeMap<String, Arc<dyn Plugin>> = BTreeMap::new();
        for (name, factory) in registry.iter() {
            if !wanted.contains(name.as_str()) {
                continue;
            }
            let plugin = factory(handle.clone()).map_err(|e| {
                SchedulerError::framework_error(
                    format!("initializing plugin {}: {}", name, e),
                    "Check the plugin's requirements on the framework handle",
                )
            })?;
            instances.insert(name.clone(), plugin);
        }

        let pre_filter_plugins =
            assign("PreFilter", &plugins.pre_filter, &instances, |p| p.as_pre_filter())?;
        let filter_plugins = assign("Filter", &plugins.filter, &instances, |p| p.as_filter())?;
        let pre_score_plugins =
            assign("PreScore", &plugins.pre_score, &instances, |p| p.as_pre_score())?;
        let scorers = assign("Score", &plugins.score, &instances, |p| p.as_score())?;

        let mut score_plugins = Vec::with_capacity(scorers.len());
        for (plugin, config) in scorers.into_iter().zip(&plugins.score) {
            if config.weight < 1 {
                return Err(SchedulerError::framework_error(
                    format!("score plugin {} has weight {}", config.name, config.weight),
                    "Score plugin weights must be at least 1",
                ));
            }
            score_plugins.push(WeightedScorePlugin {
                plugin,
                weight: config.weight,
            });
        }

        debug!(
            pre_filter = pre_filter_plugins.len(),
            filter = filter_plugins.len(),
            pre_score = pre_score_plugins.len(),
            score = score_plugins.len(),
            "Framework initialized"
        );

        Ok(Self {
            handle,
            pre_filter_plugins,
            filter_plugins,
            pre_score_plugins,
            score_plugins: score_plugins.into(),
        })
    }

    pub fn handle(&self) -> &Arc<FrameworkHandle> {
        &self.handle
    }

    /// Run PreFilter plugins in order, stopping at the first non-success.
    ///
    /// Unschedulable verdicts are returned unchanged; anything else is
    /// reported as an `Error` naming the plugin.
    pub fn run_pre_filter_plugins(&self, state: &CycleState, pod: &Pod) -> Status {
        for plugin in &self.pre_filter_plugins {
            let status = plugin.pre_filter(state, pod);
            if status.is_success() {
                continue;
            }
            if status.is_unschedulable() {
                debug!(plugin = plugin.name(), "PreFilter rejected pod: {}", status.message());
                return status;
            }
            let message = format!(
                "error while running {} prefilter plugin for pod {}: {}",
                plugin.name(),
                pod_key(pod),
                status.message()
            );
            warn!("{}", message);
            return Status::error(message);
        }
        Status::success()
    }

    /// Run every Filter plugin against one node.
    ///
    /// Returns the statuses of all plugins that rejected the node. If a plugin
    /// fails with `Error`, filtering stops and the map holds only that entry.
    pub fn run_filter_plugins(
        &self,
        state: &CycleState,
        pod: &Pod,
        node_info: &NodeInfo,
    ) -> PluginToStatus {
        let mut statuses = PluginToStatus::new();
        for plugin in &self.filter_plugins {
            let status = plugin.filter(state, pod, node_info);
            if status.is_success() {
                continue;
            }
            if !status.is_unschedulable() {
                let message = format!(
                    "running {} filter plugin for pod {} on node {}: {}",
                    plugin.name(),
                    pod_key(pod),
                    node_info.name(),
                    status.message()
                );
                warn!("{}", message);
                return PluginToStatus::from([(plugin.name().to_string(), Status::error(message))]);
            }
            statuses.insert(plugin.name().to_string(), status);
        }
        statuses
    }

    /// Run PreScore plugins in order, stopping at the first non-success
    pub fn run_pre_score_plugins(
        &self,
        state: &CycleState,
        pod: &Pod,
        nodes: &[Arc<NodeInfo>],
    ) -> Status {
        for plugin in &self.pre_score_plugins {
            let status = plugin.pre_score(state, pod, nodes);
            if !status.is_success() {
                return Status::error(format!(
                    "error while running {} prescore plugin for pod {}: {}",
                    plugin.name(),
                    pod_key(pod),
                    status.message()
                ));
            }
        }
        Status::success()
    }

    /// Score every node with every Score plugin, one task per node.
    ///
    /// Scores are validated against `MIN_NODE_SCORE..=MAX_NODE_SCORE` and then
    /// multiplied by the plugin weight. The first failure cancels the
    /// remaining work and is returned.
    pub async fn run_score_plugins(
        &self,
        state: Arc<CycleState>,
        pod: Arc<Pod>,
        nodes: &[Arc<NodeInfo>],
    ) -> std::result::Result<PluginToNodeScores, Status> {
        let token = CancellationToken::new();
        let first_error: Arc<Mutex<Option<Status>>> = Arc::new(Mutex::new(None));
        let mut tasks = JoinSet::new();

        for (index, node) in nodes.iter().enumerate() {
            let plugins = self.score_plugins.clone();
            let state = state.clone();
            let pod = pod.clone();
            let node = node.clone();
            let token = token.clone();
            let first_error = first_error.clone();

            tasks.spawn(async move {
                let mut scores = Vec::with_capacity(plugins.len());
                for weighted in plugins.iter() {
                    if token.is_cancelled() {
                        break;
                    }
                    let name = weighted.plugin.name();
                    let failure = match weighted.plugin.score(&state, &pod, &node) {
                        Ok(score) if (MIN_NODE_SCORE..=MAX_NODE_SCORE).contains(&score) => {
                            scores.push(score * weighted.weight);
                            continue;
                        }
                        Ok(score) => Status::error(format!(
                            "plugin {} returned an invalid score {} for node {}, it must be in the range [{}, {}]",
                            name,
                            score,
                            node.name(),
                            MIN_NODE_SCORE,
                            MAX_NODE_SCORE
                        )),
                        Err(status) => Status::error(format!(
                            "plugin {} failed to score node {}: {}",
                            name,
                            node.name(),
                            status.message()
                        )),
                    };

                    let mut slot = first_error.lock();
                    if slot.is_none() {
                        *slot = Some(failure);
                    }
                    token.cancel();
                    break;
                }
                (index, scores)
            });
        }

        let mut per_node: Vec<Vec<i64>> = vec![Vec::new(); nodes.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, scores)) => per_node[index] = scores,
                Err(e) => {
                    token.cancel();
                    let mut slot = first_error.lock();
                    if slot.is_none() {
                        *slot = Some(Status::error(format!("score task failed: {}", e)));
                    }
                }
            }
        }

        if let Some(status) = first_error.lock().take() {
            return Err(status);
        }

        let mut result = PluginToNodeScores::new();
        for (plugin_index, weighted) in self.score_plugins.iter().enumerate() {
            let list = nodes
                .iter()
                .zip(&per_node)
                .map(|(node, scores)| NodeScore {
                    name: node.name().to_string(),
                    score: scores[plugin_index],
                })
                .collect();
            result.insert(weighted.plugin.name().to_string(), list);
        }
        Ok(result)
    }
}

fn assign<T: ?Sized>(
    point: &str,
    configured: &[PluginConfig],
    instances: &BTreeMap<String, Arc<dyn Plugin>>,
    cast: impl Fn(Arc<dyn Plugin>) -> Option<Arc<T>>,
) -> Result<Vec<Arc<T>>> {
    let mut seen = HashSet::new();
    let mut assigned = Vec::with_capacity(configured.len());
    for config in configured {
        if !seen.insert(config.name.as_str()) {
            return Err(SchedulerError::framework_error(
                format!("plugin {} already registered as {}", config.name, point),
                "List each plugin at most once per extension point",
            ));
        }
        let plugin = instances.get(&config.name).ok_or_else(|| {
            SchedulerError::framework_error(
                format!("{} plugin {} does not exist", point, config.name),
                "Register the plugin before enabling it",
            )
        })?;
        let cast_plugin = cast(plugin.clone()).ok_or_else(|| {
            SchedulerError::framework_error(
                format!("plugin {} does not extend {} plugin", config.name, point),
                format!("Remove {} from the {} list", config.name, point),
            )
        })?;
        assigned.push(cast_plugin);
    }
    Ok(assigned)
}

fn pod_key(pod: &Pod) -> String {
    WorkloadKey::from_pod(pod)
        .map(|k| k.to_string())
        .unwrap_or_else(|_| "<unnamed>".to_string())
}
