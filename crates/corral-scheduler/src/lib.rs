//! Corral Scheduler - Workload to node placement
//!
//! This crate provides:
//! - A plugin framework with PreFilter, Filter, PreScore and Score points
//! - The in-tree plugins (resource fit, taints, affinity, ports, images, ...)
//! - Concurrent node filtering with sampling for large clusters
//! - Scoring with weighted plugins and a seeded random tie-break
//! - Preemption that reserves node capacity through a node condition
//! - Conflict-retried updates and an in-memory orchestrator for tests

pub mod cluster;
pub mod error;
pub mod framework;
pub mod mock;
pub mod plugins;
pub mod preemption;
pub mod retry;
pub mod scheduler;
pub mod types;

#[cfg(test)]
mod test_util;

// Re-export commonly used types
pub use cluster::{
    ClusterStateProvider, DeleteOptions, OrchestratorApi, PermissiveVolumeBinder,
    PropagationPolicy, VolumeBinder,
};
pub use error::{Result, SchedulerError};
pub use framework::{Framework, FrameworkHandle, PluginConfig, PluginSet, Registry};
pub use mock::MockOrchestrator;
pub use plugins::in_tree_registry;
pub use preemption::{select_victim, PreemptionExecutor, PreemptionSettings};
pub use retry::{retry_on_conflict, RetryConfig};
pub use scheduler::{Scheduler, SchedulerSettings};
pub use types::{NodeScore, ScheduleResult};
