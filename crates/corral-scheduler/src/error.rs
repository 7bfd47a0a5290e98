// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Scheduler error type
#[derive(Error, Debug, Diagnostic)]
pub enum SchedulerError {
    /// No node admits the workload and preemption is not available
    #[error("Workload {workload} is unschedulable: {reason}")]
    #[diagnostic(
        code(scheduler::unschedulable),
        help("Check node resources, taints, and workload requirements")
    )]
    Unschedulable { workload: String, reason: String },

    /// Preemption was attempted but no node or victim qualified
    #[error("Preemption not possible for workload {workload}: {reason}")]
    #[diagnostic(
        code(scheduler::preemption_exhausted),
        help("Only nodes that fail solely on resources can be freed by evicting a lower priority workload in the same namespace")
    )]
    PreemptionExhausted { workload: String, reason: String },

    /// A plugin broke the framework contract (bad score, internal plugin error)
    #[error("Plugin error: {message}")]
    #[diagnostic(
        code(scheduler::plugin_error),
        help("This aborts the current attempt only. Inspect the named plugin")
    )]
    PluginError { message: String },

    /// Framework construction failed
    #[error("Framework configuration error: {message}")]
    #[diagnostic(code(scheduler::framework_error), help("{suggestion}"))]
    FrameworkError { message: String, suggestion: String },

    /// A conflict-retried update ran out of attempts
    #[error("Retries exhausted for {operation} after {attempts} attempts")]
    #[diagnostic(
        code(scheduler::retries_exhausted),
        help("The object is being modified concurrently. The caller decides whether to retry later or give up")
    )]
    RetriesExhausted { operation: String, attempts: u32 },

    /// Preemption failed after the node reservation was recorded
    #[error("Preemption of {victim} on node {node} for {workload} failed: {message}")]
    #[diagnostic(
        code(scheduler::preemption_failed),
        help("The node reservation has been released. The workload can be rescheduled")
    )]
    PreemptionFailed {
        workload: String,
        victim: String,
        node: String,
        message: String,
    },

    /// Orchestrator or cluster state error
    #[error(transparent)]
    #[diagnostic(transparent)]
    ClusterError(#[from] corral_core::CorralError),

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(scheduler::internal_error),
        help("This is likely a bug. Please report it")
    )]
    InternalError { message: String },
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// Create an Unschedulable error
    pub fn unschedulable(workload: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unschedulable {
            workload: workload.into(),
            reason: reason.into(),
        }
    }

    /// Create a PreemptionExhausted error
    pub fn preemption_exhausted(workload: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PreemptionExhausted {
            workload: workload.into(),
            reason: reason.into(),
        }
    }

    /// Create a PluginError
    pub fn plugin_error(message: impl Into<String>) -> Self {
        Self::PluginError {
            message: message.into(),
        }
    }

    /// Create a FrameworkError
    pub fn framework_error(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::FrameworkError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a RetriesExhausted error
    pub fn retries_exhausted(operation: impl Into<String>, attempts: u32) -> Self {
        Self::RetriesExhausted {
            operation: operation.into(),
            attempts,
        }
    }

    /// Create a PreemptionFailed error
    pub fn preemption_failed(
        workload: impl Into<String>,
        victim: impl Into<String>,
        node: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::PreemptionFailed {
            workload: workload.into(),
            victim: victim.into(),
            node: node.into(),
            message: message.into(),
        }
    }

    /// Create an InternalError
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// True for outcomes the caller should answer with backoff and eventual give-up
    pub fn is_unschedulable(&self) -> bool {
        matches!(
            self,
            Self::Unschedulable { .. } | Self::PreemptionExhausted { .. }
        )
    }
}
