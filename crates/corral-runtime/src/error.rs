use miette::Diagnostic;
use thiserror::Error;

/// Runtime error type for transport, cache and worker operations
#[derive(Error, Debug, Diagnostic)]
pub enum RuntimeError {
    /// A queue has no consumer slot left or was never declared
    #[error("Queue '{queue}' is unavailable: {message}")]
    #[diagnostic(
        code(corral::runtime::queue_unavailable),
        help("Each queue supports a single consumer. Check that only one worker or relay receives from it")
    )]
    QueueUnavailable {
        #[allow(unused)]
        queue: String,
        #[allow(unused)]
        message: String,
    },

    /// The cluster cache did not finish its first sync in time
    #[error("Cluster cache not synced after {seconds}s")]
    #[diagnostic(
        code(corral::runtime::cache_sync_timeout),
        help("Verify the orchestrator API is reachable and lists nodes and pods")
    )]
    CacheSyncTimeout {
        #[allow(unused)]
        seconds: u64,
    },

    /// A message could not be decoded
    #[error("Malformed message on '{queue}': {message}")]
    #[diagnostic(
        code(corral::runtime::malformed_message),
        help("Schedule requests are JSON objects with key, lastBackoffTime, processedTime and message")
    )]
    MalformedMessage {
        #[allow(unused)]
        queue: String,
        #[allow(unused)]
        message: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(corral::runtime::invalid_config), help("{suggestion}"))]
    InvalidConfig {
        #[allow(unused)]
        message: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// Core library error
    #[error(transparent)]
    #[diagnostic(transparent)]
    CoreError(#[from] corral_core::CorralError),

    /// Scheduling error
    #[error(transparent)]
    #[diagnostic(transparent)]
    SchedulerError(#[from] corral_scheduler::SchedulerError),

    /// Internal error
    #[error("Internal runtime error: {message}")]
    #[diagnostic(
        code(corral::runtime::internal_error),
        help("This is likely a bug in corral-runtime. Please report it with the full error details")
    )]
    InternalError {
        #[allow(unused)]
        message: String,
    },
}

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

impl RuntimeError {
    pub fn queue_unavailable(queue: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QueueUnavailable {
            queue: queue.into(),
            message: message.into(),
        }
    }

    pub fn malformed_message(queue: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedMessage {
            queue: queue.into(),
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}
