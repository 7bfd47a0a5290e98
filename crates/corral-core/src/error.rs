// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for Corral operations against the orchestrator
#[derive(Error, Debug, Diagnostic)]
pub enum CorralError {
    /// Object not found
    #[error("Object not found: {key}")]
    #[diagnostic(
        code(corral::not_found),
        help("The object may have been deleted. Verify the namespace and name are correct")
    )]
    NotFound {
        #[allow(unused)]
        key: String,
    },

    /// Conflict detected (concurrent modification)
    #[error("Conflict detected for {key}: {message}")]
    #[diagnostic(
        code(corral::conflict),
        help("The object was modified concurrently. Re-read the latest version and retry")
    )]
    Conflict {
        #[allow(unused)]
        key: String,
        #[allow(unused)]
        message: String,
    },

    /// Invalid object
    #[error("Invalid object: {reason}")]
    #[diagnostic(code(corral::invalid_object), help("{suggestion}"))]
    InvalidObject {
        #[allow(unused)]
        reason: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// Invalid quantity string
    #[error("Invalid quantity '{value}': {reason}")]
    #[diagnostic(
        code(corral::invalid_quantity),
        help("Use a Kubernetes quantity such as '500m', '2', '128Mi' or '1Gi'")
    )]
    InvalidQuantity {
        #[allow(unused)]
        value: String,
        #[allow(unused)]
        reason: String,
    },

    /// Transport level failure talking to the orchestrator
    #[error("Transport error: {message}")]
    #[diagnostic(
        code(corral::transport_error),
        help("Check that the orchestrator API endpoint is reachable")
    )]
    TransportError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(corral::serialization_error),
        help("Ensure the payload format is valid JSON or YAML")
    )]
    SerializationError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(corral::internal_error),
        help("This is likely a bug. Please report it with the full error details")
    )]
    InternalError {
        #[allow(unused)]
        message: String,
    },
}

/// Result type alias for Corral operations
pub type Result<T> = std::result::Result<T, CorralError>;

impl CorralError {
    /// Create a NotFound error
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create a Conflict error
    pub fn conflict(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidObject error
    pub fn invalid_object(reason: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidObject {
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an InvalidQuantity error
    pub fn invalid_quantity(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidQuantity {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a TransportError
    pub fn transport_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::TransportError {
            message: message.into(),
            source,
        }
    }

    /// Create a SerializationError
    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }

    /// Create an InternalError
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CorralError::not_found("default/nginx");
        assert!(err.is_not_found());
        assert!(!err.is_conflict());

        let err = CorralError::conflict("node-1", "resourceVersion mismatch");
        assert!(err.is_conflict());
        assert!(err.to_string().contains("node-1"));
    }
}
