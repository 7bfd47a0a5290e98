//! Corral Core - Fundamental types shared by the Corral scheduler crates
//!
//! This crate provides:
//! - Resource quantity parsing and pod request accounting
//! - Error types with miette diagnostics
//! - Workload keys (`namespace/name`)
//! - Serialization helpers

pub mod error;
pub mod resources;
pub mod types;

// Re-export commonly used types
pub use error::{CorralError, Result};
pub use resources::{
    node_conditions, node_name, pod_can_preempt, pod_non_zero_request, pod_phase, pod_priority,
    pod_resource_request, preemption_conditions, ResourceList, ResourceQuantities,
    POD_PHASE_RUNNING, PREEMPTION_CONDITION,
};
pub use types::WorkloadKey;

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::{Event, Node, NodeCondition, Pod};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use std::path::Path;

/// Serialize a value to JSON bytes
pub fn to_json_vec<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| {
        CorralError::serialization_error(
            format!("Failed to serialize to JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a value from JSON bytes
pub fn from_json_slice<T: for<'de> serde::Deserialize<'de>>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| {
        CorralError::serialization_error(
            format!("Failed to deserialize from JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a value from YAML
pub fn from_yaml<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_yaml::from_str(data).map_err(|e| {
        CorralError::serialization_error(
            format!("Failed to deserialize from YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Read and deserialize a YAML file
pub fn from_yaml_file<T: for<'de> serde::Deserialize<'de>>(path: &Path) -> Result<T> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        CorralError::serialization_error(
            format!("Failed to read {}: {}", path.display(), e),
            Some(Box::new(e)),
        )
    })?;
    from_yaml(&data)
}
