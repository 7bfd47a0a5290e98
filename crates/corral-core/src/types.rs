use crate::error::{CorralError, Result};
use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use std::fmt;

/// WorkloadKey uniquely identifies a workload (pod) by namespace and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkloadKey {
    /// Namespace (empty for cluster-scoped objects)
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl WorkloadKey {
    /// Create a new WorkloadKey
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Build the key of a pod. Pods without a namespace land in "default".
    pub fn from_pod(pod: &Pod) -> Result<Self> {
        let name = pod.metadata.name.as_ref().ok_or_else(|| {
            CorralError::invalid_object("Pod has no name", "Set metadata.name on the pod")
        })?;
        let namespace = pod.metadata.namespace.as_deref().unwrap_or("default");
        Ok(Self::new(namespace, name.as_str()))
    }

    /// Parse a `namespace/name` key. A key without a slash is a cluster-scoped name.
    pub fn parse(key: &str) -> Result<Self> {
        let parts: Vec<&str> = key.split('/').collect();
        match parts.as_slice() {
            [name] if !name.is_empty() => Ok(Self::new("", *name)),
            [namespace, name] if !name.is_empty() => Ok(Self::new(*namespace, *name)),
            _ => Err(CorralError::invalid_object(
                format!("unexpected key format: {:?}", key),
                "Use the form <namespace>/<name>",
            )),
        }
    }

    /// Check if this is a namespaced key
    pub fn is_namespaced(&self) -> bool {
        !self.namespace.is_empty()
    }
}

impl fmt::Display for WorkloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_namespaced() {
            write!(f, "{}/{}", self.namespace, self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}
