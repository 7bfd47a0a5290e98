use crate::error::{CorralError, Result};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

pub const RESOURCE_CPU: &str = "cpu";
pub const RESOURCE_MEMORY: &str = "memory";
pub const RESOURCE_EPHEMERAL_STORAGE: &str = "ephemeral-storage";
pub const RESOURCE_PODS: &str = "pods";

/// A resource list as carried by k8s-openapi (`requests`, `allocatable`, `overhead`)
pub type ResourceList = BTreeMap<String, Quantity>;

/// Resource quantities for nodes and pods
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceQuantities {
    /// CPU in millicores (1000 = 1 core)
    pub cpu_millicores: i64,
    /// Memory in bytes
    pub memory_bytes: i64,
    /// Ephemeral storage in bytes
    pub ephemeral_storage_bytes: i64,
    /// Number of pods the node admits (only meaningful for node allocatable)
    pub allowed_pods: i64,
    /// Extended resources (e.g. `nvidia.com/gpu`), stored as plain integers
    pub scalar: BTreeMap<String, i64>,
}

impl ResourceQuantities {
    /// Parse CPU string (e.g., "2", "1000m", "0.5")
    pub fn parse_cpu(s: &str) -> Result<i64> {
        if let Some(m) = s.strip_suffix('m') {
            // Millicores
            m.parse::<i64>()
                .map_err(|e| CorralError::invalid_quantity(s, format!("invalid millicore value: {}", e)))
        } else if let Ok(cores) = s.parse::<f64>() {
            // Cores as float
            Ok((cores * 1000.0).ceil() as i64)
        } else {
            Err(CorralError::invalid_quantity(s, "invalid CPU format"))
        }
    }

    /// Parse a byte quantity (e.g., "128Mi", "1Gi", "1.5G", "1024")
    pub fn parse_bytes(s: &str) -> Result<i64> {
        const SUFFIXES: [(&str, f64); 12] = [
            ("Ki", 1024.0),
            ("Mi", 1024.0 * 1024.0),
            ("Gi", 1024.0 * 1024.0 * 1024.0),
            ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
            ("Pi", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
            ("Ei", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
            ("k", 1e3),
            ("M", 1e6),
            ("G", 1e9),
            ("T", 1e12),
            ("P", 1e15),
            ("E", 1e18),
        ];

        let (number, multiplier) = SUFFIXES
            .iter()
            .find_map(|(suffix, mult)| s.strip_suffix(suffix).map(|n| (n, *mult)))
            .unwrap_or((s, 1.0));

        // Plain integers are parsed exactly, everything else goes through f64
        if multiplier == 1.0 {
            if let Ok(v) = number.parse::<i64>() {
                return Ok(v);
            }
        }

        number
            .parse::<f64>()
            .map(|v| (v * multiplier).ceil() as i64)
            .map_err(|e| CorralError::invalid_quantity(s, e.to_string()))
    }

    /// Build quantities from a k8s-openapi resource map. Unparseable entries count as zero.
    pub fn from_k8s_resource_map(resources: &ResourceList) -> Self {
        let mut result = Self::default();
        result.add_resource_list(resources);
        result
    }

    /// Add every entry of a resource list (container requests are summed this way)
    pub fn add_resource_list(&mut self, resources: &ResourceList) {
        for (name, quantity) in resources {
            let value = Self::parse_named(name, &quantity.0);
            match name.as_str() {
                RESOURCE_CPU => self.cpu_millicores += value,
                RESOURCE_MEMORY => self.memory_bytes += value,
                RESOURCE_EPHEMERAL_STORAGE => self.ephemeral_storage_bytes += value,
                RESOURCE_PODS => self.allowed_pods += value,
                other => *self.scalar.entry(other.to_string()).or_insert(0) += value,
            }
        }
    }

    /// Raise each resource to at least the value in the list (init containers run one at a time)
    pub fn set_max_resource_list(&mut self, resources: &ResourceList) {
        for (name, quantity) in resources {
            let value = Self::parse_named(name, &quantity.0);
            match name.as_str() {
                RESOURCE_CPU => self.cpu_millicores = self.cpu_millicores.max(value),
                RESOURCE_MEMORY => self.memory_bytes = self.memory_bytes.max(value),
                RESOURCE_EPHEMERAL_STORAGE => {
                    self.ephemeral_storage_bytes = self.ephemeral_storage_bytes.max(value)
                }
                RESOURCE_PODS => self.allowed_pods = self.allowed_pods.max(value),
                other => {
                    let entry = self.scalar.entry(other.to_string()).or_insert(0);
                    *entry = (*entry).max(value);
                }
            }
        }
    }

    /// Add another set of quantities
    pub fn add(&mut self, other: &ResourceQuantities) {
        self.cpu_millicores += other.cpu_millicores;
        self.memory_bytes += other.memory_bytes;
        self.ephemeral_storage_bytes += other.ephemeral_storage_bytes;
        self.allowed_pods += other.allowed_pods;
        for (name, value) in &other.scalar {
            *self.scalar.entry(name.clone()).or_insert(0) += value;
        }
    }

    /// Subtract another set of quantities, clamping every field at zero
    pub fn saturating_sub(&self, other: &ResourceQuantities) -> ResourceQuantities {
        let mut scalar = self.scalar.clone();
        for (name, value) in &other.scalar {
            let entry = scalar.entry(name.clone()).or_insert(0);
            *entry = (*entry - value).max(0);
        }
        ResourceQuantities {
            cpu_millicores: (self.cpu_millicores - other.cpu_millicores).max(0),
            memory_bytes: (self.memory_bytes - other.memory_bytes).max(0),
            ephemeral_storage_bytes: (self.ephemeral_storage_bytes - other.ephemeral_storage_bytes)
                .max(0),
            allowed_pods: (self.allowed_pods - other.allowed_pods).max(0),
            scalar,
        }
    }

    /// True when CPU, memory and ephemeral storage are all zero
    pub fn is_zero(&self) -> bool {
        self.cpu_millicores == 0 && self.memory_bytes == 0 && self.ephemeral_storage_bytes == 0
    }

    /// True when `self` is at least `request` for CPU, memory and ephemeral storage
    pub fn covers(&self, request: &ResourceQuantities) -> bool {
        self.cpu_millicores >= request.cpu_millicores
            && self.memory_bytes >= request.memory_bytes
            && self.ephemeral_storage_bytes >= request.ephemeral_storage_bytes
    }

    /// Encode CPU, memory and ephemeral storage as `"<milli_cpu>,<memory>,<ephemeral>"`.
    ///
    /// This is the reason string of a node's Preemption condition.
    pub fn to_reservation(&self) -> String {
        format!(
            "{},{},{}",
            self.cpu_millicores, self.memory_bytes, self.ephemeral_storage_bytes
        )
    }

    /// Decode a reservation string produced by [`ResourceQuantities::to_reservation`]
    pub fn from_reservation(s: &str) -> Result<Self> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<i64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| CorralError::invalid_quantity(s, format!("bad reservation: {}", e)))?;

        match parts.as_slice() {
            [cpu, memory, ephemeral] => Ok(Self {
                cpu_millicores: *cpu,
                memory_bytes: *memory,
                ephemeral_storage_bytes: *ephemeral,
                ..Default::default()
            }),
            _ => Err(CorralError::invalid_quantity(
                s,
                "reservation must have three comma separated fields",
            )),
        }
    }

    fn parse_named(name: &str, value: &str) -> i64 {
        let parsed = if name == RESOURCE_CPU {
            Self::parse_cpu(value)
        } else {
            Self::parse_bytes(value)
        };
        parsed.unwrap_or(0)
    }
}
