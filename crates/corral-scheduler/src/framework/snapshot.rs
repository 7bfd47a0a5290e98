use super::node_info::NodeInfo;
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable point-in-time view of all nodes, shared by one scheduling attempt
#[derive(Debug, Default)]
pub struct Snapshot {
    node_infos: Vec<Arc<NodeInfo>>,
    by_name: HashMap<String, usize>,
    image_node_counts: HashMap<String, usize>,
}

impl Snapshot {
    pub fn new(node_infos: Vec<Arc<NodeInfo>>) -> Self {
        let mut by_name = HashMap::with_capacity(node_infos.len());
        let mut image_node_counts: HashMap<String, usize> = HashMap::new();
        for (i, info) in node_infos.iter().enumerate() {
            by_name.insert(info.name().to_string(), i);
            for image in info.image_names() {
                *image_node_counts.entry(image.clone()).or_insert(0) += 1;
            }
        }

        Self {
            node_infos,
            by_name,
            image_node_counts,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Nodes in listing order
    pub fn list(&self) -> &[Arc<NodeInfo>] {
        &self.node_infos
    }

    pub fn get(&self, name: &str) -> Option<&Arc<NodeInfo>> {
        self.by_name.get(name).map(|&i| &self.node_infos[i])
    }

    pub fn len(&self) -> usize {
        self.node_infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_infos.is_empty()
    }

    /// Number of nodes that have the (normalized) image cached
    pub fn nodes_with_image(&self, normalized_image: &str) -> usize {
        self.image_node_counts
            .get(normalized_image)
            .copied()
            .unwrap_or(0)
    }
}
