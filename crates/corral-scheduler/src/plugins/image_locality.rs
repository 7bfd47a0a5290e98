use crate::framework::node_info::normalize_image_name;
use crate::framework::{CycleState, NodeInfo, Plugin, ScorePlugin, Status, MAX_NODE_SCORE};
use corral_core::Pod;
use std::sync::Arc;

const MB: i64 = 1024 * 1024;
const MIN_THRESHOLD: i64 = 23 * MB;
const MAX_CONTAINER_THRESHOLD: i64 = 1000 * MB;

/// Favors nodes that already hold the pod's container images, weighted by
/// how widely each image is spread across the cluster
pub struct ImageLocality;

impl ImageLocality {
    pub const NAME: &'static str = "ImageLocality";
}

impl Plugin for ImageLocality {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn as_score(self: Arc<Self>) -> Option<Arc<dyn ScorePlugin>> {
        Some(self)
    }
}

impl ScorePlugin for ImageLocality {
    fn score(&self, state: &CycleState, pod: &Pod, node_info: &NodeInfo) -> Result<i64, Status> {
        let Some(spec) = &pod.spec else {
            return Ok(0);
        };
        let snapshot = state.snapshot();
        let total_nodes = snapshot.len().max(1) as f64;

        let mut sum = 0i64;
        for container in &spec.containers {
            let Some(image) = container.image.as_deref() else {
                continue;
            };
            let normalized = normalize_image_name(image);
            if let Some(size) = node_info.image_size(&normalized) {
                let spread = snapshot.nodes_with_image(&normalized) as f64 / total_nodes;
                sum += (size as f64 * spread) as i64;
            }
        }

        let max_threshold = MAX_CONTAINER_THRESHOLD * spec.containers.len().max(1) as i64;
        let clamped = sum.clamp(MIN_THRESHOLD, max_threshold);
        Ok(MAX_NODE_SCORE * (clamped - MIN_THRESHOLD) / (max_threshold - MIN_THRESHOLD))
    }
}
