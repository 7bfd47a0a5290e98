//! In-tree scheduling plugins and the default plugin set

pub mod helper;
pub mod image_locality;
pub mod inter_pod_affinity;
pub mod node_affinity;
pub mod node_name;
pub mod node_ports;
pub mod node_resources_fit;
pub mod node_status;
pub mod node_unschedulable;
pub mod repeat_priority;
pub mod resource_priority;
pub mod taint_toleration;
pub mod volume_binding;

pub use image_locality::ImageLocality;
pub use inter_pod_affinity::InterPodAffinity;
pub use node_affinity::NodeAffinity;
pub use node_name::NodeName;
pub use node_ports::NodePorts;
pub use node_resources_fit::NodeResourcesFit;
pub use node_status::NodeStatus;
pub use node_unschedulable::NodeUnschedulable;
pub use repeat_priority::RepeatPriority;
pub use resource_priority::ResourcePriority;
pub use taint_toleration::TaintToleration;
pub use volume_binding::VolumeBinding;

use crate::error::Result;
use crate::framework::{FrameworkHandle, Plugin, PluginConfig, PluginFactory, PluginSet, Registry};
use std::sync::Arc;

/// Registry holding every in-tree plugin
pub fn in_tree_registry() -> Registry {
    let entries: [(&str, fn(Arc<FrameworkHandle>) -> Result<Arc<dyn Plugin>>); 12] = [
        (NodeStatus::NAME, |_| Ok(Arc::new(NodeStatus))),
        (TaintToleration::NAME, |_| Ok(Arc::new(TaintToleration))),
        (NodeAffinity::NAME, |_| Ok(Arc::new(NodeAffinity))),
        (NodeResourcesFit::NAME, |_| Ok(Arc::new(NodeResourcesFit))),
        (NodeName::NAME, |_| Ok(Arc::new(NodeName))),
        (NodePorts::NAME, |_| Ok(Arc::new(NodePorts))),
        (NodeUnschedulable::NAME, |_| Ok(Arc::new(NodeUnschedulable))),
        (InterPodAffinity::NAME, |_| Ok(Arc::new(InterPodAffinity))),
        (VolumeBinding::NAME, |h| Ok(Arc::new(VolumeBinding::new(h)))),
        (ImageLocality::NAME, |_| Ok(Arc::new(ImageLocality))),
        (ResourcePriority::NAME, |_| Ok(Arc::new(ResourcePriority))),
        (RepeatPriority::NAME, |h| Ok(Arc::new(RepeatPriority::new(h)))),
    ];

    entries
        .into_iter()
        .map(|(name, factory)| (name.to_string(), Box::new(factory) as PluginFactory))
        .collect()
}

impl Default for PluginSet {
    fn default() -> Self {
        let names = |list: &[&str]| list.iter().map(|n| PluginConfig::new(*n)).collect();
        Self {
            pre_filter: names(&[
                NodeResourcesFit::NAME,
                NodePorts::NAME,
                InterPodAffinity::NAME,
            ]),
            filter: names(&[
                NodeStatus::NAME,
                TaintToleration::NAME,
                NodeAffinity::NAME,
                NodeResourcesFit::NAME,
                NodeName::NAME,
                NodePorts::NAME,
                NodeUnschedulable::NAME,
                InterPodAffinity::NAME,
                VolumeBinding::NAME,
            ]),
            pre_score: names(&[TaintToleration::NAME, InterPodAffinity::NAME]),
            score: names(&[
                TaintToleration::NAME,
                NodeAffinity::NAME,
                ImageLocality::NAME,
                ResourcePriority::NAME,
                RepeatPriority::NAME,
                InterPodAffinity::NAME,
            ]),
        }
    }
}
