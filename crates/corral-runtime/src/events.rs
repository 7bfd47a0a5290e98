use corral_core::k8s_openapi::api::core::v1::{EventSource, ObjectReference};
use corral_core::k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use corral_core::{Event, ObjectMeta, Pod};

/// Component name reported as the source of scheduler events
pub const EVENT_SOURCE: &str = "corral-scheduler";

/// Event type for failures the scheduler will retry
pub const EVENT_WARNING: &str = "Warning";

/// Event type for failures the scheduler gives up on
pub const EVENT_FATAL: &str = "Fatal";

/// Build an event attached to `pod`
pub fn pod_event(pod: &Pod, event_type: &str, reason: &str, message: impl Into<String>, host: &str) -> Event {
    let now = Time(chrono::Utc::now());
    let name = pod.metadata.name.clone().unwrap_or_default();
    let namespace = pod
        .metadata
        .namespace
        .clone()
        .unwrap_or_else(|| "default".to_string());

    Event {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-", name)),
            namespace: Some(namespace.clone()),
            ..Default::default()
        },
        involved_object: ObjectReference {
            kind: Some("Pod".to_string()),
            name: Some(name),
            namespace: Some(namespace),
            uid: pod.metadata.uid.clone(),
            ..Default::default()
        },
        reason: Some(reason.to_string()),
        message: Some(message.into()),
        type_: Some(event_type.to_string()),
        count: Some(1),
        first_timestamp: Some(now.clone()),
        last_timestamp: Some(now),
        source: Some(EventSource {
            component: Some(EVENT_SOURCE.to_string()),
            host: (!host.is_empty()).then(|| host.to_string()),
        }),
        ..Default::default()
    }
}
