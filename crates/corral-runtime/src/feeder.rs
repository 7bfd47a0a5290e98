use crate::cache::ClusterCache;
use crate::error::Result;
use crate::transport::{send_json, ScheduleRequest, Transport};
use crate::worker::PHASE_BACKOFF_EXCEEDED;
use corral_core::{pod_phase, Pod, WorkloadKey};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Publishes a schedule request for every pending workload that asks for
/// this scheduler, once per workload incarnation
pub struct PendingFeeder {
    cache: Arc<ClusterCache>,
    transport: Arc<dyn Transport>,
    queue: String,
    scheduler_name: String,
    published: Mutex<HashSet<(String, String)>>,
}

fn identity(pod: &Pod) -> Option<(String, String)> {
    let key = WorkloadKey::from_pod(pod).ok()?;
    Some((key.to_string(), pod.metadata.uid.clone().unwrap_or_default()))
}

fn waiting_since(pod: &Pod) -> Duration {
    pod.metadata
        .creation_timestamp
        .as_ref()
        .and_then(|created| (chrono::Utc::now() - created.0).to_std().ok())
        .unwrap_or_default()
}

impl PendingFeeder {
    pub fn new(
        cache: Arc<ClusterCache>,
        transport: Arc<dyn Transport>,
        queue: impl Into<String>,
        scheduler_name: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            transport,
            queue: queue.into(),
            scheduler_name: scheduler_name.into(),
            published: Mutex::new(HashSet::new()),
        }
    }

    /// Publish requests for newly pending workloads; returns how many were sent
    pub async fn feed_once(&self) -> Result<usize> {
        let pending: Vec<(Pod, (String, String))> = self
            .cache
            .pending_pods(&self.scheduler_name)
            .into_iter()
            .filter(|p| pod_phase(p) != PHASE_BACKOFF_EXCEEDED)
            .filter_map(|p| identity(&p).map(|id| (p, id)))
            .collect();

        let fresh: Vec<(Pod, (String, String))> = {
            let mut published = self.published.lock();
            let current: HashSet<&(String, String)> = pending.iter().map(|(_, id)| id).collect();
            published.retain(|id| current.contains(id));
            pending
                .iter()
                .filter(|(_, id)| !published.contains(id))
                .cloned()
                .collect()
        };

        let mut sent = 0;
        for (pod, id) in fresh {
            let request = ScheduleRequest {
                processed_time: waiting_since(&pod),
                ..ScheduleRequest::new(id.0.clone())
            };
            send_json(self.transport.as_ref(), &self.queue, &request).await?;
            debug!(pod = %id.0, "Published schedule request");
            self.published.lock().insert(id);
            sent += 1;
        }
        Ok(sent)
    }

    pub async fn run(&self, interval: Duration, token: CancellationToken) {
        info!("Feeding pending workloads for '{}' to '{}'", self.scheduler_name, self.queue);

        loop {
            match self.feed_once().await {
                Ok(0) => {}
                Ok(sent) => info!("Published {} schedule request(s)", sent),
                Err(e) => warn!("Failed to publish schedule requests: {}", e),
            }

            tokio::select! {
                _ = token.cancelled() => {
                    info!("Pending feeder shutting down");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::make_pod;
    use crate::transport::{decode, ChannelTransport};
    use corral_core::k8s_openapi::api::core::v1::PodStatus;

    #[tokio::test]
    async fn test_publishes_each_incarnation_once() {
        let cache = Arc::new(ClusterCache::new());
        let transport = Arc::new(ChannelTransport::new());
        let mut work = transport.receive("work").await.unwrap();
        let feeder = PendingFeeder::new(cache.clone(), transport.clone(), "work", "corral-scheduler");

        cache.upsert_pod(make_pod("web", "default", "corral-scheduler")).unwrap();
        cache.upsert_pod(make_pod("other", "default", "default-scheduler")).unwrap();
        let mut exceeded = make_pod("stuck", "default", "corral-scheduler");
        exceeded.status = Some(PodStatus {
            phase: Some(PHASE_BACKOFF_EXCEEDED.to_string()),
            ..Default::default()
        });
        cache.upsert_pod(exceeded).unwrap();

        assert_eq!(feeder.feed_once().await.unwrap(), 1);
        assert_eq!(feeder.feed_once().await.unwrap(), 0);
        let request: ScheduleRequest = decode("work", &work.recv().await.unwrap().body).unwrap();
        assert_eq!(request.key, "default/web");

        // Recreated under the same name
        let mut replacement = make_pod("web", "default", "corral-scheduler");
        replacement.metadata.uid = Some("uid-2".to_string());
        cache.upsert_pod(replacement).unwrap();
        assert_eq!(feeder.feed_once().await.unwrap(), 1);
    }
}
