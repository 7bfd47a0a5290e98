use crate::error::Result;
use crate::events::{pod_event, EVENT_FATAL, EVENT_WARNING};
use crate::transport::{decode, send_json, RetryRequest, ScheduleRequest, Transport};
use corral_core::k8s_openapi::api::core::v1::PodStatus;
use corral_core::{Pod, WorkloadKey};
use corral_scheduler::{retry_on_conflict, OrchestratorApi, PreemptionExecutor, RetryConfig, Scheduler};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Annotation recording how long the workload waited before its request was sent
pub const ANNOTATION_DISCOVER_TIME: &str = "corral.io/discover-time";

/// Annotation recording how long the scheduling attempt took
pub const ANNOTATION_SCHEDULING_TIME: &str = "corral.io/scheduling-time";

/// Phase given to workloads the scheduler stopped retrying
pub const PHASE_BACKOFF_EXCEEDED: &str = "PodBackoffExceeded";

/// Configuration for the schedule worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Queue schedule requests arrive on
    pub receive_queue: String,
    /// Queue of the backoff relay
    pub backoff_queue: String,
    /// Reported as the source host of emitted events
    pub hostname: String,
    /// Backoff in seconds at which the worker gives up on a workload
    pub max_backoff: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            receive_queue: "corral.schedule".to_string(),
            backoff_queue: "corral.backoff".to_string(),
            hostname: String::new(),
            max_backoff: 256,
        }
    }
}

/// What happened to one schedule request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Bound to the node
    Bound { node: String },
    /// Handed to a background preemption
    Preempting { node: String, victim: String },
    /// Sent to the backoff relay with this backoff
    Retrying { backoff: u64 },
    /// Backoff ceiling reached; the workload was marked and left alone
    GaveUp,
    /// Nothing to do (unreadable request, workload gone or already bound)
    Dropped,
}

/// Consumes schedule requests and turns scheduling results into bindings,
/// preemptions or retries
pub struct ScheduleWorker {
    scheduler: Arc<Scheduler>,
    client: Arc<dyn OrchestratorApi>,
    transport: Arc<dyn Transport>,
    preemption: Arc<PreemptionExecutor>,
    retry: RetryConfig,
    config: WorkerConfig,
}

fn annotate(mut pod: Pod, discover_time: Duration, scheduling_time: Duration) -> Pod {
    let annotations = pod.metadata.annotations.get_or_insert_with(BTreeMap::new);
    annotations.insert(ANNOTATION_DISCOVER_TIME.to_string(), format!("{:?}", discover_time));
    annotations.insert(ANNOTATION_SCHEDULING_TIME.to_string(), format!("{:?}", scheduling_time));
    pod
}

impl ScheduleWorker {
    pub fn new(
        scheduler: Arc<Scheduler>,
        client: Arc<dyn OrchestratorApi>,
        transport: Arc<dyn Transport>,
        preemption: Arc<PreemptionExecutor>,
        config: WorkerConfig,
    ) -> Self {
        let retry = scheduler.settings().retry.clone();
        Self {
            scheduler,
            client,
            transport,
            preemption,
            retry,
            config,
        }
    }

    /// Process requests until cancelled or the queue closes.
    ///
    /// A delivery is acknowledged once its request reached an outcome. When
    /// processing fails outright the delivery is dropped unacknowledged.
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        let mut deliveries = self.transport.receive(&self.config.receive_queue).await?;
        info!("Schedule worker consuming '{}'", self.config.receive_queue);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Schedule worker shutting down");
                    return Ok(());
                }
                delivery = deliveries.recv() => {
                    let Some(delivery) = delivery else {
                        warn!("Queue '{}' closed", self.config.receive_queue);
                        return Ok(());
                    };
                    match self.process(&delivery.body).await {
                        Ok(outcome) => {
                            debug!(?outcome, "Request processed");
                            delivery.ack();
                        }
                        Err(e) => error!("Failed to process schedule request: {}", e),
                    }
                }
            }
        }
    }

    /// Handle one encoded schedule request
    pub async fn process(&self, body: &[u8]) -> Result<Outcome> {
        let started = Instant::now();

        let request: ScheduleRequest = match decode(&self.config.receive_queue, body) {
            Ok(request) => request,
            Err(e) => {
                warn!("Dropping message: {}", e);
                return Ok(Outcome::Dropped);
            }
        };
        let key = match WorkloadKey::parse(&request.key) {
            Ok(key) => key,
            Err(e) => {
                warn!(key = %request.key, "Dropping request: {}", e);
                return Ok(Outcome::Dropped);
            }
        };

        let pod = match self.client.get_workload(&key.namespace, &key.name).await {
            Ok(pod) => pod,
            Err(e) if e.is_not_found() => {
                debug!(pod = %key, "Workload no longer exists");
                return Ok(Outcome::Dropped);
            }
            Err(e) => {
                warn!(pod = %key, "Failed to fetch workload: {}", e);
                return self.requeue(request, e.to_string()).await;
            }
        };
        if pod.spec.as_ref().and_then(|s| s.node_name.as_ref()).is_some() {
            debug!(pod = %key, "Workload already bound");
            return Ok(Outcome::Dropped);
        }

        let result = match self.scheduler.schedule(&pod).await {
            Ok(result) => result,
            Err(e) if e.is_unschedulable() => {
                info!(pod = %key, "Unschedulable: {}", e);
                return self.back_off(request, &pod, e.to_string()).await;
            }
            Err(e) => {
                error!(pod = %key, "Scheduling attempt failed: {}", e);
                return self.requeue(request, e.to_string()).await;
            }
        };

        let pod = annotate(pod, request.processed_time, started.elapsed());
        let node = result.suggested_host;
        match result.nominated_victim {
            None => match self.client.bind(&pod, &node).await {
                Ok(()) => {
                    info!(pod = %key, node = %node, "Bound workload");
                    Ok(Outcome::Bound { node })
                }
                Err(e) => {
                    warn!(pod = %key, node = %node, "Bind failed: {}", e);
                    self.requeue(request, e.to_string()).await
                }
            },
            Some(victim) => {
                let victim_key = WorkloadKey::from_pod(&victim)?.to_string();
                self.spawn_preemption(request, pod, node.clone(), victim);
                Ok(Outcome::Preempting {
                    node,
                    victim: victim_key,
                })
            }
        }
    }

    fn spawn_preemption(&self, request: ScheduleRequest, pod: Pod, node: String, victim: Pod) {
        let executor = self.preemption.clone();
        let client = self.client.clone();
        let transport = self.transport.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            let Err(e) = executor.execute(&node, &pod, &victim).await else {
                return;
            };
            error!(pod = %request.key, node = %node, "Preemption failed: {}", e);

            let event = pod_event(&pod, EVENT_WARNING, "PreemptionFailed", e.to_string(), &config.hostname);
            if let Err(e) = client.create_event(&event).await {
                warn!(pod = %request.key, "Failed to record event: {}", e);
            }

            let retry = RetryRequest {
                request: ScheduleRequest {
                    message: e.to_string(),
                    ..request
                },
                queue: config.receive_queue.clone(),
            };
            if let Err(e) = send_json(transport.as_ref(), &config.backoff_queue, &retry).await {
                error!(pod = %retry.request.key, "Failed to requeue after preemption failure: {}", e);
            }
        });
    }

    /// Retry after a grown backoff, or give up once the ceiling is reached
    async fn back_off(&self, mut request: ScheduleRequest, pod: &Pod, reason: String) -> Result<Outcome> {
        if request.last_backoff_time >= self.config.max_backoff {
            self.emit(
                pod,
                EVENT_FATAL,
                format!("Scheduler will not retry scheduling; Reason: {}", reason),
            )
            .await;
            if let Err(e) = self.mark_backoff_exceeded(pod).await {
                warn!(pod = %request.key, "Failed to set phase {}: {}", PHASE_BACKOFF_EXCEEDED, e);
            }
            return Ok(Outcome::GaveUp);
        }

        let backoff = (request.last_backoff_time * 2).clamp(1, self.config.max_backoff.max(1));
        self.emit(
            pod,
            EVENT_WARNING,
            format!("Scheduler will retry in {} seconds; Reason: {}", backoff, reason),
        )
        .await;

        request.last_backoff_time = backoff;
        request.message = reason;
        self.publish_retry(request).await?;
        Ok(Outcome::Retrying { backoff })
    }

    /// Retry without growing the backoff
    async fn requeue(&self, mut request: ScheduleRequest, reason: String) -> Result<Outcome> {
        let backoff = request.last_backoff_time;
        request.message = reason;
        self.publish_retry(request).await?;
        Ok(Outcome::Retrying { backoff })
    }

    async fn publish_retry(&self, request: ScheduleRequest) -> Result<()> {
        let retry = RetryRequest {
            request,
            queue: self.config.receive_queue.clone(),
        };
        send_json(self.transport.as_ref(), &self.config.backoff_queue, &retry).await
    }

    async fn emit(&self, pod: &Pod, event_type: &str, message: String) {
        let event = pod_event(pod, event_type, "FailedScheduling", message, &self.config.hostname);
        if let Err(e) = self.client.create_event(&event).await {
            warn!("Failed to record {} event: {}", event_type, e);
        }
    }

    async fn mark_backoff_exceeded(&self, pod: &Pod) -> Result<()> {
        let key = WorkloadKey::from_pod(pod)?;
        let client = &self.client;
        let key = &key;
        retry_on_conflict(&self.retry, "mark backoff exceeded", move || async move {
            let mut current = client.get_workload(&key.namespace, &key.name).await?;
            current
                .status
                .get_or_insert_with(PodStatus::default)
                .phase = Some(PHASE_BACKOFF_EXCEEDED.to_string());
            client.update_workload_status(&current).await.map(|_| ())
        })
        .await?;
        Ok(())
    }
}
