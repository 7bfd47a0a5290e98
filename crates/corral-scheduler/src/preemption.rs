//! Victim selection and the eviction protocol.
//!
//! A preemption reserves capacity on the node by appending a `Preemption`
//! condition whose reason encodes the preemptor's request and whose message
//! names the victim. Every scheduler sees the reservation in its next
//! snapshot and stops counting that capacity as free, and stops choosing the
//! same victim, until the condition is removed.

use crate::cluster::{DeleteOptions, OrchestratorApi, PropagationPolicy};
use crate::error::{Result, SchedulerError};
use crate::framework::NodeInfo;
use crate::retry::{retry_on_conflict, RetryConfig};
use corral_core::k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use corral_core::{
    pod_phase, pod_priority, pod_resource_request, NodeCondition, Pod, WorkloadKey,
    POD_PHASE_RUNNING, PREEMPTION_CONDITION,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// First delay between checks for the victim's removal
const INITIAL_POLL_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreemptionSettings {
    /// Grace period given to the evicted workload
    pub grace_period_seconds: i64,
    /// Upper bound for the randomized delay between removal checks
    pub max_poll_interval_ms: u64,
}

impl Default for PreemptionSettings {
    fn default() -> Self {
        Self {
            grace_period_seconds: 30,
            max_poll_interval_ms: 10_000,
        }
    }
}

/// Pick the workload on `node` whose eviction lets `preemptor` fit.
///
/// Candidates are scanned from lowest priority up. A pod qualifies when it
/// runs in the preemptor's namespace, is not already reserved as a victim,
/// has strictly lower priority, and either requests nothing or frees enough
/// together with the node's free capacity.
pub fn select_victim(node: &NodeInfo, preemptor: &Pod) -> Option<Pod> {
    let request = pod_resource_request(preemptor);
    let priority = pod_priority(preemptor);
    let namespace = preemptor.metadata.namespace.as_deref().unwrap_or("default");
    let free = node.free();

    let mut pods: Vec<&Pod> = node.pods().iter().collect();
    pods.sort_by_key(|p| pod_priority(p));

    pods.into_iter()
        .find(|pod| {
            let Ok(key) = WorkloadKey::from_pod(pod) else {
                return false;
            };
            if node.is_reserved_victim(&key)
                || key.namespace != namespace
                || pod_phase(pod) != POD_PHASE_RUNNING
                || pod_priority(pod) >= priority
            {
                return false;
            }

            let mut released = pod_resource_request(pod);
            if released.is_zero() {
                return true;
            }
            released.add(&free);
            released.covers(&request)
        })
        .cloned()
}

/// Carries out a nominated preemption against the orchestrator
pub struct PreemptionExecutor {
    client: Arc<dyn OrchestratorApi>,
    settings: PreemptionSettings,
    retry: RetryConfig,
}

impl PreemptionExecutor {
    pub fn new(client: Arc<dyn OrchestratorApi>, settings: PreemptionSettings, retry: RetryConfig) -> Self {
        Self {
            client,
            settings,
            retry,
        }
    }

    /// Reserve `host`, evict `victim`, wait for it to disappear, bind
    /// `preemptor`, then drop the reservation.
    ///
    /// A victim already reserved by another preemption is left alone and the
    /// attempt fails with `PreemptionExhausted`. Any failure after the
    /// reservation is recorded releases it before returning `PreemptionFailed`.
    /// Once the preemptor is bound, a failed release is only logged.
    pub async fn execute(&self, host: &str, preemptor: &Pod, victim: &Pod) -> Result<()> {
        let preemptor_key = WorkloadKey::from_pod(preemptor)?;
        let victim_key = WorkloadKey::from_pod(victim)?;
        let reservation = pod_resource_request(preemptor).to_reservation();

        if !self.reserve(host, &victim_key.to_string(), &reservation).await? {
            return Err(SchedulerError::preemption_exhausted(
                preemptor_key.to_string(),
                format!("{} on node {} is already reserved by another preemption", victim_key, host),
            ));
        }
        info!(
            pod = %preemptor_key,
            victim = %victim_key,
            node = host,
            reservation = %reservation,
            "Reserved node for preemption"
        );

        if let Err(e) = self.evict_and_bind(host, preemptor, victim, &victim_key).await {
            if let Err(release_err) = self.release(host, &victim_key.to_string()).await {
                warn!(node = host, victim = %victim_key, "Failed to release preemption reservation: {}", release_err);
            }
            return Err(SchedulerError::preemption_failed(
                preemptor_key.to_string(),
                victim_key.to_string(),
                host,
                e.to_string(),
            ));
        }

        if let Err(e) = self.release(host, &victim_key.to_string()).await {
            warn!(
                pod = %preemptor_key,
                victim = %victim_key,
                node = host,
                "Bound, but failed to release preemption reservation: {}",
                e
            );
        }
        info!(pod = %preemptor_key, victim = %victim_key, node = host, "Preemption complete");
        Ok(())
    }

    async fn evict_and_bind(&self, host: &str, preemptor: &Pod, victim: &Pod, victim_key: &WorkloadKey) -> Result<()> {
        let options = DeleteOptions {
            grace_period_seconds: self.settings.grace_period_seconds,
            propagation_policy: PropagationPolicy::Background,
        };
        match self
            .client
            .delete_workload(&victim_key.namespace, &victim_key.name, &options)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => debug!(victim = %victim_key, "Victim already gone"),
            Err(e) => return Err(e.into()),
        }

        self.wait_for_removal(victim, victim_key).await?;
        self.client.bind(preemptor, host).await?;
        Ok(())
    }

    /// Poll until the victim is gone or replaced by a workload with another UID
    async fn wait_for_removal(&self, victim: &Pod, key: &WorkloadKey) -> Result<()> {
        let ceiling = self.settings.max_poll_interval_ms.max(1);
        let mut interval = INITIAL_POLL_INTERVAL_MS.min(ceiling);

        loop {
            match self.client.get_workload(&key.namespace, &key.name).await {
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => warn!(victim = %key, "Failed to check victim removal: {}", e),
                Ok(current) if current.metadata.uid != victim.metadata.uid => return Ok(()),
                Ok(_) => {}
            }

            let delay = rand::rng().random_range(interval / 2..=interval);
            debug!(victim = %key, delay_ms = delay, "Victim still present");
            tokio::time::sleep(Duration::from_millis(delay)).await;
            interval = (interval * 2).min(ceiling);
        }
    }

    /// Append the reservation; `false` when the victim is already reserved
    async fn reserve(&self, host: &str, victim: &str, reservation: &str) -> Result<bool> {
        let client = &self.client;
        retry_on_conflict(&self.retry, "reserve node for preemption", move || async move {
            let mut node = client.get_node(host).await?;
            let conditions = node
                .status
                .get_or_insert_with(Default::default)
                .conditions
                .get_or_insert_with(Vec::new);
            if conditions
                .iter()
                .any(|c| c.type_ == PREEMPTION_CONDITION && c.message.as_deref() == Some(victim))
            {
                return Ok(false);
            }

            conditions.push(NodeCondition {
                type_: PREEMPTION_CONDITION.to_string(),
                status: "True".to_string(),
                reason: Some(reservation.to_string()),
                message: Some(victim.to_string()),
                last_transition_time: Some(Time(chrono::Utc::now())),
                ..Default::default()
            });
            client.update_node_status(&node).await.map(|_| true)
        })
        .await
    }

    async fn release(&self, host: &str, victim: &str) -> Result<()> {
        let client = &self.client;
        retry_on_conflict(&self.retry, "release preemption reservation", move || async move {
            let mut node = client.get_node(host).await?;
            let Some(conditions) = node.status.as_mut().and_then(|s| s.conditions.as_mut()) else {
                return Ok(());
            };
            let before = conditions.len();
            conditions.retain(|c| !(c.type_ == PREEMPTION_CONDITION && c.message.as_deref() == Some(victim)));
            if conditions.len() == before {
                return Ok(());
            }
            client.update_node_status(&node).await.map(|_| ())
        })
        .await
    }
}
