//! Conflict-aware retry for read-modify-write updates against the orchestrator

use crate::error::{Result, SchedulerError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Backoff schedule for conflict retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    pub steps: u32,
    /// Delay before the second attempt
    pub base_delay_ms: u64,
    /// Multiplier applied to the delay after each attempt
    pub factor: f64,
    /// Random extra delay, as a fraction of the current delay
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            steps: 5,
            base_delay_ms: 10,
            factor: 2.0,
            jitter: 0.1,
        }
    }
}

struct ExponentialBackoff {
    current_ms: f64,
    factor: f64,
    jitter: f64,
}

impl ExponentialBackoff {
    fn new(config: &RetryConfig) -> Self {
        Self {
            current_ms: config.base_delay_ms as f64,
            factor: config.factor.max(1.0),
            jitter: config.jitter.max(0.0),
        }
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let base = self.current_ms;
        self.current_ms = base * self.factor;
        let extra = if self.jitter > 0.0 {
            base * rand::rng().random_range(0.0..self.jitter)
        } else {
            0.0
        };
        Some(Duration::from_millis((base + extra).round() as u64))
    }
}

/// Run `operation` until it succeeds, retrying only on conflicts.
///
/// The operation must re-read the object on every attempt. Non-conflict
/// errors are returned immediately; running out of attempts yields
/// `SchedulerError::RetriesExhausted`.
pub async fn retry_on_conflict<T, F, Fut>(config: &RetryConfig, operation_name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = corral_core::Result<T>>,
{
    let steps = config.steps.max(1);
    let mut delays = ExponentialBackoff::new(config);

    for attempt in 1..=steps {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_conflict() => {
                debug!(operation = operation_name, attempt, "Conflict, retrying: {}", e);
                if attempt < steps {
                    if let Some(delay) = delays.next() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
            Err(e) => return Err(SchedulerError::ClusterError(e)),
        }
    }

    Err(SchedulerError::retries_exhausted(operation_name, steps))
}
