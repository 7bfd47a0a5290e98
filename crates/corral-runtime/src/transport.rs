//! Message transport between feeders, schedule workers and the backoff relay

use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// A request to schedule one workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    /// `namespace/name` of the workload
    pub key: String,
    /// Backoff in seconds applied before this attempt; grows on every
    /// unschedulable outcome
    #[serde(default)]
    pub last_backoff_time: u64,
    /// Time between the workload being discovered and the request being sent
    #[serde(default)]
    pub processed_time: Duration,
    /// Reason for the last failed attempt
    #[serde(default)]
    pub message: String,
}

impl ScheduleRequest {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            last_backoff_time: 0,
            processed_time: Duration::ZERO,
            message: String::new(),
        }
    }
}

/// A schedule request waiting out its backoff before returning to `queue`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryRequest {
    pub request: ScheduleRequest,
    pub queue: String,
}

/// One received message. Dropping it without calling [`Delivery::ack`]
/// leaves it unacknowledged.
#[derive(Debug)]
pub struct Delivery {
    pub body: Vec<u8>,
    acked: Option<Arc<AtomicUsize>>,
}

impl Delivery {
    pub fn new(body: Vec<u8>) -> Self {
        Self { body, acked: None }
    }

    pub fn ack(mut self) {
        if let Some(counter) = self.acked.take() {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub type DeliveryStream = mpsc::UnboundedReceiver<Delivery>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish `body` on `queue`
    async fn send(&self, queue: &str, body: Vec<u8>) -> Result<()>;

    /// Start consuming `queue`
    async fn receive(&self, queue: &str) -> Result<DeliveryStream>;
}

/// Serialize `value` as JSON and publish it
pub async fn send_json<T: Serialize + Sync>(transport: &dyn Transport, queue: &str, value: &T) -> Result<()> {
    let body = corral_core::to_json_vec(value)?;
    transport.send(queue, body).await
}

/// Decode a JSON message received on `queue`
pub fn decode<T: for<'de> Deserialize<'de>>(queue: &str, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| RuntimeError::malformed_message(queue, e.to_string()))
}

struct Queue {
    tx: mpsc::UnboundedSender<Delivery>,
    rx: Option<mpsc::UnboundedReceiver<Delivery>>,
    acked: Arc<AtomicUsize>,
    sent: usize,
}

impl Queue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Some(rx),
            acked: Arc::new(AtomicUsize::new(0)),
            sent: 0,
        }
    }
}

/// In-process transport with one unbounded channel per queue.
///
/// Queues are declared on first use and each has a single consumer.
#[derive(Default)]
pub struct ChannelTransport {
    queues: Mutex<HashMap<String, Queue>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages published on `queue` so far
    pub fn sent(&self, queue: &str) -> usize {
        self.queues.lock().get(queue).map(|q| q.sent).unwrap_or(0)
    }

    /// Messages acknowledged on `queue` so far
    pub fn acked(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .get(queue)
            .map(|q| q.acked.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, queue: &str, body: Vec<u8>) -> Result<()> {
        let mut queues = self.queues.lock();
        let entry = queues.entry(queue.to_string()).or_insert_with(Queue::new);
        let delivery = Delivery {
            body,
            acked: Some(entry.acked.clone()),
        };
        entry
            .tx
            .send(delivery)
            .map_err(|_| RuntimeError::queue_unavailable(queue, "consumer dropped"))?;
        entry.sent += 1;
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<DeliveryStream> {
        let mut queues = self.queues.lock();
        let entry = queues.entry(queue.to_string()).or_insert_with(Queue::new);
        entry
            .rx
            .take()
            .ok_or_else(|| RuntimeError::queue_unavailable(queue, "already has a consumer"))
    }
}
