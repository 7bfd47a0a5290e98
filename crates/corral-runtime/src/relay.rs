use crate::error::Result;
use crate::transport::{decode, send_json, RetryRequest, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Holds retry requests for their backoff, then republishes them to the
/// queue they came from
pub struct BackoffRelay {
    transport: Arc<dyn Transport>,
    queue: String,
}

impl BackoffRelay {
    pub fn new(transport: Arc<dyn Transport>, queue: impl Into<String>) -> Self {
        Self {
            transport,
            queue: queue.into(),
        }
    }

    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        let mut deliveries = self.transport.receive(&self.queue).await?;
        info!("Backoff relay consuming '{}'", self.queue);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Backoff relay shutting down");
                    return Ok(());
                }
                delivery = deliveries.recv() => {
                    let Some(delivery) = delivery else {
                        return Ok(());
                    };
                    match decode::<RetryRequest>(&self.queue, &delivery.body) {
                        Ok(retry) => self.schedule_resend(retry, token.clone()),
                        Err(e) => warn!("Dropping message: {}", e),
                    }
                    delivery.ack();
                }
            }
        }
    }

    fn schedule_resend(&self, retry: RetryRequest, token: CancellationToken) {
        let transport = self.transport.clone();
        let delay = Duration::from_secs(retry.request.last_backoff_time);
        debug!(key = %retry.request.key, ?delay, "Holding retry");

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if let Err(e) = send_json(transport.as_ref(), &retry.queue, &retry.request).await {
                warn!(key = %retry.request.key, "Failed to republish retry: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelTransport, ScheduleRequest};

    #[tokio::test(start_paused = true)]
    async fn test_republishes_after_backoff() {
        let transport = Arc::new(ChannelTransport::new());
        let mut work = transport.receive("work").await.unwrap();
        let relay = BackoffRelay::new(transport.clone(), "backoff");
        let token = CancellationToken::new();
        let run_token = token.clone();
        let handle = tokio::spawn(async move { relay.run(run_token).await });

        let mut request = ScheduleRequest::new("default/web");
        request.last_backoff_time = 4;
        let retry = RetryRequest {
            request: request.clone(),
            queue: "work".to_string(),
        };
        send_json(transport.as_ref(), "backoff", &retry).await.unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(work.try_recv().is_err());
        assert_eq!(transport.acked("backoff"), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let delivery = work.try_recv().unwrap();
        let resent: ScheduleRequest = decode("work", &delivery.body).unwrap();
        assert_eq!(resent, request);

        token.cancel();
        handle.await.unwrap().unwrap();
    }
}
