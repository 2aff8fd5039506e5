//! Out-of-band webhook delivery
//!
//! After an approval commits, one delivery task is enqueued per active
//! endpoint whose subscription matches the event type. A background worker
//! drains the queue and POSTs JSON payloads; each delivery gets a bounded
//! number of retries with fixed backoff and is then dropped — webhook
//! delivery is at-most-once-ish and never blocks the request path.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::storage::KnowledgeStore;
use crate::Result;

/// Event type emitted when an item enters the commons
pub const EVENT_KNOWLEDGE_APPROVED: &str = "knowledge.approved";

/// HTTP timeout per delivery attempt
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Retries after the initial attempt
const MAX_RETRIES: usize = 3;

/// Fixed backoff between attempts
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// JSON payload POSTed to webhook endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    pub knowledge_item_id: Uuid,
    pub tenant_id: String,
    pub category: String,
    pub timestamp: String,
}

/// One pending delivery to a single endpoint
#[derive(Debug, Clone)]
pub struct Delivery {
    pub url: String,
    pub payload: WebhookPayload,
}

/// Enqueues deliveries for the background worker
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    queue: mpsc::UnboundedSender<Delivery>,
}

impl WebhookDispatcher {
    /// Create the dispatcher and its worker-side receiver
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (queue, rx) = mpsc::unbounded_channel();
        (Self { queue }, rx)
    }

    /// Fan out one event to all matching active endpoints for a tenant
    ///
    /// Returns the number of deliveries enqueued.
    pub async fn dispatch(
        &self,
        store: &dyn KnowledgeStore,
        tenant_id: &str,
        event: &str,
        knowledge_item_id: Uuid,
        category: &str,
    ) -> Result<usize> {
        let endpoints = store.active_webhook_endpoints(tenant_id).await?;

        let payload = WebhookPayload {
            event: event.to_string(),
            knowledge_item_id,
            tenant_id: tenant_id.to_string(),
            category: category.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        };

        let mut dispatched = 0;
        for endpoint in endpoints {
            if !endpoint.accepts(event) {
                continue;
            }
            if self
                .queue
                .send(Delivery {
                    url: endpoint.url,
                    payload: payload.clone(),
                })
                .is_err()
            {
                warn!("webhook dispatcher: worker queue closed, dropping delivery");
                break;
            }
            dispatched += 1;
        }

        debug!("webhook dispatcher: {dispatched} deliveries enqueued for {event}");
        Ok(dispatched)
    }
}

/// Drain the delivery queue until the dispatcher side closes
///
/// Spawn once at startup: `tokio::spawn(run_delivery_worker(rx))`.
pub async fn run_delivery_worker(mut queue: mpsc::UnboundedReceiver<Delivery>) {
    let client = match reqwest::Client::builder().timeout(DELIVERY_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            warn!("webhook worker: failed to build HTTP client: {e}");
            return;
        }
    };

    while let Some(delivery) = queue.recv().await {
        deliver_with_retry(&client, &delivery).await;
    }
    info!("webhook worker: queue closed, shutting down");
}

/// POST one payload, retrying on any failure (network, non-2xx, timeout)
async fn deliver_with_retry(client: &reqwest::Client, delivery: &Delivery) {
    for attempt in 0..=MAX_RETRIES {
        match client
            .post(&delivery.url)
            .json(&delivery.payload)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!(
                    "webhook delivered to {} (status {})",
                    delivery.url,
                    response.status()
                );
                return;
            }
            Ok(response) => {
                warn!(
                    "webhook to {} returned {} (attempt {}/{})",
                    delivery.url,
                    response.status(),
                    attempt + 1,
                    MAX_RETRIES + 1
                );
            }
            Err(e) => {
                warn!(
                    "webhook to {} failed: {e} (attempt {}/{})",
                    delivery.url,
                    attempt + 1,
                    MAX_RETRIES + 1
                );
            }
        }
        if attempt < MAX_RETRIES {
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }
    warn!("webhook to {} dropped after {} attempts", delivery.url, MAX_RETRIES + 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_with_expected_shape() {
        let payload = WebhookPayload {
            event: EVENT_KNOWLEDGE_APPROVED.to_string(),
            knowledge_item_id: Uuid::new_v4(),
            tenant_id: "acme".to_string(),
            category: "bug_fix".to_string(),
            timestamp: Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["event"], "knowledge.approved");
        assert_eq!(json["tenant_id"], "acme");
        assert_eq!(json["category"], "bug_fix");
        assert!(json["knowledge_item_id"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn enqueued_delivery_reaches_the_worker_side() {
        let (dispatcher, mut rx) = WebhookDispatcher::new();
        dispatcher
            .queue
            .send(Delivery {
                url: "https://example.com/hook".to_string(),
                payload: WebhookPayload {
                    event: EVENT_KNOWLEDGE_APPROVED.to_string(),
                    knowledge_item_id: Uuid::new_v4(),
                    tenant_id: "acme".to_string(),
                    category: "general".to_string(),
                    timestamp: Utc::now().to_rfc3339(),
                },
            })
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.url, "https://example.com/hook");
    }
}
