//! In-band notification fabric
//!
//! A process-wide broadcast channel carries `knowledge_published` events from
//! the approval paths to every connected SSE subscriber. Each subscriber
//! holds its own dedicated receiver (the channel analogue of a persistent
//! listen connection); slow subscribers lag and drop rather than backing up
//! publishers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::types::KnowledgeCategory;

/// Buffered events per subscriber before lagging kicks in
const CHANNEL_CAPACITY: usize = 256;

/// Payload published on the `knowledge_published` channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgePublished {
    pub id: uuid::Uuid,
    pub is_public: bool,
    pub tenant_id: String,
    pub category: KnowledgeCategory,
    /// First 80 chars of content, for display
    pub title: String,
}

/// Broadcast hub for knowledge publication events
#[derive(Debug)]
pub struct NotificationHub {
    sender: broadcast::Sender<KnowledgePublished>,
}

impl NotificationHub {
    /// Create the hub; one per process
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an event to all current subscribers
    ///
    /// Returns the number of subscribers that received it; zero subscribers
    /// is not an error.
    pub fn publish(&self, event: KnowledgePublished) -> usize {
        let delivered = self.sender.send(event).unwrap_or(0);
        debug!("notification hub: delivered knowledge_published to {delivered} subscribers");
        delivered
    }

    /// Open a dedicated receiver for one subscriber
    pub fn subscribe(&self) -> broadcast::Receiver<KnowledgePublished> {
        self.sender.subscribe()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn event(is_public: bool, tenant: &str) -> KnowledgePublished {
        KnowledgePublished {
            id: Uuid::new_v4(),
            is_public,
            tenant_id: tenant.to_string(),
            category: KnowledgeCategory::General,
            title: "a test item".to_string(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let hub = NotificationHub::new();
        let mut rx = hub.subscribe();

        let delivered = hub.publish(event(true, "acme"));
        assert_eq!(delivered, 1);

        let received = rx.recv().await.unwrap();
        assert!(received.is_public);
        assert_eq!(received.tenant_id, "acme");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let hub = NotificationHub::new();
        assert_eq!(hub.publish(event(false, "acme")), 0);
    }

    #[tokio::test]
    async fn dropped_subscriber_stops_counting() {
        let hub = NotificationHub::new();
        let rx = hub.subscribe();
        drop(rx);
        assert_eq!(hub.publish(event(true, "acme")), 0);
    }
}
