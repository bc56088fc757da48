// Live push channel for job-completion events. Fire-and-forget: delivery
// failure is logged, never surfaced to the pipeline.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

#[derive(Debug, Clone, Serialize)]
pub struct PushEvent {
    pub event: String,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn send_to_user(&self, user_id: &str, event: PushEvent);
}

/// In-process hub mapping user ids to broadcast channels. A user without
/// an active subscription simply misses the event.
pub struct NotificationHub {
    channels: RwLock<HashMap<String, broadcast::Sender<PushEvent>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub async fn subscribe(&self, user_id: &str) -> broadcast::Receiver<PushEvent> {
        let mut channels = self.channels.write().await;
        channels
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(16).0)
            .subscribe()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushChannel for NotificationHub {
    async fn send_to_user(&self, user_id: &str, event: PushEvent) {
        let channels = self.channels.read().await;
        match channels.get(user_id) {
            Some(sender) => {
                if let Err(e) = sender.send(event) {
                    tracing::warn!("Push delivery to {} failed: {}", user_id, e);
                }
            }
            None => {
                tracing::debug!("No push subscribers for {}", user_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_event() {
        let hub = NotificationHub::new();
        let mut rx = hub.subscribe("user-1").await;

        hub.send_to_user(
            "user-1",
            PushEvent {
                event: "narration_completed".to_string(),
                payload: serde_json::json!({"requestId": "r1"}),
            },
        )
        .await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, "narration_completed");
        assert_eq!(event.payload["requestId"], "r1");
    }

    #[tokio::test]
    async fn sending_without_subscribers_is_a_no_op() {
        let hub = NotificationHub::new();
        hub.send_to_user(
            "nobody",
            PushEvent {
                event: "narration_completed".to_string(),
                payload: serde_json::json!({}),
            },
        )
        .await;
    }
}
