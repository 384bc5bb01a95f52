//! Publish-subscribe channel - broadcast fan-out for auction-style scatter
//!
//! Uses a tokio broadcast channel so every live subscriber receives its own copy.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::{ChannelError, MessageChannel};
use crate::message::Message;

/// Default channel capacity (messages buffered per subscriber)
pub const DEFAULT_PUBSUB_CAPACITY: usize = 1024;

/// Fan-out channel delivering each message to every live subscriber
///
/// Publishing never blocks and never fails; with no subscribers the message is dropped.
#[derive(Debug)]
pub struct PublishSubscribeChannel {
    name: String,
    tx: broadcast::Sender<Message>,
}

impl PublishSubscribeChannel {
    /// Create a new channel with the given per-subscriber capacity
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let name = name.into();
        debug!(%name, capacity, "PublishSubscribeChannel::new: called");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { name, tx }
    }

    /// Create a new channel with default capacity
    pub fn with_default_capacity(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_PUBSUB_CAPACITY)
    }

    /// Subscribe to receive messages published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        debug!(channel = %self.name, "PublishSubscribeChannel::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Broadcast a message, returning how many subscribers it reached
    pub fn publish(&self, message: Message) -> usize {
        debug!(channel = %self.name, message_id = %message.id, "PublishSubscribeChannel::publish: called");
        self.tx.send(message).unwrap_or(0)
    }
}

#[async_trait]
impl MessageChannel for PublishSubscribeChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: Message, _timeout: Duration) -> Result<(), ChannelError> {
        self.publish(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscriber_count() {
        let channel = PublishSubscribeChannel::new("bids", 16);
        assert_eq!(channel.subscriber_count(), 0);
        let _rx1 = channel.subscribe();
        let rx2 = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 2);
        drop(rx2);
        assert_eq!(channel.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let channel = PublishSubscribeChannel::new("bids", 16);
        let mut rx1 = channel.subscribe();
        let mut rx2 = channel.subscribe();

        let reached = channel.publish(Message::new(json!({"item": "lamp"})));
        assert_eq!(reached, 2);

        assert_eq!(rx1.recv().await.unwrap().payload["item"], "lamp");
        assert_eq!(rx2.recv().await.unwrap().payload["item"], "lamp");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let channel = PublishSubscribeChannel::with_default_capacity("bids");
        assert_eq!(channel.publish(Message::new(json!(1))), 0);
        assert!(channel.send(Message::new(json!(2)), Duration::ZERO).await.is_ok());
    }
}
