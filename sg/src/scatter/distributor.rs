//! Distributor - sends one request to many recipients

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::error::ScatterError;
use super::recipient::RecipientList;
use crate::channel::{MessageChannel, PublishSubscribeChannel};
use crate::message::Message;

/// How a request reaches its recipients
#[derive(Debug, Clone)]
pub enum Distribution {
    /// Identical broadcast to every subscriber of a fan-out channel
    Auction(Arc<PublishSubscribeChannel>),
    /// Filtered, individually addressed sends
    RecipientList(RecipientList),
}

/// Which distribution an endpoint uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionMode {
    Auction,
    Distribution,
}

impl Distribution {
    pub fn mode(&self) -> DistributionMode {
        match self {
            Distribution::Auction(_) => DistributionMode::Auction,
            Distribution::RecipientList(_) => DistributionMode::Distribution,
        }
    }
}

/// Scatter half of the endpoint
#[derive(Debug)]
pub struct Distributor {
    distribution: Distribution,
    apply_sequence: bool,
    send_timeout: Duration,
}

impl Distributor {
    pub fn new(distribution: Distribution) -> Self {
        Self {
            distribution,
            apply_sequence: true,
            send_timeout: Duration::from_secs(1),
        }
    }

    /// Stamp sequence size/number on every copy (default on)
    pub fn with_apply_sequence(mut self, apply_sequence: bool) -> Self {
        self.apply_sequence = apply_sequence;
        self
    }

    /// Bound for sends to capacity-limited recipient channels
    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn mode(&self) -> DistributionMode {
        self.distribution.mode()
    }

    /// Send the request to its recipients, returning how many received it
    pub async fn scatter(&self, request: &Message) -> Result<usize, ScatterError> {
        debug!(message_id = %request.id, mode = ?self.mode(), "Distributor::scatter: called");
        match &self.distribution {
            Distribution::Auction(channel) => Ok(self.broadcast(channel, request)),
            Distribution::RecipientList(list) => self.distribute(list, request).await,
        }
    }

    fn broadcast(&self, channel: &PublishSubscribeChannel, request: &Message) -> usize {
        let mut copy = request.clone();
        if self.apply_sequence {
            copy.headers.sequence_size = Some(channel.subscriber_count());
            copy.headers.sequence_number = Some(1);
        }
        let reached = channel.publish(copy);
        debug!(channel = %channel.name(), reached, "Distributor::broadcast: published");
        reached
    }

    async fn distribute(&self, list: &RecipientList, request: &Message) -> Result<usize, ScatterError> {
        let selected: Vec<_> = list.select(request).collect();
        let size = selected.len();
        debug!(candidates = list.len(), selected = size, "Distributor::distribute: selected recipients");

        let mut sent = 0;
        for (index, recipient) in selected.into_iter().enumerate() {
            let mut copy = Message::with_headers(recipient.payload_for(request), request.headers.clone());
            if self.apply_sequence {
                copy.headers.sequence_size = Some(size);
                copy.headers.sequence_number = Some(index + 1);
            }

            match recipient.channel().send(copy, self.send_timeout).await {
                Ok(()) => sent += 1,
                Err(e) if list.ignores_send_failures() => {
                    warn!(recipient = %recipient.channel().name(), error = %e, "Skipping failed recipient");
                }
                Err(e) => {
                    return Err(ScatterError::Routing {
                        recipient: recipient.channel().name().to_string(),
                        source: e,
                    });
                }
            }
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{PollableChannel, QueueChannel};
    use crate::scatter::Recipient;
    use serde_json::json;

    #[tokio::test]
    async fn test_auction_stamps_live_subscriber_count() {
        let channel = Arc::new(PublishSubscribeChannel::new("bids", 16));
        let mut rx1 = channel.subscribe();
        let mut rx2 = channel.subscribe();
        let distributor = Distributor::new(Distribution::Auction(channel.clone()));

        let request = Message::new(json!({"item": "lamp"})).correlated("c1");
        assert_eq!(distributor.scatter(&request).await.unwrap(), 2);

        for rx in [&mut rx1, &mut rx2] {
            let copy = rx.recv().await.unwrap();
            assert_eq!(copy.headers.sequence_size, Some(2));
            assert_eq!(copy.correlation_id(), Some("c1"));
            assert_eq!(copy.payload, request.payload);
        }
    }

    #[tokio::test]
    async fn test_auction_without_sequence() {
        let channel = Arc::new(PublishSubscribeChannel::new("bids", 16));
        let mut rx = channel.subscribe();
        let distributor = Distributor::new(Distribution::Auction(channel)).with_apply_sequence(false);

        distributor.scatter(&Message::new(json!(1))).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().headers.sequence_size, None);
    }

    #[tokio::test]
    async fn test_distribution_sequence_counts_selected() {
        let a = Arc::new(QueueChannel::unbounded("a"));
        let b = Arc::new(QueueChannel::unbounded("b"));
        let c = Arc::new(QueueChannel::unbounded("c"));
        let list = RecipientList::new(vec![
            Recipient::new(a.clone()),
            Recipient::new(b.clone()).with_selector(|_| false),
            Recipient::new(c.clone()).with_transformer(|p| json!({"inner": p})),
        ]);
        let distributor = Distributor::new(Distribution::RecipientList(list));
        assert_eq!(distributor.mode(), DistributionMode::Distribution);

        let sent = distributor.scatter(&Message::new(json!(5)).correlated("k")).await.unwrap();
        assert_eq!(sent, 2);

        let first = a.try_receive().unwrap();
        assert_eq!(first.headers.sequence_size, Some(2));
        assert_eq!(first.headers.sequence_number, Some(1));
        assert!(b.try_receive().is_none());
        let second = c.try_receive().unwrap();
        assert_eq!(second.headers.sequence_number, Some(2));
        assert_eq!(second.payload, json!({"inner": 5}));
        assert_eq!(second.correlation_id(), Some("k"));
    }

    #[tokio::test]
    async fn test_distribution_send_failure() {
        let full = Arc::new(QueueChannel::bounded("full", 1));
        full.send(Message::new(json!(0)), Duration::ZERO).await.unwrap();
        let ok = Arc::new(QueueChannel::unbounded("ok"));

        let list = RecipientList::new(vec![Recipient::new(full.clone()), Recipient::new(ok.clone())]);
        let distributor =
            Distributor::new(Distribution::RecipientList(list.clone())).with_send_timeout(Duration::from_millis(10));
        let err = distributor.scatter(&Message::new(json!(1))).await.unwrap_err();
        assert!(matches!(err, ScatterError::Routing { ref recipient, .. } if recipient == "full"));

        let lenient = Distributor::new(Distribution::RecipientList(list.ignore_send_failures(true)))
            .with_send_timeout(Duration::from_millis(10));
        assert_eq!(lenient.scatter(&Message::new(json!(1))).await.unwrap(), 1);
    }
}
