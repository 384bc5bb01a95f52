//! Builder wiring channels and strategies into a ScatterGather endpoint

use std::sync::{Arc, Mutex};

use tracing::debug;

use super::core::{Inner, Runtime, ScatterGather};
use super::gather_channel::GatherChannel;
use crate::channel::{ChannelRef, PollableChannel, PublishSubscribeChannel};
use crate::config::{ConfigError, ScatterGatherConfig};
use crate::events::EventBus;
use crate::gather::{AggregationFunction, CorrelationStrategy, Gatherer, ReleaseStrategy};
use crate::scatter::{Distribution, Distributor, RecipientList};

/// Assembles a [`ScatterGather`] endpoint
///
/// ```rust,ignore
/// let endpoint = ScatterGatherBuilder::new("quotes")
///     .input(requests.clone())
///     .output(results.clone())
///     .scatter_channel(bidders.clone())
///     .aggregator(CollectPayloads)
///     .build()?;
/// endpoint.start();
/// ```
#[derive(Default)]
pub struct ScatterGatherBuilder {
    name: String,
    config: ScatterGatherConfig,
    input: Option<Arc<dyn PollableChannel>>,
    output: Option<ChannelRef>,
    error_channel: Option<ChannelRef>,
    scatter_channel: Option<Arc<PublishSubscribeChannel>>,
    recipients: Option<RecipientList>,
    gather_channel: Option<(Arc<dyn PollableChannel>, ChannelRef)>,
    aggregator: Option<Arc<dyn AggregationFunction>>,
    release: Option<Arc<dyn ReleaseStrategy>>,
    correlation: Option<Arc<dyn CorrelationStrategy>>,
    events: Option<Arc<EventBus>>,
}

impl ScatterGatherBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn config(mut self, config: ScatterGatherConfig) -> Self {
        self.config = config;
        self
    }

    /// Channel requests arrive on (required)
    pub fn input<C: PollableChannel + 'static>(mut self, channel: Arc<C>) -> Self {
        let channel: Arc<dyn PollableChannel> = channel;
        self.input = Some(channel);
        self
    }

    /// Where aggregated results go; falls back to each request's reply channel
    pub fn output(mut self, channel: ChannelRef) -> Self {
        self.output = Some(channel);
        self
    }

    /// Where failures of input-driven requests are published
    pub fn error_channel(mut self, channel: ChannelRef) -> Self {
        self.error_channel = Some(channel);
        self
    }

    /// Auction mode: broadcast every request on this channel
    pub fn scatter_channel(mut self, channel: Arc<PublishSubscribeChannel>) -> Self {
        self.scatter_channel = Some(channel);
        self
    }

    /// Distribution mode: route every request through this list
    pub fn recipients(mut self, recipients: RecipientList) -> Self {
        self.recipients = Some(recipients);
        self
    }

    /// Dedicated reply channel, consumed by a subscription while the endpoint runs
    pub fn gather_channel<C: PollableChannel + 'static>(mut self, channel: Arc<C>) -> Self {
        let reply: ChannelRef = channel.clone();
        let pollable: Arc<dyn PollableChannel> = channel;
        self.gather_channel = Some((pollable, reply));
        self
    }

    /// Aggregation applied to every released group (required)
    pub fn aggregator(mut self, aggregator: impl AggregationFunction + 'static) -> Self {
        let aggregator: Arc<dyn AggregationFunction> = Arc::new(aggregator);
        self.aggregator = Some(aggregator);
        self
    }

    pub fn release_strategy(mut self, release: impl ReleaseStrategy + 'static) -> Self {
        let release: Arc<dyn ReleaseStrategy> = Arc::new(release);
        self.release = Some(release);
        self
    }

    pub fn correlation_strategy(mut self, correlation: impl CorrelationStrategy + 'static) -> Self {
        let correlation: Arc<dyn CorrelationStrategy> = Arc::new(correlation);
        self.correlation = Some(correlation);
        self
    }

    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Validate the wiring and create a stopped endpoint
    pub fn build(self) -> Result<ScatterGather, ConfigError> {
        debug!(name = %self.name, "ScatterGatherBuilder::build: called");
        self.config.validate()?;

        let distribution = match (self.scatter_channel, self.recipients) {
            (Some(_), Some(_)) => return Err(ConfigError::BothDistributionModes),
            (None, None) => return Err(ConfigError::NoDistributionMode),
            (Some(channel), None) => Distribution::Auction(channel),
            (None, Some(list)) => {
                let ignore = list.ignores_send_failures() || self.config.ignore_send_failures;
                Distribution::RecipientList(list.ignore_send_failures(ignore))
            }
        };
        let aggregator = self.aggregator.ok_or(ConfigError::MissingAggregator)?;
        let input = self.input.ok_or(ConfigError::MissingInput)?;

        let distributor = Distributor::new(distribution)
            .with_apply_sequence(self.config.apply_sequence)
            .with_send_timeout(self.config.send_timeout());

        let mut gatherer = Gatherer::new(aggregator).with_settings(self.config.gatherer_settings());
        if let Some(release) = self.release {
            gatherer = gatherer.with_release_strategy(release);
        }
        if let Some(correlation) = self.correlation {
            gatherer = gatherer.with_correlation_strategy(correlation);
        }
        if let Some(events) = self.events.clone() {
            gatherer = gatherer.with_events(events);
        }
        let gatherer = Arc::new(gatherer);

        let (dedicated_gather, reply_channel) = match self.gather_channel {
            Some((pollable, reply)) => (Some(pollable), reply),
            None => {
                let channel: ChannelRef = Arc::new(GatherChannel::new(format!("{}.gather", self.name), gatherer.clone()));
                (None, channel)
            }
        };

        Ok(ScatterGather::from_inner(Inner {
            name: self.name,
            config: self.config,
            input,
            output: self.output,
            error_channel: self.error_channel,
            distributor,
            gatherer,
            reply_channel,
            dedicated_gather,
            events: self.events,
            runtime: Mutex::new(Runtime::default()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{MessageChannel, QueueChannel};
    use crate::gather::CollectPayloads;
    use crate::scatter::{DistributionMode, Recipient};

    fn input() -> Arc<QueueChannel> {
        Arc::new(QueueChannel::unbounded("in"))
    }

    #[test]
    fn test_both_modes_rejected() {
        let err = ScatterGatherBuilder::new("ep")
            .input(input())
            .scatter_channel(Arc::new(PublishSubscribeChannel::new("bids", 8)))
            .recipients(RecipientList::new(vec![Recipient::new(input())]))
            .aggregator(CollectPayloads)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::BothDistributionModes));
    }

    #[test]
    fn test_no_mode_rejected() {
        let err = ScatterGatherBuilder::new("ep")
            .input(input())
            .aggregator(CollectPayloads)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::NoDistributionMode));
    }

    #[test]
    fn test_required_parts() {
        let err = ScatterGatherBuilder::new("ep")
            .input(input())
            .scatter_channel(Arc::new(PublishSubscribeChannel::new("bids", 8)))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingAggregator));

        let err = ScatterGatherBuilder::new("ep")
            .scatter_channel(Arc::new(PublishSubscribeChannel::new("bids", 8)))
            .aggregator(CollectPayloads)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingInput));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = ScatterGatherBuilder::new("ep")
            .config(ScatterGatherConfig {
                gather_timeout_ms: -2,
                ..Default::default()
            })
            .input(input())
            .scatter_channel(Arc::new(PublishSubscribeChannel::new("bids", 8)))
            .aggregator(CollectPayloads)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout { .. }));
    }

    #[test]
    fn test_default_reply_channel_is_internal() {
        let endpoint = ScatterGatherBuilder::new("quotes")
            .input(input())
            .recipients(RecipientList::new(vec![Recipient::new(input())]))
            .aggregator(CollectPayloads)
            .build()
            .unwrap();
        assert_eq!(endpoint.mode(), DistributionMode::Distribution);
        assert_eq!(endpoint.reply_channel().name(), "quotes.gather");
        assert!(!endpoint.is_running());

        let replies = Arc::new(QueueChannel::unbounded("replies"));
        let endpoint = ScatterGatherBuilder::new("quotes")
            .input(input())
            .recipients(RecipientList::new(vec![Recipient::new(input())]))
            .gather_channel(replies)
            .aggregator(CollectPayloads)
            .build()
            .unwrap();
        assert_eq!(endpoint.reply_channel().name(), "replies");
    }
}
