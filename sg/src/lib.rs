//! Scatter-gather request/reply endpoint
//!
//! One inbound request is broadcast or routed to many independent recipients,
//! their replies are correlated under a shared key, a release strategy decides
//! when enough have arrived, and an aggregation function folds them into a
//! single result delivered to an output channel.
//!
//! # Modules
//!
//! - [`message`] - Messages and headers
//! - [`channel`] - In-memory channels and the one-shot reply sink
//! - [`scatter`] - Auction and recipient-list distribution
//! - [`gather`] - Correlation, release and aggregation
//! - [`endpoint`] - The orchestrating `ScatterGather` endpoint
//! - [`lifecycle`] - Phase-ordered start/stop
//! - [`events`] - Diagnostic event bus
//! - [`config`] - Configuration types and loading
//! - [`workers`] - Recipient workers
//! - [`cli`] - Command-line interface

pub mod channel;
pub mod cli;
pub mod config;
pub mod endpoint;
pub mod events;
pub mod gather;
pub mod lifecycle;
pub mod message;
pub mod scatter;
pub mod workers;

pub use channel::{ChannelError, ChannelRef, MessageChannel, PollableChannel, PublishSubscribeChannel, QueueChannel, ReplySink};
pub use config::{Config, ConfigError, ScatterGatherConfig};
pub use endpoint::{RequestContext, ScatterGather, ScatterGatherBuilder, ScatterGatherError};
pub use events::{EventBus, EventEmitter, RequestPhase, SgEvent, create_event_bus};
pub use gather::{
    AggregateFn, AggregationFunction, CollectPayloads, CorrelationStrategy, CountRelease, GatherError, Gatherer,
    GathererSettings, HeaderCorrelation, KeyFn, PredicateRelease, ReleaseStrategy, ReplyGroup, SequenceSizeRelease,
};
pub use lifecycle::{Lifecycle, LifecycleGroup, LifecycleState};
pub use message::{Message, MessageHeaders};
pub use scatter::{Distribution, DistributionMode, Distributor, Recipient, RecipientList, ScatterError};
