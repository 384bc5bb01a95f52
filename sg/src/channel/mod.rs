//! In-memory message channels
//!
//! The endpoint talks to every destination through [`MessageChannel`]. Three
//! reference transports are provided:
//! - **QueueChannel:** point-to-point, optionally capacity-bounded
//! - **PublishSubscribeChannel:** broadcast fan-out to every live subscriber
//! - **ReplySink:** one-shot destination for a single aggregated result

mod error;
mod pubsub;
mod queue;
mod reply;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::message::Message;

pub use error::ChannelError;
pub use pubsub::{DEFAULT_PUBSUB_CAPACITY, PublishSubscribeChannel};
pub use reply::ReplySink;
pub use queue::QueueChannel;

/// Shared handle to any channel
pub type ChannelRef = Arc<dyn MessageChannel>;

/// A destination messages can be sent to
#[async_trait]
pub trait MessageChannel: fmt::Debug + Send + Sync {
    /// Channel name used in logs and errors
    fn name(&self) -> &str;

    /// Send a message
    ///
    /// `timeout` bounds how long a capacity-limited channel may block; channels
    /// that always accept ignore it.
    async fn send(&self, message: Message, timeout: Duration) -> Result<(), ChannelError>;
}

/// A channel that buffers messages for a consumer to pull
#[async_trait]
pub trait PollableChannel: MessageChannel {
    /// Wait for the next message; `None` once the channel is closed
    async fn receive(&self) -> Option<Message>;

    /// Take a message if one is immediately available
    fn try_receive(&self) -> Option<Message>;
}
