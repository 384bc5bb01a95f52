//! Channel error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while sending to a channel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("Channel '{channel}' still full after {timeout:?}")]
    Full { channel: String, timeout: Duration },

    #[error("Channel '{channel}' is closed")]
    Closed { channel: String },

    #[error("Channel '{channel}' rejected message: {reason}")]
    Rejected { channel: String, reason: String },
}

impl ChannelError {
    /// Name of the channel that failed
    pub fn channel(&self) -> &str {
        match self {
            ChannelError::Full { channel, .. }
            | ChannelError::Closed { channel }
            | ChannelError::Rejected { channel, .. } => channel,
        }
    }

    /// Check if the failure was a capacity timeout
    pub fn is_full(&self) -> bool {
        matches!(self, ChannelError::Full { .. })
    }
}
