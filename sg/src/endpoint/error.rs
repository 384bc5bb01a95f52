//! Endpoint error types

use std::time::Duration;

use thiserror::Error;

use crate::channel::ChannelError;
use crate::gather::GatherError;
use crate::scatter::ScatterError;

/// Errors a scatter-gather request can resolve with
#[derive(Debug, Error)]
pub enum ScatterGatherError {
    #[error("No reply for '{correlation_id}' within {timeout:?}")]
    ReplyRequired {
        correlation_id: String,
        timeout: Option<Duration>,
    },

    #[error("Output channel '{channel}' still full after {timeout:?}")]
    DeliveryExhausted { channel: String, timeout: Duration },

    #[error("Failed to deliver result to '{channel}': {source}")]
    Delivery {
        channel: String,
        #[source]
        source: ChannelError,
    },

    #[error("No output channel configured and request '{correlation_id}' has no reply channel")]
    NoOutputDestination { correlation_id: String },

    #[error(transparent)]
    Routing(#[from] ScatterError),

    #[error(transparent)]
    Gather(#[from] GatherError),

    #[error("Endpoint '{endpoint}' is not running")]
    Stopped { endpoint: String },
}

impl ScatterGatherError {
    /// Whether the caller may reasonably resubmit the request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScatterGatherError::ReplyRequired { .. } | ScatterGatherError::DeliveryExhausted { .. }
        )
    }
}
