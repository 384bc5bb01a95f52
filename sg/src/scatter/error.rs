//! Scatter error types

use thiserror::Error;

use crate::channel::ChannelError;

/// Errors that can occur while sending to recipients
#[derive(Debug, Error)]
pub enum ScatterError {
    #[error("Failed to send to recipient '{recipient}': {source}")]
    Routing {
        recipient: String,
        #[source]
        source: ChannelError,
    },
}
