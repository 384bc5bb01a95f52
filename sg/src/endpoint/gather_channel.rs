//! Always-accepting reply destination that feeds the gatherer directly

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::channel::{ChannelError, MessageChannel};
use crate::gather::Gatherer;
use crate::message::Message;

/// Reply channel used when no dedicated gather channel is configured
#[derive(Debug)]
pub(crate) struct GatherChannel {
    name: String,
    gatherer: Arc<Gatherer>,
}

impl GatherChannel {
    pub(crate) fn new(name: impl Into<String>, gatherer: Arc<Gatherer>) -> Self {
        Self {
            name: name.into(),
            gatherer,
        }
    }
}

#[async_trait]
impl MessageChannel for GatherChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: Message, _timeout: Duration) -> Result<(), ChannelError> {
        self.gatherer
            .handle(message)
            .await
            .map_err(|e| ChannelError::Rejected {
                channel: self.name.clone(),
                reason: e.to_string(),
            })
    }
}
