//! One-shot reply sink for a single aggregated result

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use super::{ChannelError, MessageChannel};
use crate::message::Message;

/// Ephemeral destination created for exactly one request
///
/// Clones share the same slot. The first successful delivery consumes it;
/// every later delivery fails with [`ChannelError::Closed`].
#[derive(Clone)]
pub struct ReplySink {
    id: String,
    slot: Arc<Mutex<Option<oneshot::Sender<Message>>>>,
}

impl ReplySink {
    /// Create a sink and the receiver that awaits its single message
    pub fn new() -> (Self, oneshot::Receiver<Message>) {
        let (tx, rx) = oneshot::channel();
        let id = format!("reply-sink-{}", Uuid::now_v7());
        debug!(%id, "ReplySink::new: called");
        (
            Self {
                id,
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Deliver the result; fails if already used or the receiver is gone
    pub fn deliver(&self, message: Message) -> Result<(), ChannelError> {
        let tx = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        match tx {
            Some(tx) => tx.send(message).map_err(|_| {
                debug!(id = %self.id, "ReplySink::deliver: receiver dropped");
                self.closed()
            }),
            None => {
                debug!(id = %self.id, "ReplySink::deliver: already used");
                Err(self.closed())
            }
        }
    }

    /// True once the sink has been used or its receiver dropped
    pub fn is_closed(&self) -> bool {
        match self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).as_ref() {
            Some(tx) => tx.is_closed(),
            None => true,
        }
    }

    fn closed(&self) -> ChannelError {
        ChannelError::Closed {
            channel: self.id.clone(),
        }
    }
}

impl fmt::Debug for ReplySink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplySink")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl MessageChannel for ReplySink {
    fn name(&self) -> &str {
        &self.id
    }

    async fn send(&self, message: Message, _timeout: Duration) -> Result<(), ChannelError> {
        self.deliver(message)
    }
}
