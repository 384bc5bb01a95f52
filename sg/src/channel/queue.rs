//! Point-to-point queue channel backed by a tokio mpsc channel

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::debug;

use super::{ChannelError, MessageChannel, PollableChannel};
use crate::message::Message;

#[derive(Debug)]
enum QueueSender {
    Bounded(mpsc::Sender<Message>),
    Unbounded(mpsc::UnboundedSender<Message>),
}

#[derive(Debug)]
enum QueueReceiver {
    Bounded(mpsc::Receiver<Message>),
    Unbounded(mpsc::UnboundedReceiver<Message>),
}

impl QueueReceiver {
    async fn recv(&mut self) -> Option<Message> {
        match self {
            QueueReceiver::Bounded(rx) => rx.recv().await,
            QueueReceiver::Unbounded(rx) => rx.recv().await,
        }
    }

    fn try_recv(&mut self) -> Option<Message> {
        match self {
            QueueReceiver::Bounded(rx) => rx.try_recv().ok(),
            QueueReceiver::Unbounded(rx) => rx.try_recv().ok(),
        }
    }
}

/// Queue channel with a single logical consumer
///
/// A bounded queue applies backpressure: `send` waits up to the given timeout
/// for capacity and then fails with [`ChannelError::Full`].
#[derive(Debug)]
pub struct QueueChannel {
    name: String,
    tx: QueueSender,
    rx: Mutex<QueueReceiver>,
    capacity: Option<usize>,
}

impl QueueChannel {
    /// Create a capacity-bounded queue
    pub fn bounded(name: impl Into<String>, capacity: usize) -> Self {
        let name = name.into();
        debug!(%name, capacity, "QueueChannel::bounded: called");
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            name,
            tx: QueueSender::Bounded(tx),
            rx: Mutex::new(QueueReceiver::Bounded(rx)),
            capacity: Some(capacity.max(1)),
        }
    }

    /// Create an always-accepting queue
    pub fn unbounded(name: impl Into<String>) -> Self {
        let name = name.into();
        debug!(%name, "QueueChannel::unbounded: called");
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name,
            tx: QueueSender::Unbounded(tx),
            rx: Mutex::new(QueueReceiver::Unbounded(rx)),
            capacity: None,
        }
    }

    /// Maximum capacity, `None` for unbounded queues
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Remaining free slots, `None` for unbounded queues
    pub fn remaining_capacity(&self) -> Option<usize> {
        match &self.tx {
            QueueSender::Bounded(tx) => Some(tx.capacity()),
            QueueSender::Unbounded(_) => None,
        }
    }
}

#[async_trait]
impl MessageChannel for QueueChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: Message, timeout: Duration) -> Result<(), ChannelError> {
        debug!(channel = %self.name, message_id = %message.id, ?timeout, "QueueChannel::send: called");
        match &self.tx {
            QueueSender::Bounded(tx) => tx.send_timeout(message, timeout).await.map_err(|e| match e {
                SendTimeoutError::Timeout(_) => ChannelError::Full {
                    channel: self.name.clone(),
                    timeout,
                },
                SendTimeoutError::Closed(_) => ChannelError::Closed {
                    channel: self.name.clone(),
                },
            }),
            QueueSender::Unbounded(tx) => tx.send(message).map_err(|_| ChannelError::Closed {
                channel: self.name.clone(),
            }),
        }
    }
}

#[async_trait]
impl PollableChannel for QueueChannel {
    async fn receive(&self) -> Option<Message> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    fn try_receive(&self) -> Option<Message> {
        // try_lock so a blocked receive() elsewhere doesn't stall us
        let mut rx = self.rx.try_lock().ok()?;
        rx.try_recv()
    }
}
