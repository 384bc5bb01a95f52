//! Recipient workers that answer scattered requests
//!
//! A worker pulls requests from a queue or a broadcast subscription, runs a
//! handler, and sends the handler's payload back on the request's reply
//! channel. A handler returning `None` stays silent.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::channel::{MessageChannel, PollableChannel};
use crate::message::Message;

/// How long a worker waits on a full reply channel
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Handler that replies with the request payload
pub fn echo(request: &Message) -> Option<Value> {
    Some(request.payload.clone())
}

/// Handler that never replies
pub fn silent(_request: &Message) -> Option<Value> {
    None
}

/// Serve requests arriving on a point-to-point channel
pub fn spawn_queue_worker<C, F>(channel: Arc<C>, handler: F) -> JoinHandle<()>
where
    C: PollableChannel + 'static,
    F: Fn(&Message) -> Option<Value> + Send + Sync + 'static,
{
    tokio::spawn(async move {
        debug!(channel = %channel.name(), "spawn_queue_worker: started");
        while let Some(request) = channel.receive().await {
            answer(&request, &handler).await;
        }
    })
}

/// Serve requests broadcast on a publish-subscribe channel
pub fn spawn_subscriber_worker<F>(mut rx: broadcast::Receiver<Message>, handler: F) -> JoinHandle<()>
where
    F: Fn(&Message) -> Option<Value> + Send + Sync + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(request) => answer(&request, &handler).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagged, requests skipped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn answer<F>(request: &Message, handler: &F)
where
    F: Fn(&Message) -> Option<Value>,
{
    let Some(payload) = handler(request) else {
        debug!(message_id = %request.id, "answer: handler stayed silent");
        return;
    };
    let Some(reply_channel) = &request.headers.reply_channel else {
        warn!(message_id = %request.id, "Request has no reply channel, dropping reply");
        return;
    };
    if let Err(e) = reply_channel.send(request.reply(payload), REPLY_TIMEOUT).await {
        warn!(channel = %reply_channel.name(), error = %e, "Failed to send reply");
    }
}
