//! ScatterGather endpoint - per-request orchestration and background tasks

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::context::RequestContext;
use super::error::ScatterGatherError;
use crate::channel::{ChannelError, ChannelRef, MessageChannel, PollableChannel, ReplySink};
use crate::config::ScatterGatherConfig;
use crate::events::{EventBus, EventEmitter, RequestPhase, SgEvent};
use crate::gather::Gatherer;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::message::Message;
use crate::scatter::{DistributionMode, Distributor};

/// State shared between the endpoint handle and its background tasks
pub(super) struct Inner {
    pub(super) name: String,
    pub(super) config: ScatterGatherConfig,
    pub(super) input: Arc<dyn PollableChannel>,
    pub(super) output: Option<ChannelRef>,
    pub(super) error_channel: Option<ChannelRef>,
    pub(super) distributor: Distributor,
    pub(super) gatherer: Arc<Gatherer>,
    /// Stamped as the reply channel on every scattered copy
    pub(super) reply_channel: ChannelRef,
    /// Polled by a subscription task when replies arrive on a dedicated channel
    pub(super) dedicated_gather: Option<Arc<dyn PollableChannel>>,
    pub(super) events: Option<Arc<EventBus>>,
    pub(super) runtime: Mutex<Runtime>,
}

/// Lifecycle state and the background tasks it owns, changed together
#[derive(Default)]
pub(super) struct Runtime {
    state: LifecycleState,
    tasks: Vec<JoinHandle<()>>,
}

/// Scatter-gather request/reply endpoint
///
/// Each request is scattered to its recipients, the replies are correlated and
/// aggregated by the gatherer, and the single result is delivered to the output
/// channel. Build one with [`ScatterGatherBuilder`](super::ScatterGatherBuilder).
pub struct ScatterGather {
    inner: Arc<Inner>,
}

impl ScatterGather {
    pub(super) fn from_inner(inner: Inner) -> Self {
        Self { inner: Arc::new(inner) }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &ScatterGatherConfig {
        &self.inner.config
    }

    pub fn mode(&self) -> DistributionMode {
        self.inner.distributor.mode()
    }

    /// The gatherer, for inspecting live groups
    pub fn gatherer(&self) -> &Arc<Gatherer> {
        &self.inner.gatherer
    }

    /// Channel recipients reply to
    pub fn reply_channel(&self) -> ChannelRef {
        self.inner.reply_channel.clone()
    }

    /// Run one request through scatter, gather and delivery
    ///
    /// Returns the delivered result, or `None` when the gather timed out and no
    /// reply is required.
    pub async fn handle_request(&self, request: Message) -> Result<Option<Message>, ScatterGatherError> {
        self.inner.handle_request(request).await
    }

    /// Feed a reply into the gatherer from outside the configured reply channel
    pub async fn on_reply(&self, reply: Message) -> Result<(), ScatterGatherError> {
        self.inner.gatherer.handle(reply).await?;
        Ok(())
    }

    /// Start consuming input, gathering replies and reaping expired groups
    ///
    /// Must be called from within a tokio runtime. Starting a running endpoint
    /// does nothing.
    pub fn start(&self) {
        let mut runtime = self.inner.runtime();
        match runtime.state {
            LifecycleState::Running => {
                debug!(endpoint = %self.inner.name, "ScatterGather::start: already running");
                return;
            }
            LifecycleState::Stopped => {
                runtime.tasks.push(tokio::spawn(consume_input(self.inner.clone())));
                if let Some(channel) = self.inner.dedicated_gather.clone() {
                    runtime.tasks.push(tokio::spawn(consume_replies(self.inner.clone(), channel)));
                }
                runtime.tasks.push(tokio::spawn(reap_groups(self.inner.clone())));
                runtime.state = LifecycleState::Running;
            }
        }
        info!(endpoint = %self.inner.name, tasks = runtime.tasks.len(), "Endpoint started");
        drop(runtime);
        self.inner.emit(SgEvent::LifecycleChanged {
            endpoint: self.inner.name.clone(),
            running: true,
        });
    }

    /// Abort the background tasks; in-flight requests finish on their own
    pub fn stop(&self) {
        let mut runtime = self.inner.runtime();
        match runtime.state {
            LifecycleState::Stopped => {
                debug!(endpoint = %self.inner.name, "ScatterGather::stop: not running");
                return;
            }
            LifecycleState::Running => {
                for task in runtime.tasks.drain(..) {
                    task.abort();
                }
                runtime.state = LifecycleState::Stopped;
            }
        }
        drop(runtime);
        info!(endpoint = %self.inner.name, "Endpoint stopped");
        self.inner.emit(SgEvent::LifecycleChanged {
            endpoint: self.inner.name.clone(),
            running: false,
        });
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }
}

impl Lifecycle for ScatterGather {
    fn name(&self) -> &str {
        ScatterGather::name(self)
    }

    fn phase(&self) -> i32 {
        self.inner.config.phase
    }

    fn start(&self) {
        ScatterGather::start(self)
    }

    fn stop(&self) {
        ScatterGather::stop(self)
    }

    fn is_running(&self) -> bool {
        ScatterGather::is_running(self)
    }

    fn state(&self) -> LifecycleState {
        ScatterGather::state(self)
    }
}

impl Drop for ScatterGather {
    fn drop(&mut self) {
        // Background tasks hold the shared state alive; stop them with the handle
        self.stop();
    }
}

impl fmt::Debug for ScatterGather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScatterGather")
            .field("name", &self.inner.name)
            .field("mode", &self.inner.distributor.mode())
            .field("state", &self.state())
            .field("gatherer", &self.inner.gatherer)
            .finish()
    }
}

impl Inner {
    async fn handle_request(&self, request: Message) -> Result<Option<Message>, ScatterGatherError> {
        if self.state() == LifecycleState::Stopped {
            return Err(ScatterGatherError::Stopped {
                endpoint: self.name.clone(),
            });
        }

        let ctx = RequestContext::new(request, self.distributor.mode(), &self.config);
        let key = ctx.correlation_key().to_string();
        debug!(endpoint = %self.name, %key, "ScatterGather::handle_request: called");
        let emitter = self.emitter(&key);
        emitter.phase(RequestPhase::Init);

        let (sink, rx) = ReplySink::new();
        let mut headers = ctx.request().headers.clone();
        headers.correlation_id = Some(key.clone());
        headers.gather_result = Some(sink);
        headers.reply_channel = Some(self.reply_channel.clone());
        headers.original_id = Some(ctx.request().id.clone());
        let scattered = Message::with_headers(ctx.request().payload.clone(), headers);

        let recipients = match self.distributor.scatter(&scattered).await {
            Ok(recipients) => recipients,
            Err(e) => {
                warn!(%key, error = %e, "Scatter failed");
                self.gatherer.discard(&key).await;
                emitter.phase(RequestPhase::Failed);
                return Err(e.into());
            }
        };
        // Only recipients and the group may hold the sink from here on
        drop(scattered);
        emitter.scattered(recipients);
        emitter.phase(RequestPhase::Scattered);

        emitter.phase(RequestPhase::Gathering);
        let outcome = if recipients == 0 {
            debug!(%key, "ScatterGather::handle_request: no recipients, nothing to gather");
            None
        } else {
            match ctx.gather_timeout() {
                Some(timeout) => tokio::time::timeout(timeout, rx).await.ok().and_then(Result::ok),
                // A dropped sink means the group was expired without a result
                None => rx.await.ok(),
            }
        };
        self.gatherer.discard(&key).await;

        let Some(mut result) = outcome else {
            return self.timed_out(&ctx, &emitter);
        };
        emitter.phase(RequestPhase::Completed);

        result.headers.gather_result = None;
        result.headers.correlation_id = ctx.caller_correlation_id().map(str::to_string);
        result.headers.reply_channel = ctx.request().headers.reply_channel.clone();
        result.headers.original_id = Some(ctx.request().id.clone());

        self.deliver(&ctx, &emitter, result).await.map(Some)
    }

    fn timed_out(&self, ctx: &RequestContext, emitter: &EventEmitter) -> Result<Option<Message>, ScatterGatherError> {
        let timeout = ctx.gather_timeout();
        warn!(key = %ctx.correlation_key(), ?timeout, requires_reply = ctx.requires_reply(), "Gather timed out");
        emitter.gather_timed_out(timeout.map(|t| t.as_millis() as u64).unwrap_or_default());
        emitter.phase(RequestPhase::TimedOut);

        if ctx.requires_reply() {
            emitter.phase(RequestPhase::Failed);
            return Err(ScatterGatherError::ReplyRequired {
                correlation_id: ctx.correlation_key().to_string(),
                timeout,
            });
        }
        Ok(None)
    }

    async fn deliver(
        &self,
        ctx: &RequestContext,
        emitter: &EventEmitter,
        result: Message,
    ) -> Result<Message, ScatterGatherError> {
        let Some(destination) = self.output.clone().or_else(|| ctx.request().headers.reply_channel.clone()) else {
            emitter.phase(RequestPhase::Failed);
            return Err(ScatterGatherError::NoOutputDestination {
                correlation_id: ctx.correlation_key().to_string(),
            });
        };

        debug!(key = %ctx.correlation_key(), channel = %destination.name(), "ScatterGather::deliver: called");
        match destination.send(result.clone(), ctx.send_timeout()).await {
            Ok(()) => {
                emitter.delivered(destination.name());
                emitter.phase(RequestPhase::Delivered);
                Ok(result)
            }
            Err(e) => {
                warn!(key = %ctx.correlation_key(), channel = %destination.name(), error = %e, "Delivery failed");
                emitter.delivery_failed(destination.name(), &e.to_string());
                emitter.phase(RequestPhase::Failed);
                Err(match e {
                    ChannelError::Full { channel, timeout } => ScatterGatherError::DeliveryExhausted { channel, timeout },
                    source => ScatterGatherError::Delivery {
                        channel: destination.name().to_string(),
                        source,
                    },
                })
            }
        }
    }

    /// Handle an input-driven request, publishing any failure to the error channel
    async fn process(&self, request: Message) {
        let error_channel = request.headers.error_channel.clone().or_else(|| self.error_channel.clone());
        let request_id = request.id.clone();
        let correlation_id = request.headers.correlation_id.clone();

        let Err(e) = self.handle_request(request).await else {
            return;
        };
        warn!(endpoint = %self.name, %request_id, error = %e, "Request failed");

        let Some(channel) = error_channel else {
            return;
        };
        let mut failure = Message::new(json!({
            "endpoint": self.name,
            "error": e.to_string(),
            "retryable": e.is_retryable(),
        }));
        failure.headers.correlation_id = correlation_id;
        failure.headers.original_id = Some(request_id);
        if let Err(send_err) = channel.send(failure, self.config.send_timeout()).await {
            warn!(channel = %channel.name(), error = %send_err, "Failed to publish error message");
        }
    }

    fn emitter(&self, key: &str) -> EventEmitter {
        match &self.events {
            Some(events) => events.emitter_for(key),
            None => EventEmitter::detached(key),
        }
    }

    fn runtime(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> LifecycleState {
        self.runtime().state
    }

    fn emit(&self, event: SgEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }
}

async fn consume_input(inner: Arc<Inner>) {
    debug!(endpoint = %inner.name, channel = %inner.input.name(), "consume_input: started");
    while let Some(request) = inner.input.receive().await {
        let inner = inner.clone();
        tokio::spawn(async move { inner.process(request).await });
    }
    debug!(endpoint = %inner.name, "consume_input: input closed");
}

async fn consume_replies(inner: Arc<Inner>, channel: Arc<dyn PollableChannel>) {
    debug!(endpoint = %inner.name, channel = %channel.name(), "consume_replies: started");
    while let Some(reply) = channel.receive().await {
        if let Err(e) = inner.gatherer.handle(reply).await {
            warn!(endpoint = %inner.name, error = %e, "Rejected reply");
        }
    }
}

async fn reap_groups(inner: Arc<Inner>) {
    let period: Duration = inner.config.reaper_interval();
    let mut ticker = tokio::time::interval(period);
    // First tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let expired = inner.gatherer.expire_groups().await;
        if expired > 0 {
            debug!(endpoint = %inner.name, expired, "reap_groups: expired groups");
        }
    }
}
