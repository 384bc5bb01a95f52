//! Event Bus - broadcast of scatter-gather diagnostics
//!
//! The EventBus uses a tokio broadcast channel to deliver events to all
//! subscribers. Components emit, consumers (tests, loggers, metrics) subscribe.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::{RequestPhase, SgEvent};

/// Events buffered per subscriber before it starts lagging
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4096;

/// Central diagnostic bus shared by an endpoint and its gatherer
pub struct EventBus {
    tx: broadcast::Sender<SgEvent>,
}

impl EventBus {
    /// Bus buffering `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: called");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Broadcast an event; dropped when nobody is subscribed
    pub fn emit(&self, event: SgEvent) {
        debug!(
            event_type = event.event_type(),
            correlation_id = ?event.correlation_id(),
            "EventBus::emit"
        );
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<SgEvent> {
        debug!(subscribers = self.tx.receiver_count(), "EventBus::subscribe: called");
        self.tx.subscribe()
    }

    /// Create an emitter bound to one correlation key
    pub fn emitter_for(&self, correlation_id: impl Into<String>) -> EventEmitter {
        EventEmitter {
            tx: Some(self.tx.clone()),
            correlation_id: correlation_id.into(),
        }
    }

    /// Live receivers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Handle for emitting events about a single request
#[derive(Clone)]
pub struct EventEmitter {
    tx: Option<broadcast::Sender<SgEvent>>,
    correlation_id: String,
}

impl EventEmitter {
    /// Emitter with no bus behind it; every emit only logs
    pub fn detached(correlation_id: impl Into<String>) -> Self {
        Self {
            tx: None,
            correlation_id: correlation_id.into(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn emit(&self, event: SgEvent) {
        debug!(key = %self.correlation_id, event_type = event.event_type(), "EventEmitter::emit: called");
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn scattered(&self, recipients: usize) {
        self.emit(SgEvent::Scattered {
            correlation_id: self.correlation_id.clone(),
            recipients,
        });
    }

    pub fn phase(&self, phase: RequestPhase) {
        self.emit(SgEvent::PhaseChanged {
            correlation_id: self.correlation_id.clone(),
            phase,
        });
    }

    pub fn gather_timed_out(&self, timeout_ms: u64) {
        self.emit(SgEvent::GatherTimedOut {
            correlation_id: self.correlation_id.clone(),
            timeout_ms,
        });
    }

    pub fn delivered(&self, channel: &str) {
        self.emit(SgEvent::Delivered {
            correlation_id: self.correlation_id.clone(),
            channel: channel.to_string(),
        });
    }

    pub fn delivery_failed(&self, channel: &str, reason: &str) {
        self.emit(SgEvent::DeliveryFailed {
            correlation_id: self.correlation_id.clone(),
            channel: channel.to_string(),
            reason: reason.to_string(),
        });
    }
}

/// Shared bus with the default capacity
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_subscriber_count_tracks_receivers() {
        let bus = EventBus::new(16);
        assert_eq!(bus.subscriber_count(), 0);
        let first = bus.subscribe();
        let _second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        drop(first);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_emit_without_listeners_is_silent() {
        let bus = EventBus::new(16);
        bus.emit(SgEvent::GroupReleased {
            correlation_id: "c".to_string(),
            replies: 1,
        });
    }

    #[tokio::test]
    async fn test_emitter_tags_every_event_with_its_key() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let emitter = bus.emitter_for("corr-7");

        emitter.phase(RequestPhase::Init);
        emitter.scattered(3);
        emitter.phase(RequestPhase::Gathering);
        emitter.gather_timed_out(100);
        emitter.delivery_failed("out", "full");

        for _ in 0..5 {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.correlation_id(), Some("corr-7"));
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_detached_emitter_keeps_key() {
        let emitter = EventEmitter::detached("corr-8");
        emitter.phase(RequestPhase::Init);
        emitter.delivered("out");
        assert_eq!(emitter.correlation_id(), "corr-8");
    }
}
