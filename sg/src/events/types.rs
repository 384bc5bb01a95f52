//! Event types for scatter-gather diagnostics
//!
//! These events represent the observable activity of an endpoint:
//! - Request progress (scatter, phase transitions, delivery)
//! - Reply group activity (append, release, expiry, late drops)
//! - Endpoint lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phases a single request moves through inside the endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestPhase {
    Init,
    Scattered,
    Gathering,
    Completed,
    TimedOut,
    Delivered,
    Failed,
}

impl RequestPhase {
    /// Terminal phases end the request
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestPhase::Delivered | RequestPhase::Failed)
    }
}

/// Core event enum - the vocabulary of scatter-gather activity
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SgEvent {
    // === Request ===
    /// A request was scattered to its recipients
    Scattered {
        correlation_id: String,
        recipients: usize,
    },
    /// A request moved to a new phase
    PhaseChanged {
        correlation_id: String,
        phase: RequestPhase,
    },
    /// No aggregated result arrived within the gather timeout
    GatherTimedOut { correlation_id: String, timeout_ms: u64 },
    /// The aggregated result reached the output destination
    Delivered { correlation_id: String, channel: String },
    /// The aggregated result could not be delivered
    DeliveryFailed {
        correlation_id: String,
        channel: String,
        reason: String,
    },

    // === Reply groups ===
    /// A reply was appended to its group
    ReplyAppended {
        correlation_id: String,
        received: usize,
        expected: Option<usize>,
    },
    /// A group satisfied its release strategy and was aggregated
    GroupReleased { correlation_id: String, replies: usize },
    /// A reply arrived after its group was released or expired
    LateReplyDropped { correlation_id: String, message_id: String },
    /// A partial group was expired
    GroupExpired {
        correlation_id: String,
        replies: usize,
        partial_released: bool,
    },

    // === Lifecycle ===
    /// An endpoint was started or stopped
    LifecycleChanged { endpoint: String, running: bool },
}

impl SgEvent {
    /// Correlation id for request and group events
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            SgEvent::Scattered { correlation_id, .. }
            | SgEvent::PhaseChanged { correlation_id, .. }
            | SgEvent::GatherTimedOut { correlation_id, .. }
            | SgEvent::Delivered { correlation_id, .. }
            | SgEvent::DeliveryFailed { correlation_id, .. }
            | SgEvent::ReplyAppended { correlation_id, .. }
            | SgEvent::GroupReleased { correlation_id, .. }
            | SgEvent::LateReplyDropped { correlation_id, .. }
            | SgEvent::GroupExpired { correlation_id, .. } => Some(correlation_id),
            SgEvent::LifecycleChanged { .. } => None,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            SgEvent::Scattered { .. } => "Scattered",
            SgEvent::PhaseChanged { .. } => "PhaseChanged",
            SgEvent::GatherTimedOut { .. } => "GatherTimedOut",
            SgEvent::Delivered { .. } => "Delivered",
            SgEvent::DeliveryFailed { .. } => "DeliveryFailed",
            SgEvent::ReplyAppended { .. } => "ReplyAppended",
            SgEvent::GroupReleased { .. } => "GroupReleased",
            SgEvent::LateReplyDropped { .. } => "LateReplyDropped",
            SgEvent::GroupExpired { .. } => "GroupExpired",
            SgEvent::LifecycleChanged { .. } => "LifecycleChanged",
        }
    }
}

/// A timestamped event entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub event: SgEvent,
}

impl EventLogEntry {
    /// Create a new log entry with current timestamp
    pub fn new(event: SgEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
