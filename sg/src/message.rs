//! Message and header types passed between the endpoint, recipients and the gatherer

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::channel::{ChannelRef, ReplySink};

/// Metadata carried alongside a payload
///
/// Channel-valued headers live only in memory and are skipped on serialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageHeaders {
    /// Key grouping every reply that belongs to one scattered request
    #[serde(rename = "correlation-id", default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// 1-based position of this copy among the scattered copies
    #[serde(rename = "sequence-number", default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<usize>,

    /// Number of copies scattered for the request (expected reply count)
    #[serde(rename = "sequence-size", default, skip_serializing_if = "Option::is_none")]
    pub sequence_size: Option<usize>,

    /// Id of the inbound request a scattered copy was derived from
    #[serde(rename = "original-id", default, skip_serializing_if = "Option::is_none")]
    pub original_id: Option<String>,

    /// Where a recipient should send its reply
    #[serde(skip)]
    pub reply_channel: Option<ChannelRef>,

    /// Where failures for this message should be published
    #[serde(skip)]
    pub error_channel: Option<ChannelRef>,

    /// One-shot sink awaiting the aggregated result
    #[serde(skip)]
    pub gather_result: Option<ReplySink>,

    /// Free-form application headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

/// An immutable payload plus headers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub payload: Value,
    #[serde(default)]
    pub headers: MessageHeaders,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message with empty headers
    pub fn new(payload: Value) -> Self {
        Self::with_headers(payload, MessageHeaders::default())
    }

    /// Create a message with the given headers
    pub fn with_headers(payload: Value, headers: MessageHeaders) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            payload,
            headers,
            timestamp: Utc::now(),
        }
    }

    /// Build a reply that keeps this message's headers
    ///
    /// Recipients use this so correlation and sink headers travel back to the gatherer.
    pub fn reply(&self, payload: Value) -> Self {
        Self::with_headers(payload, self.headers.clone())
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.headers.correlation_id.as_deref()
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.headers.attributes.get(key)
    }

    /// Builder-style header setter for correlation id
    pub fn correlated(mut self, correlation_id: impl Into<String>) -> Self {
        self.headers.correlation_id = Some(correlation_id.into());
        self
    }

    /// Builder-style setter for the reply channel header
    pub fn reply_to(mut self, channel: ChannelRef) -> Self {
        self.headers.reply_channel = Some(channel);
        self
    }

    /// Builder-style setter for the error channel header
    pub fn errors_to(mut self, channel: ChannelRef) -> Self {
        self.headers.error_channel = Some(channel);
        self
    }

    /// Builder-style setter for an application attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.headers.attributes.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::QueueChannel;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_new_message_has_unique_id() {
        let a = Message::new(json!({"id": "req1"}));
        let b = Message::new(json!({"id": "req1"}));
        assert_ne!(a.id, b.id);
        assert!(a.headers.correlation_id.is_none());
    }

    #[test]
    fn test_reply_keeps_headers() {
        let channel: ChannelRef = Arc::new(QueueChannel::unbounded("gather"));
        let mut request = Message::new(json!({"id": "req1"})).correlated("corr-1").reply_to(channel);
        request.headers.sequence_size = Some(3);

        let reply = request.reply(json!({"v": 1}));
        assert_ne!(reply.id, request.id);
        assert_eq!(reply.correlation_id(), Some("corr-1"));
        assert_eq!(reply.headers.sequence_size, Some(3));
        assert!(reply.headers.reply_channel.is_some());
        assert_eq!(reply.payload, json!({"v": 1}));
    }

    #[test]
    fn test_serialization_skips_channels() {
        let channel: ChannelRef = Arc::new(QueueChannel::unbounded("gather"));
        let msg = Message::new(json!(42))
            .correlated("corr-9")
            .reply_to(channel)
            .with_attribute("tenant", json!("acme"));

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("correlation-id"));
        assert!(json.contains("tenant"));
        assert!(!json.contains("reply"));

        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.correlation_id(), Some("corr-9"));
        assert!(parsed.headers.reply_channel.is_none());
        assert_eq!(parsed.attribute("tenant"), Some(&json!("acme")));
    }
}
