//! Per-request context snapshot

use std::time::Duration;

use uuid::Uuid;

use crate::config::ScatterGatherConfig;
use crate::message::Message;
use crate::scatter::DistributionMode;

/// Immutable view of one in-flight request
///
/// Created when a request enters the endpoint and dropped once it resolves.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request: Message,
    correlation_key: String,
    mode: DistributionMode,
    gather_timeout: Option<Duration>,
    send_timeout: Duration,
    requires_reply: bool,
}

impl RequestContext {
    pub fn new(request: Message, mode: DistributionMode, config: &ScatterGatherConfig) -> Self {
        // Fresh per call; the caller's correlation id is only carried through
        Self {
            request,
            correlation_key: Uuid::now_v7().to_string(),
            mode,
            gather_timeout: config.gather_timeout(),
            send_timeout: config.send_timeout(),
            requires_reply: config.requires_reply,
        }
    }

    pub fn request(&self) -> &Message {
        &self.request
    }

    /// Key the gatherer groups this request's replies under
    pub fn correlation_key(&self) -> &str {
        &self.correlation_key
    }

    /// Correlation id the caller put on the request, restored on the result
    pub fn caller_correlation_id(&self) -> Option<&str> {
        self.request.correlation_id()
    }

    pub fn mode(&self) -> DistributionMode {
        self.mode
    }

    /// `None` waits without limit
    pub fn gather_timeout(&self) -> Option<Duration> {
        self.gather_timeout
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    pub fn requires_reply(&self) -> bool {
        self.requires_reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_is_fresh_per_request() {
        let request = Message::new(json!({"id": "req1"}));
        let config = ScatterGatherConfig::default();
        let first = RequestContext::new(request.clone(), DistributionMode::Auction, &config);
        let second = RequestContext::new(request.clone(), DistributionMode::Auction, &config);
        assert_ne!(first.correlation_key(), second.correlation_key());
        assert_ne!(first.correlation_key(), request.id);
        assert_eq!(first.caller_correlation_id(), None);
        assert_eq!(first.gather_timeout(), None);
        assert!(first.requires_reply());
    }

    #[test]
    fn test_key_ignores_caller_correlation_header() {
        let config = ScatterGatherConfig {
            gather_timeout_ms: 100,
            requires_reply: false,
            ..Default::default()
        };
        let ctx = RequestContext::new(
            Message::new(json!(1)).correlated("order-7"),
            DistributionMode::Distribution,
            &config,
        );
        assert_ne!(ctx.correlation_key(), "order-7");
        assert_eq!(ctx.caller_correlation_id(), Some("order-7"));
        assert_eq!(ctx.gather_timeout(), Some(Duration::from_millis(100)));
        assert!(!ctx.requires_reply());
        assert_eq!(ctx.mode(), DistributionMode::Distribution);
    }
}
