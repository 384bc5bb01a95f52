//! Recipient list for distribution-mode scatter

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::channel::ChannelRef;
use crate::message::Message;

/// Predicate deciding whether a recipient gets the request
pub type Selector = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// Per-recipient payload transformation
pub type Transformer = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// One candidate destination
#[derive(Clone)]
pub struct Recipient {
    channel: ChannelRef,
    selector: Option<Selector>,
    transformer: Option<Transformer>,
}

impl Recipient {
    /// Recipient that always receives the request unchanged
    pub fn new(channel: ChannelRef) -> Self {
        Self {
            channel,
            selector: None,
            transformer: None,
        }
    }

    /// Only send when the selector accepts the request
    pub fn with_selector(mut self, selector: impl Fn(&Message) -> bool + Send + Sync + 'static) -> Self {
        self.selector = Some(Arc::new(selector));
        self
    }

    /// Transform the payload for this recipient
    pub fn with_transformer(mut self, transformer: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        self.transformer = Some(Arc::new(transformer));
        self
    }

    pub fn channel(&self) -> &ChannelRef {
        &self.channel
    }

    /// True if this recipient should receive the request
    pub fn accepts(&self, request: &Message) -> bool {
        self.selector.as_ref().is_none_or(|select| select(request))
    }

    /// Payload this recipient receives
    pub fn payload_for(&self, request: &Message) -> Value {
        match &self.transformer {
            Some(transform) => transform(&request.payload),
            None => request.payload.clone(),
        }
    }
}

impl fmt::Debug for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipient")
            .field("channel", &self.channel.name())
            .field("selector", &self.selector.is_some())
            .field("transformer", &self.transformer.is_some())
            .finish()
    }
}

/// Ordered candidate recipients
#[derive(Debug, Clone, Default)]
pub struct RecipientList {
    recipients: Vec<Recipient>,
    ignore_send_failures: bool,
}

impl RecipientList {
    pub fn new(recipients: Vec<Recipient>) -> Self {
        Self {
            recipients,
            ignore_send_failures: false,
        }
    }

    /// Append a recipient
    pub fn push(mut self, recipient: Recipient) -> Self {
        self.recipients.push(recipient);
        self
    }

    /// Skip recipients whose send fails instead of aborting the scatter
    pub fn ignore_send_failures(mut self, ignore: bool) -> Self {
        self.ignore_send_failures = ignore;
        self
    }

    pub fn ignores_send_failures(&self) -> bool {
        self.ignore_send_failures
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    /// Recipients accepting the request, in list order
    pub fn select<'a>(&'a self, request: &'a Message) -> impl Iterator<Item = &'a Recipient> + 'a {
        self.recipients.iter().filter(move |r| r.accepts(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::QueueChannel;
    use serde_json::json;

    fn channel(name: &str) -> ChannelRef {
        Arc::new(QueueChannel::unbounded(name))
    }

    #[test]
    fn test_select_preserves_order_and_filters() {
        let list = RecipientList::new(vec![
            Recipient::new(channel("a")),
            Recipient::new(channel("b")).with_selector(|m| m.payload["vip"] == json!(true)),
            Recipient::new(channel("c")),
        ]);

        let plain = Message::new(json!({"vip": false}));
        let names: Vec<_> = list.select(&plain).map(|r| r.channel().name().to_string()).collect();
        assert_eq!(names, vec!["a", "c"]);

        let vip = Message::new(json!({"vip": true}));
        assert_eq!(list.select(&vip).count(), 3);
    }

    #[test]
    fn test_transformer() {
        let recipient = Recipient::new(channel("a")).with_transformer(|p| json!({"wrapped": p}));
        let msg = Message::new(json!(1));
        assert_eq!(recipient.payload_for(&msg), json!({"wrapped": 1}));
        assert_eq!(Recipient::new(channel("b")).payload_for(&msg), json!(1));
    }

    #[test]
    fn test_builder() {
        let list = RecipientList::default().push(Recipient::new(channel("a"))).ignore_send_failures(true);
        assert_eq!(list.len(), 1);
        assert!(list.ignores_send_failures());
    }
}
