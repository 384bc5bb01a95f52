//! Reply group - the replies collected so far for one correlation key

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::message::Message;

/// Mutable state for one correlation key
///
/// Owned by the gatherer; only appended to while incomplete.
#[derive(Debug)]
pub struct ReplyGroup {
    key: String,
    messages: Vec<Message>,
    sequence_size: Option<usize>,
    complete: bool,
    created: Instant,
}

impl ReplyGroup {
    pub(crate) fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            messages: Vec::new(),
            sequence_size: None,
            complete: false,
            created: Instant::now(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Replies in arrival order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Reply payloads in arrival order
    pub fn payloads(&self) -> impl Iterator<Item = &Value> {
        self.messages.iter().map(|m| &m.payload)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Expected reply count, taken from the first reply carrying a sequence size
    pub fn sequence_size(&self) -> Option<usize> {
        self.sequence_size
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Time since the group was created
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub(crate) fn append(&mut self, message: Message) {
        if self.sequence_size.is_none() {
            self.sequence_size = message.headers.sequence_size;
        }
        self.messages.push(message);
    }

    pub(crate) fn mark_complete(&mut self) {
        self.complete = true;
    }
}
