//! Pluggable correlation, release and aggregation behaviours

use serde_json::Value;
use tracing::debug;

use super::group::ReplyGroup;
use crate::message::Message;

/// Extracts the correlation key from a reply
pub trait CorrelationStrategy: Send + Sync {
    fn correlation_key(&self, message: &Message) -> Option<String>;
}

/// Decides whether a group has collected enough replies
pub trait ReleaseStrategy: Send + Sync {
    fn can_release(&self, group: &ReplyGroup) -> bool;
}

/// Turns a released group into one result payload
///
/// A sequence result is returned as a JSON array.
pub trait AggregationFunction: Send + Sync {
    fn aggregate(&self, group: &ReplyGroup) -> Value;
}

/// Correlate on the `correlation-id` header
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderCorrelation;

impl CorrelationStrategy for HeaderCorrelation {
    fn correlation_key(&self, message: &Message) -> Option<String> {
        message.headers.correlation_id.clone()
    }
}

/// Correlate on a closure
pub struct KeyFn<F>(pub F);

impl<F> CorrelationStrategy for KeyFn<F>
where
    F: Fn(&Message) -> Option<String> + Send + Sync,
{
    fn correlation_key(&self, message: &Message) -> Option<String> {
        (self.0)(message)
    }
}

/// Release once the group holds `sequence_size` replies
///
/// Groups whose replies carry no sequence size never release.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceSizeRelease;

impl ReleaseStrategy for SequenceSizeRelease {
    fn can_release(&self, group: &ReplyGroup) -> bool {
        match group.sequence_size() {
            Some(size) => group.len() >= size,
            None => false,
        }
    }
}

/// Release once a fixed number of replies arrived
#[derive(Debug, Clone, Copy)]
pub struct CountRelease(pub usize);

impl ReleaseStrategy for CountRelease {
    fn can_release(&self, group: &ReplyGroup) -> bool {
        group.len() >= self.0
    }
}

/// Release on an arbitrary predicate over the group
pub struct PredicateRelease<F>(pub F);

impl<F> ReleaseStrategy for PredicateRelease<F>
where
    F: Fn(&ReplyGroup) -> bool + Send + Sync,
{
    fn can_release(&self, group: &ReplyGroup) -> bool {
        (self.0)(group)
    }
}

/// Collect reply payloads into a JSON array in arrival order
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectPayloads;

impl AggregationFunction for CollectPayloads {
    fn aggregate(&self, group: &ReplyGroup) -> Value {
        debug!(key = %group.key(), replies = group.len(), "CollectPayloads::aggregate: called");
        Value::Array(group.payloads().cloned().collect())
    }
}

/// Aggregate with a closure
pub struct AggregateFn<F>(pub F);

impl<F> AggregationFunction for AggregateFn<F>
where
    F: Fn(&ReplyGroup) -> Value + Send + Sync,
{
    fn aggregate(&self, group: &ReplyGroup) -> Value {
        (self.0)(group)
    }
}
