//! Gatherer - correlates replies into groups and releases aggregated results

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::GatherError;
use super::group::ReplyGroup;
use super::strategy::{AggregationFunction, CorrelationStrategy, HeaderCorrelation, ReleaseStrategy, SequenceSizeRelease};
use crate::events::{EventBus, SgEvent};
use crate::message::Message;

/// Expiry and retention settings for a gatherer
#[derive(Debug, Clone)]
pub struct GathererSettings {
    /// Partial groups older than this are expired; `None` disables expiry
    pub group_timeout: Option<Duration>,

    /// How long released keys are remembered so late replies are recognised
    pub tombstone_ttl: Duration,

    /// Release partial groups through the aggregation function on expiry
    pub send_partial_result_on_expiry: bool,
}

impl Default for GathererSettings {
    fn default() -> Self {
        Self {
            group_timeout: Some(Duration::from_secs(60)),
            tombstone_ttl: Duration::from_secs(60),
            send_partial_result_on_expiry: false,
        }
    }
}

type SharedGroup = Arc<Mutex<ReplyGroup>>;

/// Correlating aggregator
///
/// Groups live in a sharded concurrent map of key to mutex-protected group, so
/// replies for one key are serialized while other keys proceed independently.
pub struct Gatherer {
    groups: DashMap<String, SharedGroup>,
    /// Keys that were released, expired or discarded, with the time it happened
    released: DashMap<String, Instant>,
    correlation: Arc<dyn CorrelationStrategy>,
    release: Arc<dyn ReleaseStrategy>,
    aggregation: Arc<dyn AggregationFunction>,
    settings: GathererSettings,
    events: Option<Arc<EventBus>>,
}

impl Gatherer {
    /// Create a gatherer with header correlation and sequence-size release
    pub fn new(aggregation: Arc<dyn AggregationFunction>) -> Self {
        debug!("Gatherer::new: called");
        Self {
            groups: DashMap::new(),
            released: DashMap::new(),
            correlation: Arc::new(HeaderCorrelation),
            release: Arc::new(SequenceSizeRelease),
            aggregation,
            settings: GathererSettings::default(),
            events: None,
        }
    }

    pub fn with_release_strategy(mut self, release: Arc<dyn ReleaseStrategy>) -> Self {
        self.release = release;
        self
    }

    pub fn with_correlation_strategy(mut self, correlation: Arc<dyn CorrelationStrategy>) -> Self {
        self.correlation = correlation;
        self
    }

    pub fn with_settings(mut self, settings: GathererSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn settings(&self) -> &GathererSettings {
        &self.settings
    }

    /// Append a reply to its group and release the group if the strategy allows
    ///
    /// Returns the aggregated result when this reply completed the group. Replies
    /// for a group that was already released are dropped.
    pub async fn on_reply(&self, message: Message) -> Result<Option<Message>, GatherError> {
        let key = self
            .correlation
            .correlation_key(&message)
            .ok_or_else(|| GatherError::MissingCorrelation {
                message_id: message.id.clone(),
            })?;
        debug!(%key, message_id = %message.id, "Gatherer::on_reply: called");

        if self.released.contains_key(&key) {
            self.drop_late(&key, &message);
            return Ok(None);
        }

        let group = self
            .groups
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(ReplyGroup::new(key.clone()))))
            .clone();
        let mut guard = group.lock().await;

        // Released while we waited for the lock, or a fresh group raced the release
        if guard.is_complete() || self.released.contains_key(&key) {
            if !guard.is_complete() {
                self.groups.remove_if(&key, |_, g| Arc::ptr_eq(g, &group));
            }
            self.drop_late(&key, &message);
            return Ok(None);
        }

        guard.append(message);
        self.emit(SgEvent::ReplyAppended {
            correlation_id: key.clone(),
            received: guard.len(),
            expected: guard.sequence_size(),
        });

        if !self.release.can_release(&guard) {
            debug!(%key, received = guard.len(), expected = ?guard.sequence_size(), "Gatherer::on_reply: waiting for more replies");
            return Ok(None);
        }

        Ok(Some(self.complete(&key, &group, &mut guard)))
    }

    /// Correlate a reply and route any released result to its reply sink
    pub async fn handle(&self, message: Message) -> Result<(), GatherError> {
        if let Some(result) = self.on_reply(message).await? {
            self.route(result);
        }
        Ok(())
    }

    /// Force release of a group regardless of the release strategy
    pub async fn release(&self, key: &str) -> Option<Message> {
        debug!(%key, "Gatherer::release: called");
        let group = self.groups.get(key).map(|g| g.value().clone())?;
        let mut guard = group.lock().await;
        if guard.is_complete() {
            return None;
        }
        Some(self.complete(key, &group, &mut guard))
    }

    /// Drop a group without aggregating it and refuse further replies for its key
    ///
    /// Returns true if a live group was removed.
    pub async fn discard(&self, key: &str) -> bool {
        debug!(%key, "Gatherer::discard: called");
        self.released.insert(key.to_string(), Instant::now());

        let Some(group) = self.groups.get(key).map(|g| g.value().clone()) else {
            return false;
        };
        let mut guard = group.lock().await;
        if guard.is_complete() {
            return false;
        }
        guard.mark_complete();
        self.groups.remove_if(key, |_, g| Arc::ptr_eq(g, &group));
        info!(%key, replies = guard.len(), "Discarded reply group");
        true
    }

    /// Expire partial groups older than the group timeout
    ///
    /// Also forgets released keys older than the tombstone retention. Returns the
    /// number of groups expired.
    pub async fn expire_groups(&self) -> usize {
        let mut expired = 0;

        if let Some(timeout) = self.settings.group_timeout {
            let candidates: Vec<(String, SharedGroup)> = self
                .groups
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect();

            for (key, group) in candidates {
                let mut guard = group.lock().await;
                if guard.is_complete() || guard.age() < timeout {
                    continue;
                }

                let replies = guard.len();
                let partial_released = self.settings.send_partial_result_on_expiry && !guard.is_empty();
                if partial_released {
                    let result = self.complete(&key, &group, &mut guard);
                    drop(guard);
                    self.route(result);
                } else {
                    guard.mark_complete();
                    self.released.insert(key.clone(), Instant::now());
                    self.groups.remove_if(&key, |_, g| Arc::ptr_eq(g, &group));
                }

                warn!(%key, replies, partial_released, "Reply group expired");
                self.emit(SgEvent::GroupExpired {
                    correlation_id: key,
                    replies,
                    partial_released,
                });
                expired += 1;
            }
        }

        let ttl = self.settings.tombstone_ttl;
        self.released.retain(|_, at| at.elapsed() < ttl);

        if expired > 0 {
            debug!(expired, "Gatherer::expire_groups: done");
        }
        expired
    }

    /// Deliver a released result to the sink named in its headers
    pub fn route(&self, result: Message) {
        let Some(sink) = result.headers.gather_result.clone() else {
            warn!(message_id = %result.id, correlation_id = ?result.correlation_id(), "Released result has no reply sink, dropping");
            return;
        };
        if let Err(e) = sink.deliver(result) {
            // The requester already gave up (timeout) or was served
            debug!(error = %e, "Gatherer::route: sink closed, result dropped");
        }
    }

    /// Number of live (unreleased) groups
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// True if a live group exists for the key
    pub fn contains(&self, key: &str) -> bool {
        self.groups.contains_key(key)
    }

    /// True if the key was released, expired or discarded and is still remembered
    pub fn is_released(&self, key: &str) -> bool {
        self.released.contains_key(key)
    }

    fn complete(&self, key: &str, group: &SharedGroup, guard: &mut ReplyGroup) -> Message {
        guard.mark_complete();
        self.released.insert(key.to_string(), Instant::now());
        self.groups.remove_if(key, |_, g| Arc::ptr_eq(g, group));

        let payload = self.aggregation.aggregate(guard);
        let mut headers = guard.messages().first().map(|m| m.headers.clone()).unwrap_or_default();
        headers.correlation_id = Some(key.to_string());
        headers.sequence_number = None;
        headers.sequence_size = None;

        info!(%key, replies = guard.len(), "Released reply group");
        self.emit(SgEvent::GroupReleased {
            correlation_id: key.to_string(),
            replies: guard.len(),
        });
        Message::with_headers(payload, headers)
    }

    fn drop_late(&self, key: &str, message: &Message) {
        warn!(%key, message_id = %message.id, "Dropping late reply for released group");
        self.emit(SgEvent::LateReplyDropped {
            correlation_id: key.to_string(),
            message_id: message.id.clone(),
        });
    }

    fn emit(&self, event: SgEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }
}

impl fmt::Debug for Gatherer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gatherer")
            .field("groups", &self.groups.len())
            .field("released", &self.released.len())
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ReplySink;
    use crate::gather::strategy::{CollectPayloads, CountRelease};
    use serde_json::json;

    fn reply(key: &str, v: i64, sequence_size: Option<usize>) -> Message {
        let mut msg = Message::new(json!({ "v": v })).correlated(key);
        msg.headers.sequence_size = sequence_size;
        msg
    }

    fn gatherer() -> Gatherer {
        Gatherer::new(Arc::new(CollectPayloads))
    }

    #[tokio::test]
    async fn test_releases_exactly_at_sequence_size() {
        let gatherer = gatherer();

        assert!(gatherer.on_reply(reply("k", 1, Some(3))).await.unwrap().is_none());
        assert!(gatherer.on_reply(reply("k", 2, Some(3))).await.unwrap().is_none());
        assert!(gatherer.contains("k"));

        let result = gatherer.on_reply(reply("k", 3, Some(3))).await.unwrap().unwrap();
        assert_eq!(result.payload, json!([{"v": 1}, {"v": 2}, {"v": 3}]));
        assert_eq!(result.correlation_id(), Some("k"));
        assert_eq!(result.headers.sequence_size, None);
        assert!(!gatherer.contains("k"));
        assert!(gatherer.is_released("k"));
    }

    #[tokio::test]
    async fn test_late_reply_dropped() {
        let events = Arc::new(EventBus::new(64));
        let mut rx = events.subscribe();
        let gatherer = Gatherer::new(Arc::new(CollectPayloads))
            .with_release_strategy(Arc::new(CountRelease(1)))
            .with_events(events);

        assert!(gatherer.on_reply(reply("k", 1, None)).await.unwrap().is_some());
        assert!(gatherer.on_reply(reply("k", 2, None)).await.unwrap().is_none());
        assert_eq!(gatherer.group_count(), 0);

        let mut saw_drop = false;
        while let Ok(event) = rx.try_recv() {
            if let SgEvent::LateReplyDropped { correlation_id, .. } = event {
                assert_eq!(correlation_id, "k");
                saw_drop = true;
            }
        }
        assert!(saw_drop);
    }

    #[tokio::test]
    async fn test_missing_correlation_rejected() {
        let gatherer = gatherer();
        let err = gatherer.on_reply(Message::new(json!(1))).await.unwrap_err();
        assert!(matches!(err, GatherError::MissingCorrelation { .. }));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let gatherer = gatherer();
        gatherer.on_reply(reply("a", 1, Some(2))).await.unwrap();
        gatherer.on_reply(reply("b", 10, Some(2))).await.unwrap();
        assert_eq!(gatherer.group_count(), 2);

        let a = gatherer.on_reply(reply("a", 2, Some(2))).await.unwrap().unwrap();
        assert_eq!(a.payload, json!([{"v": 1}, {"v": 2}]));
        assert!(gatherer.contains("b"));
    }

    #[tokio::test]
    async fn test_force_release_partial_group() {
        let gatherer = gatherer();
        gatherer.on_reply(reply("k", 1, Some(5))).await.unwrap();

        let result = gatherer.release("k").await.unwrap();
        assert_eq!(result.payload, json!([{"v": 1}]));
        assert!(gatherer.release("k").await.is_none());
        assert!(gatherer.release("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_discard_blocks_later_replies() {
        let gatherer = gatherer();
        gatherer.on_reply(reply("k", 1, Some(2))).await.unwrap();

        assert!(gatherer.discard("k").await);
        assert!(!gatherer.contains("k"));
        assert!(gatherer.on_reply(reply("k", 2, Some(2))).await.unwrap().is_none());
        assert!(!gatherer.contains("k"));

        // Discarding an unknown key still tombstones it
        assert!(!gatherer.discard("never-seen").await);
        assert!(gatherer.is_released("never-seen"));
    }

    #[tokio::test]
    async fn test_expire_groups() {
        let gatherer = gatherer().with_settings(GathererSettings {
            group_timeout: Some(Duration::from_millis(20)),
            tombstone_ttl: Duration::from_secs(60),
            send_partial_result_on_expiry: false,
        });
        gatherer.on_reply(reply("old", 1, Some(2))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        gatherer.on_reply(reply("new", 1, Some(2))).await.unwrap();

        assert_eq!(gatherer.expire_groups().await, 1);
        assert!(!gatherer.contains("old"));
        assert!(gatherer.contains("new"));
        assert!(gatherer.is_released("old"));
    }

    #[tokio::test]
    async fn test_expire_sends_partial_result() {
        let gatherer = gatherer().with_settings(GathererSettings {
            group_timeout: Some(Duration::ZERO),
            tombstone_ttl: Duration::from_secs(60),
            send_partial_result_on_expiry: true,
        });
        let (sink, rx) = ReplySink::new();
        let mut msg = reply("k", 7, Some(3));
        msg.headers.gather_result = Some(sink);
        gatherer.on_reply(msg).await.unwrap();

        assert_eq!(gatherer.expire_groups().await, 1);
        let partial = rx.await.unwrap();
        assert_eq!(partial.payload, json!([{"v": 7}]));
    }

    #[tokio::test]
    async fn test_tombstones_pruned_after_ttl() {
        let gatherer = gatherer().with_settings(GathererSettings {
            group_timeout: None,
            tombstone_ttl: Duration::ZERO,
            send_partial_result_on_expiry: false,
        });
        gatherer.discard("k").await;
        assert!(gatherer.is_released("k"));
        gatherer.expire_groups().await;
        assert!(!gatherer.is_released("k"));
    }

    #[tokio::test]
    async fn test_handle_routes_to_sink() {
        let gatherer = gatherer().with_release_strategy(Arc::new(CountRelease(2)));
        let (sink, rx) = ReplySink::new();
        for v in [1, 2] {
            let mut msg = reply("k", v, None);
            msg.headers.gather_result = Some(sink.clone());
            gatherer.handle(msg).await.unwrap();
        }
        assert_eq!(rx.await.unwrap().payload, json!([{"v": 1}, {"v": 2}]));
    }

    #[tokio::test]
    async fn test_concurrent_replies_same_key() {
        let gatherer = Arc::new(gatherer());
        let mut handles = Vec::new();
        for v in 0..50 {
            let g = gatherer.clone();
            handles.push(tokio::spawn(async move { g.on_reply(reply("k", v, Some(50))).await.unwrap() }));
        }

        let mut released = Vec::new();
        for h in handles {
            if let Some(result) = h.await.unwrap() {
                released.push(result);
            }
        }
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].payload.as_array().unwrap().len(), 50);
    }
}
