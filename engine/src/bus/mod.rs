//! Event bus adapter.
//!
//! Domain events leave the platform as CloudEvents 1.0 envelopes, published
//! to one topic per bounded context with the aggregate id as the partition
//! key. Publishing is at-least-once: the outbox publisher only marks a row
//! published after the bus accepts it, so a bus failure leaves the row
//! pending and the event is retried. Consumers must dedup.

mod cloudevent;

pub use cloudevent::CloudEvent;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

/// Errors surfaced by a bus publish attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Event bus unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Event payload rejected: {reason}")]
    Rejected { reason: String },
}

/// Transport seam for outbound events.
///
/// Publish failures must bubble up unchanged so the outbox row stays pending.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        partition_key: &str,
        event: CloudEvent,
    ) -> Result<(), BusError>;
}

/// In-process bus recording deliveries per topic in arrival order.
///
/// Tests use `fail_next` to inject transient publish failures and the
/// accessors to assert per-key delivery order.
#[derive(Default)]
pub struct InMemoryEventBus {
    topics: Mutex<HashMap<String, Vec<(String, CloudEvent)>>>,
    fail_next: AtomicU32,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` publish calls fail with `Unavailable`.
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Every event delivered to a topic, in delivery order.
    pub fn published(&self, topic: &str) -> Vec<CloudEvent> {
        self.topics
            .lock()
            .get(topic)
            .map(|entries| entries.iter().map(|(_, e)| e.clone()).collect())
            .unwrap_or_default()
    }

    /// Events delivered for one partition key across a topic.
    pub fn published_for_key(&self, topic: &str, key: &str) -> Vec<CloudEvent> {
        self.topics
            .lock()
            .get(topic)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(k, _)| k == key)
                    .map(|(_, e)| e.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Event type names across all topics, in delivery order.
    pub fn event_types(&self) -> Vec<String> {
        let topics = self.topics.lock();
        let mut all: Vec<(chrono::DateTime<chrono::Utc>, String)> = topics
            .values()
            .flatten()
            .map(|(_, e)| (e.time, e.event_type.clone()))
            .collect();
        all.sort_by_key(|(time, _)| *time);
        all.into_iter().map(|(_, t)| t).collect()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(
        &self,
        topic: &str,
        partition_key: &str,
        event: CloudEvent,
    ) -> Result<(), BusError> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(BusError::Unavailable {
                reason: "injected failure".to_string(),
            });
        }
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push((partition_key.to_string(), event));
        Ok(())
    }
}
