//! Background outbox publisher.
//!
//! A cooperative tokio task polls the pending outbox in batches ordered by
//! `(created_at, seq)`, publishes each row to the bus keyed by aggregate id,
//! and marks successes. A failed row keeps its key in exponential backoff and
//! blocks the key's later rows for the rest of the drain, preserving
//! per-aggregate FIFO. Delivery is at-least-once; consumers dedup.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bus::EventBus;
use crate::core::clock::{Clock, SharedClock};
use crate::outbox::TransactionalStore;

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            batch_size: 64,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Outcome of one polling pass, exposed for deterministic tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    pub published: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Drains pending outbox rows to the event bus.
pub struct OutboxPublisher {
    store: Arc<TransactionalStore>,
    bus: Arc<dyn EventBus>,
    clock: SharedClock,
    config: PublisherConfig,
    /// Per-aggregate "do not retry before" instants.
    backoff: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl OutboxPublisher {
    pub fn new(
        store: Arc<TransactionalStore>,
        bus: Arc<dyn EventBus>,
        clock: SharedClock,
        config: PublisherConfig,
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            config,
            backoff: Mutex::new(HashMap::new()),
        }
    }

    /// Publish one batch of pending rows. Rows whose aggregate is in backoff
    /// or failed earlier in this pass are skipped to keep per-key FIFO.
    pub async fn drain_once(&self) -> DrainStats {
        let now = self.clock.now();
        let rows = self.store.pending_outbox(self.config.batch_size);

        let mut blocked: HashSet<String> = {
            let backoff = self.backoff.lock();
            backoff
                .iter()
                .filter(|(_, until)| **until > now)
                .map(|(key, _)| key.clone())
                .collect()
        };

        let mut stats = DrainStats::default();
        for row in rows {
            if blocked.contains(&row.aggregate_id) {
                stats.skipped += 1;
                continue;
            }
            match self
                .bus
                .publish(&row.topic, &row.aggregate_id, row.payload.clone())
                .await
            {
                Ok(()) => {
                    self.store.mark_published(&row.id);
                    self.backoff.lock().remove(&row.aggregate_id);
                    stats.published += 1;
                    debug!(
                        outbox_id = %row.id,
                        aggregate_id = %row.aggregate_id,
                        event_type = %row.payload.event_type,
                        "outbox row published"
                    );
                }
                Err(err) => {
                    let attempts = self.store.record_publish_failure(&row.id);
                    let delay = backoff_delay(&self.config, attempts);
                    let until = self.clock.now()
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(30));
                    self.backoff.lock().insert(row.aggregate_id.clone(), until);
                    blocked.insert(row.aggregate_id.clone());
                    stats.failed += 1;
                    warn!(
                        outbox_id = %row.id,
                        aggregate_id = %row.aggregate_id,
                        attempts,
                        error = %err,
                        "outbox publish failed, row stays pending"
                    );
                }
            }
        }
        stats
    }

    /// Spawn the polling loop. The returned handle stops it cooperatively.
    pub fn start(self: Arc<Self>) -> PublisherHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let publisher = self;
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(publisher.config.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        publisher.drain_once().await;
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("outbox publisher stopped");
        });
        PublisherHandle {
            stop_tx,
            join: tokio::sync::Mutex::new(Some(join)),
        }
    }
}

fn backoff_delay(config: &PublisherConfig, attempts: u32) -> Duration {
    // Exponent is capped; the max_backoff clamp below dominates anyway.
    let exponent = attempts.saturating_sub(1).min(16);
    let delay = config.base_backoff.saturating_mul(1u32 << exponent);
    delay.min(config.max_backoff)
}

/// Stop handle for the publisher loop. `stop` is idempotent.
pub struct PublisherHandle {
    stop_tx: watch::Sender<bool>,
    join: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PublisherHandle {
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(true);
        if let Some(join) = self.join.lock().await.take() {
            let _ = join.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_exponential_and_capped() {
        let config = PublisherConfig {
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            ..PublisherConfig::default()
        };
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(400));
        assert_eq!(backoff_delay(&config, 30), Duration::from_secs(30));
    }
}
