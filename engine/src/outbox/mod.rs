//! Transactional outbox.
//!
//! The outbox guarantees "exactly-once outbound commit": an aggregate
//! mutation and the events it produced are persisted in one storage
//! transaction, and only events that committed are ever published. Delivery
//! to the bus is at-least-once with FIFO ordering per aggregate id.

mod publisher;
mod store;

pub use publisher::{DrainStats, OutboxPublisher, PublisherConfig, PublisherHandle};
pub use store::{OutboxRepository, StorageError, TransactionalStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bus::CloudEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Published,
    Failed,
}

/// One persisted outbound event.
///
/// Rows are drained in `(created_at, seq)` order; `seq` is a store-assigned
/// monotonic tiebreaker for rows created in the same instant. The payload is
/// immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRow {
    pub id: String,
    pub seq: u64,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub topic: String,
    pub payload: CloudEvent,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}
