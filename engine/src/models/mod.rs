//! Domain aggregates.
//!
//! Each aggregate exposes a narrow command surface that enforces its
//! invariants and appends `DomainEvent`s to a transient buffer. The outbox
//! repository is the only component that drains the buffer, and it does so
//! atomically with persisting the aggregate. Aggregates reference each other
//! by identity only (an order holds a `wave_id`, a wave holds order ids);
//! there is no live object graph across aggregate boundaries.

pub mod allocation;
pub mod event;
pub mod inventory;
pub mod ledger;
pub mod order;
pub mod process_path;
pub mod reservation;
pub mod retry;
pub mod wave;

pub use event::{BackorderTrigger, DomainEvent, EventMeta};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Persistence contract shared by every aggregate root.
pub trait Aggregate: Serialize + DeserializeOwned + Clone + Send + 'static {
    /// Stable collection name, also the `aggregate_type` on outbox rows.
    const KIND: &'static str;

    /// Natural identity used as the document key and outbox partition key.
    fn aggregate_id(&self) -> &str;

    /// Events buffered since the last successful save.
    fn pending_events(&self) -> &[DomainEvent];

    /// Drain and clear the event buffer. Called by the repository only after
    /// the storage transaction that persisted the aggregate has committed.
    fn take_events(&mut self) -> Vec<DomainEvent>;
}
