//! In-memory transactional document store with an outbox table.
//!
//! The store is the only serialization primitive for aggregate consistency:
//! each `save` runs as one all-or-nothing transaction covering the aggregate
//! upsert and its outbox inserts. There are no cross-aggregate transactions.
//!
//! Writes are staged in a `Transaction` value and applied under a single
//! write lock only if the closure returns `Ok`; an aborted transaction leaves
//! no observable state and no cleared event buffer.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

use crate::bus::CloudEvent;
use crate::core::clock::{Clock, SharedClock};
use crate::models::{Aggregate, DomainEvent, EventMeta};
use crate::outbox::{OutboxRow, OutboxStatus};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    #[error("Serialization failure: {message}")]
    Serialization { message: String },

    #[error("Transaction aborted: {message}")]
    Aborted { message: String },
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization {
            message: err.to_string(),
        }
    }
}

#[derive(Default)]
struct StoreInner {
    /// (collection, document id) -> serialized aggregate.
    documents: HashMap<(String, String), serde_json::Value>,
    outbox: Vec<OutboxRow>,
    next_seq: u64,
}

/// Staged writes for one transaction.
#[derive(Default)]
pub struct Transaction {
    puts: Vec<(String, String, serde_json::Value)>,
    events: Vec<(DomainEvent, String)>,
}

impl Transaction {
    /// Stage an aggregate upsert keyed by its natural id.
    pub fn upsert(&mut self, collection: &str, id: &str, document: serde_json::Value) {
        self.puts
            .push((collection.to_string(), id.to_string(), document));
    }

    /// Stage an outbox insert for a buffered domain event.
    pub fn enqueue_event(&mut self, event: DomainEvent, source: &str) {
        self.events.push((event, source.to_string()));
    }
}

/// Storage engine shared by every repository.
pub struct TransactionalStore {
    inner: RwLock<StoreInner>,
    clock: SharedClock,
}

impl TransactionalStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            clock,
        }
    }

    /// Run a closure that stages writes; apply them atomically on `Ok`.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&mut Transaction) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut txn = Transaction::default();
        let out = f(&mut txn)?;

        let now = self.clock.now();
        let mut inner = self.inner.write();
        for (collection, id, document) in txn.puts {
            inner.documents.insert((collection, id), document);
        }
        for (event, source) in txn.events {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.outbox.push(OutboxRow {
                id: Uuid::new_v4().to_string(),
                seq,
                aggregate_id: event.aggregate_id().to_string(),
                aggregate_type: aggregate_type_of(&event),
                topic: event.topic().to_string(),
                payload: CloudEvent::from_domain_event(&event, &source),
                status: OutboxStatus::Pending,
                attempts: 0,
                created_at: now,
                published_at: None,
            });
        }
        Ok(out)
    }

    /// Committed document, if present.
    pub fn get_document(&self, collection: &str, id: &str) -> Option<serde_json::Value> {
        self.inner
            .read()
            .documents
            .get(&(collection.to_string(), id.to_string()))
            .cloned()
    }

    /// All committed documents in a collection.
    pub fn list_documents(&self, collection: &str) -> Vec<serde_json::Value> {
        self.inner
            .read()
            .documents
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|(_, doc)| doc.clone())
            .collect()
    }

    /// Pending outbox rows in `(created_at, seq)` order, up to `limit`.
    pub fn pending_outbox(&self, limit: usize) -> Vec<OutboxRow> {
        let inner = self.inner.read();
        let mut rows: Vec<OutboxRow> = inner
            .outbox
            .iter()
            .filter(|r| r.status == OutboxStatus::Pending)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.seq.cmp(&b.seq)));
        rows.truncate(limit);
        rows
    }

    /// Every outbox row for one aggregate in creation order.
    pub fn outbox_for_aggregate(&self, aggregate_id: &str) -> Vec<OutboxRow> {
        let inner = self.inner.read();
        let mut rows: Vec<OutboxRow> = inner
            .outbox
            .iter()
            .filter(|r| r.aggregate_id == aggregate_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.seq.cmp(&b.seq)));
        rows
    }

    pub fn outbox_len(&self) -> usize {
        self.inner.read().outbox.len()
    }

    pub(crate) fn mark_published(&self, row_id: &str) {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        if let Some(row) = inner.outbox.iter_mut().find(|r| r.id == row_id) {
            row.status = OutboxStatus::Published;
            row.published_at = Some(now);
        }
    }

    /// Bump the attempt counter, keeping the row pending. Returns the new
    /// attempt count.
    pub(crate) fn record_publish_failure(&self, row_id: &str) -> u32 {
        let mut inner = self.inner.write();
        if let Some(row) = inner.outbox.iter_mut().find(|r| r.id == row_id) {
            row.attempts += 1;
            row.attempts
        } else {
            0
        }
    }
}

fn aggregate_type_of(event: &DomainEvent) -> String {
    // The context segment of the event name names the owning aggregate type.
    event
        .event_type()
        .split('.')
        .nth(1)
        .unwrap_or("unknown")
        .to_string()
}

/// Outbox-integrated repository for one aggregate type.
///
/// `save` is the only component that drains an aggregate's event buffer, and
/// it does so only after the transaction that persisted both the aggregate
/// and the buffered events has committed.
pub struct OutboxRepository<A: Aggregate> {
    store: Arc<TransactionalStore>,
    source: String,
    _marker: PhantomData<fn() -> A>,
}

impl<A: Aggregate> OutboxRepository<A> {
    pub fn new(store: Arc<TransactionalStore>, source: impl Into<String>) -> Self {
        Self {
            store,
            source: source.into(),
            _marker: PhantomData,
        }
    }

    /// Persist the aggregate and its buffered events atomically, then clear
    /// the buffer. On failure the buffer is left intact.
    pub fn save(&self, aggregate: &mut A) -> Result<(), StorageError> {
        let document = serde_json::to_value(&*aggregate)?;
        let events = aggregate.pending_events().to_vec();
        let id = aggregate.aggregate_id().to_string();

        self.store.transaction(move |txn| {
            txn.upsert(A::KIND, &id, document);
            for event in events {
                txn.enqueue_event(event, &self.source);
            }
            Ok(())
        })?;

        aggregate.take_events();
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<A>, StorageError> {
        self.store
            .get_document(A::KIND, id)
            .map(serde_json::from_value)
            .transpose()
            .map_err(StorageError::from)
    }

    pub fn list(&self) -> Result<Vec<A>, StorageError> {
        self.store
            .list_documents(A::KIND)
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(StorageError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::SimulatedClock;
    use crate::models::order::{Address, Dimensions, Order, OrderItem, Priority};
    use crate::money::{Currency, Money};

    fn store() -> Arc<TransactionalStore> {
        Arc::new(TransactionalStore::new(Arc::new(SimulatedClock::default())))
    }

    fn sample_order(id: &str) -> Order {
        let now = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        Order::receive(
            id,
            "CUST-1",
            vec![OrderItem {
                sku: "SKU-1".to_string(),
                quantity: 1,
                unit_weight_grams: 100,
                dimensions: Dimensions {
                    length_cm: 1,
                    width_cm: 1,
                    height_cm: 1,
                },
                unit_price: Money::new(10_00, Currency::usd()).unwrap(),
                zone: "A".to_string(),
                fragile: false,
                hazmat: false,
                cold_chain: false,
            }],
            Address {
                line1: "1 Warehouse Way".to_string(),
                city: "Reno".to_string(),
                region: "NV".to_string(),
                postal_code: "89502".to_string(),
                country: "US".to_string(),
            },
            Priority::Standard,
            now,
            false,
            now,
        )
        .unwrap()
    }

    #[test]
    fn save_persists_aggregate_and_outbox_atomically() {
        let store = store();
        let repo: OutboxRepository<Order> = OutboxRepository::new(store.clone(), "/wms/orders");

        let mut order = sample_order("ORD-1");
        repo.save(&mut order).unwrap();

        assert!(order.pending_events().is_empty(), "buffer cleared on commit");
        assert!(repo.get("ORD-1").unwrap().is_some());
        let rows = store.outbox_for_aggregate("ORD-1");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, OutboxStatus::Pending);
        assert_eq!(rows[0].aggregate_type, "order");
        assert_eq!(rows[0].topic, "wms.orders");
    }

    #[test]
    fn aborted_transaction_leaves_nothing() {
        let store = store();
        let result: Result<(), StorageError> = store.transaction(|txn| {
            txn.upsert("order", "ORD-X", serde_json::json!({}));
            Err(StorageError::Aborted {
                message: "validation failed".to_string(),
            })
        });

        assert!(result.is_err());
        assert!(store.get_document("order", "ORD-X").is_none());
        assert_eq!(store.outbox_len(), 0);
    }

    #[test]
    fn pending_rows_ordered_by_creation() {
        let store = store();
        let repo: OutboxRepository<Order> = OutboxRepository::new(store.clone(), "/wms/orders");

        let mut a = sample_order("ORD-A");
        let mut b = sample_order("ORD-B");
        repo.save(&mut a).unwrap();
        repo.save(&mut b).unwrap();

        let rows = store.pending_outbox(10);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].seq < rows[1].seq);
        assert_eq!(rows[0].aggregate_id, "ORD-A");
    }
}
