//! Retry bookkeeping and dead-letter entries.
//!
//! `RetryMetadata` counts workflow attempts per order and keeps the full
//! attempt history. When the budget is exhausted the controller snapshots the
//! order into a `DeadLetterEntry` for operator triage. Entries resolve exactly
//! once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::order::Order;
use crate::models::{Aggregate, DomainEvent};

/// Default workflow retry budget per order.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// One failed workflow attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryAttempt {
    pub attempted_at: DateTime<Utc>,
    pub order_status: String,
    pub reason: String,
    pub workflow_id: String,
    pub run_id: String,
}

/// Bounded retry counter for one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryMetadata {
    order_id: String,
    retry_count: u32,
    max_retries: u32,
    attempts: Vec<RetryAttempt>,
    updated_at: DateTime<Utc>,
}

impl RetryMetadata {
    pub fn new(order_id: impl Into<String>, max_retries: u32, now: DateTime<Utc>) -> Self {
        Self {
            order_id: order_id.into(),
            retry_count: 0,
            max_retries,
            attempts: Vec::new(),
            updated_at: now,
        }
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn attempts(&self) -> &[RetryAttempt] {
        &self.attempts
    }

    /// Record a failed attempt and return the new count.
    pub fn increment(&mut self, attempt: RetryAttempt) -> u32 {
        self.retry_count += 1;
        self.updated_at = attempt.attempted_at;
        self.attempts.push(attempt);
        self.retry_count
    }

    /// Budget left for another automatic retry.
    pub fn has_budget(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// How an operator closed a dead-letter entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlqResolutionKind {
    ManualRetry,
    Cancelled,
    Escalated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqResolution {
    pub kind: DlqResolutionKind,
    pub notes: String,
    pub resolver: String,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DlqError {
    #[error("Dead-letter entry {entry_id} is already resolved")]
    AlreadyResolved { entry_id: String },
}

/// Snapshot of an order whose workflow exhausted its retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    id: String,
    order_id: String,
    reason: String,
    retry_history: Vec<RetryAttempt>,
    order_snapshot: Order,
    created_at: DateTime<Utc>,
    resolution: Option<DlqResolution>,

    #[serde(skip, default)]
    events: Vec<DomainEvent>,
}

impl DeadLetterEntry {
    pub fn new(
        id: impl Into<String>,
        reason: impl Into<String>,
        metadata: &RetryMetadata,
        order_snapshot: Order,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            order_id: metadata.order_id().to_string(),
            reason: reason.into(),
            retry_history: metadata.attempts().to_vec(),
            order_snapshot,
            created_at: now,
            resolution: None,
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn retry_history(&self) -> &[RetryAttempt] {
        &self.retry_history
    }

    pub fn order_snapshot(&self) -> &Order {
        &self.order_snapshot
    }

    pub fn resolution(&self) -> Option<&DlqResolution> {
        self.resolution.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// Close the entry. A second resolution attempt fails.
    pub fn resolve(
        &mut self,
        kind: DlqResolutionKind,
        notes: impl Into<String>,
        resolver: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DlqError> {
        if self.resolution.is_some() {
            return Err(DlqError::AlreadyResolved {
                entry_id: self.id.clone(),
            });
        }
        self.resolution = Some(DlqResolution {
            kind,
            notes: notes.into(),
            resolver: resolver.into(),
            resolved_at: now,
        });
        Ok(())
    }
}

impl Aggregate for DeadLetterEntry {
    const KIND: &'static str = "dead_letter_entry";

    fn aggregate_id(&self) -> &str {
        &self.id
    }

    fn pending_events(&self) -> &[DomainEvent] {
        &self.events
    }

    fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{Address, Dimensions, OrderItem, Priority};
    use crate::money::{Currency, Money};

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn attempt(reason: &str) -> RetryAttempt {
        RetryAttempt {
            attempted_at: now(),
            order_status: "pending_retry".to_string(),
            reason: reason.to_string(),
            workflow_id: "wf-1".to_string(),
            run_id: "run-1".to_string(),
        }
    }

    fn sample_order() -> Order {
        Order::receive(
            "ORD-DLQ",
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
            now(),
            false,
            now(),
        )
        .unwrap()
    }

    #[test]
    fn budget_is_bounded() {
        let mut meta = RetryMetadata::new("ORD-1", 2, now());
        assert!(meta.has_budget());
        meta.increment(attempt("timeout"));
        assert!(meta.has_budget());
        meta.increment(attempt("timeout"));
        assert!(!meta.has_budget());
        assert_eq!(meta.attempts().len(), 2);
    }

    #[test]
    fn second_resolution_fails() {
        let meta = RetryMetadata::new("ORD-DLQ", 5, now());
        let mut entry = DeadLetterEntry::new("DLQ-1", "exhausted", &meta, sample_order(), now());

        entry
            .resolve(DlqResolutionKind::ManualRetry, "retrying", "ops", now())
            .unwrap();
        let err = entry
            .resolve(DlqResolutionKind::Cancelled, "never mind", "ops", now())
            .unwrap_err();
        assert_eq!(
            err,
            DlqError::AlreadyResolved {
                entry_id: "DLQ-1".to_string()
            }
        );
    }

    #[test]
    fn entry_carries_history_and_snapshot() {
        let mut meta = RetryMetadata::new("ORD-DLQ", 5, now());
        meta.increment(attempt("worker unavailable"));
        meta.increment(attempt("worker unavailable"));

        let entry = DeadLetterEntry::new("DLQ-2", "exhausted", &meta, sample_order(), now());
        assert_eq!(entry.retry_history().len(), 2);
        assert_eq!(entry.order_snapshot().id(), "ORD-DLQ");
    }
}
