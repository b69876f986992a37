//! Inventory reservation aggregate.
//!
//! One aggregate per reservation so the unbounded reservation history never
//! bloats the `InventoryItem` document. Lifecycle:
//!
//! ```text
//! Active → Staged → Fulfilled
//!   ↘ Cancelled / Expired (terminal, cannot re-enter)
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Aggregate, DomainEvent};

/// Reservations silently lapse this long after creation unless fulfilled.
pub const DEFAULT_EXPIRY_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    Staged,
    Fulfilled,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Fulfilled | ReservationStatus::Cancelled | ReservationStatus::Expired
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReservationError {
    #[error("Invalid reservation transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("Reservation has not expired yet")]
    NotExpired,
}

/// One reserved line of stock for one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryReservation {
    id: String,
    order_id: String,
    sku: String,
    location: String,
    quantity: u64,
    status: ReservationStatus,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    #[serde(skip, default)]
    events: Vec<DomainEvent>,
}

impl InventoryReservation {
    pub fn new(
        id: impl Into<String>,
        order_id: impl Into<String>,
        sku: impl Into<String>,
        location: impl Into<String>,
        quantity: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            order_id: order_id.into(),
            sku: sku.into(),
            location: location.into(),
            quantity,
            status: ReservationStatus::Active,
            created_at: now,
            expires_at: now + Duration::hours(DEFAULT_EXPIRY_HOURS),
            updated_at: now,
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn status(&self) -> ReservationStatus {
        self.status
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    fn transition(
        &mut self,
        to: ReservationStatus,
        now: DateTime<Utc>,
    ) -> Result<(), ReservationError> {
        let allowed = matches!(
            (self.status, to),
            (ReservationStatus::Active, ReservationStatus::Staged)
                | (ReservationStatus::Staged, ReservationStatus::Fulfilled)
                | (ReservationStatus::Active, ReservationStatus::Cancelled)
                | (ReservationStatus::Staged, ReservationStatus::Cancelled)
                | (ReservationStatus::Active, ReservationStatus::Expired)
        );
        if !allowed {
            return Err(ReservationError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn stage(&mut self, now: DateTime<Utc>) -> Result<(), ReservationError> {
        self.transition(ReservationStatus::Staged, now)
    }

    pub fn fulfill(&mut self, now: DateTime<Utc>) -> Result<(), ReservationError> {
        self.transition(ReservationStatus::Fulfilled, now)
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), ReservationError> {
        self.transition(ReservationStatus::Cancelled, now)
    }

    /// Lapse an active reservation whose deadline has passed.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<(), ReservationError> {
        if now < self.expires_at {
            return Err(ReservationError::NotExpired);
        }
        self.transition(ReservationStatus::Expired, now)
    }
}

impl Aggregate for InventoryReservation {
    const KIND: &'static str = "inventory_reservation";

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

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn reservation() -> InventoryReservation {
        InventoryReservation::new("RES-1", "ORD-1", "SKU-1", "A-01", 5, now())
    }

    #[test]
    fn happy_path() {
        let mut r = reservation();
        r.stage(now()).unwrap();
        r.fulfill(now()).unwrap();
        assert_eq!(r.status(), ReservationStatus::Fulfilled);
    }

    #[test]
    fn terminal_cannot_reenter() {
        let mut r = reservation();
        r.cancel(now()).unwrap();
        assert!(r.stage(now()).is_err());
        assert!(r.fulfill(now()).is_err());
        assert!(r.cancel(now()).is_err());
    }

    #[test]
    fn cannot_fulfill_before_staging() {
        let mut r = reservation();
        assert_eq!(
            r.fulfill(now()),
            Err(ReservationError::InvalidTransition {
                from: ReservationStatus::Active,
                to: ReservationStatus::Fulfilled
            })
        );
    }

    #[test]
    fn expiry_respects_deadline() {
        let mut r = reservation();
        assert_eq!(r.expire(now()), Err(ReservationError::NotExpired));
        r.expire(now() + Duration::hours(DEFAULT_EXPIRY_HOURS)).unwrap();
        assert_eq!(r.status(), ReservationStatus::Expired);
    }
}
