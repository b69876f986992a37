//! Inventory allocation aggregate.
//!
//! An allocation tracks physical units committed to one order as they move
//! through the outbound dock:
//!
//! ```text
//! Staged → Packed → Shipped
//!        ↘ Returned (from Staged or Packed only)
//! ```
//!
//! Cannot ship before packing; cannot return after shipping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Aggregate, DomainEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    Staged,
    Packed,
    Shipped,
    Returned,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("Invalid allocation transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: AllocationStatus,
        to: AllocationStatus,
    },
}

/// Units of one SKU staged for one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryAllocation {
    id: String,
    order_id: String,
    sku: String,
    location: String,
    quantity: u64,
    status: AllocationStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    #[serde(skip, default)]
    events: Vec<DomainEvent>,
}

impl InventoryAllocation {
    pub fn stage(
        id: impl Into<String>,
        order_id: impl Into<String>,
        sku: impl Into<String>,
        location: impl Into<String>,
        quantity: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let mut allocation = Self {
            id: id.into(),
            order_id: order_id.into(),
            sku: sku.into(),
            location: location.into(),
            quantity,
            status: AllocationStatus::Staged,
            created_at: now,
            updated_at: now,
            events: Vec::new(),
        };
        allocation.events.push(DomainEvent::InventoryStaged {
            allocation_id: allocation.id.clone(),
            order_id: allocation.order_id.clone(),
            sku: allocation.sku.clone(),
            quantity,
            occurred_at: now,
        });
        allocation
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

    pub fn status(&self) -> AllocationStatus {
        self.status
    }

    fn transition(
        &mut self,
        to: AllocationStatus,
        now: DateTime<Utc>,
    ) -> Result<(), AllocationError> {
        let allowed = matches!(
            (self.status, to),
            (AllocationStatus::Staged, AllocationStatus::Packed)
                | (AllocationStatus::Packed, AllocationStatus::Shipped)
                | (AllocationStatus::Staged, AllocationStatus::Returned)
                | (AllocationStatus::Packed, AllocationStatus::Returned)
        );
        if !allowed {
            return Err(AllocationError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn pack(&mut self, now: DateTime<Utc>) -> Result<(), AllocationError> {
        self.transition(AllocationStatus::Packed, now)?;
        self.events.push(DomainEvent::InventoryPacked {
            allocation_id: self.id.clone(),
            order_id: self.order_id.clone(),
            sku: self.sku.clone(),
            quantity: self.quantity,
            occurred_at: now,
        });
        Ok(())
    }

    pub fn ship(&mut self, now: DateTime<Utc>) -> Result<(), AllocationError> {
        self.transition(AllocationStatus::Shipped, now)?;
        self.events.push(DomainEvent::InventoryShipped {
            allocation_id: self.id.clone(),
            order_id: self.order_id.clone(),
            sku: self.sku.clone(),
            quantity: self.quantity,
            occurred_at: now,
        });
        Ok(())
    }

    pub fn mark_returned(&mut self, now: DateTime<Utc>) -> Result<(), AllocationError> {
        self.transition(AllocationStatus::Returned, now)
    }
}

impl Aggregate for InventoryAllocation {
    const KIND: &'static str = "inventory_allocation";

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

    fn allocation() -> InventoryAllocation {
        InventoryAllocation::stage("ALLOC-1", "ORD-1", "SKU-1", "A-01", 3, now())
    }

    #[test]
    fn cannot_ship_before_packed() {
        let mut a = allocation();
        assert_eq!(
            a.ship(now()),
            Err(AllocationError::InvalidTransition {
                from: AllocationStatus::Staged,
                to: AllocationStatus::Shipped
            })
        );
    }

    #[test]
    fn cannot_return_after_shipped() {
        let mut a = allocation();
        a.pack(now()).unwrap();
        a.ship(now()).unwrap();
        assert!(a.mark_returned(now()).is_err());
    }

    #[test]
    fn full_lifecycle_emits_events() {
        let mut a = allocation();
        a.pack(now()).unwrap();
        a.ship(now()).unwrap();
        let events = a.take_events();
        let types: Vec<_> = events
            .iter()
            .map(crate::models::EventMeta::event_type)
            .collect();
        assert_eq!(
            types,
            vec![
                "wms.inventory.staged",
                "wms.inventory.packed",
                "wms.inventory.shipped"
            ]
        );
    }
}
