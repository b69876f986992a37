//! Inventory item aggregate.
//!
//! Tracks physical stock per SKU across warehouse locations.
//!
//! # Critical Invariants
//!
//! For every location and for the aggregate totals:
//! - `quantity = reserved + hard_allocated + available`, all four >= 0
//! - reservations never reduce `quantity`; only a committed pick does
//! - the per-location quantities always sum to the aggregate total
//!
//! Unbounded histories (reservations, allocations, ledger transactions) live
//! in sibling aggregates keyed back to this SKU.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Aggregate, BackorderTrigger, DomainEvent};

/// Pick-frequency class used for slotting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VelocityClass {
    A,
    B,
    C,
}

impl VelocityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            VelocityClass::A => "A",
            VelocityClass::B => "B",
            VelocityClass::C => "C",
        }
    }
}

/// Errors that can occur during inventory commands
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("Unknown location {location} for SKU {sku}")]
    UnknownLocation { sku: String, location: String },

    #[error("Insufficient available stock at {location}: requested {requested}, available {available}")]
    InsufficientAvailable {
        location: String,
        requested: u64,
        available: u64,
    },

    #[error("Insufficient reserved stock at {location}: requested {requested}, reserved {reserved}")]
    InsufficientReserved {
        location: String,
        requested: u64,
        reserved: u64,
    },

    #[error("Insufficient allocated stock at {location}: requested {requested}, allocated {allocated}")]
    InsufficientAllocated {
        location: String,
        requested: u64,
        allocated: u64,
    },

    #[error("Adjustment of zero quantity is rejected")]
    ZeroAdjustment,

    #[error("Quantity must be positive")]
    ZeroQuantity,
}

/// Stock held at one warehouse location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationStock {
    pub location: String,
    pub zone: String,
    pub quantity: u64,
    pub reserved: u64,
    pub hard_allocated: u64,
}

impl LocationStock {
    /// Units free for new reservations.
    pub fn available(&self) -> u64 {
        self.quantity
            .saturating_sub(self.reserved)
            .saturating_sub(self.hard_allocated)
    }
}

/// Inventory aggregate root, one per SKU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    sku: String,
    locations: Vec<LocationStock>,
    velocity_class: VelocityClass,
    reorder_point: u64,
    reorder_quantity: u64,
    updated_at: DateTime<Utc>,

    #[serde(skip, default)]
    events: Vec<DomainEvent>,
}

impl InventoryItem {
    pub fn new(
        sku: impl Into<String>,
        reorder_point: u64,
        reorder_quantity: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            sku: sku.into(),
            locations: Vec::new(),
            velocity_class: VelocityClass::C,
            reorder_point,
            reorder_quantity,
            updated_at: now,
            events: Vec::new(),
        }
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn locations(&self) -> &[LocationStock] {
        &self.locations
    }

    pub fn velocity_class(&self) -> VelocityClass {
        self.velocity_class
    }

    pub fn reorder_point(&self) -> u64 {
        self.reorder_point
    }

    pub fn reorder_quantity(&self) -> u64 {
        self.reorder_quantity
    }

    pub fn total_quantity(&self) -> u64 {
        self.locations.iter().map(|l| l.quantity).sum()
    }

    pub fn total_reserved(&self) -> u64 {
        self.locations.iter().map(|l| l.reserved).sum()
    }

    pub fn total_allocated(&self) -> u64 {
        self.locations.iter().map(|l| l.hard_allocated).sum()
    }

    pub fn total_available(&self) -> u64 {
        self.locations.iter().map(|l| l.available()).sum()
    }

    fn location_mut(&mut self, location: &str) -> Result<&mut LocationStock, InventoryError> {
        let sku = self.sku.clone();
        self.locations
            .iter_mut()
            .find(|l| l.location == location)
            .ok_or(InventoryError::UnknownLocation {
                sku,
                location: location.to_string(),
            })
    }

    /// Emit a low-stock alert when available stock sinks to the reorder
    /// point. Only fires on the crossing, not on every mutation below it.
    fn check_low_stock(&mut self, available_before: u64, now: DateTime<Utc>) {
        let available = self.total_available();
        if available <= self.reorder_point && available_before > self.reorder_point {
            self.events.push(DomainEvent::LowStockAlert {
                sku: self.sku.clone(),
                available,
                reorder_point: self.reorder_point,
                occurred_at: now,
            });
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Put received stock away at a location, creating it on first receipt.
    pub fn receive_stock(
        &mut self,
        location: impl Into<String>,
        zone: impl Into<String>,
        quantity: u64,
        now: DateTime<Utc>,
    ) -> Result<(), InventoryError> {
        if quantity == 0 {
            return Err(InventoryError::ZeroQuantity);
        }
        let location = location.into();
        match self.locations.iter_mut().find(|l| l.location == location) {
            Some(stock) => stock.quantity += quantity,
            None => self.locations.push(LocationStock {
                location: location.clone(),
                zone: zone.into(),
                quantity,
                reserved: 0,
                hard_allocated: 0,
            }),
        }
        self.updated_at = now;
        self.events.push(DomainEvent::InventoryReceived {
            sku: self.sku.clone(),
            location,
            quantity,
            occurred_at: now,
        });
        Ok(())
    }

    /// Soft-reserve available units for an order.
    pub fn reserve(
        &mut self,
        location: &str,
        quantity: u64,
        reservation_id: &str,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), InventoryError> {
        if quantity == 0 {
            return Err(InventoryError::ZeroQuantity);
        }
        let available_before = self.total_available();
        let stock = self.location_mut(location)?;
        let available = stock.available();
        if available < quantity {
            return Err(InventoryError::InsufficientAvailable {
                location: location.to_string(),
                requested: quantity,
                available,
            });
        }
        stock.reserved += quantity;
        self.updated_at = now;
        self.events.push(DomainEvent::InventoryReserved {
            sku: self.sku.clone(),
            reservation_id: reservation_id.to_string(),
            order_id: order_id.to_string(),
            location: location.to_string(),
            quantity,
            occurred_at: now,
        });
        self.check_low_stock(available_before, now);
        Ok(())
    }

    /// Give reserved units back to the available pool.
    pub fn release_reservation(
        &mut self,
        location: &str,
        quantity: u64,
        now: DateTime<Utc>,
    ) -> Result<(), InventoryError> {
        let stock = self.location_mut(location)?;
        if stock.reserved < quantity {
            return Err(InventoryError::InsufficientReserved {
                location: location.to_string(),
                requested: quantity,
                reserved: stock.reserved,
            });
        }
        stock.reserved -= quantity;
        self.updated_at = now;
        Ok(())
    }

    /// Harden a soft reservation into a staged allocation.
    pub fn stage(
        &mut self,
        location: &str,
        quantity: u64,
        allocation_id: &str,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), InventoryError> {
        let sku = self.sku.clone();
        let stock = self.location_mut(location)?;
        if stock.reserved < quantity {
            return Err(InventoryError::InsufficientReserved {
                location: location.to_string(),
                requested: quantity,
                reserved: stock.reserved,
            });
        }
        stock.reserved -= quantity;
        stock.hard_allocated += quantity;
        self.updated_at = now;
        self.events.push(DomainEvent::InventoryStaged {
            allocation_id: allocation_id.to_string(),
            order_id: order_id.to_string(),
            sku,
            quantity,
            occurred_at: now,
        });
        Ok(())
    }

    /// Physically remove picked units. This is the only command that reduces
    /// `quantity` for an order. Consumes hard allocation first, then
    /// reservation.
    pub fn commit_pick(
        &mut self,
        location: &str,
        quantity: u64,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), InventoryError> {
        let sku = self.sku.clone();
        let stock = self.location_mut(location)?;
        let held = stock.hard_allocated + stock.reserved;
        if held < quantity || stock.quantity < quantity {
            return Err(InventoryError::InsufficientAllocated {
                location: location.to_string(),
                requested: quantity,
                allocated: held,
            });
        }
        let from_allocated = quantity.min(stock.hard_allocated);
        stock.hard_allocated -= from_allocated;
        stock.reserved -= quantity - from_allocated;
        stock.quantity -= quantity;
        self.updated_at = now;
        self.events.push(DomainEvent::InventoryPicked {
            sku,
            location: location.to_string(),
            quantity,
            order_id: order_id.to_string(),
            occurred_at: now,
        });
        Ok(())
    }

    /// Cycle-count or damage adjustment. Zero deltas are rejected; negative
    /// deltas cannot take available stock below zero.
    pub fn adjust(
        &mut self,
        location: &str,
        delta: i64,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), InventoryError> {
        if delta == 0 {
            return Err(InventoryError::ZeroAdjustment);
        }
        let available_before = self.total_available();
        let stock = self.location_mut(location)?;
        if delta > 0 {
            stock.quantity += delta as u64;
        } else {
            let take = delta.unsigned_abs();
            let available = stock.available();
            if available < take {
                return Err(InventoryError::InsufficientAvailable {
                    location: location.to_string(),
                    requested: take,
                    available,
                });
            }
            stock.quantity -= take;
        }
        self.updated_at = now;
        self.events.push(DomainEvent::InventoryAdjusted {
            sku: self.sku.clone(),
            location: location.to_string(),
            delta,
            reason: reason.into(),
            occurred_at: now,
        });
        self.check_low_stock(available_before, now);
        Ok(())
    }

    /// Return units to a shelf after a cancelled pick or a customer return.
    pub fn return_to_shelf(
        &mut self,
        location: &str,
        quantity: u64,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), InventoryError> {
        if quantity == 0 {
            return Err(InventoryError::ZeroQuantity);
        }
        let stock = self.location_mut(location)?;
        stock.quantity += quantity;
        self.updated_at = now;
        self.events.push(DomainEvent::InventoryReturnedToShelf {
            sku: self.sku.clone(),
            location: location.to_string(),
            quantity,
            reason: reason.into(),
            occurred_at: now,
        });
        Ok(())
    }

    /// Record that a reservation could not be covered; raises a backorder.
    pub fn record_stock_shortage(
        &mut self,
        order_id: &str,
        requested: u64,
        now: DateTime<Utc>,
    ) {
        let available = self.total_available();
        self.updated_at = now;
        self.events.push(DomainEvent::StockShortage {
            sku: self.sku.clone(),
            order_id: order_id.to_string(),
            requested,
            available,
            occurred_at: now,
        });
        self.events.push(DomainEvent::InventoryBackorderCreated {
            sku: self.sku.clone(),
            order_id: order_id.to_string(),
            quantity: requested.saturating_sub(available),
            trigger: BackorderTrigger::StockShortage,
            occurred_at: now,
        });
    }

    /// Record a cycle-count discrepancy and reconcile the on-hand figure.
    pub fn reconcile(
        &mut self,
        location: &str,
        counted: u64,
        now: DateTime<Utc>,
    ) -> Result<(), InventoryError> {
        let stock = self.location_mut(location)?;
        let expected = stock.quantity;
        if counted != expected {
            self.events.push(DomainEvent::InventoryDiscrepancy {
                sku: self.sku.clone(),
                location: location.to_string(),
                expected,
                counted,
                occurred_at: now,
            });
            let stock = self.location_mut(location)?;
            stock.quantity = counted;
        }
        self.updated_at = now;
        self.events.push(DomainEvent::ReconciliationCompleted {
            sku: self.sku.clone(),
            counted,
            adjusted_by: counted as i64 - expected as i64,
            occurred_at: now,
        });
        Ok(())
    }

    /// Reclassify pick velocity; emits only on change.
    pub fn set_velocity_class(&mut self, class: VelocityClass, now: DateTime<Utc>) {
        if self.velocity_class == class {
            return;
        }
        let previous = self.velocity_class;
        self.velocity_class = class;
        self.updated_at = now;
        self.events.push(DomainEvent::VelocityClassChanged {
            sku: self.sku.clone(),
            previous: previous.as_str().to_string(),
            current: class.as_str().to_string(),
            occurred_at: now,
        });
    }

    /// Verify the conservation invariant across all locations.
    pub fn check_invariants(&self) -> bool {
        self.locations.iter().all(|l| {
            l.reserved + l.hard_allocated <= l.quantity
                && l.quantity == l.reserved + l.hard_allocated + l.available()
        })
    }
}

impl Aggregate for InventoryItem {
    const KIND: &'static str = "inventory_item";

    fn aggregate_id(&self) -> &str {
        &self.sku
    }

    fn pending_events(&self) -> &[DomainEvent] {
        &self.events
    }

    fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }
}
