//! Order aggregate.
//!
//! An order moves through the fulfillment pipeline along a guarded status
//! machine:
//!
//! ```text
//! Received → Validated → WaveAssigned → Picking → [Consolidated] → Packed
//!          → Shipped → Delivered
//! ```
//!
//! `Cancelled` absorbs from any pre-shipment state; `PendingRetry` and
//! `DeadLetter` are reached only through the retry controller. Transitions are
//! the only permitted mutation paths, and every command stamps `updated_at`.
//!
//! CRITICAL: All money values are integer minor units (`Money`).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::process_path::SpecialHandling;
use crate::models::{Aggregate, BackorderTrigger, DomainEvent};
use crate::money::{Money, MoneyError};

/// Orders at or above this total are high-value and require verification
/// handling ($500.00 in minor units).
pub const HIGH_VALUE_THRESHOLD_MINOR: i64 = 500_00;

/// Delivery priority, ordered most to least urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    SameDay,
    NextDay,
    Standard,
}

impl Priority {
    /// Sort rank used by the wave planner (same_day first).
    pub fn rank(&self) -> u8 {
        match self {
            Priority::SameDay => 1,
            Priority::NextDay => 2,
            Priority::Standard => 3,
        }
    }

    /// How long the planning workflow waits for wave assignment.
    pub fn wave_assignment_timeout(&self) -> chrono::Duration {
        match self {
            Priority::SameDay => chrono::Duration::minutes(30),
            Priority::NextDay => chrono::Duration::hours(2),
            Priority::Standard => chrono::Duration::hours(8),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::SameDay => "same_day",
            Priority::NextDay => "next_day",
            Priority::Standard => "standard",
        }
    }
}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Received,
    Validated,
    WaveAssigned,
    Picking,
    Consolidated,
    Packed,
    Shipped,
    Delivered,
    Cancelled,
    PendingRetry,
    DeadLetter,
}

impl OrderStatus {
    /// Position on the happy path, `None` for the out-of-band states.
    fn sequence_rank(&self) -> Option<u8> {
        match self {
            OrderStatus::Received => Some(0),
            OrderStatus::Validated => Some(1),
            OrderStatus::WaveAssigned => Some(2),
            OrderStatus::Picking => Some(3),
            OrderStatus::Consolidated => Some(4),
            OrderStatus::Packed => Some(5),
            OrderStatus::Shipped => Some(6),
            OrderStatus::Delivered => Some(7),
            _ => None,
        }
    }

    /// Whether the order has physically left the building.
    pub fn is_shipped_or_later(&self) -> bool {
        matches!(self, OrderStatus::Shipped | OrderStatus::Delivered)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::DeadLetter
        )
    }
}

/// Errors that can occur during order commands
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrderError {
    #[error("Order must contain at least one item")]
    EmptyItems,

    #[error("Item {sku} has zero quantity")]
    ZeroQuantity { sku: String },

    #[error("Order items must share one currency")]
    MixedCurrencies,

    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order already assigned to wave {wave_id}")]
    AlreadyWaved { wave_id: String },

    #[error("Cannot cancel order in status {status:?}")]
    CannotCancel { status: OrderStatus },

    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Physical item dimensions in centimetres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length_cm: u32,
    pub width_cm: u32,
    pub height_cm: u32,
}

/// One order line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub sku: String,
    pub quantity: u32,
    pub unit_weight_grams: u32,
    pub dimensions: Dimensions,
    pub unit_price: Money,
    /// Storage zone the SKU picks from.
    pub zone: String,
    pub fragile: bool,
    pub hazmat: bool,
    pub cold_chain: bool,
}

/// Shipping destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
}

/// Order aggregate root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    id: String,
    customer_id: String,
    items: Vec<OrderItem>,
    shipping_address: Address,
    priority: Priority,
    status: OrderStatus,
    promised_delivery_at: DateTime<Utc>,
    carrier: Option<String>,
    carrier_cutoff: Option<DateTime<Utc>>,
    wave_id: Option<String>,
    tracking_number: Option<String>,
    gift_wrap: bool,
    received_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    #[serde(skip, default)]
    events: Vec<DomainEvent>,
}

impl Order {
    /// Register a newly submitted order. Emits `wms.order.received`.
    #[allow(clippy::too_many_arguments)]
    pub fn receive(
        id: impl Into<String>,
        customer_id: impl Into<String>,
        items: Vec<OrderItem>,
        shipping_address: Address,
        priority: Priority,
        promised_delivery_at: DateTime<Utc>,
        gift_wrap: bool,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::EmptyItems);
        }
        for item in &items {
            if item.quantity == 0 {
                return Err(OrderError::ZeroQuantity {
                    sku: item.sku.clone(),
                });
            }
        }
        let currency = items[0].unit_price.currency();
        if items.iter().any(|i| i.unit_price.currency() != currency) {
            return Err(OrderError::MixedCurrencies);
        }

        let mut order = Self {
            id: id.into(),
            customer_id: customer_id.into(),
            items,
            shipping_address,
            priority,
            status: OrderStatus::Received,
            promised_delivery_at,
            carrier: None,
            carrier_cutoff: None,
            wave_id: None,
            tracking_number: None,
            gift_wrap,
            received_at: now,
            updated_at: now,
            events: Vec::new(),
        };

        let total_value = order.total_value()?;
        order.events.push(DomainEvent::OrderReceived {
            order_id: order.id.clone(),
            customer_id: order.customer_id.clone(),
            item_count: order.item_count(),
            total_value,
            priority: order.priority.as_str().to_string(),
            occurred_at: now,
        });
        Ok(order)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn wave_id(&self) -> Option<&str> {
        self.wave_id.as_deref()
    }

    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_number.as_deref()
    }

    pub fn promised_delivery_at(&self) -> DateTime<Utc> {
        self.promised_delivery_at
    }

    pub fn carrier(&self) -> Option<&str> {
        self.carrier.as_deref()
    }

    pub fn carrier_cutoff(&self) -> Option<DateTime<Utc>> {
        self.carrier_cutoff
    }

    pub fn gift_wrap(&self) -> bool {
        self.gift_wrap
    }

    pub fn shipping_address(&self) -> &Address {
        &self.shipping_address
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Total units across all lines.
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Total shipping weight in grams.
    pub fn total_weight_grams(&self) -> u64 {
        self.items
            .iter()
            .map(|i| u64::from(i.quantity) * u64::from(i.unit_weight_grams))
            .sum()
    }

    /// Order value as `Σ unit_price * quantity`.
    pub fn total_value(&self) -> Result<Money, MoneyError> {
        let currency = self.items[0].unit_price.currency();
        let mut total = Money::zero(currency);
        for item in &self.items {
            total = total.add(&item.unit_price.multiply(u64::from(item.quantity))?)?;
        }
        Ok(total)
    }

    /// High-value orders need verification at a capable station.
    pub fn requires_high_value_handling(&self) -> bool {
        self.total_value()
            .map(|v| v.amount_minor() >= HIGH_VALUE_THRESHOLD_MINOR)
            .unwrap_or(false)
    }

    /// Special-handling classes derived from the order lines.
    pub fn special_handling(&self) -> BTreeSet<SpecialHandling> {
        let mut set = BTreeSet::new();
        for item in &self.items {
            if item.fragile {
                set.insert(SpecialHandling::Fragile);
            }
            if item.hazmat {
                set.insert(SpecialHandling::Hazmat);
            }
            if item.cold_chain {
                set.insert(SpecialHandling::ColdChain);
            }
        }
        if self.gift_wrap {
            set.insert(SpecialHandling::GiftWrap);
        }
        if self.requires_high_value_handling() {
            set.insert(SpecialHandling::HighValue);
        }
        set
    }

    /// Distinct pick zones the order spans.
    pub fn zones(&self) -> BTreeSet<String> {
        self.items.iter().map(|i| i.zone.clone()).collect()
    }

    /// First zone in sort order, used for wave sequencing.
    pub fn primary_zone(&self) -> String {
        self.zones().into_iter().next().unwrap_or_default()
    }

    /// Orders spanning multiple zones go through the consolidation wall.
    pub fn consolidation_required(&self) -> bool {
        self.zones().len() > 1
    }

    /// Ready for the wave planner: validated and not yet waved.
    pub fn is_waveable(&self) -> bool {
        self.status == OrderStatus::Validated && self.wave_id.is_none()
    }

    pub fn set_carrier(&mut self, carrier: impl Into<String>, cutoff: Option<DateTime<Utc>>) {
        self.carrier = Some(carrier.into());
        self.carrier_cutoff = cutoff;
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    fn transition(&mut self, to: OrderStatus, now: DateTime<Utc>) -> Result<(), OrderError> {
        let allowed = match (self.status, to) {
            (OrderStatus::Received, OrderStatus::Validated) => true,
            (OrderStatus::PendingRetry, OrderStatus::Validated) => true,
            (OrderStatus::Validated, OrderStatus::WaveAssigned) => true,
            (OrderStatus::WaveAssigned, OrderStatus::Picking) => true,
            (OrderStatus::Picking, OrderStatus::Consolidated) => true,
            (OrderStatus::Picking, OrderStatus::Packed) => true,
            (OrderStatus::Consolidated, OrderStatus::Packed) => true,
            (OrderStatus::Packed, OrderStatus::Shipped) => true,
            (OrderStatus::Shipped, OrderStatus::Delivered) => true,
            (from, OrderStatus::Cancelled) => !from.is_shipped_or_later(),
            // DeadLetter re-enters via the manual_retry resolution.
            (from, OrderStatus::PendingRetry) => {
                !matches!(from, OrderStatus::Delivered | OrderStatus::Cancelled)
            }
            (from, OrderStatus::DeadLetter) => !from.is_terminal(),
            _ => false,
        };
        if !allowed {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// Validate the order. Idempotent: validating an order that already
    /// progressed past `Validated` is a no-op.
    pub fn validate(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self
            .status
            .sequence_rank()
            .is_some_and(|rank| rank >= OrderStatus::Validated.sequence_rank().unwrap_or(1))
        {
            return Ok(());
        }
        self.transition(OrderStatus::Validated, now)?;
        self.events.push(DomainEvent::OrderValidated {
            order_id: self.id.clone(),
            occurred_at: now,
        });
        Ok(())
    }

    /// Attach the order to a wave. Fails if it is already waved.
    pub fn assign_to_wave(
        &mut self,
        wave_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if let Some(existing) = &self.wave_id {
            return Err(OrderError::AlreadyWaved {
                wave_id: existing.clone(),
            });
        }
        self.transition(OrderStatus::WaveAssigned, now)?;
        let wave_id = wave_id.into();
        self.wave_id = Some(wave_id.clone());
        self.events.push(DomainEvent::OrderWaveAssigned {
            order_id: self.id.clone(),
            wave_id,
            occurred_at: now,
        });
        Ok(())
    }

    pub fn start_picking(
        &mut self,
        station_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        self.transition(OrderStatus::Picking, now)?;
        self.events.push(DomainEvent::PickingStarted {
            order_id: self.id.clone(),
            station_id: station_id.into(),
            occurred_at: now,
        });
        Ok(())
    }

    /// Record the end of the pick stage without changing status.
    pub fn complete_picking(
        &mut self,
        station_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if self.status != OrderStatus::Picking {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: OrderStatus::Picking,
            });
        }
        self.updated_at = now;
        self.events.push(DomainEvent::PickingCompleted {
            order_id: self.id.clone(),
            station_id: station_id.into(),
            occurred_at: now,
        });
        Ok(())
    }

    pub fn start_consolidation(
        &mut self,
        station_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if self.status != OrderStatus::Picking {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: OrderStatus::Consolidated,
            });
        }
        self.updated_at = now;
        self.events.push(DomainEvent::ConsolidationStarted {
            order_id: self.id.clone(),
            station_id: station_id.into(),
            occurred_at: now,
        });
        Ok(())
    }

    pub fn mark_consolidated(
        &mut self,
        station_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        self.transition(OrderStatus::Consolidated, now)?;
        self.events.push(DomainEvent::ConsolidationCompleted {
            order_id: self.id.clone(),
            station_id: station_id.into(),
            occurred_at: now,
        });
        Ok(())
    }

    pub fn start_packing(
        &mut self,
        station_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !matches!(
            self.status,
            OrderStatus::Picking | OrderStatus::Consolidated
        ) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: OrderStatus::Packed,
            });
        }
        self.updated_at = now;
        self.events.push(DomainEvent::PackingStarted {
            order_id: self.id.clone(),
            station_id: station_id.into(),
            occurred_at: now,
        });
        Ok(())
    }

    pub fn mark_packed(
        &mut self,
        package_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        self.transition(OrderStatus::Packed, now)?;
        self.events.push(DomainEvent::PackingCompleted {
            order_id: self.id.clone(),
            package_id: package_id.into(),
            occurred_at: now,
        });
        Ok(())
    }

    /// SLAM: scan, label, apply, manifest. Requires a packed order.
    pub fn record_slam(
        &mut self,
        tracking_number: impl Into<String>,
        manifest_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if self.status != OrderStatus::Packed {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: OrderStatus::Packed,
            });
        }
        let tracking_number = tracking_number.into();
        self.tracking_number = Some(tracking_number.clone());
        self.updated_at = now;
        self.events.push(DomainEvent::ShippingLabelCreated {
            order_id: self.id.clone(),
            tracking_number,
            occurred_at: now,
        });
        self.events.push(DomainEvent::ShippingManifested {
            order_id: self.id.clone(),
            manifest_id: manifest_id.into(),
            occurred_at: now,
        });
        Ok(())
    }

    /// Hand the package to the carrier.
    pub fn dispatch(
        &mut self,
        carrier: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        self.transition(OrderStatus::Shipped, now)?;
        let carrier = carrier.into();
        self.carrier = Some(carrier.clone());
        self.events.push(DomainEvent::OrderShipped {
            order_id: self.id.clone(),
            tracking_number: self.tracking_number.clone().unwrap_or_default(),
            occurred_at: now,
        });
        self.events.push(DomainEvent::ShippingDispatched {
            order_id: self.id.clone(),
            carrier,
            occurred_at: now,
        });
        Ok(())
    }

    pub fn deliver(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Delivered, now)
    }

    /// Terminal success marker for the fulfillment workflow.
    pub fn complete_fulfillment(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.is_shipped_or_later() {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: OrderStatus::Shipped,
            });
        }
        self.updated_at = now;
        self.events.push(DomainEvent::OrderCompleted {
            order_id: self.id.clone(),
            wave_id: self.wave_id.clone(),
            tracking_number: self.tracking_number.clone(),
            occurred_at: now,
        });
        Ok(())
    }

    /// Cancel the order. A second cancel is a no-op; shipped and delivered
    /// orders cannot be cancelled.
    pub fn cancel(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self.status == OrderStatus::Cancelled {
            return Ok(());
        }
        if self.status.is_shipped_or_later() {
            return Err(OrderError::CannotCancel {
                status: self.status,
            });
        }
        self.transition(OrderStatus::Cancelled, now)?;
        self.events.push(DomainEvent::OrderCancelled {
            order_id: self.id.clone(),
            reason: reason.into(),
            occurred_at: now,
        });
        Ok(())
    }

    /// Clear wave assignment and park the order for another workflow run.
    pub fn reset_for_retry(
        &mut self,
        retry_count: u32,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        self.transition(OrderStatus::PendingRetry, now)?;
        self.wave_id = None;
        self.events.push(DomainEvent::OrderRetryScheduled {
            order_id: self.id.clone(),
            retry_count,
            reason: reason.into(),
            occurred_at: now,
        });
        Ok(())
    }

    /// Park the order on the dead-letter queue after the retry budget.
    pub fn move_to_dead_letter(
        &mut self,
        entry_id: impl Into<String>,
        retry_count: u32,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        self.transition(OrderStatus::DeadLetter, now)?;
        self.events.push(DomainEvent::OrderMovedToDlq {
            order_id: self.id.clone(),
            entry_id: entry_id.into(),
            retry_count,
            reason: reason.into(),
            occurred_at: now,
        });
        Ok(())
    }

    /// A pick committed fewer units than the line asked for; raise a
    /// backorder for the remainder.
    pub fn record_partial_fulfillment(
        &mut self,
        sku: impl Into<String>,
        requested: u64,
        fulfilled: u64,
        now: DateTime<Utc>,
    ) {
        let sku = sku.into();
        self.updated_at = now;
        self.events.push(DomainEvent::OrderPartiallyFulfilled {
            order_id: self.id.clone(),
            sku: sku.clone(),
            requested,
            fulfilled,
            occurred_at: now,
        });
        self.events.push(DomainEvent::OrderBackorderCreated {
            order_id: self.id.clone(),
            sku,
            quantity: requested.saturating_sub(fulfilled),
            trigger: BackorderTrigger::PartialFulfillment,
            occurred_at: now,
        });
    }

    pub fn record_backorder_fulfilled(
        &mut self,
        sku: impl Into<String>,
        quantity: u64,
        now: DateTime<Utc>,
    ) {
        self.updated_at = now;
        self.events.push(DomainEvent::OrderBackorderFulfilled {
            order_id: self.id.clone(),
            sku: sku.into(),
            quantity,
            occurred_at: now,
        });
    }
}

impl Aggregate for Order {
    const KIND: &'static str = "order";

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
