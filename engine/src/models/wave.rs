//! Wave aggregate.
//!
//! A wave is a batch of orders released together under shared capacity
//! constraints. Status machine:
//!
//! ```text
//! Planning → Scheduled → Released → InProgress → Completed
//!          ↘ Cancelled (not after work has started)
//! ```
//!
//! # Critical Invariants
//!
//! - `Σ order.item_count <= max_items`
//! - `Σ order.weight <= max_weight`
//! - `|orders| <= max_orders`
//! - release requires a scheduled wave with at least one order

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::order::Priority;
use crate::models::process_path::{PathKind, SpecialHandling, StationCapability, StationType};
use crate::models::{Aggregate, DomainEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveType {
    Digital,
    Wholesale,
    Priority,
    Mixed,
    Hazmat,
    ColdChain,
    HighValue,
    Fragile,
    Standard,
    Specialized,
}

impl WaveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaveType::Digital => "digital",
            WaveType::Wholesale => "wholesale",
            WaveType::Priority => "priority",
            WaveType::Mixed => "mixed",
            WaveType::Hazmat => "hazmat",
            WaveType::ColdChain => "cold_chain",
            WaveType::HighValue => "high_value",
            WaveType::Fragile => "fragile",
            WaveType::Standard => "standard",
            WaveType::Specialized => "specialized",
        }
    }

    /// Special-handling class a dedicated wave type accepts, if any.
    pub fn dedicated_handling(&self) -> Option<SpecialHandling> {
        match self {
            WaveType::Hazmat => Some(SpecialHandling::Hazmat),
            WaveType::ColdChain => Some(SpecialHandling::ColdChain),
            WaveType::HighValue => Some(SpecialHandling::HighValue),
            WaveType::Fragile => Some(SpecialHandling::Fragile),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentMode {
    Wave,
    Waveless,
}

impl FulfillmentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentMode::Wave => "wave",
            FulfillmentMode::Waveless => "waveless",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveStatus {
    Planning,
    Scheduled,
    Released,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WaveError {
    #[error("Wave capacity exceeded: {dimension} would reach {requested}, limit {limit}")]
    CapacityExceeded {
        dimension: &'static str,
        requested: u64,
        limit: u64,
    },

    #[error("Invalid wave transition from {from:?} to {to:?}")]
    InvalidTransition { from: WaveStatus, to: WaveStatus },

    #[error("Cannot release a wave with no orders")]
    EmptyWave,

    #[error("Wave can only be optimized while planning or scheduled")]
    NotOptimizable,

    #[error("Cannot cancel a wave that is already in progress")]
    CancelAfterStart,

    #[error("Order {order_id} is already in this wave")]
    DuplicateOrder { order_id: String },
}

/// Capacity and filtering configuration a wave was planned under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveConfiguration {
    pub max_orders: u32,
    pub max_items: u64,
    pub max_weight_grams: u64,
    pub priority_filter: Option<Priority>,
    pub carrier_filter: Option<String>,
    pub zone: Option<String>,
    pub cutoff_time: Option<DateTime<Utc>>,
    pub release_delay_seconds: u64,
    pub auto_release: bool,
    pub optimize_for_picking: bool,
}

impl Default for WaveConfiguration {
    fn default() -> Self {
        Self {
            max_orders: 100,
            max_items: 2_000,
            max_weight_grams: 500_000,
            priority_filter: None,
            carrier_filter: None,
            zone: None,
            cutoff_time: None,
            release_delay_seconds: 0,
            auto_release: false,
            optimize_for_picking: true,
        }
    }
}

/// Denormalized summary of a member order, captured at add time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveOrder {
    pub order_id: String,
    pub priority: Priority,
    pub item_count: u32,
    pub weight_grams: u64,
    pub zone: String,
    pub special_handling: BTreeSet<SpecialHandling>,
    pub path_kind: PathKind,
}

/// Staffing derived from wave contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaborAllocation {
    pub pickers: u32,
    pub packers: u32,
}

impl LaborAllocation {
    /// `pickers = ceil(items/100)`, `packers = ceil(orders/50)`, one minimum.
    pub fn size_for(total_items: u64, order_count: u32) -> Self {
        Self {
            pickers: (total_items.div_ceil(100) as u32).max(1),
            packers: (u64::from(order_count).div_ceil(50) as u32).max(1),
        }
    }
}

/// Wave aggregate root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wave {
    id: String,
    wave_type: WaveType,
    fulfillment_mode: FulfillmentMode,
    status: WaveStatus,
    configuration: WaveConfiguration,
    orders: Vec<WaveOrder>,
    labor: LaborAllocation,
    priority: u8,
    scheduled_start: Option<DateTime<Utc>>,
    released_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    #[serde(skip, default)]
    events: Vec<DomainEvent>,
}

impl Wave {
    pub fn create(
        id: impl Into<String>,
        wave_type: WaveType,
        fulfillment_mode: FulfillmentMode,
        configuration: WaveConfiguration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            wave_type,
            fulfillment_mode,
            status: WaveStatus::Planning,
            configuration,
            orders: Vec::new(),
            labor: LaborAllocation {
                pickers: 1,
                packers: 1,
            },
            priority: Priority::Standard.rank(),
            scheduled_start: None,
            released_at: None,
            created_at: now,
            updated_at: now,
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn wave_type(&self) -> WaveType {
        self.wave_type
    }

    pub fn fulfillment_mode(&self) -> FulfillmentMode {
        self.fulfillment_mode
    }

    pub fn status(&self) -> WaveStatus {
        self.status
    }

    pub fn configuration(&self) -> &WaveConfiguration {
        &self.configuration
    }

    pub fn orders(&self) -> &[WaveOrder] {
        &self.orders
    }

    pub fn order_ids(&self) -> Vec<String> {
        self.orders.iter().map(|o| o.order_id.clone()).collect()
    }

    pub fn labor(&self) -> LaborAllocation {
        self.labor
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn scheduled_start(&self) -> Option<DateTime<Utc>> {
        self.scheduled_start
    }

    pub fn total_items(&self) -> u64 {
        self.orders.iter().map(|o| u64::from(o.item_count)).sum()
    }

    pub fn total_weight_grams(&self) -> u64 {
        self.orders.iter().map(|o| o.weight_grams).sum()
    }

    /// Capabilities every station set working this wave must cover.
    pub fn required_capabilities(&self) -> BTreeSet<StationCapability> {
        self.orders
            .iter()
            .flat_map(|o| o.special_handling.iter())
            .map(|h| h.required_capability())
            .collect()
    }

    /// Station kinds needed across member paths.
    pub fn station_types(&self) -> BTreeSet<StationType> {
        let mut set = BTreeSet::from([
            StationType::Pick,
            StationType::Pack,
            StationType::Sort,
            StationType::Ship,
        ]);
        if self
            .orders
            .iter()
            .any(|o| o.path_kind == PathKind::PickWallPack)
        {
            set.insert(StationType::Wall);
        }
        set
    }

    /// Special-handling classes present in the wave.
    pub fn special_handling_types(&self) -> BTreeSet<SpecialHandling> {
        self.orders
            .iter()
            .flat_map(|o| o.special_handling.iter().copied())
            .collect()
    }

    fn recompute_derived(&mut self) {
        self.labor = LaborAllocation::size_for(self.total_items(), self.orders.len() as u32);
        self.priority = self
            .orders
            .iter()
            .map(|o| o.priority.rank())
            .min()
            .unwrap_or(Priority::Standard.rank());
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Add an order, enforcing every capacity dimension.
    pub fn add_order(&mut self, order: WaveOrder, now: DateTime<Utc>) -> Result<(), WaveError> {
        if !matches!(self.status, WaveStatus::Planning | WaveStatus::Scheduled) {
            return Err(WaveError::InvalidTransition {
                from: self.status,
                to: self.status,
            });
        }
        if self.orders.iter().any(|o| o.order_id == order.order_id) {
            return Err(WaveError::DuplicateOrder {
                order_id: order.order_id,
            });
        }
        let order_count = self.orders.len() as u64 + 1;
        if order_count > u64::from(self.configuration.max_orders) {
            return Err(WaveError::CapacityExceeded {
                dimension: "orders",
                requested: order_count,
                limit: u64::from(self.configuration.max_orders),
            });
        }
        let items = self.total_items() + u64::from(order.item_count);
        if items > self.configuration.max_items {
            return Err(WaveError::CapacityExceeded {
                dimension: "items",
                requested: items,
                limit: self.configuration.max_items,
            });
        }
        let weight = self.total_weight_grams() + order.weight_grams;
        if weight > self.configuration.max_weight_grams {
            return Err(WaveError::CapacityExceeded {
                dimension: "weight",
                requested: weight,
                limit: self.configuration.max_weight_grams,
            });
        }

        self.events.push(DomainEvent::WaveOrderAdded {
            wave_id: self.id.clone(),
            order_id: order.order_id.clone(),
            occurred_at: now,
        });
        self.orders.push(order);
        self.recompute_derived();
        self.updated_at = now;
        Ok(())
    }

    /// Emit the creation event once membership is final.
    pub fn finalize_creation(&mut self, now: DateTime<Utc>) {
        self.events.push(DomainEvent::WaveCreated {
            wave_id: self.id.clone(),
            wave_type: self.wave_type.as_str().to_string(),
            fulfillment_mode: self.fulfillment_mode.as_str().to_string(),
            order_count: self.orders.len() as u32,
            priority: self.priority,
            occurred_at: now,
        });
        self.events.push(DomainEvent::LaborAllocated {
            wave_id: self.id.clone(),
            pickers: self.labor.pickers,
            packers: self.labor.packers,
            occurred_at: now,
        });
        self.updated_at = now;
    }

    pub fn schedule(
        &mut self,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), WaveError> {
        if self.status != WaveStatus::Planning {
            return Err(WaveError::InvalidTransition {
                from: self.status,
                to: WaveStatus::Scheduled,
            });
        }
        self.status = WaveStatus::Scheduled;
        self.scheduled_start = Some(start);
        self.updated_at = now;
        self.events.push(DomainEvent::WaveScheduled {
            wave_id: self.id.clone(),
            scheduled_start: start,
            occurred_at: now,
        });
        Ok(())
    }

    /// Release the wave to the floor. Requires scheduled status and at least
    /// one member order.
    pub fn release(&mut self, now: DateTime<Utc>) -> Result<(), WaveError> {
        if self.status != WaveStatus::Scheduled {
            return Err(WaveError::InvalidTransition {
                from: self.status,
                to: WaveStatus::Released,
            });
        }
        if self.orders.is_empty() {
            return Err(WaveError::EmptyWave);
        }
        self.status = WaveStatus::Released;
        self.released_at = Some(now);
        self.updated_at = now;
        self.events.push(DomainEvent::WaveReleased {
            wave_id: self.id.clone(),
            order_ids: self.order_ids(),
            occurred_at: now,
        });
        Ok(())
    }

    pub fn start_progress(&mut self, now: DateTime<Utc>) -> Result<(), WaveError> {
        if self.status != WaveStatus::Released {
            return Err(WaveError::InvalidTransition {
                from: self.status,
                to: WaveStatus::InProgress,
            });
        }
        self.status = WaveStatus::InProgress;
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), WaveError> {
        if self.status != WaveStatus::InProgress {
            return Err(WaveError::InvalidTransition {
                from: self.status,
                to: WaveStatus::Completed,
            });
        }
        self.status = WaveStatus::Completed;
        self.updated_at = now;
        self.events.push(DomainEvent::WaveCompleted {
            wave_id: self.id.clone(),
            occurred_at: now,
        });
        self.events.push(DomainEvent::LaborReleased {
            wave_id: self.id.clone(),
            occurred_at: now,
        });
        Ok(())
    }

    /// Cancel is forbidden once floor work has started.
    pub fn cancel(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), WaveError> {
        match self.status {
            WaveStatus::InProgress | WaveStatus::Completed => Err(WaveError::CancelAfterStart),
            WaveStatus::Cancelled => Ok(()),
            _ => {
                self.status = WaveStatus::Cancelled;
                self.updated_at = now;
                self.events.push(DomainEvent::WaveCancelled {
                    wave_id: self.id.clone(),
                    reason: reason.into(),
                    occurred_at: now,
                });
                Ok(())
            }
        }
    }

    /// Re-sequence member orders for picking efficiency: zone ascending, then
    /// item count ascending. Permitted only before release.
    pub fn optimize(&mut self, now: DateTime<Utc>) -> Result<f64, WaveError> {
        if !matches!(self.status, WaveStatus::Planning | WaveStatus::Scheduled) {
            return Err(WaveError::NotOptimizable);
        }
        let before: Vec<String> = self.orders.iter().map(|o| o.order_id.clone()).collect();
        self.orders
            .sort_by(|a, b| a.zone.cmp(&b.zone).then(a.item_count.cmp(&b.item_count)));
        let moved = self
            .orders
            .iter()
            .zip(before.iter())
            .filter(|(after, before)| &after.order_id != *before)
            .count();
        // Placeholder metric: fraction of orders whose position improved.
        let estimated_savings = if self.orders.is_empty() {
            0.0
        } else {
            moved as f64 / self.orders.len() as f64
        };
        self.recompute_derived();
        self.updated_at = now;
        self.events.push(DomainEvent::WaveOptimized {
            wave_id: self.id.clone(),
            estimated_savings,
            occurred_at: now,
        });
        Ok(estimated_savings)
    }
}

impl Aggregate for Wave {
    const KIND: &'static str = "wave";

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
