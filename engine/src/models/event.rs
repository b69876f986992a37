//! Domain events emitted by aggregates.
//!
//! Events are a closed tagged enum; dispatch is by variant, never by
//! reflection. Aggregates push events into a transient buffer as part of each
//! command; the outbox repository drains the buffer atomically with the state
//! change that produced it, so no event is ever observable without its
//! aggregate mutation having committed.
//!
//! The serde `type` tag carries the verbatim dot-namespaced event name used on
//! the wire (`wms.order.received`, `wms.inventory.valued`, ...), so a
//! serialized event is exactly the CloudEvents `data` payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// Minimal read surface shared by every event.
pub trait EventMeta {
    /// Verbatim dot-namespaced event name.
    fn event_type(&self) -> &'static str;

    /// When the event occurred.
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Identity of the aggregate that emitted the event; this is the outbox
    /// partition key.
    fn aggregate_id(&self) -> &str;
}

/// All events the platform emits, one variant per catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    // ------------------------------------------------------------------
    // Orders
    // ------------------------------------------------------------------
    #[serde(rename = "wms.order.received")]
    OrderReceived {
        order_id: String,
        customer_id: String,
        item_count: u32,
        total_value: Money,
        priority: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.order.validated")]
    OrderValidated {
        order_id: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.order.wave-assigned")]
    OrderWaveAssigned {
        order_id: String,
        wave_id: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.order.shipped")]
    OrderShipped {
        order_id: String,
        tracking_number: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.order.cancelled")]
    OrderCancelled {
        order_id: String,
        reason: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.order.completed")]
    OrderCompleted {
        order_id: String,
        wave_id: Option<String>,
        tracking_number: Option<String>,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.order.retry-scheduled")]
    OrderRetryScheduled {
        order_id: String,
        retry_count: u32,
        reason: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.order.moved-to-dlq")]
    OrderMovedToDlq {
        order_id: String,
        entry_id: String,
        retry_count: u32,
        reason: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.order.partially-fulfilled")]
    OrderPartiallyFulfilled {
        order_id: String,
        sku: String,
        requested: u64,
        fulfilled: u64,
        occurred_at: DateTime<Utc>,
    },

    /// Backorder raised against an order; `trigger` distinguishes the
    /// stock-shortage path from the partial-fulfilment path.
    #[serde(rename = "wms.order.backorder-created")]
    OrderBackorderCreated {
        order_id: String,
        sku: String,
        quantity: u64,
        trigger: BackorderTrigger,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.order.backorder-fulfilled")]
    OrderBackorderFulfilled {
        order_id: String,
        sku: String,
        quantity: u64,
        occurred_at: DateTime<Utc>,
    },

    // ------------------------------------------------------------------
    // Waves
    // ------------------------------------------------------------------
    #[serde(rename = "wms.wave.created")]
    WaveCreated {
        wave_id: String,
        wave_type: String,
        fulfillment_mode: String,
        order_count: u32,
        priority: u8,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.wave.order-added")]
    WaveOrderAdded {
        wave_id: String,
        order_id: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.wave.scheduled")]
    WaveScheduled {
        wave_id: String,
        scheduled_start: DateTime<Utc>,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.wave.released")]
    WaveReleased {
        wave_id: String,
        order_ids: Vec<String>,
        occurred_at: DateTime<Utc>,
    },

    /// `estimated_savings` is an opaque figure until a concrete formula is
    /// agreed; consumers must not interpret it.
    #[serde(rename = "wms.wave.optimized")]
    WaveOptimized {
        wave_id: String,
        estimated_savings: f64,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.wave.completed")]
    WaveCompleted {
        wave_id: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.wave.cancelled")]
    WaveCancelled {
        wave_id: String,
        reason: String,
        occurred_at: DateTime<Utc>,
    },

    // ------------------------------------------------------------------
    // Inventory
    // ------------------------------------------------------------------
    #[serde(rename = "wms.inventory.received")]
    InventoryReceived {
        sku: String,
        location: String,
        quantity: u64,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.inventory.reserved")]
    InventoryReserved {
        sku: String,
        reservation_id: String,
        order_id: String,
        location: String,
        quantity: u64,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.inventory.picked")]
    InventoryPicked {
        sku: String,
        location: String,
        quantity: u64,
        order_id: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.inventory.adjusted")]
    InventoryAdjusted {
        sku: String,
        location: String,
        delta: i64,
        reason: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.inventory.low-stock-alert")]
    LowStockAlert {
        sku: String,
        available: u64,
        reorder_point: u64,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.inventory.staged")]
    InventoryStaged {
        allocation_id: String,
        order_id: String,
        sku: String,
        quantity: u64,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.inventory.packed")]
    InventoryPacked {
        allocation_id: String,
        order_id: String,
        sku: String,
        quantity: u64,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.inventory.shipped")]
    InventoryShipped {
        allocation_id: String,
        order_id: String,
        sku: String,
        quantity: u64,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.inventory.returned-to-shelf")]
    InventoryReturnedToShelf {
        sku: String,
        location: String,
        quantity: u64,
        reason: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.inventory.stock-shortage")]
    StockShortage {
        sku: String,
        order_id: String,
        requested: u64,
        available: u64,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.inventory.discrepancy")]
    InventoryDiscrepancy {
        sku: String,
        location: String,
        expected: u64,
        counted: u64,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.inventory.backorder-created")]
    InventoryBackorderCreated {
        sku: String,
        order_id: String,
        quantity: u64,
        trigger: BackorderTrigger,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.inventory.velocity-class-changed")]
    VelocityClassChanged {
        sku: String,
        previous: String,
        current: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.inventory.ledger-entry-created")]
    LedgerEntryCreated {
        sku: String,
        transaction_id: String,
        debit_account: String,
        credit_account: String,
        amount: Money,
        quantity: u64,
        occurred_at: DateTime<Utc>,
    },

    /// New valuation after receiving, picking or adjusting.
    #[serde(rename = "wms.inventory.valued")]
    InventoryValued {
        sku: String,
        balance: u64,
        value: Money,
        average_unit_cost: Money,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.inventory.reconciliation-completed")]
    ReconciliationCompleted {
        sku: String,
        counted: u64,
        adjusted_by: i64,
        occurred_at: DateTime<Utc>,
    },

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------
    #[serde(rename = "wms.routing.route-calculated")]
    RouteCalculated {
        route_id: String,
        order_id: String,
        stop_count: u32,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.routing.route-started")]
    RouteStarted {
        route_id: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.routing.stop-completed")]
    StopCompleted {
        route_id: String,
        stop_index: u32,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.routing.route-completed")]
    RouteCompleted {
        route_id: String,
        occurred_at: DateTime<Utc>,
    },

    // ------------------------------------------------------------------
    // Execution stages
    // ------------------------------------------------------------------
    #[serde(rename = "wms.picking.started")]
    PickingStarted {
        order_id: String,
        station_id: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.picking.completed")]
    PickingCompleted {
        order_id: String,
        station_id: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.consolidation.started")]
    ConsolidationStarted {
        order_id: String,
        station_id: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.consolidation.completed")]
    ConsolidationCompleted {
        order_id: String,
        station_id: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.packing.started")]
    PackingStarted {
        order_id: String,
        station_id: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.packing.completed")]
    PackingCompleted {
        order_id: String,
        package_id: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.shipping.label-created")]
    ShippingLabelCreated {
        order_id: String,
        tracking_number: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.shipping.manifested")]
    ShippingManifested {
        order_id: String,
        manifest_id: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.shipping.dispatched")]
    ShippingDispatched {
        order_id: String,
        carrier: String,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.labor.allocated")]
    LaborAllocated {
        wave_id: String,
        pickers: u32,
        packers: u32,
        occurred_at: DateTime<Utc>,
    },

    #[serde(rename = "wms.labor.released")]
    LaborReleased {
        wave_id: String,
        occurred_at: DateTime<Utc>,
    },
}

/// Which path raised a backorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackorderTrigger {
    /// Reservation found less stock than requested.
    StockShortage,
    /// A pick committed fewer units than the order line asked for.
    PartialFulfillment,
}

impl DomainEvent {
    /// Topic (bounded context stream) the event belongs on.
    pub fn topic(&self) -> &'static str {
        let name = self.event_type();
        if name.starts_with("wms.order.") {
            "wms.orders"
        } else if name.starts_with("wms.wave.") {
            "wms.waves"
        } else if name.starts_with("wms.inventory.") {
            "wms.inventory"
        } else if name.starts_with("wms.routing.") {
            "wms.routing"
        } else if name.starts_with("wms.picking.") {
            "wms.picking"
        } else if name.starts_with("wms.consolidation.") {
            "wms.consolidation"
        } else if name.starts_with("wms.packing.") {
            "wms.packing"
        } else if name.starts_with("wms.shipping.") {
            "wms.shipping"
        } else {
            "wms.labor"
        }
    }
}

impl EventMeta for DomainEvent {
    fn event_type(&self) -> &'static str {
        use DomainEvent::*;
        match self {
            OrderReceived { .. } => "wms.order.received",
            OrderValidated { .. } => "wms.order.validated",
            OrderWaveAssigned { .. } => "wms.order.wave-assigned",
            OrderShipped { .. } => "wms.order.shipped",
            OrderCancelled { .. } => "wms.order.cancelled",
            OrderCompleted { .. } => "wms.order.completed",
            OrderRetryScheduled { .. } => "wms.order.retry-scheduled",
            OrderMovedToDlq { .. } => "wms.order.moved-to-dlq",
            OrderPartiallyFulfilled { .. } => "wms.order.partially-fulfilled",
            OrderBackorderCreated { .. } => "wms.order.backorder-created",
            OrderBackorderFulfilled { .. } => "wms.order.backorder-fulfilled",
            WaveCreated { .. } => "wms.wave.created",
            WaveOrderAdded { .. } => "wms.wave.order-added",
            WaveScheduled { .. } => "wms.wave.scheduled",
            WaveReleased { .. } => "wms.wave.released",
            WaveOptimized { .. } => "wms.wave.optimized",
            WaveCompleted { .. } => "wms.wave.completed",
            WaveCancelled { .. } => "wms.wave.cancelled",
            InventoryReceived { .. } => "wms.inventory.received",
            InventoryReserved { .. } => "wms.inventory.reserved",
            InventoryPicked { .. } => "wms.inventory.picked",
            InventoryAdjusted { .. } => "wms.inventory.adjusted",
            LowStockAlert { .. } => "wms.inventory.low-stock-alert",
            InventoryStaged { .. } => "wms.inventory.staged",
            InventoryPacked { .. } => "wms.inventory.packed",
            InventoryShipped { .. } => "wms.inventory.shipped",
            InventoryReturnedToShelf { .. } => "wms.inventory.returned-to-shelf",
            StockShortage { .. } => "wms.inventory.stock-shortage",
            InventoryDiscrepancy { .. } => "wms.inventory.discrepancy",
            InventoryBackorderCreated { .. } => "wms.inventory.backorder-created",
            VelocityClassChanged { .. } => "wms.inventory.velocity-class-changed",
            LedgerEntryCreated { .. } => "wms.inventory.ledger-entry-created",
            InventoryValued { .. } => "wms.inventory.valued",
            ReconciliationCompleted { .. } => "wms.inventory.reconciliation-completed",
            RouteCalculated { .. } => "wms.routing.route-calculated",
            RouteStarted { .. } => "wms.routing.route-started",
            StopCompleted { .. } => "wms.routing.stop-completed",
            RouteCompleted { .. } => "wms.routing.route-completed",
            PickingStarted { .. } => "wms.picking.started",
            PickingCompleted { .. } => "wms.picking.completed",
            ConsolidationStarted { .. } => "wms.consolidation.started",
            ConsolidationCompleted { .. } => "wms.consolidation.completed",
            PackingStarted { .. } => "wms.packing.started",
            PackingCompleted { .. } => "wms.packing.completed",
            ShippingLabelCreated { .. } => "wms.shipping.label-created",
            ShippingManifested { .. } => "wms.shipping.manifested",
            ShippingDispatched { .. } => "wms.shipping.dispatched",
            LaborAllocated { .. } => "wms.labor.allocated",
            LaborReleased { .. } => "wms.labor.released",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        use DomainEvent::*;
        match self {
            OrderReceived { occurred_at, .. }
            | OrderValidated { occurred_at, .. }
            | OrderWaveAssigned { occurred_at, .. }
            | OrderShipped { occurred_at, .. }
            | OrderCancelled { occurred_at, .. }
            | OrderCompleted { occurred_at, .. }
            | OrderRetryScheduled { occurred_at, .. }
            | OrderMovedToDlq { occurred_at, .. }
            | OrderPartiallyFulfilled { occurred_at, .. }
            | OrderBackorderCreated { occurred_at, .. }
            | OrderBackorderFulfilled { occurred_at, .. }
            | WaveCreated { occurred_at, .. }
            | WaveOrderAdded { occurred_at, .. }
            | WaveScheduled { occurred_at, .. }
            | WaveReleased { occurred_at, .. }
            | WaveOptimized { occurred_at, .. }
            | WaveCompleted { occurred_at, .. }
            | WaveCancelled { occurred_at, .. }
            | InventoryReceived { occurred_at, .. }
            | InventoryReserved { occurred_at, .. }
            | InventoryPicked { occurred_at, .. }
            | InventoryAdjusted { occurred_at, .. }
            | LowStockAlert { occurred_at, .. }
            | InventoryStaged { occurred_at, .. }
            | InventoryPacked { occurred_at, .. }
            | InventoryShipped { occurred_at, .. }
            | InventoryReturnedToShelf { occurred_at, .. }
            | StockShortage { occurred_at, .. }
            | InventoryDiscrepancy { occurred_at, .. }
            | InventoryBackorderCreated { occurred_at, .. }
            | VelocityClassChanged { occurred_at, .. }
            | LedgerEntryCreated { occurred_at, .. }
            | InventoryValued { occurred_at, .. }
            | ReconciliationCompleted { occurred_at, .. }
            | RouteCalculated { occurred_at, .. }
            | RouteStarted { occurred_at, .. }
            | StopCompleted { occurred_at, .. }
            | RouteCompleted { occurred_at, .. }
            | PickingStarted { occurred_at, .. }
            | PickingCompleted { occurred_at, .. }
            | ConsolidationStarted { occurred_at, .. }
            | ConsolidationCompleted { occurred_at, .. }
            | PackingStarted { occurred_at, .. }
            | PackingCompleted { occurred_at, .. }
            | ShippingLabelCreated { occurred_at, .. }
            | ShippingManifested { occurred_at, .. }
            | ShippingDispatched { occurred_at, .. }
            | LaborAllocated { occurred_at, .. }
            | LaborReleased { occurred_at, .. } => *occurred_at,
        }
    }

    fn aggregate_id(&self) -> &str {
        use DomainEvent::*;
        match self {
            OrderReceived { order_id, .. }
            | OrderValidated { order_id, .. }
            | OrderWaveAssigned { order_id, .. }
            | OrderShipped { order_id, .. }
            | OrderCancelled { order_id, .. }
            | OrderCompleted { order_id, .. }
            | OrderRetryScheduled { order_id, .. }
            | OrderMovedToDlq { order_id, .. }
            | OrderPartiallyFulfilled { order_id, .. }
            | OrderBackorderCreated { order_id, .. }
            | OrderBackorderFulfilled { order_id, .. }
            | PickingStarted { order_id, .. }
            | PickingCompleted { order_id, .. }
            | ConsolidationStarted { order_id, .. }
            | ConsolidationCompleted { order_id, .. }
            | PackingStarted { order_id, .. }
            | PackingCompleted { order_id, .. }
            | ShippingLabelCreated { order_id, .. }
            | ShippingManifested { order_id, .. }
            | ShippingDispatched { order_id, .. } => order_id,
            WaveCreated { wave_id, .. }
            | WaveOrderAdded { wave_id, .. }
            | WaveScheduled { wave_id, .. }
            | WaveReleased { wave_id, .. }
            | WaveOptimized { wave_id, .. }
            | WaveCompleted { wave_id, .. }
            | WaveCancelled { wave_id, .. }
            | LaborAllocated { wave_id, .. }
            | LaborReleased { wave_id, .. } => wave_id,
            InventoryReceived { sku, .. }
            | InventoryReserved { sku, .. }
            | InventoryPicked { sku, .. }
            | InventoryAdjusted { sku, .. }
            | LowStockAlert { sku, .. }
            | InventoryReturnedToShelf { sku, .. }
            | StockShortage { sku, .. }
            | InventoryDiscrepancy { sku, .. }
            | InventoryBackorderCreated { sku, .. }
            | VelocityClassChanged { sku, .. }
            | LedgerEntryCreated { sku, .. }
            | InventoryValued { sku, .. }
            | ReconciliationCompleted { sku, .. } => sku,
            InventoryStaged { allocation_id, .. }
            | InventoryPacked { allocation_id, .. }
            | InventoryShipped { allocation_id, .. } => allocation_id,
            RouteCalculated { route_id, .. }
            | RouteStarted { route_id, .. }
            | StopCompleted { route_id, .. }
            | RouteCompleted { route_id, .. } => route_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::{Currency, Money};

    fn sample_event() -> DomainEvent {
        DomainEvent::OrderReceived {
            order_id: "ORD-001".to_string(),
            customer_id: "CUST-1".to_string(),
            item_count: 1,
            total_value: Money::new(25_00, Currency::usd()).unwrap(),
            priority: "same_day".to_string(),
            occurred_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn event_type_matches_serde_tag() {
        let event = sample_event();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
    }

    #[test]
    fn topic_follows_bounded_context() {
        assert_eq!(sample_event().topic(), "wms.orders");

        let picked = DomainEvent::InventoryPicked {
            sku: "SKU-1".to_string(),
            location: "A-01".to_string(),
            quantity: 3,
            order_id: "ORD-001".to_string(),
            occurred_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };
        assert_eq!(picked.topic(), "wms.inventory");
        assert_eq!(picked.aggregate_id(), "SKU-1");
    }

    #[test]
    fn round_trips_through_json() {
        let event = sample_event();
        let json = serde_json::to_string(&event).unwrap();
        let back: DomainEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
