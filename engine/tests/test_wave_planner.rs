//! Wave planner tests.

use std::sync::{Arc, Mutex};

use chrono::Duration;
use fulfillment_engine_rs::core::clock::{Clock, SharedClock, SimulatedClock};
use fulfillment_engine_rs::fulfillment::planning_workflow_id;
use fulfillment_engine_rs::models::order::{Address, Dimensions, Order, OrderItem, Priority};
use fulfillment_engine_rs::models::wave::WaveType;
use fulfillment_engine_rs::orchestrator::{RuntimeWaveNotifier, StoreOrderQueries};
use fulfillment_engine_rs::outbox::{OutboxRepository, TransactionalStore};
use fulfillment_engine_rs::waving::{
    WaveAssignedSignal, WaveAssignmentNotifier, WavePlanError, WavePlanner, WavePlanningConfig,
};
use fulfillment_engine_rs::workflow::{InMemoryJournalStore, WorkflowRuntime};

// ============================================================================
// Test Helpers
// ============================================================================

#[derive(Default)]
struct RecordingNotifier {
    notified: Mutex<Vec<(String, String)>>,
}

impl WaveAssignmentNotifier for RecordingNotifier {
    fn notify_wave_assigned(&self, order_id: &str, signal: WaveAssignedSignal) {
        self.notified
            .lock()
            .unwrap()
            .push((order_id.to_string(), signal.wave_id));
    }
}

struct Fixture {
    clock: Arc<SimulatedClock>,
    orders: OutboxRepository<Order>,
    planner: WavePlanner,
    notifier: Arc<RecordingNotifier>,
}

fn fixture() -> Fixture {
    let clock = Arc::new(SimulatedClock::default());
    let shared: SharedClock = clock.clone();
    let store = Arc::new(TransactionalStore::new(shared.clone()));
    let orders: OutboxRepository<Order> = OutboxRepository::new(store.clone(), "/wms/orders");
    let queries = Arc::new(StoreOrderQueries::new(OutboxRepository::new(
        store.clone(),
        "/wms/orders",
    )));
    let notifier = Arc::new(RecordingNotifier::default());
    let planner = WavePlanner::new(
        queries,
        OutboxRepository::new(store.clone(), "/wms/waves"),
        notifier.clone(),
        shared,
    );
    Fixture {
        clock,
        orders,
        planner,
        notifier,
    }
}

#[allow(clippy::too_many_arguments)]
fn seed_order(
    fixture: &Fixture,
    id: &str,
    priority: Priority,
    quantity: u32,
    weight_grams: u32,
    zone: &str,
    hazmat: bool,
) {
    let now = fixture.clock.now();
    let mut order = Order::receive(
        id,
        "CUST-1",
        vec![OrderItem {
            sku: format!("SKU-{id}"),
            quantity,
            unit_weight_grams: weight_grams,
            dimensions: Dimensions {
                length_cm: 10,
                width_cm: 10,
                height_cm: 10,
            },
            unit_price: fulfillment_engine_rs::money::Money::new(
                10_00,
                fulfillment_engine_rs::money::Currency::usd(),
            )
            .unwrap(),
            zone: zone.to_string(),
            fragile: false,
            hazmat,
            cold_chain: false,
        }],
        Address {
            line1: "1 Warehouse Way".to_string(),
            city: "Reno".to_string(),
            region: "NV".to_string(),
            postal_code: "89502".to_string(),
            country: "US".to_string(),
        },
        priority,
        now + Duration::days(2),
        false,
        now,
    )
    .unwrap();
    order.validate(now).unwrap();
    fixture.orders.save(&mut order).unwrap();
}

fn standard_config(max_orders: u32) -> WavePlanningConfig {
    WavePlanningConfig {
        max_orders,
        ..WavePlanningConfig::default()
    }
}

// ============================================================================
// Priority selection: 3 candidates, max_orders = 2
// ============================================================================

#[test]
fn test_planner_takes_two_highest_priority_orders_in_priority_order() {
    let fixture = fixture();
    seed_order(&fixture, "ORD-STD", Priority::Standard, 2, 500, "A", false);
    seed_order(&fixture, "ORD-SD", Priority::SameDay, 2, 500, "B", false);
    seed_order(&fixture, "ORD-ND", Priority::NextDay, 2, 500, "C", false);

    let wave = fixture.planner.plan_wave(&standard_config(2)).unwrap();

    let members: Vec<&str> = wave.orders().iter().map(|o| o.order_id.as_str()).collect();
    assert_eq!(members, vec!["ORD-SD", "ORD-ND"]);
    assert_eq!(wave.priority(), 1);
    assert!(wave.labor().pickers >= 1);
    assert!(wave.labor().packers >= 1);
    assert_eq!(wave.id(), "WAVE-001");
}

// ============================================================================
// Packing and Compatibility
// ============================================================================

#[test]
fn test_oversized_order_is_skipped_not_fatal() {
    let fixture = fixture();
    seed_order(&fixture, "ORD-BIG", Priority::SameDay, 100, 500, "A", false);
    seed_order(&fixture, "ORD-SMALL", Priority::Standard, 5, 500, "B", false);

    let config = WavePlanningConfig {
        max_orders: 10,
        max_items: 10,
        ..WavePlanningConfig::default()
    };
    let wave = fixture.planner.plan_wave(&config).unwrap();

    let members: Vec<&str> = wave.orders().iter().map(|o| o.order_id.as_str()).collect();
    assert_eq!(members, vec!["ORD-SMALL"]);
}

#[test]
fn test_standard_wave_rejects_special_handling() {
    let fixture = fixture();
    seed_order(&fixture, "ORD-HAZ", Priority::SameDay, 1, 500, "A", true);

    let err = fixture.planner.plan_wave(&standard_config(10)).unwrap_err();
    assert!(matches!(err, WavePlanError::NoOrdersAvailable));
}

#[test]
fn test_hazmat_wave_takes_only_hazmat_orders() {
    let fixture = fixture();
    seed_order(&fixture, "ORD-HAZ", Priority::Standard, 1, 500, "A", true);
    seed_order(&fixture, "ORD-PLAIN", Priority::SameDay, 1, 500, "B", false);

    let config = WavePlanningConfig {
        wave_type: WaveType::Hazmat,
        ..standard_config(10)
    };
    let wave = fixture.planner.plan_wave(&config).unwrap();

    let members: Vec<&str> = wave.orders().iter().map(|o| o.order_id.as_str()).collect();
    assert_eq!(members, vec!["ORD-HAZ"]);
}

#[test]
fn test_empty_pool_is_no_orders_available() {
    let fixture = fixture();
    let err = fixture.planner.plan_wave(&standard_config(5)).unwrap_err();
    assert!(matches!(err, WavePlanError::NoOrdersAvailable));
}

#[test]
fn test_waved_orders_leave_the_candidate_pool() {
    let fixture = fixture();
    seed_order(&fixture, "ORD-1", Priority::Standard, 1, 500, "A", false);

    let wave = fixture.planner.plan_wave(&standard_config(5)).unwrap();
    let now = fixture.clock.now();
    fixture.planner.schedule_wave(wave.id(), now).unwrap();
    fixture.planner.release_wave(wave.id()).unwrap();

    // RecordingNotifier does not mutate the order, so mark it waved here the
    // way the runtime notifier would.
    let mut order = fixture.orders.get("ORD-1").unwrap().unwrap();
    order.assign_to_wave(wave.id(), now).unwrap();
    fixture.orders.save(&mut order).unwrap();

    let err = fixture.planner.plan_wave(&standard_config(5)).unwrap_err();
    assert!(matches!(err, WavePlanError::NoOrdersAvailable));
}

// ============================================================================
// Release and Signaling
// ============================================================================

#[test]
fn test_release_notifies_every_member() {
    let fixture = fixture();
    seed_order(&fixture, "ORD-1", Priority::SameDay, 1, 500, "A", false);
    seed_order(&fixture, "ORD-2", Priority::Standard, 1, 500, "B", false);

    let wave = fixture.planner.plan_wave(&standard_config(5)).unwrap();
    fixture
        .planner
        .schedule_wave(wave.id(), fixture.clock.now())
        .unwrap();
    fixture.planner.release_wave(wave.id()).unwrap();

    let notified = fixture.notifier.notified.lock().unwrap().clone();
    assert_eq!(notified.len(), 2);
    assert!(notified.iter().all(|(_, wave_id)| wave_id == wave.id()));
}

#[test]
fn test_runtime_notifier_assigns_order_and_queues_signal() {
    let clock = Arc::new(SimulatedClock::default());
    let shared: SharedClock = clock.clone();
    let store = Arc::new(TransactionalStore::new(shared.clone()));
    let orders: OutboxRepository<Order> = OutboxRepository::new(store.clone(), "/wms/orders");
    let runtime = Arc::new(WorkflowRuntime::new(
        Arc::new(InMemoryJournalStore::new()),
        shared.clone(),
    ));

    let now = clock.now();
    let mut order = Order::receive(
        "ORD-SIG",
        "CUST-1",
        vec![OrderItem {
            sku: "SKU-1".to_string(),
            quantity: 1,
            unit_weight_grams: 500,
            dimensions: Dimensions {
                length_cm: 10,
                width_cm: 10,
                height_cm: 10,
            },
            unit_price: fulfillment_engine_rs::money::Money::new(
                10_00,
                fulfillment_engine_rs::money::Currency::usd(),
            )
            .unwrap(),
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
        now + Duration::days(2),
        false,
        now,
    )
    .unwrap();
    order.validate(now).unwrap();
    orders.save(&mut order).unwrap();

    let notifier = RuntimeWaveNotifier::new(
        runtime.clone(),
        OutboxRepository::new(store.clone(), "/wms/orders"),
        shared,
    );
    notifier.notify_wave_assigned(
        "ORD-SIG",
        WaveAssignedSignal {
            wave_id: "WAVE-001".to_string(),
            scheduled_start: now,
        },
    );

    let order = orders.get("ORD-SIG").unwrap().unwrap();
    assert_eq!(order.wave_id(), Some("WAVE-001"));
    assert_eq!(
        runtime
            .signals()
            .pending(&planning_workflow_id("ORD-SIG"), "waveAssigned"),
        1
    );
}

#[test]
fn test_optimize_only_before_release() {
    let fixture = fixture();
    seed_order(&fixture, "ORD-1", Priority::Standard, 1, 500, "C", false);
    seed_order(&fixture, "ORD-2", Priority::Standard, 1, 500, "A", false);

    let wave = fixture.planner.plan_wave(&standard_config(5)).unwrap();
    let optimized = fixture.planner.optimize_wave(wave.id()).unwrap();
    let zones: Vec<&str> = optimized.orders().iter().map(|o| o.zone.as_str()).collect();
    assert_eq!(zones, vec!["A", "C"]);

    fixture
        .planner
        .schedule_wave(wave.id(), fixture.clock.now())
        .unwrap();
    fixture.planner.release_wave(wave.id()).unwrap();
    assert!(fixture.planner.optimize_wave(wave.id()).is_err());
}
