//! Continuous ("waveless") release loop tests.

use std::sync::Arc;

use chrono::Duration;
use fulfillment_engine_rs::core::clock::{Clock, SharedClock, SimulatedClock};
use fulfillment_engine_rs::fulfillment::planning_workflow_id;
use fulfillment_engine_rs::models::order::{Address, Dimensions, Order, OrderItem, Priority};
use fulfillment_engine_rs::orchestrator::{RuntimeWaveNotifier, StoreOrderQueries};
use fulfillment_engine_rs::outbox::{OutboxRepository, TransactionalStore};
use fulfillment_engine_rs::waving::{ContinuousWavingConfig, ContinuousWavingLoop, WavePlanner};
use fulfillment_engine_rs::workflow::{InMemoryJournalStore, WorkflowRuntime};

// ============================================================================
// Test Helpers
// ============================================================================

struct Fixture {
    clock: Arc<SimulatedClock>,
    runtime: Arc<WorkflowRuntime>,
    orders: OutboxRepository<Order>,
    waving: Arc<ContinuousWavingLoop>,
}

fn fixture(config: ContinuousWavingConfig) -> Fixture {
    let clock = Arc::new(SimulatedClock::default());
    let shared: SharedClock = clock.clone();
    let store = Arc::new(TransactionalStore::new(shared.clone()));
    let runtime = Arc::new(WorkflowRuntime::new(
        Arc::new(InMemoryJournalStore::new()),
        shared.clone(),
    ));
    let orders: OutboxRepository<Order> = OutboxRepository::new(store.clone(), "/wms/orders");
    let queries = Arc::new(StoreOrderQueries::new(OutboxRepository::new(
        store.clone(),
        "/wms/orders",
    )));
    let notifier = Arc::new(RuntimeWaveNotifier::new(
        runtime.clone(),
        OutboxRepository::new(store.clone(), "/wms/orders"),
        shared.clone(),
    ));
    let planner = Arc::new(WavePlanner::new(
        queries,
        OutboxRepository::new(store.clone(), "/wms/waves"),
        notifier,
        shared,
    ));
    let waving = Arc::new(ContinuousWavingLoop::new(planner, config));
    Fixture {
        clock,
        runtime,
        orders,
        waving,
    }
}

fn config() -> ContinuousWavingConfig {
    ContinuousWavingConfig {
        release_interval: std::time::Duration::from_millis(50),
        immediate_priority_threshold: 1,
        min_orders_for_release: 3,
        max_wait_time: std::time::Duration::from_secs(300),
        max_orders_per_micro_wave: 25,
    }
}

fn seed_order(fixture: &Fixture, id: &str, priority: Priority) {
    let now = fixture.clock.now();
    let mut order = Order::receive(
        id,
        "CUST-1",
        vec![OrderItem {
            sku: format!("SKU-{id}"),
            quantity: 2,
            unit_weight_grams: 500,
            dimensions: Dimensions {
                length_cm: 10,
                width_cm: 10,
                height_cm: 10,
            },
            unit_price: fulfillment_engine_rs::money::Money::new(
                15_00,
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
        priority,
        now + Duration::days(1),
        false,
        now,
    )
    .unwrap();
    order.validate(now).unwrap();
    fixture.orders.save(&mut order).unwrap();
}

// ============================================================================
// Immediate vs Batch Release
// ============================================================================

#[tokio::test]
async fn test_urgent_orders_release_immediately() {
    let fixture = fixture(config());
    seed_order(&fixture, "ORD-URGENT", Priority::SameDay);
    seed_order(&fixture, "ORD-SLOW", Priority::Standard);

    let outcome = fixture.waving.tick_once();

    assert_eq!(outcome.immediate_released, 1);
    assert_eq!(outcome.batch_released, 0);

    let urgent = fixture.orders.get("ORD-URGENT").unwrap().unwrap();
    assert!(urgent.wave_id().is_some());
    assert_eq!(
        fixture
            .runtime
            .signals()
            .pending(&planning_workflow_id("ORD-URGENT"), "waveAssigned"),
        1
    );

    let slow = fixture.orders.get("ORD-SLOW").unwrap().unwrap();
    assert!(slow.wave_id().is_none(), "standard order keeps waiting");
}

#[tokio::test]
async fn test_batch_releases_at_min_count() {
    let fixture = fixture(config());
    seed_order(&fixture, "ORD-1", Priority::Standard);
    seed_order(&fixture, "ORD-2", Priority::Standard);

    let outcome = fixture.waving.tick_once();
    assert_eq!(outcome.batch_released, 0, "two orders stay below the minimum");

    seed_order(&fixture, "ORD-3", Priority::Standard);
    let outcome = fixture.waving.tick_once();
    assert_eq!(outcome.batch_released, 3);

    for id in ["ORD-1", "ORD-2", "ORD-3"] {
        assert!(fixture.orders.get(id).unwrap().unwrap().wave_id().is_some());
    }
}

#[tokio::test]
async fn test_batch_releases_after_max_wait() {
    let fixture = fixture(config());
    seed_order(&fixture, "ORD-LONE", Priority::Standard);

    let outcome = fixture.waving.tick_once();
    assert_eq!(outcome.batch_released, 0);

    fixture.clock.advance(Duration::seconds(301));
    let outcome = fixture.waving.tick_once();
    assert_eq!(outcome.batch_released, 1);
    assert!(fixture
        .orders
        .get("ORD-LONE")
        .unwrap()
        .unwrap()
        .wave_id()
        .is_some());
}

#[tokio::test]
async fn test_released_orders_do_not_release_twice() {
    let fixture = fixture(config());
    seed_order(&fixture, "ORD-URGENT", Priority::SameDay);

    let first = fixture.waving.tick_once();
    assert_eq!(first.immediate_released, 1);

    let second = fixture.waving.tick_once();
    assert_eq!(second.immediate_released, 0);
    assert_eq!(second.batch_released, 0);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let fixture = fixture(config());

    fixture.waving.start().await;
    fixture.waving.start().await; // second start is a no-op

    fixture.waving.stop().await;
    fixture.waving.stop().await; // second stop is a no-op
}

#[tokio::test]
async fn test_running_loop_releases_urgent_order() {
    let fixture = fixture(ContinuousWavingConfig {
        release_interval: std::time::Duration::from_millis(10),
        ..config()
    });
    seed_order(&fixture, "ORD-URGENT", Priority::SameDay);

    fixture.waving.start().await;
    for _ in 0..200 {
        if fixture
            .orders
            .get("ORD-URGENT")
            .unwrap()
            .unwrap()
            .wave_id()
            .is_some()
        {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    fixture.waving.stop().await;

    assert!(fixture
        .orders
        .get("ORD-URGENT")
        .unwrap()
        .unwrap()
        .wave_id()
        .is_some());
}
