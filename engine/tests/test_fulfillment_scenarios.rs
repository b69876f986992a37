//! End-to-end fulfillment saga scenarios.
//!
//! The workflow tests substitute mock activities at the named registration
//! seam; the final test runs the full stack (default activities, store,
//! planner, outbox, bus) and checks the outbound event sequence.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fulfillment_engine_rs::bus::InMemoryEventBus;
use fulfillment_engine_rs::core::clock::{Clock, SharedClock, SimulatedClock};
use fulfillment_engine_rs::fulfillment::activities::*;
use fulfillment_engine_rs::fulfillment::{
    planning_workflow_id, register_default_activities, register_workflows, ActivityEnvironment,
    CancellationInput, CancellationResult, FulfillmentItem, OrderFulfillmentInput,
    OrderFulfillmentResult, WesInput, WesResult, ORDER_CANCELLATION_WORKFLOW,
    ORDER_FULFILLMENT_WORKFLOW, WES_EXECUTION_WORKFLOW,
};
use fulfillment_engine_rs::models::inventory::InventoryItem;
use fulfillment_engine_rs::models::order::{
    Address, Dimensions, Order, OrderItem, OrderStatus, Priority,
};
use fulfillment_engine_rs::models::process_path::{PathKind, StationType};
use fulfillment_engine_rs::money::{Currency, Money};
use fulfillment_engine_rs::orchestrator::{RuntimeWaveNotifier, StoreOrderQueries};
use fulfillment_engine_rs::outbox::{
    OutboxPublisher, OutboxRepository, PublisherConfig, TransactionalStore,
};
use fulfillment_engine_rs::waving::{WaveAssignedSignal, WavePlanner, WavePlanningConfig};
use fulfillment_engine_rs::workflow::{ActivityError, InMemoryJournalStore, WorkflowRuntime};

// ============================================================================
// Test Helpers
// ============================================================================

fn ts() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn runtime() -> Arc<WorkflowRuntime> {
    let runtime = Arc::new(WorkflowRuntime::new(
        Arc::new(InMemoryJournalStore::new()),
        Arc::new(SimulatedClock::default()),
    ));
    register_workflows(&runtime);
    runtime
}

fn single_item_input(order_id: &str, priority: Priority) -> OrderFulfillmentInput {
    OrderFulfillmentInput {
        order_id: order_id.to_string(),
        priority,
        items: vec![FulfillmentItem {
            sku: "SKU-1".to_string(),
            quantity: 1,
            weight_grams: 2_500,
            zone: "A".to_string(),
        }],
        consolidation_required: false,
        unit_tracking_enabled: true,
    }
}

/// Mocks for a fully successful pipeline. Returns the compensation counter.
fn register_happy_mocks(runtime: &WorkflowRuntime) -> Arc<AtomicU32> {
    runtime.register_activity("ValidateOrder", |_: ValidateOrderInput| async move {
        Ok(ValidateOrderResult {
            valid: true,
            reason: None,
        })
    });
    runtime.register_activity(
        "DetermineProcessPath",
        |input: DetermineProcessPathInput| async move {
            Ok(DetermineProcessPathResult {
                path_id: format!("PATH-{}", input.order_id),
                kind: PathKind::PickPack,
                required_capabilities: vec![],
            })
        },
    );
    runtime.register_activity(
        "PersistProcessPath",
        |_: PersistProcessPathInput| async move { Ok(PersistProcessPathResult { persisted: true }) },
    );
    runtime.register_activity("ReserveUnits", |_: ReserveUnitsInput| async move {
        Ok(ReserveUnitsResult {
            reservation_ids: vec!["RES-1".to_string()],
        })
    });
    runtime.register_activity("AssignToWave", |_: AssignToWaveInput| async move {
        Ok(AssignToWaveResult { queued: true })
    });

    let release_calls = Arc::new(AtomicU32::new(0));
    let release_in = release_calls.clone();
    runtime.register_activity(
        "ReleaseInventoryReservation",
        move |_: ReleaseReservationInput| {
            let calls = release_in.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(ReleaseReservationResult { released_count: 1 })
            }
        },
    );

    runtime.register_activity("ExecuteSLAM", |_: ExecuteSlamInput| async move {
        Ok(ExecuteSlamResult {
            tracking_number: "TRACK-123456".to_string(),
            label_id: "LBL-1".to_string(),
            manifest_id: "MAN-1".to_string(),
        })
    });
    runtime.register_activity(
        "FindCapableStation",
        |input: FindCapableStationInput| async move {
            let prefix = match input.station_type {
                StationType::Pick => "PICK",
                StationType::Wall => "WALL",
                StationType::Pack => "PACK",
                StationType::Sort => "SORT",
                StationType::Ship => "SHIP",
            };
            Ok(FindCapableStationResult {
                station_id: format!("{prefix}-01"),
            })
        },
    );
    runtime.register_activity("StartPicking", |_: StartPickingInput| async move {
        Ok(StartPickingResult {
            picked_items: vec![],
            complete: true,
        })
    });
    runtime.register_activity("MarkConsolidated", |_: MarkConsolidatedInput| async move {
        Ok(MarkConsolidatedResult { consolidated: true })
    });
    runtime.register_activity("MarkPacked", |_: MarkPackedInput| async move {
        Ok(MarkPackedResult {
            package_id: "PKG-1".to_string(),
        })
    });
    runtime.register_activity("CalculateRoute", |input: CalculateRouteInput| async move {
        Ok(CalculateRouteResult {
            route_id: format!("ROUTE-{}", input.order_id),
            stop_count: 3,
        })
    });
    runtime.register_activity(
        "CalculateMultiRoute",
        |input: CalculateMultiRouteInput| async move {
            Ok(CalculateMultiRouteResult {
                route_ids: vec![format!("ROUTE-{}-0", input.order_id)],
                stop_count: 3,
            })
        },
    );
    runtime.register_activity("DispatchShipment", |_: DispatchShipmentInput| async move {
        Ok(DispatchShipmentResult {
            carrier: "UPS".to_string(),
            dispatched: true,
        })
    });
    runtime.register_activity("CancelOrder", |_: CancelOrderInput| async move {
        Ok(CancelOrderResult { cancelled: true })
    });
    runtime.register_activity(
        "NotifyCustomerCancellation",
        |_: NotifyCustomerCancellationInput| async move {
            Ok(NotifyCustomerCancellationResult { notified: true })
        },
    );

    release_calls
}

fn send_wave_signal(runtime: &WorkflowRuntime, order_id: &str, wave_id: &str) {
    runtime.signal(
        &planning_workflow_id(order_id),
        "waveAssigned",
        &WaveAssignedSignal {
            wave_id: wave_id.to_string(),
            scheduled_start: ts(),
        },
    );
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_single_item_order_completes() {
    let runtime = runtime();
    let _release = register_happy_mocks(&runtime);

    let input = single_item_input("ORD-001", Priority::SameDay);
    let handle = runtime
        .spawn(ORDER_FULFILLMENT_WORKFLOW, "ORD-001", &input)
        .unwrap();
    send_wave_signal(&runtime, "ORD-001", "WAVE-001");

    let result: OrderFulfillmentResult = handle.result().await.unwrap();
    assert_eq!(result.order_id, "ORD-001");
    assert_eq!(result.status, "completed");
    assert_eq!(result.wave_id, "WAVE-001");
    assert_eq!(result.tracking_number, "TRACK-123456");
}

// ============================================================================
// Validation failure, no compensation
// ============================================================================

#[tokio::test]
async fn test_validation_failure_exits_without_compensation() {
    let runtime = runtime();
    let release = register_happy_mocks(&runtime);
    runtime.register_activity("ValidateOrder", |_: ValidateOrderInput| async move {
        Ok(ValidateOrderResult {
            valid: false,
            reason: Some("insufficient inventory".to_string()),
        })
    });

    let input = single_item_input("ORD-001", Priority::SameDay);
    let err = runtime
        .run::<OrderFulfillmentInput, OrderFulfillmentResult>(
            ORDER_FULFILLMENT_WORKFLOW,
            "ORD-001",
            &input,
        )
        .await
        .unwrap_err();

    assert!(err.message().contains("insufficient inventory"));
    assert_eq!(
        release.load(Ordering::SeqCst),
        0,
        "no reservation exists yet, so no compensation may run"
    );
}

// ============================================================================
// Wave assignment timeout
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_same_day_order_times_out_after_30_minutes() {
    let runtime = runtime();
    let _release = register_happy_mocks(&runtime);

    let input = single_item_input("ORD-001", Priority::SameDay);
    let handle = runtime
        .spawn(ORDER_FULFILLMENT_WORKFLOW, "ORD-001", &input)
        .unwrap();
    // No waveAssigned signal is ever delivered.

    let err = handle.result::<OrderFulfillmentResult>().await.unwrap_err();
    assert_eq!(err.message(), "wave assignment timeout for order ORD-001");
}

// ============================================================================
// Execution failure triggers exactly one compensation
// ============================================================================

#[tokio::test]
async fn test_picking_failure_releases_reservation_once() {
    let runtime = runtime();
    let release = register_happy_mocks(&runtime);
    runtime.register_activity("StartPicking", |_: StartPickingInput| async move {
        Err::<StartPickingResult, ActivityError>(ActivityError::non_retryable(
            "worker_unavailable",
            "worker unavailable",
        ))
    });

    let input = single_item_input("ORD-001", Priority::SameDay);
    let handle = runtime
        .spawn(ORDER_FULFILLMENT_WORKFLOW, "ORD-001", &input)
        .unwrap();
    send_wave_signal(&runtime, "ORD-001", "WAVE-001");

    let err = handle.result::<OrderFulfillmentResult>().await.unwrap_err();
    assert_eq!(err.message(), "worker unavailable");
    assert_eq!(release.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Consolidation path has three stages
// ============================================================================

#[tokio::test]
async fn test_consolidated_order_runs_pick_wall_pack() {
    let runtime = runtime();
    let _release = register_happy_mocks(&runtime);

    let result: WesResult = runtime
        .run(
            WES_EXECUTION_WORKFLOW,
            "wes-ORD-005",
            &WesInput {
                order_id: "ORD-005".to_string(),
                consolidation_required: true,
                required_capabilities: vec![],
            },
        )
        .await
        .unwrap();

    assert_eq!(result.path, "pick_wall_pack");
    assert_eq!(result.status, "completed");
    let stages: Vec<&str> = result.stages.iter().map(|s| s.stage.as_str()).collect();
    assert_eq!(stages, vec!["picking", "walling", "packing"]);
}

// ============================================================================
// Cancellation continues past a failed compensation step
// ============================================================================

#[tokio::test]
async fn test_cancellation_is_best_effort_after_step_one() {
    let runtime = runtime();
    let _release = register_happy_mocks(&runtime);
    runtime.register_activity(
        "ReleaseInventoryReservation",
        |_: ReleaseReservationInput| async move {
            Err::<ReleaseReservationResult, ActivityError>(ActivityError::non_retryable(
                "release_failed",
                "reservation store offline",
            ))
        },
    );
    let notified = Arc::new(AtomicU32::new(0));
    let notified_in = notified.clone();
    runtime.register_activity(
        "NotifyCustomerCancellation",
        move |_: NotifyCustomerCancellationInput| {
            let calls = notified_in.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(NotifyCustomerCancellationResult { notified: true })
            }
        },
    );

    let result: CancellationResult = runtime
        .run(
            ORDER_CANCELLATION_WORKFLOW,
            "cancel-ORD-CANCEL-001",
            &CancellationInput {
                order_id: "ORD-CANCEL-001".to_string(),
                reason: "Customer requested".to_string(),
            },
        )
        .await
        .unwrap();

    assert!(result.cancelled);
    assert!(!result.reservation_released);
    assert!(result.customer_notified);
    assert_eq!(notified.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Full stack: default activities, planner, outbox, bus
// ============================================================================

#[tokio::test]
async fn test_full_pipeline_emits_ordered_event_sequence() {
    let clock = Arc::new(SimulatedClock::default());
    let shared: SharedClock = clock.clone();
    let store = Arc::new(TransactionalStore::new(shared.clone()));
    let bus = Arc::new(InMemoryEventBus::new());
    let runtime = Arc::new(WorkflowRuntime::new(
        Arc::new(InMemoryJournalStore::new()),
        shared.clone(),
    ));
    register_workflows(&runtime);
    register_default_activities(
        &runtime,
        Arc::new(ActivityEnvironment::new(store.clone(), shared.clone())),
    );

    let orders: OutboxRepository<Order> = OutboxRepository::new(store.clone(), "/wms/orders");
    let inventory: OutboxRepository<InventoryItem> =
        OutboxRepository::new(store.clone(), "/wms/inventory");

    // Seed stock and the order.
    let now = clock.now();
    let mut stock = InventoryItem::new("SKU-1", 0, 100, now);
    stock.receive_stock("A-01", "A", 50, now).unwrap();
    inventory.save(&mut stock).unwrap();

    let mut order = Order::receive(
        "ORD-001",
        "CUST-1",
        vec![OrderItem {
            sku: "SKU-1".to_string(),
            quantity: 1,
            unit_weight_grams: 2_500,
            dimensions: Dimensions {
                length_cm: 20,
                width_cm: 15,
                height_cm: 10,
            },
            unit_price: Money::new(25_00, Currency::usd()).unwrap(),
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
        Priority::SameDay,
        now + Duration::days(1),
        false,
        now,
    )
    .unwrap();
    orders.save(&mut order).unwrap();

    // Start the saga, then release a wave once the order validates.
    let input = single_item_input("ORD-001", Priority::SameDay);
    let handle = runtime
        .spawn(ORDER_FULFILLMENT_WORKFLOW, "ORD-001", &input)
        .unwrap();

    for _ in 0..500 {
        let status = orders.get("ORD-001").unwrap().unwrap().status();
        if status == OrderStatus::Validated {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert_eq!(
        orders.get("ORD-001").unwrap().unwrap().status(),
        OrderStatus::Validated
    );

    let queries = Arc::new(StoreOrderQueries::new(OutboxRepository::new(
        store.clone(),
        "/wms/orders",
    )));
    let notifier = Arc::new(RuntimeWaveNotifier::new(
        runtime.clone(),
        OutboxRepository::new(store.clone(), "/wms/orders"),
        shared.clone(),
    ));
    let planner = WavePlanner::new(
        queries,
        OutboxRepository::new(store.clone(), "/wms/waves"),
        notifier,
        shared.clone(),
    );
    let wave = planner.plan_wave(&WavePlanningConfig::default()).unwrap();
    planner.schedule_wave(wave.id(), clock.now()).unwrap();
    planner.release_wave(wave.id()).unwrap();

    let result: OrderFulfillmentResult = handle.result().await.unwrap();
    assert_eq!(result.status, "completed");
    assert_eq!(result.wave_id, "WAVE-001");
    assert!(result.tracking_number.starts_with("TRACK-"));

    // Drain the outbox and verify the per-order event sequence.
    let publisher = OutboxPublisher::new(
        store.clone(),
        bus.clone(),
        shared,
        PublisherConfig::default(),
    );
    while publisher.drain_once().await.published > 0 {}

    let delivered = bus.published_for_key("wms.orders", "ORD-001");
    let types: Vec<&str> = delivered.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(
        types,
        vec![
            "wms.order.received",
            "wms.order.validated",
            "wms.order.wave-assigned",
            "wms.order.shipped",
            "wms.order.completed",
        ]
    );

    // Stage events flowed on their own topics for the same order.
    assert!(!bus.published_for_key("wms.picking", "ORD-001").is_empty());
    assert!(!bus.published_for_key("wms.packing", "ORD-001").is_empty());
    assert!(!bus.published_for_key("wms.shipping", "ORD-001").is_empty());

    let final_order = orders.get("ORD-001").unwrap().unwrap();
    assert_eq!(final_order.status(), OrderStatus::Shipped);
    assert_eq!(final_order.wave_id(), Some("WAVE-001"));
}
