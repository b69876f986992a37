//! Inventory item conservation tests.

use chrono::{DateTime, Utc};
use fulfillment_engine_rs::models::inventory::{InventoryError, InventoryItem, VelocityClass};
use fulfillment_engine_rs::models::{Aggregate, BackorderTrigger, DomainEvent};

// ============================================================================
// Test Helpers
// ============================================================================

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn stocked(sku: &str, qty: u64) -> InventoryItem {
    let mut item = InventoryItem::new(sku, 10, 200, now());
    item.receive_stock("A-01", "A", qty, now()).unwrap();
    item.take_events();
    item
}

// ============================================================================
// Conservation Invariant
// ============================================================================

#[test]
fn test_quantity_equals_reserved_plus_allocated_plus_available() {
    let mut item = stocked("SKU-1", 120);
    item.reserve("A-01", 50, "RES-1", "ORD-1", now()).unwrap();
    item.stage("A-01", 20, "ALLOC-1", "ORD-1", now()).unwrap();

    for stock in item.locations() {
        assert_eq!(
            stock.quantity,
            stock.reserved + stock.hard_allocated + stock.available()
        );
    }
    assert!(item.check_invariants());
}

#[test]
fn test_invariant_holds_across_mixed_operations() {
    let mut item = stocked("SKU-2", 200);
    item.receive_stock("B-01", "B", 50, now()).unwrap();
    item.reserve("A-01", 80, "RES-1", "ORD-1", now()).unwrap();
    item.stage("A-01", 30, "ALLOC-1", "ORD-1", now()).unwrap();
    item.commit_pick("A-01", 30, "ORD-1", now()).unwrap();
    item.release_reservation("A-01", 20, now()).unwrap();
    item.adjust("B-01", -5, "damaged", now()).unwrap();
    item.return_to_shelf("B-01", 2, "customer return", now()).unwrap();

    assert!(item.check_invariants());
    assert_eq!(item.total_quantity(), 200 + 50 - 30 - 5 + 2);
}

// ============================================================================
// Reserve / Release Law
// ============================================================================

#[test]
fn test_receive_reserve_release_restores_available() {
    let mut item = stocked("SKU-3", 40);
    let available_before = item.total_available();

    item.reserve("A-01", 15, "RES-1", "ORD-1", now()).unwrap();
    assert_eq!(item.total_available(), available_before - 15);

    item.release_reservation("A-01", 15, now()).unwrap();
    assert_eq!(item.total_available(), available_before);
    assert_eq!(item.total_quantity(), 40, "release touches reservations only");
}

#[test]
fn test_reserve_beyond_available_fails() {
    let mut item = stocked("SKU-4", 10);
    item.reserve("A-01", 8, "RES-1", "ORD-1", now()).unwrap();
    let err = item.reserve("A-01", 3, "RES-2", "ORD-2", now()).unwrap_err();
    assert!(matches!(err, InventoryError::InsufficientAvailable { .. }));
}

#[test]
fn test_pick_reduces_quantity_only_at_commit() {
    let mut item = stocked("SKU-5", 30);
    item.reserve("A-01", 10, "RES-1", "ORD-1", now()).unwrap();
    assert_eq!(item.total_quantity(), 30);

    item.commit_pick("A-01", 10, "ORD-1", now()).unwrap();
    assert_eq!(item.total_quantity(), 20);
    assert_eq!(item.total_reserved(), 0);
}

// ============================================================================
// Alerts and Backorders
// ============================================================================

#[test]
fn test_low_stock_alert_on_reorder_point_crossing() {
    let mut item = stocked("SKU-6", 20); // reorder point 10
    item.reserve("A-01", 12, "RES-1", "ORD-1", now()).unwrap();

    let events = item.take_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, DomainEvent::LowStockAlert { available: 8, .. })));
}

#[test]
fn test_stock_shortage_creates_backorder() {
    let mut item = stocked("SKU-7", 2);
    item.record_stock_shortage("ORD-9", 10, now());

    let events = item.take_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, DomainEvent::StockShortage { requested: 10, .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        DomainEvent::InventoryBackorderCreated {
            quantity: 8,
            trigger: BackorderTrigger::StockShortage,
            ..
        }
    )));
}

#[test]
fn test_velocity_class_change_emits_once() {
    let mut item = stocked("SKU-8", 5);
    item.set_velocity_class(VelocityClass::A, now());
    item.set_velocity_class(VelocityClass::A, now());

    let changes = item
        .take_events()
        .iter()
        .filter(|e| matches!(e, DomainEvent::VelocityClassChanged { .. }))
        .count();
    assert_eq!(changes, 1);
}

#[test]
fn test_reconciliation_fixes_on_hand() {
    let mut item = stocked("SKU-9", 50);
    item.reconcile("A-01", 47, now()).unwrap();
    assert_eq!(item.total_quantity(), 47);

    let events = item.take_events();
    assert!(events.iter().any(|e| matches!(
        e,
        DomainEvent::ReconciliationCompleted { adjusted_by: -3, .. }
    )));
}
