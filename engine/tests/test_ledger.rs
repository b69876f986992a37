//! Inventory ledger tests: double-entry bookkeeping over cost layers.

use chrono::{DateTime, Utc};
use fulfillment_engine_rs::models::ledger::{Account, InventoryLedger, LedgerError};
use fulfillment_engine_rs::money::{Currency, Money, ValuationMethod};
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn usd(amount: i64) -> Money {
    Money::new(amount, Currency::usd()).unwrap()
}

fn ledger(method: ValuationMethod) -> InventoryLedger {
    InventoryLedger::new("acme", "RNO1", "SKU-1", method, Currency::usd(), now())
}

// ============================================================================
// Two-layer FIFO pick: receive 50 @ $15.00, receive 50 @ $16.00, pick 60
// ============================================================================

#[test]
fn test_fifo_pick_across_two_layers() {
    let mut ledger = ledger(ValuationMethod::Fifo);
    ledger.record_receiving(50, usd(15_00), "PO-1", now()).unwrap();
    ledger.record_receiving(50, usd(16_00), "PO-2", now()).unwrap();

    ledger.record_pick(60, "ORD-001", now()).unwrap();

    // Remaining layers = [{qty: 40, unit_cost: $16.00}]
    assert_eq!(ledger.layers().len(), 1);
    assert_eq!(ledger.layers()[0].quantity, 40);
    assert_eq!(ledger.layers()[0].unit_cost, usd(16_00));
    assert_eq!(ledger.balance(), 40);

    // COGS entry between $900.00 and $930.00, debit COGS / credit INVENTORY
    let txn = ledger.transactions().last().unwrap();
    assert_eq!(txn.debit().account, Account::Cogs);
    assert_eq!(txn.credit().account, Account::Inventory);
    let cogs = txn.debit().amount.amount_minor();
    assert!((900_00..=930_00).contains(&cogs), "COGS was {cogs}");
    assert!(txn.is_balanced());
}

// ============================================================================
// Valuation Laws
// ============================================================================

/// Strict FIFO law: receive n1@c1 then n2@c2, pick n1 -> COGS is exactly
/// n1 * c1. (Valuation-aware: weighted average would give a blended cost.)
#[test]
fn test_fifo_cogs_is_exactly_first_layer() {
    let mut ledger = ledger(ValuationMethod::Fifo);
    ledger.record_receiving(30, usd(12_00), "PO-1", now()).unwrap();
    ledger.record_receiving(70, usd(19_00), "PO-2", now()).unwrap();

    let cogs = ledger.record_pick(30, "ORD-001", now()).unwrap();
    assert_eq!(cogs, usd(30 * 12_00));
}

#[test]
fn test_lifo_consumes_newest_layer_first() {
    let mut ledger = ledger(ValuationMethod::Lifo);
    ledger.record_receiving(30, usd(12_00), "PO-1", now()).unwrap();
    ledger.record_receiving(70, usd(19_00), "PO-2", now()).unwrap();

    let cogs = ledger.record_pick(30, "ORD-001", now()).unwrap();
    assert_eq!(cogs, usd(30 * 19_00));
}

#[test]
fn test_weighted_average_blends_cost() {
    let mut ledger = ledger(ValuationMethod::WeightedAverage);
    ledger.record_receiving(50, usd(10_00), "PO-1", now()).unwrap();
    ledger.record_receiving(50, usd(20_00), "PO-2", now()).unwrap();

    let cogs = ledger.record_pick(10, "ORD-001", now()).unwrap();
    assert_eq!(cogs, usd(10 * 15_00));
    assert!(ledger.layers().is_empty(), "weighted average keeps no layers");
}

#[test]
fn test_pick_beyond_balance_is_insufficient_stock() {
    let mut ledger = ledger(ValuationMethod::Fifo);
    ledger.record_receiving(5, usd(10_00), "PO-1", now()).unwrap();
    assert_eq!(
        ledger.record_pick(6, "ORD-001", now()),
        Err(LedgerError::InsufficientStock {
            balance: 5,
            requested: 6
        })
    );
}

#[test]
fn test_adjustments_are_balanced_pairs() {
    let mut ledger = ledger(ValuationMethod::Fifo);
    ledger.record_receiving(20, usd(10_00), "PO-1", now()).unwrap();

    ledger.record_adjustment(3, "cycle count gain", now()).unwrap();
    ledger.record_adjustment(-5, "damage", now()).unwrap();
    assert_eq!(
        ledger.record_adjustment(0, "noop", now()),
        Err(LedgerError::ZeroAdjustment)
    );

    assert_eq!(ledger.balance(), 18);
    assert!(ledger.transactions().iter().all(|t| t.is_balanced()));
    assert!(ledger.check_invariants());
}

#[test]
fn test_account_balances_track_entries() {
    let mut ledger = ledger(ValuationMethod::Fifo);
    ledger.record_receiving(10, usd(10_00), "PO-1", now()).unwrap();
    ledger.record_pick(4, "ORD-001", now()).unwrap();

    // INVENTORY debited 100.00, credited 40.00
    assert_eq!(ledger.account_balance(Account::Inventory), 60_00);
    assert_eq!(ledger.account_balance(Account::Cogs), 40_00);
    assert_eq!(ledger.account_balance(Account::GoodsInTransit), -100_00);
}

// ============================================================================
// Conservation Property
// ============================================================================

proptest! {
    /// After any sequence of receives and picks, a FIFO ledger keeps
    /// `current_value = sum(layer.qty * layer.unit_cost)` and its transactions
    /// all balance.
    #[test]
    fn prop_fifo_value_equals_layer_sum(ops in prop::collection::vec((0u8..2, 1u64..40, 1i64..50_00), 1..25)) {
        let mut ledger = ledger(ValuationMethod::Fifo);
        for (kind, qty, cost) in ops {
            if kind == 0 {
                ledger.record_receiving(qty, usd(cost), "PO", now()).unwrap();
            } else {
                let take = qty.min(ledger.balance());
                if take > 0 {
                    ledger.record_pick(take, "ORD", now()).unwrap();
                }
            }
            prop_assert!(ledger.check_invariants());
        }
    }
}
