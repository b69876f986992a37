//! Inventory ledger aggregate with double-entry bookkeeping.
//!
//! One ledger per (tenant, facility, SKU). Every operation produces exactly
//! one transaction of two entries — a debit and a credit of equal value — so
//! the entry set of any transaction sums to zero.
//!
//! # Critical Invariants
//!
//! - Balance (quantity) never goes negative
//! - For FIFO/LIFO: `current_value = Σ layer.quantity * layer.unit_cost`
//! - `average_unit_cost = current_value / balance` while balance > 0
//! - No negative `Money` anywhere
//!
//! CRITICAL: All money values are integer minor units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Aggregate, DomainEvent};
use crate::money::{CostLayer, CostLayerError, CostLayers, Currency, Money, MoneyError, ValuationMethod};

/// Ledger accounts. Asset accounts grow on debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Account {
    Inventory,
    Cogs,
    GoodsInTransit,
    Adjustments,
    Returns,
}

impl Account {
    pub fn as_str(&self) -> &'static str {
        match self {
            Account::Inventory => "INVENTORY",
            Account::Cogs => "COGS",
            Account::GoodsInTransit => "GOODS_IN_TRANSIT",
            Account::Adjustments => "ADJUSTMENTS",
            Account::Returns => "RETURNS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySide {
    Debit,
    Credit,
}

/// Half of a balanced transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub account: Account,
    pub side: EntrySide,
    pub amount: Money,
}

impl LedgerEntry {
    /// Signed value: debits positive, credits negative.
    pub fn signed_minor(&self) -> i64 {
        match self.side {
            EntrySide::Debit => self.amount.amount_minor(),
            EntrySide::Credit => -self.amount.amount_minor(),
        }
    }
}

/// A matched debit/credit pair plus its quantity context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: String,
    pub entries: [LedgerEntry; 2],
    pub quantity: u64,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

impl LedgerTransaction {
    /// Debit and credit must cancel out.
    pub fn is_balanced(&self) -> bool {
        self.entries.iter().map(LedgerEntry::signed_minor).sum::<i64>() == 0
    }

    pub fn debit(&self) -> &LedgerEntry {
        &self.entries[0]
    }

    pub fn credit(&self) -> &LedgerEntry {
        &self.entries[1]
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Insufficient stock: balance {balance}, requested {requested}")]
    InsufficientStock { balance: u64, requested: u64 },

    #[error("Quantity must be positive")]
    ZeroQuantity,

    #[error("Adjustment of zero quantity is rejected")]
    ZeroAdjustment,

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error(transparent)]
    CostLayer(#[from] CostLayerError),
}

/// Inventory ledger aggregate root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryLedger {
    id: String,
    tenant: String,
    facility: String,
    sku: String,
    method: ValuationMethod,
    currency: Currency,
    layers: CostLayers,
    balance: u64,
    value: Money,
    average_unit_cost: Money,
    /// Signed minor-unit balance per account; debits positive.
    account_balances: std::collections::BTreeMap<Account, i64>,
    transactions: Vec<LedgerTransaction>,
    updated_at: DateTime<Utc>,

    #[serde(skip, default)]
    events: Vec<DomainEvent>,
}

impl InventoryLedger {
    pub fn new(
        tenant: impl Into<String>,
        facility: impl Into<String>,
        sku: impl Into<String>,
        method: ValuationMethod,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Self {
        let tenant = tenant.into();
        let facility = facility.into();
        let sku = sku.into();
        Self {
            id: format!("{tenant}/{facility}/{sku}"),
            tenant,
            facility,
            sku,
            method,
            currency,
            layers: CostLayers::new(),
            balance: 0,
            value: Money::zero(currency),
            average_unit_cost: Money::zero(currency),
            account_balances: std::collections::BTreeMap::new(),
            transactions: Vec::new(),
            updated_at: now,
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn method(&self) -> ValuationMethod {
        self.method
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn value(&self) -> Money {
        self.value
    }

    pub fn average_unit_cost(&self) -> Money {
        self.average_unit_cost
    }

    pub fn layers(&self) -> &[CostLayer] {
        self.layers.layers()
    }

    pub fn transactions(&self) -> &[LedgerTransaction] {
        &self.transactions
    }

    /// Signed minor-unit balance of one account (debits positive).
    pub fn account_balance(&self, account: Account) -> i64 {
        self.account_balances.get(&account).copied().unwrap_or(0)
    }

    fn recompute_average(&mut self) -> Result<(), LedgerError> {
        self.average_unit_cost = if self.balance > 0 {
            self.value.divide(self.balance)?
        } else {
            Money::zero(self.currency)
        };
        Ok(())
    }

    fn post(
        &mut self,
        debit: Account,
        credit: Account,
        amount: Money,
        quantity: u64,
        reference: String,
        now: DateTime<Utc>,
    ) {
        let txn = LedgerTransaction {
            id: Uuid::new_v4().to_string(),
            entries: [
                LedgerEntry {
                    account: debit,
                    side: EntrySide::Debit,
                    amount,
                },
                LedgerEntry {
                    account: credit,
                    side: EntrySide::Credit,
                    amount,
                },
            ],
            quantity,
            reference,
            occurred_at: now,
        };
        *self.account_balances.entry(debit).or_insert(0) += amount.amount_minor();
        *self.account_balances.entry(credit).or_insert(0) -= amount.amount_minor();
        self.events.push(DomainEvent::LedgerEntryCreated {
            sku: self.sku.clone(),
            transaction_id: txn.id.clone(),
            debit_account: debit.as_str().to_string(),
            credit_account: credit.as_str().to_string(),
            amount,
            quantity,
            occurred_at: now,
        });
        self.transactions.push(txn);
    }

    fn emit_valuation(&mut self, now: DateTime<Utc>) {
        self.events.push(DomainEvent::InventoryValued {
            sku: self.sku.clone(),
            balance: self.balance,
            value: self.value,
            average_unit_cost: self.average_unit_cost,
            occurred_at: now,
        });
        self.updated_at = now;
    }

    /// Cost of removing `quantity` units under the configured valuation.
    ///
    /// FIFO/LIFO consume cost layers; weighted average does not use layers and
    /// costs the pick at `average_unit_cost * quantity` (the full remaining
    /// value when the ledger empties, so no residue is stranded).
    fn consume_cost(&mut self, quantity: u64) -> Result<Money, LedgerError> {
        match self.method {
            ValuationMethod::Fifo | ValuationMethod::Lifo => {
                Ok(self.layers.consume(self.method, quantity)?)
            }
            ValuationMethod::WeightedAverage => {
                if quantity == self.balance {
                    Ok(self.value)
                } else {
                    Ok(self.average_unit_cost.multiply(quantity)?)
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Receive purchased stock: Debit INVENTORY / Credit GOODS_IN_TRANSIT.
    pub fn record_receiving(
        &mut self,
        quantity: u64,
        unit_cost: Money,
        reference: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::ZeroQuantity);
        }
        let reference = reference.into();
        let amount = unit_cost.multiply(quantity)?;

        if matches!(self.method, ValuationMethod::Fifo | ValuationMethod::Lifo) {
            self.layers.push(CostLayer {
                quantity,
                unit_cost,
                received_at: now,
                reference: reference.clone(),
            });
        }
        self.balance += quantity;
        self.value = self.value.add(&amount)?;
        self.recompute_average()?;

        self.post(
            Account::Inventory,
            Account::GoodsInTransit,
            amount,
            quantity,
            reference,
            now,
        );
        self.emit_valuation(now);
        Ok(())
    }

    /// Cost a pick: Debit COGS / Credit INVENTORY.
    pub fn record_pick(
        &mut self,
        quantity: u64,
        order_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Money, LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::ZeroQuantity);
        }
        if self.balance < quantity {
            return Err(LedgerError::InsufficientStock {
                balance: self.balance,
                requested: quantity,
            });
        }
        let cost = self.consume_cost(quantity)?;
        self.balance -= quantity;
        self.value = self.value.subtract(&cost)?;
        self.recompute_average()?;

        self.post(
            Account::Cogs,
            Account::Inventory,
            cost,
            quantity,
            order_id.into(),
            now,
        );
        self.emit_valuation(now);
        Ok(cost)
    }

    /// Cycle-count adjustment. Positive deltas add stock at the last known
    /// unit cost; negative deltas consume it like a pick into ADJUSTMENTS.
    pub fn record_adjustment(
        &mut self,
        delta: i64,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if delta == 0 {
            return Err(LedgerError::ZeroAdjustment);
        }
        let reason = reason.into();
        if delta > 0 {
            let quantity = delta as u64;
            let unit_cost = self
                .layers
                .last_unit_cost()
                .unwrap_or(self.average_unit_cost);
            let amount = unit_cost.multiply(quantity)?;
            if matches!(self.method, ValuationMethod::Fifo | ValuationMethod::Lifo) {
                self.layers.push(CostLayer {
                    quantity,
                    unit_cost,
                    received_at: now,
                    reference: reason.clone(),
                });
            }
            self.balance += quantity;
            self.value = self.value.add(&amount)?;
            self.recompute_average()?;
            self.post(
                Account::Inventory,
                Account::Adjustments,
                amount,
                quantity,
                reason,
                now,
            );
        } else {
            let quantity = delta.unsigned_abs();
            if self.balance < quantity {
                return Err(LedgerError::InsufficientStock {
                    balance: self.balance,
                    requested: quantity,
                });
            }
            let cost = self.consume_cost(quantity)?;
            self.balance -= quantity;
            self.value = self.value.subtract(&cost)?;
            self.recompute_average()?;
            self.post(
                Account::Adjustments,
                Account::Inventory,
                cost,
                quantity,
                reason,
                now,
            );
        }
        self.emit_valuation(now);
        Ok(())
    }

    /// Customer return back into stock: Debit INVENTORY / Credit RETURNS.
    pub fn record_return(
        &mut self,
        quantity: u64,
        unit_cost: Money,
        reference: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::ZeroQuantity);
        }
        let reference = reference.into();
        let amount = unit_cost.multiply(quantity)?;
        if matches!(self.method, ValuationMethod::Fifo | ValuationMethod::Lifo) {
            self.layers.push(CostLayer {
                quantity,
                unit_cost,
                received_at: now,
                reference: reference.clone(),
            });
        }
        self.balance += quantity;
        self.value = self.value.add(&amount)?;
        self.recompute_average()?;

        self.post(
            Account::Inventory,
            Account::Returns,
            amount,
            quantity,
            reference,
            now,
        );
        self.emit_valuation(now);
        Ok(())
    }

    /// Layer-value conservation check for FIFO/LIFO ledgers.
    pub fn check_invariants(&self) -> bool {
        let balanced = self.transactions.iter().all(LedgerTransaction::is_balanced);
        match self.method {
            ValuationMethod::Fifo | ValuationMethod::Lifo => {
                let layer_value = self
                    .layers
                    .total_value(self.currency)
                    .map(|v| v.amount_minor())
                    .unwrap_or(-1);
                balanced
                    && layer_value == self.value.amount_minor()
                    && self.layers.total_quantity() == self.balance
            }
            ValuationMethod::WeightedAverage => balanced,
        }
    }
}

impl Aggregate for InventoryLedger {
    const KIND: &'static str = "inventory_ledger";

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
