//! Cost layers for inventory valuation.
//!
//! Each received batch of stock keeps its own unit cost. Picks consume layers
//! oldest-first (FIFO) or newest-first (LIFO); weighted-average valuation does
//! not track layers at all and is costed by the ledger from its running
//! average.
//!
//! # Critical Invariants
//!
//! - Layer quantities are always positive; exhausted layers are dropped
//! - Consumption is atomic: insufficient total quantity changes nothing
//! - Total layer value equals sum of `quantity * unit_cost` at all times

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Money, MoneyError};

/// Inventory valuation method for a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationMethod {
    Fifo,
    Lifo,
    WeightedAverage,
}

/// Errors that can occur when consuming cost layers
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CostLayerError {
    #[error("Insufficient cost layers: requested {requested}, available {available}")]
    InsufficientCostLayers { requested: u64, available: u64 },

    #[error("Weighted-average valuation does not consume layers")]
    LayersNotTracked,

    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// A received batch of inventory with its own unit cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostLayer {
    pub quantity: u64,
    pub unit_cost: Money,
    pub received_at: DateTime<Utc>,
    pub reference: String,
}

impl CostLayer {
    /// Value of the whole layer (`quantity * unit_cost`).
    pub fn value(&self) -> Result<Money, MoneyError> {
        self.unit_cost.multiply(self.quantity)
    }
}

/// Ordered collection of cost layers, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostLayers {
    layers: Vec<CostLayer>,
}

impl CostLayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a newly received layer. Zero-quantity layers are ignored.
    pub fn push(&mut self, layer: CostLayer) {
        if layer.quantity > 0 {
            self.layers.push(layer);
        }
    }

    pub fn layers(&self) -> &[CostLayer] {
        &self.layers
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Total quantity across all layers.
    pub fn total_quantity(&self) -> u64 {
        self.layers.iter().map(|l| l.quantity).sum()
    }

    /// Total value across all layers (`Σ quantity * unit_cost`).
    pub fn total_value(&self, currency: super::Currency) -> Result<Money, MoneyError> {
        let mut total = Money::zero(currency);
        for layer in &self.layers {
            total = total.add(&layer.value()?)?;
        }
        Ok(total)
    }

    /// Unit cost of the most recently received layer, if any.
    pub fn last_unit_cost(&self) -> Option<Money> {
        self.layers.last().map(|l| l.unit_cost)
    }

    /// Consume `quantity` units under the given valuation method and return
    /// the total cost consumed.
    ///
    /// FIFO consumes from the oldest layer, LIFO from the newest. Layers that
    /// reach zero are dropped. If the layers cannot cover the request, nothing
    /// is consumed and `InsufficientCostLayers` is returned. Weighted-average
    /// ledgers never call this; they cost picks from the running average.
    pub fn consume(
        &mut self,
        method: ValuationMethod,
        quantity: u64,
    ) -> Result<Money, CostLayerError> {
        if method == ValuationMethod::WeightedAverage {
            return Err(CostLayerError::LayersNotTracked);
        }

        let available = self.total_quantity();
        if available < quantity {
            return Err(CostLayerError::InsufficientCostLayers {
                requested: quantity,
                available,
            });
        }

        let currency = match self.layers.first() {
            Some(layer) => layer.unit_cost.currency(),
            // quantity must be zero here; nothing to consume.
            None => return Ok(Money::zero(super::Currency::usd())),
        };

        let mut remaining = quantity;
        let mut consumed = Money::zero(currency);

        while remaining > 0 {
            let index = match method {
                ValuationMethod::Fifo => 0,
                ValuationMethod::Lifo => self.layers.len() - 1,
                ValuationMethod::WeightedAverage => unreachable!(),
            };
            let layer = &mut self.layers[index];
            let take = remaining.min(layer.quantity);

            consumed = consumed.add(&layer.unit_cost.multiply(take)?)?;
            layer.quantity -= take;
            remaining -= take;

            if layer.quantity == 0 {
                self.layers.remove(index);
            }
        }

        Ok(consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;

    fn usd(amount: i64) -> Money {
        Money::new(amount, Currency::usd()).unwrap()
    }

    fn layer(qty: u64, unit_cost: i64, secs: i64) -> CostLayer {
        CostLayer {
            quantity: qty,
            unit_cost: usd(unit_cost),
            received_at: DateTime::from_timestamp(secs, 0).unwrap(),
            reference: format!("PO-{secs}"),
        }
    }

    fn book(layers: Vec<CostLayer>) -> CostLayers {
        let mut book = CostLayers::new();
        for l in layers {
            book.push(l);
        }
        book
    }

    #[test]
    fn fifo_consumes_oldest_first() {
        let mut layers = book(vec![layer(50, 15_00, 100), layer(50, 16_00, 200)]);

        let cost = layers.consume(ValuationMethod::Fifo, 60).unwrap();

        // 50 @ $15.00 + 10 @ $16.00
        assert_eq!(cost, usd(50 * 15_00 + 10 * 16_00));
        assert_eq!(layers.layers().len(), 1);
        assert_eq!(layers.layers()[0].quantity, 40);
        assert_eq!(layers.layers()[0].unit_cost, usd(16_00));
    }

    #[test]
    fn lifo_consumes_newest_first() {
        let mut layers = book(vec![layer(50, 15_00, 100), layer(50, 16_00, 200)]);

        let cost = layers.consume(ValuationMethod::Lifo, 60).unwrap();

        // 50 @ $16.00 + 10 @ $15.00
        assert_eq!(cost, usd(50 * 16_00 + 10 * 15_00));
        assert_eq!(layers.layers().len(), 1);
        assert_eq!(layers.layers()[0].quantity, 40);
        assert_eq!(layers.layers()[0].unit_cost, usd(15_00));
    }

    #[test]
    fn insufficient_layers_change_nothing() {
        let mut layers = book(vec![layer(10, 15_00, 100)]);
        let before = layers.clone();

        let err = layers.consume(ValuationMethod::Fifo, 11).unwrap_err();

        assert_eq!(
            err,
            CostLayerError::InsufficientCostLayers {
                requested: 11,
                available: 10
            }
        );
        assert_eq!(layers, before);
    }

    #[test]
    fn weighted_average_rejects_layer_consumption() {
        let mut layers = book(vec![layer(10, 15_00, 100)]);
        assert_eq!(
            layers.consume(ValuationMethod::WeightedAverage, 5),
            Err(CostLayerError::LayersNotTracked)
        );
    }

    #[test]
    fn exhausted_layers_are_dropped() {
        let mut layers = book(vec![layer(10, 15_00, 100), layer(10, 16_00, 200)]);
        layers.consume(ValuationMethod::Fifo, 10).unwrap();
        assert_eq!(layers.layers().len(), 1);
        assert_eq!(layers.total_quantity(), 10);
    }
}
