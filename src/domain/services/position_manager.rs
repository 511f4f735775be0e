//! PositionManager (C3) — multi-entry positions with weighted average price.
//!
//! This is the strategy's own view of a position (`StopLossPosition`), distinct
//! from `entities::account::AccountBalance`, the exchange's view.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::errors::PositionError;
use crate::domain::value_objects::{decimal_eq, COST_EPSILON, QUANTITY_EPSILON};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Initial,
    Averaging,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub price: Decimal,
    pub quantity: Decimal,
    pub cost: Decimal,
    pub kind: EntryKind,
    pub timestamp: DateTime<Utc>,
}

/// The strategy's accounting for one market: an ordered list of buy entries
/// plus their weighted-average rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopLossPosition {
    pub market: String,
    pub entries: Vec<PositionEntry>,
    pub total_quantity: Decimal,
    pub total_cost: Decimal,
    pub average_price: Decimal,
}

impl StopLossPosition {
    fn recompute(&mut self) {
        self.total_quantity = self.entries.iter().map(|e| e.quantity).sum();
        self.total_cost = self.entries.iter().map(|e| e.cost).sum();
        self.average_price = if self.total_quantity > Decimal::ZERO {
            self.total_cost / self.total_quantity
        } else {
            Decimal::ZERO
        };
    }
}

/// PnL snapshot returned by `PositionManager::pnl`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionPnl {
    pub current_value: Decimal,
    pub total_cost: Decimal,
    pub pnl: Decimal,
    pub pnl_rate: Decimal,
    pub average_price: Decimal,
    pub current_price: Decimal,
}

fn validate_price_qty(price: Decimal, quantity: Decimal) -> Result<(), PositionError> {
    if price <= Decimal::ZERO {
        return Err(PositionError::InvalidInput(format!(
            "price must be positive, got {}",
            price
        )));
    }
    if quantity <= Decimal::ZERO {
        return Err(PositionError::InvalidInput(format!(
            "quantity must be positive, got {}",
            quantity
        )));
    }
    Ok(())
}

/// In-memory position book, one `StopLossPosition` per market.
pub struct PositionManager {
    positions: Mutex<HashMap<String, StopLossPosition>>,
}

impl Default for PositionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionManager {
    pub fn new() -> Self {
        Self {
            positions: Mutex::new(HashMap::new()),
        }
    }

    pub fn add_initial(
        &self,
        market: &str,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<StopLossPosition, PositionError> {
        if market.is_empty() {
            return Err(PositionError::InvalidInput("market must not be empty".into()));
        }
        validate_price_qty(price, quantity)?;

        let mut positions = self.positions.lock().unwrap();
        if positions.contains_key(market) {
            return Err(PositionError::DuplicatePosition(market.to_string()));
        }

        let cost = price * quantity;
        let entry = PositionEntry {
            price,
            quantity,
            cost,
            kind: EntryKind::Initial,
            timestamp: Utc::now(),
        };
        let mut position = StopLossPosition {
            market: market.to_string(),
            entries: vec![entry],
            total_quantity: Decimal::ZERO,
            total_cost: Decimal::ZERO,
            average_price: Decimal::ZERO,
        };
        position.recompute();
        positions.insert(market.to_string(), position.clone());
        Ok(position)
    }

    pub fn add_averaging(
        &self,
        market: &str,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<StopLossPosition, PositionError> {
        validate_price_qty(price, quantity)?;

        let mut positions = self.positions.lock().unwrap();
        let position = positions
            .get_mut(market)
            .ok_or_else(|| PositionError::NoSuchPosition(market.to_string()))?;

        let cost = price * quantity;
        position.entries.push(PositionEntry {
            price,
            quantity,
            cost,
            kind: EntryKind::Averaging,
            timestamp: Utc::now(),
        });
        position.recompute();
        Ok(position.clone())
    }

    /// Reduces the position by `sell_qty`. The average price does not change
    /// on a sell — realised PnL is C7's business, not C3's. Returns a zeroed
    /// sentinel and removes the position once `total_quantity < 1e-5`.
    pub fn partial_sell(
        &self,
        market: &str,
        sell_qty: Decimal,
        _sell_price: Decimal,
    ) -> Result<StopLossPosition, PositionError> {
        if sell_qty <= Decimal::ZERO {
            return Err(PositionError::InvalidInput(
                "sell_qty must be positive".into(),
            ));
        }

        let mut positions = self.positions.lock().unwrap();
        let position = positions
            .get_mut(market)
            .ok_or_else(|| PositionError::NoSuchPosition(market.to_string()))?;

        if sell_qty > position.total_quantity {
            return Err(PositionError::OversellError {
                market: market.to_string(),
                sell_qty,
                available: position.total_quantity,
            });
        }

        let average_price = position.average_price;
        position.total_quantity -= sell_qty;
        position.total_cost -= sell_qty * average_price;
        // average_price deliberately unchanged.

        if position.total_quantity < QUANTITY_EPSILON {
            positions.remove(market);
            return Ok(StopLossPosition {
                market: market.to_string(),
                entries: Vec::new(),
                total_quantity: Decimal::ZERO,
                total_cost: Decimal::ZERO,
                average_price: Decimal::ZERO,
            });
        }

        Ok(position.clone())
    }

    /// Idempotent: returns whether a position was actually removed.
    pub fn close(&self, market: &str) -> bool {
        self.positions.lock().unwrap().remove(market).is_some()
    }

    pub fn get(&self, market: &str) -> Option<StopLossPosition> {
        self.positions.lock().unwrap().get(market).cloned()
    }

    pub fn pnl(&self, market: &str, current_price: Decimal) -> Option<PositionPnl> {
        let positions = self.positions.lock().unwrap();
        let position = positions.get(market)?;

        let current_value = current_price * position.total_quantity;
        let pnl = current_value - position.total_cost;
        let pnl_rate = if position.total_cost > Decimal::ZERO {
            (pnl / position.total_cost) * Decimal::from(100)
        } else {
            Decimal::ZERO
        };

        Some(PositionPnl {
            current_value,
            total_cost: position.total_cost,
            pnl,
            pnl_rate,
            average_price: position.average_price,
            current_price,
        })
    }

    /// Cost/average-price invariant check per §8 property 1: used by tests
    /// and callers that want to assert consistency without reaching in.
    pub fn is_consistent(position: &StopLossPosition) -> bool {
        if position.total_quantity <= Decimal::ZERO {
            return true;
        }
        let expected_avg = position.total_cost / position.total_quantity;
        decimal_eq(position.average_price, expected_avg, COST_EPSILON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn e1_averaging_scenario() {
        let manager = PositionManager::new();
        manager.add_initial("X", dec!(100), dec!(1)).unwrap();
        let position = manager.add_averaging("X", dec!(80), dec!(1)).unwrap();

        assert_eq!(position.average_price, dec!(90));
        assert_eq!(position.total_quantity, dec!(2));
        assert_eq!(position.total_cost, dec!(180));
    }

    #[test]
    fn add_initial_rejects_duplicate() {
        let manager = PositionManager::new();
        manager.add_initial("X", dec!(100), dec!(1)).unwrap();
        assert_eq!(
            manager.add_initial("X", dec!(90), dec!(1)).unwrap_err(),
            PositionError::DuplicatePosition("X".to_string())
        );
    }

    #[test]
    fn add_averaging_requires_existing_position() {
        let manager = PositionManager::new();
        assert!(matches!(
            manager.add_averaging("X", dec!(90), dec!(1)),
            Err(PositionError::NoSuchPosition(_))
        ));
    }

    #[test]
    fn partial_sell_conserves_quantity_and_holds_average_price() {
        let manager = PositionManager::new();
        manager.add_initial("X", dec!(100), dec!(10)).unwrap();
        let position = manager.partial_sell("X", dec!(4), dec!(120)).unwrap();

        assert_eq!(position.total_quantity, dec!(6));
        assert_eq!(position.average_price, dec!(100));
    }

    #[test]
    fn oversell_is_rejected() {
        let manager = PositionManager::new();
        manager.add_initial("X", dec!(100), dec!(1)).unwrap();
        assert!(matches!(
            manager.partial_sell("X", dec!(2), dec!(100)),
            Err(PositionError::OversellError { .. })
        ));
    }

    #[test]
    fn selling_below_dust_threshold_removes_position() {
        let manager = PositionManager::new();
        manager.add_initial("X", dec!(100), dec!(1)).unwrap();
        let result = manager.partial_sell("X", dec!(1), dec!(110)).unwrap();

        assert_eq!(result.total_quantity, Decimal::ZERO);
        assert!(manager.get("X").is_none());
    }

    #[test]
    fn close_is_idempotent() {
        let manager = PositionManager::new();
        manager.add_initial("X", dec!(100), dec!(1)).unwrap();
        assert!(manager.close("X"));
        assert!(!manager.close("X"));
    }

    #[test]
    fn pnl_reflects_current_price() {
        let manager = PositionManager::new();
        manager.add_initial("X", dec!(100), dec!(2)).unwrap();
        let pnl = manager.pnl("X", dec!(110)).unwrap();

        assert_eq!(pnl.current_value, dec!(220));
        assert_eq!(pnl.pnl, dec!(20));
        assert_eq!(pnl.pnl_rate, dec!(10));
    }

    #[test]
    fn pnl_is_none_without_position() {
        let manager = PositionManager::new();
        assert!(manager.pnl("X", dec!(100)).is_none());
    }
}
