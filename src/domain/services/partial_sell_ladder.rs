//! Partial-Sell Ladder (C4) — a fixed two-rung sell ladder derived from
//! `target_profit`. Owns its own ladder only; it does not gate a trailing
//! stop (that is `trailing_stop::TrailingStopTracker`, parameterized
//! independently — a sell ladder and a trailing stop are different state
//! machines with different lifecycles and should not share a reset).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Rung {
    threshold: Decimal,
    ratio: Decimal,
    completed: bool,
}

/// Tracks the two fixed sell thresholds and the stop-loss-adjustment flag
/// for one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialSellLadder {
    l1: Rung,
    l2: Rung,
    stop_loss_adjusted: bool,
}

impl PartialSellLadder {
    /// `target_profit` is a percentage (e.g. `2.0` for 2%).
    pub fn new(target_profit: Decimal) -> Self {
        Self {
            l1: Rung {
                threshold: target_profit * Decimal::new(5, 1), // 0.5 * target
                ratio: Decimal::new(30, 2),                    // 0.30
                completed: false,
            },
            l2: Rung {
                threshold: target_profit, // 1.0 * target
                ratio: Decimal::new(50, 2), // 0.50
                completed: false,
            },
            stop_loss_adjusted: false,
        }
    }

    /// Scans L1, L2 in order and returns the first non-completed rung whose
    /// threshold is met, marking it completed. Each rung fires exactly once;
    /// a call at or above L2 while L1 is still open returns L1's ratio — the
    /// ladder never skips rungs.
    pub fn should_partial_sell(&mut self, current_pnl_pct: Decimal) -> Option<Decimal> {
        if !self.l1.completed && current_pnl_pct >= self.l1.threshold {
            self.l1.completed = true;
            return Some(self.l1.ratio);
        }
        if !self.l2.completed && current_pnl_pct >= self.l2.threshold {
            self.l2.completed = true;
            return Some(self.l2.ratio);
        }
        None
    }

    pub fn should_adjust_stop_loss(&self) -> bool {
        self.l1.completed && !self.stop_loss_adjusted
    }

    pub fn mark_stop_loss_adjusted(&mut self) {
        self.stop_loss_adjusted = true;
    }

    pub fn remaining_ratio(&self) -> Decimal {
        let mut taken = Decimal::ZERO;
        if self.l1.completed {
            taken += self.l1.ratio;
        }
        if self.l2.completed {
            taken += self.l2.ratio;
        }
        Decimal::ONE - taken
    }

    /// `total · ratio`, clamped into `(0, total]`.
    pub fn calculate_sell_quantity(total: Decimal, ratio: Decimal) -> Decimal {
        let raw = total * ratio;
        raw.clamp(Decimal::new(1, 10), total)
    }

    pub fn reset(&mut self) {
        self.l1.completed = false;
        self.l2.completed = false;
        self.stop_loss_adjusted = false;
    }
}
