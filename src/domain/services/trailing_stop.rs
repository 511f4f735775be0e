//! Trailing-Stop Tracker (C5) — an `Idle -> Armed` state machine tracking a
//! high-water mark and a derived stop price that never regresses while armed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum State {
    Idle,
    Armed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailingStopTracker {
    activation_profit_pct: Decimal,
    trail_percent: Decimal,
    state: State,
    high_water_price: Option<Decimal>,
    stop_price: Option<Decimal>,
}

impl TrailingStopTracker {
    /// Both parameters must be strictly positive and are independently
    /// configurable — not derived from `target_profit`.
    pub fn new(activation_profit_pct: Decimal, trail_percent: Decimal) -> Self {
        assert!(activation_profit_pct > Decimal::ZERO);
        assert!(trail_percent > Decimal::ZERO);
        Self {
            activation_profit_pct,
            trail_percent,
            state: State::Idle,
            high_water_price: None,
            stop_price: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.state == State::Armed
    }

    pub fn should_activate(&self, current_pnl_pct: Decimal) -> bool {
        self.is_armed() || current_pnl_pct >= self.activation_profit_pct
    }

    pub fn activate(&mut self, current_price: Decimal) {
        self.state = State::Armed;
        self.high_water_price = Some(current_price);
        self.recompute_stop();
    }

    pub fn update_high_water(&mut self, current_price: Decimal) {
        if !self.is_armed() {
            return;
        }
        let high_water = self.high_water_price.unwrap_or(current_price).max(current_price);
        self.high_water_price = Some(high_water);
        self.recompute_stop();
    }

    fn recompute_stop(&mut self) {
        if let Some(high_water) = self.high_water_price {
            let factor = Decimal::ONE - self.trail_percent / Decimal::from(100);
            self.stop_price = Some(high_water * factor);
        }
    }

    pub fn should_trigger_stop(&self, current_price: Decimal) -> bool {
        self.is_armed()
            && self
                .stop_price
                .map_or(false, |stop| current_price <= stop)
    }

    pub fn stop_price(&self) -> Option<Decimal> {
        self.stop_price
    }

    pub fn high_water_price(&self) -> Option<Decimal> {
        self.high_water_price
    }

    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.high_water_price = None;
        self.stop_price = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn e5_trailing_stop_scenario() {
        let mut tracker = TrailingStopTracker::new(dec!(3.0), dec!(1.0));

        assert!(tracker.should_activate(dec!(3.0)));
        tracker.activate(dec!(100));
        tracker.update_high_water(dec!(105));
        tracker.update_high_water(dec!(103));
        tracker.update_high_water(dec!(104.0));

        assert_eq!(tracker.high_water_price(), Some(dec!(105)));
        assert_eq!(tracker.stop_price(), Some(dec!(103.95)));
        assert!(tracker.should_trigger_stop(dec!(103)));
        assert!(!tracker.should_trigger_stop(dec!(104)));
    }

    #[test]
    fn idle_update_is_noop() {
        let mut tracker = TrailingStopTracker::new(dec!(3.0), dec!(1.0));
        tracker.update_high_water(dec!(200));
        assert!(tracker.high_water_price().is_none());
        assert!(!tracker.should_trigger_stop(dec!(1)));
    }

    #[test]
    fn stop_price_never_decreases_while_armed() {
        let mut tracker = TrailingStopTracker::new(dec!(1.0), dec!(2.0));
        tracker.activate(dec!(100));
        let mut last_stop = tracker.stop_price().unwrap();

        for price in [105, 102, 110, 108, 120] {
            tracker.update_high_water(Decimal::from(price));
            let stop = tracker.stop_price().unwrap();
            assert!(stop >= last_stop);
            last_stop = stop;
        }
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut tracker = TrailingStopTracker::new(dec!(3.0), dec!(1.0));
        tracker.activate(dec!(100));
        tracker.reset();
        assert!(!tracker.is_armed());
        assert!(tracker.stop_price().is_none());
    }
}
