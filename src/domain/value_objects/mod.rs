//! Shared tolerances for the fixed-point arithmetic used across the averaging
//! and PnL core (§4.3, §8). A `rust_decimal::Decimal` comparison is exact;
//! these epsilons exist only for the equality predicates the spec calls for.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Absolute tolerance for cost/average-price comparisons (§4.3).
pub const COST_EPSILON: Decimal = dec!(0.01);

/// Absolute tolerance for quantity comparisons; a quantity below this is
/// treated as zero (§3 `StopLossPosition` lifecycle).
pub const QUANTITY_EPSILON: Decimal = dec!(0.00001);

pub fn decimal_eq(a: Decimal, b: Decimal, epsilon: Decimal) -> bool {
    (a - b).abs() < epsilon
}
