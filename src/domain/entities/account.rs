//! Account-side entities: an exchange balance row for one currency.
//!
//! This is deliberately a distinct type from the strategy-side position tracked
//! by the position manager (`services::position_manager::StopLossPosition`) even
//! though both are informally called "a position" upstream — unifying them was
//! the duck-typing anti-pattern this crate's authors rejected.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One row of `GET /v1/accounts`: the exchange's view of a balance for a currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub currency: String,
    pub balance: Decimal,
    pub locked: Decimal,
    pub avg_buy_price: Decimal,
    pub unit_currency: String,
}

impl AccountBalance {
    pub fn available(&self) -> Decimal {
        self.balance - self.locked
    }
}

/// The full set of account balances, keyed by currency, as returned by one
/// `get_accounts` call.
pub type AccountSnapshot = Vec<AccountBalance>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn available_subtracts_locked() {
        let balance = AccountBalance {
            currency: "KRW".to_string(),
            balance: dec!(1000),
            locked: dec!(300),
            avg_buy_price: dec!(0),
            unit_currency: "KRW".to_string(),
        };
        assert_eq!(balance.available(), dec!(700));
    }
}
