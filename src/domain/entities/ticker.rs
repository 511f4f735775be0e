//! Market-data record produced by the ticker collaborator (WebSocket/REST transport
//! is out of scope; only this shape matters to the core).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single price tick for a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub market: String,
    pub trade_price: Decimal,
    pub trade_volume: Decimal,
    pub timestamp: DateTime<Utc>,
    pub change_rate: Decimal,
}

impl Ticker {
    /// Validates the `trade_price > 0` invariant. Malformed tickers are dropped
    /// silently by the boundary that parses them (§7 `ParseError`), not here.
    pub fn is_valid(&self) -> bool {
        self.trade_price > Decimal::ZERO
    }
}
