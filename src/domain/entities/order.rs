//! Order request/response entities (§3) and the `TradingSignal` that the order
//! manager (C6) translates into an `Order`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::errors::OrderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Bid,
    Ask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrdType {
    Limit,
    Market,
    Price,
}

/// An order request, validated at construction time per the §3 invariants:
/// `limit ⇒ price>0 ∧ volume>0`; `market ask ⇒ volume>0 ∧ price=∅`;
/// `price bid ⇒ price>0 ∧ volume=∅` (here `price` is the KRW amount to spend).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub market: String,
    pub side: OrderSide,
    pub ord_type: OrdType,
    pub price: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub identifier: String,
}

impl Order {
    pub fn new(
        market: impl Into<String>,
        side: OrderSide,
        ord_type: OrdType,
        price: Option<Decimal>,
        volume: Option<Decimal>,
        identifier: impl Into<String>,
    ) -> Result<Self, OrderError> {
        let market = market.into();
        if market.is_empty() {
            return Err(OrderError::InvalidInput("market must not be empty".into()));
        }

        match (ord_type, side) {
            (OrdType::Limit, _) => {
                if price.map_or(true, |p| p <= Decimal::ZERO)
                    || volume.map_or(true, |v| v <= Decimal::ZERO)
                {
                    return Err(OrderError::InvalidInput(
                        "limit orders require price>0 and volume>0".into(),
                    ));
                }
            }
            (OrdType::Market, OrderSide::Ask) => {
                if volume.map_or(true, |v| v <= Decimal::ZERO) || price.is_some() {
                    return Err(OrderError::InvalidInput(
                        "market ask requires volume>0 and no price".into(),
                    ));
                }
            }
            (OrdType::Price, OrderSide::Bid) => {
                if price.map_or(true, |p| p <= Decimal::ZERO) || volume.is_some() {
                    return Err(OrderError::InvalidInput(
                        "price bid requires price>0 (KRW to spend) and no volume".into(),
                    ));
                }
            }
            (OrdType::Market, OrderSide::Bid) | (OrdType::Price, OrderSide::Ask) => {
                return Err(OrderError::InvalidInput(format!(
                    "{:?} is not a valid combination of ord_type and side",
                    ord_type
                )));
            }
        }

        Ok(Self {
            market,
            side,
            ord_type,
            price,
            volume,
            identifier: identifier.into(),
        })
    }
}

/// The fill/acknowledgement record returned by a successful `place_order` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub market: String,
    pub side: OrderSide,
    pub ord_type: OrdType,
    pub price: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub executed_volume: Decimal,
    pub remaining_volume: Decimal,
    pub paid_fee: Decimal,
    pub reserved_fee: Decimal,
    pub locked: Decimal,
    pub trades_count: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    Wait,
    Done,
    Cancel,
}

impl OrderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Done | OrderState::Cancel)
    }
}

/// The tracked lifecycle view the order manager keeps for each active order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatus {
    pub order_id: String,
    pub state: OrderState,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalAction {
    Buy,
    Sell,
}

/// An externally produced trading signal, translated into an `Order` by C6.
/// `confidence` is a dispatch hint, not a reliability measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub market: String,
    pub action: SignalAction,
    pub confidence: f64,
    pub price: Decimal,
    pub volume: Decimal,
    pub strategy_id: String,
    pub timestamp: DateTime<Utc>,
}

impl TradingSignal {
    /// Identifier format: `"<strategy_id>_<unix-seconds-of-timestamp>"`.
    pub fn identifier(&self) -> String {
        format!("{}_{}", self.strategy_id, self.timestamp.timestamp())
    }
}
