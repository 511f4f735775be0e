//! Append-only ledger rows (§3, §6): the trade record and the portfolio
//! snapshot. Domain-level shapes; `persistence::models` carries the sqlx
//! `FromRow` projections that map onto these.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::entities::order::OrderSide;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub market: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub volume: Decimal,
    pub fee: Decimal,
    pub timestamp: DateTime<Utc>,
    pub strategy_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshotRecord {
    pub total_krw: Decimal,
    pub total_btc: Decimal,
    pub timestamp: DateTime<Utc>,
    pub positions_json: serde_json::Value,
}

/// Filter predicates accepted by `TradeStore::get_trades` (§4.8).
#[derive(Debug, Clone, Default)]
pub struct TradeQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub market: Option<String>,
    pub limit: Option<u32>,
}
