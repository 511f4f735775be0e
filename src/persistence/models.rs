//! sqlx row projections for the `trades` and `portfolio_snapshots` tables.
//!
//! `rust_decimal` isn't wired into `sqlx`'s column-decoding here, so decimal
//! columns are stored as `TEXT` and parsed on the way in/out; see
//! `repository.rs` for the conversions to/from `domain::entities::ledger`.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct TradeRow {
    pub id: i64,
    pub market: String,
    pub side: String,
    pub price: String,
    pub volume: String,
    pub fee: String,
    pub timestamp: DateTime<Utc>,
    pub strategy_id: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PortfolioSnapshotRow {
    pub id: i64,
    pub total_krw: String,
    pub total_btc: String,
    pub timestamp: DateTime<Utc>,
    pub positions_json: String,
}
