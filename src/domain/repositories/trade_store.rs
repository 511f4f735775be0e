//! `TradeStore` (C8) — the narrow capability C7 and C6 use to persist fills
//! and portfolio snapshots. Implemented over SQLite via `sqlx` in
//! `persistence::repository::TradeRepository`.

use async_trait::async_trait;

use crate::domain::entities::ledger::{PortfolioSnapshotRecord, TradeQuery, TradeRecord};
use crate::domain::errors::OrderError;

#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn insert_trade(&self, trade: &TradeRecord) -> Result<(), OrderError>;

    async fn insert_portfolio_snapshot(
        &self,
        snapshot: &PortfolioSnapshotRecord,
    ) -> Result<(), OrderError>;

    async fn get_trades(&self, query: TradeQuery) -> Result<Vec<TradeRecord>, OrderError>;

    async fn get_latest_portfolio_snapshot(
        &self,
    ) -> Result<Option<PortfolioSnapshotRecord>, OrderError>;
}
