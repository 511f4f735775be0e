//! `TradeRepository` — the `sqlx`-backed implementation of `TradeStore` (C8).

use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::models::{PortfolioSnapshotRow, TradeRow};
use super::DbPool;
use crate::domain::entities::ledger::{PortfolioSnapshotRecord, TradeQuery, TradeRecord};
use crate::domain::entities::order::OrderSide;
use crate::domain::errors::OrderError;
use crate::domain::repositories::trade_store::TradeStore;

pub struct TradeRepository {
    pool: DbPool,
}

impl TradeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn side_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Bid => "bid",
        OrderSide::Ask => "ask",
    }
}

fn parse_side(raw: &str) -> Result<OrderSide, OrderError> {
    match raw {
        "bid" => Ok(OrderSide::Bid),
        "ask" => Ok(OrderSide::Ask),
        other => Err(OrderError::StoreError(format!("unknown side in row: {}", other))),
    }
}

fn parse_decimal(raw: &str, field: &str) -> Result<Decimal, OrderError> {
    Decimal::from_str(raw)
        .map_err(|e| OrderError::StoreError(format!("malformed {} column: {}", field, e)))
}

impl TradeRow {
    fn into_record(self) -> Result<TradeRecord, OrderError> {
        Ok(TradeRecord {
            market: self.market,
            side: parse_side(&self.side)?,
            price: parse_decimal(&self.price, "price")?,
            volume: parse_decimal(&self.volume, "volume")?,
            fee: parse_decimal(&self.fee, "fee")?,
            timestamp: self.timestamp,
            strategy_id: self.strategy_id,
        })
    }
}

impl PortfolioSnapshotRow {
    fn into_record(self) -> Result<PortfolioSnapshotRecord, OrderError> {
        Ok(PortfolioSnapshotRecord {
            total_krw: parse_decimal(&self.total_krw, "total_krw")?,
            total_btc: parse_decimal(&self.total_btc, "total_btc")?,
            timestamp: self.timestamp,
            positions_json: serde_json::from_str(&self.positions_json)
                .map_err(|e| OrderError::StoreError(format!("malformed positions_json: {}", e)))?,
        })
    }
}

#[async_trait]
impl TradeStore for TradeRepository {
    async fn insert_trade(&self, trade: &TradeRecord) -> Result<(), OrderError> {
        sqlx::query(
            r#"
            INSERT INTO trades (market, side, price, volume, fee, timestamp, strategy_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&trade.market)
        .bind(side_str(trade.side))
        .bind(trade.price.to_string())
        .bind(trade.volume.to_string())
        .bind(trade.fee.to_string())
        .bind(trade.timestamp)
        .bind(&trade.strategy_id)
        .execute(&self.pool)
        .await
        .map_err(|e| OrderError::StoreError(e.to_string()))?;

        Ok(())
    }

    async fn insert_portfolio_snapshot(
        &self,
        snapshot: &PortfolioSnapshotRecord,
    ) -> Result<(), OrderError> {
        let positions_json = serde_json::to_string(&snapshot.positions_json)
            .map_err(|e| OrderError::StoreError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO portfolio_snapshots (total_krw, total_btc, timestamp, positions_json)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(snapshot.total_krw.to_string())
        .bind(snapshot.total_btc.to_string())
        .bind(snapshot.timestamp)
        .bind(positions_json)
        .execute(&self.pool)
        .await
        .map_err(|e| OrderError::StoreError(e.to_string()))?;

        Ok(())
    }

    async fn get_trades(&self, query: TradeQuery) -> Result<Vec<TradeRecord>, OrderError> {
        let mut sql = String::from("SELECT * FROM trades WHERE 1=1");
        if query.start.is_some() {
            sql.push_str(" AND timestamp >= ?");
        }
        if query.end.is_some() {
            sql.push_str(" AND timestamp <= ?");
        }
        if query.market.is_some() {
            sql.push_str(" AND market = ?");
        }
        sql.push_str(" ORDER BY timestamp ASC");
        if query.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut q = sqlx::query_as::<_, TradeRow>(&sql);
        if let Some(start) = query.start {
            q = q.bind(start);
        }
        if let Some(end) = query.end {
            q = q.bind(end);
        }
        if let Some(market) = &query.market {
            q = q.bind(market);
        }
        if let Some(limit) = query.limit {
            q = q.bind(limit as i64);
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OrderError::StoreError(e.to_string()))?;

        rows.into_iter().map(TradeRow::into_record).collect()
    }

    async fn get_latest_portfolio_snapshot(
        &self,
    ) -> Result<Option<PortfolioSnapshotRecord>, OrderError> {
        let row = sqlx::query_as::<_, PortfolioSnapshotRow>(
            "SELECT * FROM portfolio_snapshots ORDER BY timestamp DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OrderError::StoreError(e.to_string()))?;

        row.map(PortfolioSnapshotRow::into_record).transpose()
    }
}
