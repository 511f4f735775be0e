//! Portfolio Manager (C7) — ingests account snapshots, records fills, and
//! computes performance metrics over the append-only ledger (C8).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::domain::entities::account::{AccountBalance, AccountSnapshot};
use crate::domain::entities::ledger::{PortfolioSnapshotRecord, TradeQuery, TradeRecord};
use crate::domain::entities::order::{OrderResult, OrderSide};
use crate::domain::errors::OrderError;
use crate::domain::repositories::trade_store::TradeStore;

const RISK_FREE_ANNUAL: f64 = 0.03;
const DEFAULT_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceMetrics {
    pub total_trades: u64,
    pub buy_trades: u64,
    pub sell_trades: u64,
    pub total_buy_value: Decimal,
    pub total_sell_value: Decimal,
    pub total_fees: Decimal,
    pub gross_profit: Decimal,
    pub net_profit: Decimal,
    pub win_rate: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
}

pub struct PortfolioManager {
    trade_store: Arc<dyn TradeStore>,
    accounts: Mutex<HashMap<String, AccountBalance>>,
    positions: Mutex<HashMap<String, AccountBalance>>,
}

impl PortfolioManager {
    pub fn new(trade_store: Arc<dyn TradeStore>) -> Self {
        Self {
            trade_store,
            accounts: Mutex::new(HashMap::new()),
            positions: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the in-memory account map from a fresh snapshot, aggregates
    /// `total_krw`/`total_btc`, and writes a portfolio snapshot row.
    pub async fn update_positions(&self, accounts: AccountSnapshot) -> Result<(), OrderError> {
        let mut map = HashMap::new();
        for balance in &accounts {
            map.insert(balance.currency.clone(), balance.clone());
        }

        let mut positions = HashMap::new();
        for balance in map.values() {
            if balance.currency != "KRW"
                && (balance.balance > Decimal::ZERO || balance.locked > Decimal::ZERO)
            {
                positions.insert(format!("KRW-{}", balance.currency), balance.clone());
            }
        }

        let total_krw = map
            .values()
            .map(|b| {
                if b.currency == "KRW" {
                    b.balance
                } else if b.currency != "BTC" && b.balance > Decimal::ZERO {
                    b.balance * b.avg_buy_price
                } else {
                    Decimal::ZERO
                }
            })
            .sum();

        let total_btc = map
            .get("BTC")
            .map(|b| b.balance)
            .unwrap_or(Decimal::ZERO);

        let positions_json = serde_json::to_value(&map).map_err(|e| {
            OrderError::StoreError(format!("failed to serialize account map: {}", e))
        })?;

        let snapshot = PortfolioSnapshotRecord {
            total_krw,
            total_btc,
            timestamp: Utc::now(),
            positions_json,
        };
        self.trade_store.insert_portfolio_snapshot(&snapshot).await?;

        *self.accounts.lock().await = map;
        *self.positions.lock().await = positions;
        Ok(())
    }

    /// Appends a ledger row for a fill. A zero-`executed_volume` result is a
    /// deliberate no-op, not an error.
    pub async fn record_trade(
        &self,
        order_result: &OrderResult,
        strategy_id: Option<String>,
    ) -> Result<bool, OrderError> {
        if order_result.executed_volume <= Decimal::ZERO {
            return Ok(true);
        }

        let trade = TradeRecord {
            market: order_result.market.clone(),
            side: order_result.side,
            price: order_result.price.unwrap_or(Decimal::ZERO),
            volume: order_result.executed_volume,
            fee: order_result.paid_fee,
            timestamp: Utc::now(),
            strategy_id,
        };
        self.trade_store.insert_trade(&trade).await?;
        Ok(true)
    }

    pub async fn account_balances(&self) -> HashMap<String, AccountBalance> {
        self.accounts.lock().await.clone()
    }

    pub async fn current_positions(&self) -> HashMap<String, AccountBalance> {
        self.positions.lock().await.clone()
    }

    /// Performance metrics over `[start, end]`, defaulting to the trailing 30 days.
    pub async fn compute_performance_metrics(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<PerformanceMetrics, OrderError> {
        let end = end.unwrap_or_else(Utc::now);
        let start = start.unwrap_or(end - Duration::days(DEFAULT_WINDOW_DAYS));

        let trades = self
            .trade_store
            .get_trades(TradeQuery {
                start: Some(start),
                end: Some(end),
                market: None,
                limit: None,
            })
            .await?;

        Ok(compute_metrics(&trades))
    }

    /// A thin pass-through to C8: the store contract exposes only the latest
    /// snapshot, so "history" here is that one row when it falls in range.
    pub async fn get_portfolio_history(
        &self,
        days: i64,
    ) -> Result<Vec<PortfolioSnapshotRecord>, OrderError> {
        let cutoff = Utc::now() - Duration::days(days);
        match self.trade_store.get_latest_portfolio_snapshot().await? {
            Some(snapshot) if snapshot.timestamp >= cutoff => Ok(vec![snapshot]),
            _ => Ok(Vec::new()),
        }
    }

    /// The store contract (C8) exposes no delete capability; retention is
    /// left to the storage layer's own housekeeping. Logged, not silent.
    pub async fn cleanup_old_data(&self, days_to_keep: i64) {
        tracing::warn!(
            days_to_keep,
            "cleanup_old_data called but the trade store contract has no prune operation"
        );
    }

    /// Assembles the trading-performance report. `include_positions` and
    /// `include_trades` gate the optional `current_positions`/`trade_history`
    /// sections; `account_balances` is always included.
    pub async fn generate_report(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        include_positions: bool,
        include_trades: bool,
    ) -> Result<serde_json::Value, OrderError> {
        let metrics = self.compute_performance_metrics(start, end).await?;
        let balances = self.account_balances().await;

        let account_balances: HashMap<String, serde_json::Value> = balances
            .iter()
            .map(|(currency, balance)| (currency.clone(), account_balance_report_json(balance)))
            .collect();

        let mut report = serde_json::json!({
            "report_info": {
                "generated_at": Utc::now().to_rfc3339(),
                "report_type": "trading_performance",
                "version": "1.0",
            },
            "performance_metrics": {
                "total_trades": metrics.total_trades,
                "buy_trades": metrics.buy_trades,
                "sell_trades": metrics.sell_trades,
                "total_buy_value": round_dp(metrics.total_buy_value, 2),
                "total_sell_value": round_dp(metrics.total_sell_value, 2),
                "total_fees": round_dp(metrics.total_fees, 2),
                "gross_profit": round_dp(metrics.gross_profit, 2),
                "net_profit": round_dp(metrics.net_profit, 2),
                "win_rate": round_f64(metrics.win_rate, 2),
                "sharpe_ratio": round_f64(metrics.sharpe_ratio, 4),
                "max_drawdown": round_f64(metrics.max_drawdown * 100.0, 2),
            },
            "account_balances": account_balances,
        });

        if include_positions {
            let positions = self.current_positions().await;
            let positions_json: HashMap<String, serde_json::Value> = positions
                .iter()
                .map(|(market, position)| {
                    let mut entry = account_balance_report_json(position);
                    entry["estimated_value_krw"] =
                        round_dp(position.balance * position.avg_buy_price, 2).into();
                    (market.clone(), entry)
                })
                .collect();
            report["current_positions"] = serde_json::to_value(positions_json).map_err(|e| {
                OrderError::StoreError(format!("failed to serialize positions: {}", e))
            })?;
        }

        if include_trades {
            let trades = self
                .trade_store
                .get_trades(TradeQuery {
                    start,
                    end,
                    market: None,
                    limit: Some(1000),
                })
                .await?;
            let trades_json: Vec<serde_json::Value> = trades
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "timestamp": t.timestamp.to_rfc3339(),
                        "market": t.market,
                        "side": t.side,
                        "price": round_dp(t.price, 2),
                        "volume": round_dp(t.volume, 8),
                        "fee": round_dp(t.fee, 2),
                        "strategy_id": t.strategy_id,
                        "trade_value": round_dp(t.price * t.volume, 2),
                    })
                })
                .collect();
            report["trade_history"] = serde_json::Value::Array(trades_json);
        }

        Ok(report)
    }

    pub async fn save_report_to_file(&self, dir: &str) -> Result<String, OrderError> {
        let report = self.generate_report(None, None, true, true).await?;
        let path = format!("{}/portfolio_report_{}.json", dir, Utc::now().timestamp());
        let body = serde_json::to_string_pretty(&report)
            .map_err(|e| OrderError::StoreError(format!("failed to serialize report: {}", e)))?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| OrderError::StoreError(format!("failed to write report: {}", e)))?;
        Ok(path)
    }
}

fn round_dp(value: Decimal, dp: u32) -> f64 {
    value.round_dp(dp).to_f64().unwrap_or(0.0)
}

/// `balance`/`locked` rounded as volumes (8 d.p.), `avg_buy_price` rounded as
/// an amount (2 d.p.); shared by `account_balances` and `current_positions`.
fn account_balance_report_json(balance: &AccountBalance) -> serde_json::Value {
    serde_json::json!({
        "balance": round_dp(balance.balance, 8),
        "locked": round_dp(balance.locked, 8),
        "avg_buy_price": round_dp(balance.avg_buy_price, 2),
        "unit_currency": balance.unit_currency,
    })
}

fn round_f64(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (value * factor).round() / factor
}

fn compute_metrics(trades: &[TradeRecord]) -> PerformanceMetrics {
    let total_trades = trades.len() as u64;
    let buy_trades_vec: Vec<&TradeRecord> =
        trades.iter().filter(|t| t.side == OrderSide::Bid).collect();
    let sell_trades_vec: Vec<&TradeRecord> =
        trades.iter().filter(|t| t.side == OrderSide::Ask).collect();

    let buy_trades = buy_trades_vec.len() as u64;
    let sell_trades = sell_trades_vec.len() as u64;

    let total_buy_value: Decimal = buy_trades_vec.iter().map(|t| t.price * t.volume).sum();
    let total_sell_value: Decimal = sell_trades_vec.iter().map(|t| t.price * t.volume).sum();
    let total_fees: Decimal = trades.iter().map(|t| t.fee).sum();

    let gross_profit = total_sell_value - total_buy_value;
    let net_profit = gross_profit - total_fees;

    let total_buy_volume: Decimal = buy_trades_vec.iter().map(|t| t.volume).sum();
    let avg_buy_price = if total_buy_volume > Decimal::ZERO {
        total_buy_value / total_buy_volume
    } else {
        Decimal::ZERO
    };

    let profitable_sells = sell_trades_vec
        .iter()
        .filter(|t| t.price > avg_buy_price)
        .count() as f64;
    let win_rate = if sell_trades > 0 {
        profitable_sells / sell_trades as f64 * 100.0
    } else {
        0.0
    };

    let sharpe_ratio = compute_sharpe_ratio(trades);
    let max_drawdown = compute_max_drawdown(trades);

    PerformanceMetrics {
        total_trades,
        buy_trades,
        sell_trades,
        total_buy_value,
        total_sell_value,
        total_fees,
        gross_profit,
        net_profit,
        win_rate,
        sharpe_ratio,
        max_drawdown,
    }
}

fn compute_sharpe_ratio(trades: &[TradeRecord]) -> f64 {
    let mut by_day: HashMap<chrono::NaiveDate, (Decimal, Decimal, Decimal)> = HashMap::new();
    for t in trades {
        let day = t.timestamp.date_naive();
        let entry = by_day.entry(day).or_insert((Decimal::ZERO, Decimal::ZERO, Decimal::ZERO));
        let value = t.price * t.volume;
        match t.side {
            OrderSide::Ask => entry.0 += value,
            OrderSide::Bid => entry.0 -= value,
        }
        entry.1 += t.fee;
        entry.2 += value.abs();
    }

    let daily_returns: Vec<f64> = by_day
        .values()
        .filter(|(_, _, volume)| *volume > Decimal::ZERO)
        .map(|(profit, fees, volume)| {
            ((*profit - *fees) / *volume).to_f64().unwrap_or(0.0)
        })
        .collect();

    if daily_returns.len() < 2 {
        return 0.0;
    }

    let mean = daily_returns.iter().sum::<f64>() / daily_returns.len() as f64;
    let variance = daily_returns
        .iter()
        .map(|r| (r - mean).powi(2))
        .sum::<f64>()
        / (daily_returns.len() - 1) as f64;
    let stddev = variance.sqrt();
    if stddev == 0.0 {
        return 0.0;
    }

    let risk_free_daily = RISK_FREE_ANNUAL / 365.0;
    (mean - risk_free_daily) / stddev
}

fn compute_max_drawdown(trades: &[TradeRecord]) -> f64 {
    let mut running = Decimal::ZERO;
    let mut peak = Decimal::ZERO;
    let mut max_dd = Decimal::ZERO;

    for t in trades {
        let value = t.price * t.volume;
        running += match t.side {
            OrderSide::Ask => value,
            OrderSide::Bid => -value,
        };
        running -= t.fee;

        if running > peak {
            peak = running;
        }
        if peak > Decimal::ZERO {
            let drawdown = (peak - running) / peak;
            if drawdown > max_dd {
                max_dd = drawdown;
            }
        }
    }

    max_dd.to_f64().unwrap_or(0.0)
}
