mod config;
mod domain;
mod infrastructure;
mod persistence;
mod secrets;
mod task_runner;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;
use crate::domain::entities::account::AccountSnapshot;
use crate::domain::entities::order::{OrdType, Order, OrderSide};
use crate::domain::repositories::exchange_client::ExchangeClient;
use crate::domain::repositories::trade_store::TradeStore;
use crate::domain::services::order_manager::OrderManager;
use crate::domain::services::partial_sell_ladder::PartialSellLadder;
use crate::domain::services::portfolio_manager::PortfolioManager;
use crate::domain::services::position_manager::PositionManager;
use crate::domain::services::strategy_config::{StrategyConfig, StrategyRuntime};
use crate::domain::services::trailing_stop::TrailingStopTracker;
use crate::infrastructure::credential_store::{self, CredentialBlob};
use crate::infrastructure::upbit_client::{UpbitClient, UpbitClientConfig};
use crate::task_runner::CircuitBreakerConfig;

/// Ties the per-market strategy state machines (C3/C4/C5) to the order and
/// portfolio managers (C6/C7), and drives one monitoring tick (§4.9, §6).
struct StrategyEngine {
    market: String,
    strategy_id: String,
    exchange: Arc<dyn ExchangeClient>,
    position_manager: PositionManager,
    ladder: std::sync::Mutex<PartialSellLadder>,
    trailing_stop: std::sync::Mutex<TrailingStopTracker>,
    order_manager: OrderManager,
    portfolio_manager: PortfolioManager,
    runtime: std::sync::Mutex<StrategyRuntime>,
}

impl StrategyEngine {
    fn new(
        market: String,
        runtime: StrategyRuntime,
        exchange: Arc<dyn ExchangeClient>,
        trade_store: Arc<dyn TradeStore>,
    ) -> Self {
        let target_profit = runtime.config().target_profit;
        let activation_pct = runtime.config().target_profit;
        let trail_percent = target_profit.max(Decimal::new(5, 1));

        Self {
            market,
            strategy_id: "upbit-single-market".to_string(),
            exchange: exchange.clone(),
            position_manager: PositionManager::new(),
            ladder: std::sync::Mutex::new(PartialSellLadder::new(target_profit)),
            trailing_stop: std::sync::Mutex::new(TrailingStopTracker::new(
                activation_pct,
                trail_percent,
            )),
            order_manager: OrderManager::new(exchange, trade_store.clone(), 3),
            portfolio_manager: PortfolioManager::new(trade_store),
            runtime: std::sync::Mutex::new(runtime),
        }
    }

    /// One monitoring pass: refresh the ticker and accounts, evaluate the
    /// ladder and trailing stop against the open position, and place an
    /// order when either fires. Errors are logged and surfaced to the
    /// circuit breaker rather than unwound through the caller.
    async fn tick(&self) -> Result<(), String> {
        let ticker = self
            .exchange
            .get_ticker(&self.market)
            .await
            .map_err(|e| e.to_string())?;
        if !ticker.is_valid() {
            warn!(market = %self.market, "dropping invalid ticker");
            return Ok(());
        }

        let accounts: AccountSnapshot = self
            .exchange
            .get_accounts()
            .await
            .map_err(|e| e.to_string())?;
        self.portfolio_manager
            .update_positions(accounts)
            .await
            .map_err(|e| e.to_string())?;

        self.order_manager.track_orders().await;

        let Some(position) = self.position_manager.get(&self.market) else {
            return Ok(());
        };
        let Some(pnl) = self.position_manager.pnl(&self.market, ticker.trade_price) else {
            return Ok(());
        };

        let sell_ratio = {
            let mut ladder = self.ladder.lock().unwrap();
            ladder.should_partial_sell(pnl.pnl_rate)
        };
        if let Some(ratio) = sell_ratio {
            let quantity = PartialSellLadder::calculate_sell_quantity(position.total_quantity, ratio);
            self.place_sell(quantity, "partial-sell-ladder").await;

            if self.ladder.lock().unwrap().should_adjust_stop_loss() {
                self.ladder.lock().unwrap().mark_stop_loss_adjusted();
                info!(market = %self.market, "stop-loss rung cleared, tightening trailing stop");
            }
        }

        {
            let mut trailing_stop = self.trailing_stop.lock().unwrap();
            if !trailing_stop.is_armed() && trailing_stop.should_activate(pnl.pnl_rate) {
                trailing_stop.activate(ticker.trade_price);
                info!(market = %self.market, price = %ticker.trade_price, "trailing stop armed");
            } else if trailing_stop.is_armed() {
                trailing_stop.update_high_water(ticker.trade_price);
            }

            if trailing_stop.should_trigger_stop(ticker.trade_price) {
                let quantity = self
                    .position_manager
                    .get(&self.market)
                    .map(|p| p.total_quantity)
                    .unwrap_or_default();
                drop(trailing_stop);
                if quantity > Decimal::ZERO {
                    self.place_sell(quantity, "trailing-stop").await;
                    self.trailing_stop.lock().unwrap().reset();
                    self.ladder.lock().unwrap().reset();
                }
            }
        }

        self.order_manager
            .cleanup_completed_orders(Duration::from_secs(3600))
            .await;

        Ok(())
    }

    async fn place_sell(&self, quantity: Decimal, reason: &str) {
        if quantity <= Decimal::ZERO {
            return;
        }
        let order = match Order::new(
            self.market.clone(),
            OrderSide::Ask,
            OrdType::Market,
            None,
            Some(quantity),
            format!("{}_{}", self.strategy_id, reason),
        ) {
            Ok(order) => order,
            Err(e) => {
                error!(market = %self.market, reason, "failed to build sell order: {}", e);
                return;
            }
        };

        match self.order_manager.execute_order(order).await {
            Some(result) => {
                if let Err(e) = self
                    .position_manager
                    .partial_sell(&self.market, result.executed_volume, result.price.unwrap_or_default())
                {
                    warn!(market = %self.market, "position ledger out of sync after sell: {}", e);
                }
                if let Err(e) = self
                    .portfolio_manager
                    .record_trade(&result, Some(self.strategy_id.clone()))
                    .await
                {
                    error!(market = %self.market, "failed to record trade: {}", e);
                }
                info!(
                    market = %self.market,
                    reason,
                    volume = %result.executed_volume,
                    "sell order executed"
                );
            }
            None => {
                if let Some(err) = self.order_manager.last_error() {
                    error!(market = %self.market, reason, "sell order failed: {}", err);
                }
            }
        }
    }

    fn monitoring_interval(&self) -> Duration {
        Duration::from_secs(self.runtime.lock().unwrap().config().monitoring_interval_secs)
    }
}

async fn load_credentials(credential_path: &str) -> Result<(String, String), String> {
    let password = crate::secrets::load_secret("CREDENTIAL_PASSWORD").map_err(|e| e.to_string())?;

    let raw = tokio::fs::read_to_string(credential_path)
        .await
        .map_err(|e| format!("failed to read credential file {}: {}", credential_path, e))?;
    let blob: CredentialBlob =
        serde_json::from_str(&raw).map_err(|e| format!("malformed credential file: {}", e))?;

    let (access_key, secret_key) =
        credential_store::decrypt(&password, &blob).map_err(|e| e.to_string())?;
    Ok((access_key.to_string(), secret_key.to_string()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv() {
        tracing::warn!("could not load .env file: {}", e);
        tracing::info!("continuing with environment variables from system");
    } else {
        tracing::info!("loaded environment variables from .env file");
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "upbit_trading_bot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("upbit trading bot starting up");

    let app_config = AppConfig::from_env();
    let strategy_config = StrategyConfig::from_env();
    strategy_config
        .validate()
        .map_err(|e| format!("invalid strategy config at startup: {}", e))?;
    let client_config = UpbitClientConfig::from_env();

    info!(market = %app_config.market, "trading market selected");

    let pool = persistence::init_database(&app_config.database_url).await?;
    let trade_store: Arc<dyn TradeStore> =
        Arc::new(persistence::repository::TradeRepository::new(pool.clone()));

    let exchange: Arc<dyn ExchangeClient> = Arc::new(UpbitClient::new(client_config));

    let (access_key, secret_key) = load_credentials(&app_config.credential_path).await?;
    exchange
        .authenticate(&access_key, &secret_key)
        .await
        .map_err(|e| format!("failed to authenticate with exchange: {}", e))?;
    info!("exchange credentials validated");

    let runtime = StrategyRuntime::new(strategy_config);
    let engine = Arc::new(StrategyEngine::new(
        app_config.market.clone(),
        runtime,
        exchange,
        trade_store,
    ));

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to install ctrl_c handler: {}", e);
                return;
            }
            info!("shutdown signal received, draining in-flight work");
            shutdown.store(true, Ordering::Relaxed);
        });
    }

    let monitor_handle = {
        let engine = engine.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let breaker_config = CircuitBreakerConfig {
                max_consecutive_failures: 10,
                initial_retry_delay: Duration::from_secs(1),
                max_retry_delay: Duration::from_secs(60),
            };

            task_runner::run_with_circuit_breaker("strategy-monitor", breaker_config, || {
                let engine = engine.clone();
                let shutdown = shutdown.clone();
                async move {
                    if shutdown.load(Ordering::Relaxed) {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        return Ok(());
                    }
                    engine.tick().await?;
                    tokio::time::sleep(engine.monitoring_interval()).await;
                    Ok(())
                }
            })
            .await;
        })
    };

    while !shutdown.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    monitor_handle.abort();

    pool.close().await;
    info!("upbit trading bot shut down cleanly");

    Ok(())
}
