//! Order Manager (C6) — signal→order translation, pre-trade balance
//! validation, bounded retry with backoff, and in-memory lifecycle tracking.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::domain::entities::account::AccountSnapshot;
use crate::domain::entities::ledger::TradeRecord;
use crate::domain::entities::order::{
    Order, OrderResult, OrderSide, OrderState, OrderStatus, OrdType, SignalAction, TradingSignal,
};
use crate::domain::errors::{ExchangeError, OrderError, OrderValidationResult};
use crate::domain::repositories::exchange_client::ExchangeClient;
use crate::domain::repositories::trade_store::TradeStore;
use std::sync::Arc;

/// Confidence above this dispatches a market order instead of a limit order.
/// A dispatch hint, not a measure of exchange-side reliability.
const MARKET_ORDER_CONFIDENCE_THRESHOLD: f64 = 0.8;

const RETRY_DELAY_PATTERN_SECS: [f64; 3] = [1.0, 2.0, 4.0];

fn retry_delay_secs(attempt_index: usize) -> f64 {
    RETRY_DELAY_PATTERN_SECS
        .get(attempt_index)
        .copied()
        .unwrap_or(*RETRY_DELAY_PATTERN_SECS.last().unwrap())
}

/// Translates a `TradingSignal` into an `Order` per §4.6's dispatch rule.
pub fn build_order(signal: &TradingSignal) -> Result<Order, OrderError> {
    let identifier = signal.identifier();
    let is_market = signal.confidence > MARKET_ORDER_CONFIDENCE_THRESHOLD;

    match (signal.action, is_market) {
        (SignalAction::Buy, true) => Order::new(
            signal.market.clone(),
            OrderSide::Bid,
            OrdType::Price,
            Some(signal.price * signal.volume),
            None,
            identifier,
        ),
        (SignalAction::Buy, false) => Order::new(
            signal.market.clone(),
            OrderSide::Bid,
            OrdType::Limit,
            Some(signal.price),
            Some(signal.volume),
            identifier,
        ),
        (SignalAction::Sell, true) => Order::new(
            signal.market.clone(),
            OrderSide::Ask,
            OrdType::Market,
            None,
            Some(signal.volume),
            identifier,
        ),
        (SignalAction::Sell, false) => Order::new(
            signal.market.clone(),
            OrderSide::Ask,
            OrdType::Limit,
            Some(signal.price),
            Some(signal.volume),
            identifier,
        ),
    }
}

/// Validates a candidate order against an account snapshot. Pure function of
/// its inputs — repeated calls with the same inputs return identical results.
pub fn validate_order(order: &Order, accounts: &AccountSnapshot) -> OrderValidationResult {
    match order.side {
        OrderSide::Bid => {
            let required = match order.ord_type {
                OrdType::Price => order.price.unwrap_or(Decimal::ZERO),
                _ => order.price.unwrap_or(Decimal::ZERO) * order.volume.unwrap_or(Decimal::ZERO),
            };
            let krw = accounts.iter().find(|a| a.currency == "KRW");
            match krw {
                None => OrderValidationResult::rejected("no KRW balance row in accounts"),
                Some(balance) => {
                    let available = balance.available();
                    if available >= required {
                        OrderValidationResult::ok(required, available)
                    } else {
                        OrderValidationResult::insufficient(
                            format!(
                                "insufficient KRW balance: required {}, available {}",
                                required, available
                            ),
                            required,
                            available,
                        )
                    }
                }
            }
        }
        OrderSide::Ask => {
            let required = order.volume.unwrap_or(Decimal::ZERO);
            let base_currency = order.market.split('-').nth(1).unwrap_or("");
            let row = accounts.iter().find(|a| a.currency == base_currency);
            match row {
                None => OrderValidationResult::rejected(format!(
                    "no {} balance row in accounts",
                    base_currency
                )),
                Some(balance) => {
                    let available = balance.available();
                    if available >= required {
                        OrderValidationResult::ok(required, available)
                    } else {
                        OrderValidationResult::insufficient(
                            format!(
                                "insufficient {} balance: required {}, available {}",
                                base_currency, required, available
                            ),
                            required,
                            available,
                        )
                    }
                }
            }
        }
    }
}

pub struct OrderManager {
    exchange: Arc<dyn ExchangeClient>,
    trade_store: Arc<dyn TradeStore>,
    active_orders: Mutex<HashMap<String, OrderStatus>>,
    last_error: StdMutex<Option<ExchangeError>>,
    max_retries: u32,
}

impl OrderManager {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        trade_store: Arc<dyn TradeStore>,
        max_retries: u32,
    ) -> Self {
        Self {
            exchange,
            trade_store,
            active_orders: Mutex::new(HashMap::new()),
            last_error: StdMutex::new(None),
            max_retries,
        }
    }

    pub fn last_error(&self) -> Option<ExchangeError> {
        self.last_error.lock().unwrap().clone()
    }

    pub async fn active_order_count(&self) -> usize {
        self.active_orders.lock().await.len()
    }

    /// The retry core. Validates first (no exchange call on rejection), then
    /// attempts at most `1 + max_retries` placements, retrying only on
    /// `RateLimited`/`ServerError`/`Transport`.
    pub async fn execute_order(&self, order: Order) -> Option<OrderResult> {
        let accounts = match self.exchange.get_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                *self.last_error.lock().unwrap() = Some(e);
                return None;
            }
        };

        let validation = validate_order(&order, &accounts);
        if !validation.is_valid {
            return None;
        }

        let attempts = 1 + self.max_retries as usize;
        for attempt in 0..attempts {
            match self.exchange.place_order(order.clone()).await {
                Ok(result) => {
                    let trade = TradeRecord {
                        market: result.market.clone(),
                        side: result.side,
                        price: result.price.unwrap_or(Decimal::ZERO),
                        volume: result.executed_volume,
                        fee: result.paid_fee,
                        timestamp: Utc::now(),
                        strategy_id: None,
                    };
                    if let Err(e) = self.trade_store.insert_trade(&trade).await {
                        tracing::error!("ledger append failed after a confirmed fill: {}", e);
                    }

                    let status = OrderStatus {
                        order_id: result.order_id.clone(),
                        state: OrderState::Wait,
                        updated_at: Utc::now(),
                    };
                    self.active_orders
                        .lock()
                        .await
                        .insert(result.order_id.clone(), status);

                    return Some(result);
                }
                Err(e) => {
                    *self.last_error.lock().unwrap() = Some(e.clone());
                    let is_last_attempt = attempt + 1 == attempts;
                    if is_last_attempt || !e.is_retryable() {
                        return None;
                    }
                    tokio::time::sleep(Duration::from_secs_f64(retry_delay_secs(attempt))).await;
                }
            }
        }

        None
    }

    /// Polls `get_order_status` for each active entry; updates the cached
    /// copy on change and drops it from the active map once terminal.
    pub async fn track_orders(&self) {
        let ids: Vec<String> = self.active_orders.lock().await.keys().cloned().collect();

        for id in ids {
            let polled = match self.exchange.get_order_status(&id).await {
                Ok(state) => state,
                Err(e) => {
                    *self.last_error.lock().unwrap() = Some(e);
                    continue;
                }
            };

            let mut active = self.active_orders.lock().await;
            if let Some(cached) = active.get_mut(&id) {
                if cached.state != polled {
                    cached.state = polled;
                    cached.updated_at = Utc::now();
                }
                if polled.is_terminal() {
                    active.remove(&id);
                }
            }
        }
    }

    /// Calls the exchange; on success marks the cached entry cancelled.
    pub async fn cancel_order(&self, order_id: &str) -> Result<(), OrderError> {
        self.exchange.cancel_order(order_id).await?;
        if let Some(entry) = self.active_orders.lock().await.get_mut(order_id) {
            entry.state = OrderState::Cancel;
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    /// Removes terminal-state entries older than `max_age`.
    pub async fn cleanup_completed_orders(&self, max_age: Duration) {
        let now = Utc::now();
        self.active_orders.lock().await.retain(|_, status| {
            !(status.state.is_terminal()
                && (now - status.updated_at).to_std().unwrap_or(Duration::ZERO) > max_age)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::account::AccountBalance;
    use crate::domain::errors::OrderError as DomainOrderError;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockExchange {
        accounts: AccountSnapshot,
        failures_then_success: AtomicU32,
        failure_kind: ExchangeError,
        place_order_calls: StdMutex<u32>,
    }

    #[async_trait]
    impl ExchangeClient for MockExchange {
        async fn authenticate(&self, _access_key: &str, _secret_key: &str) -> Result<(), ExchangeError> {
            Ok(())
        }

        async fn get_accounts(&self) -> Result<AccountSnapshot, ExchangeError> {
            Ok(self.accounts.clone())
        }

        async fn get_ticker(
            &self,
            _market: &str,
        ) -> Result<crate::domain::entities::ticker::Ticker, ExchangeError> {
            unimplemented!()
        }

        async fn get_markets(&self) -> Result<Vec<String>, ExchangeError> {
            unimplemented!()
        }

        async fn place_order(&self, order: Order) -> Result<OrderResult, ExchangeError> {
            *self.place_order_calls.lock().unwrap() += 1;
            let remaining = self.failures_then_success.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_then_success.fetch_sub(1, Ordering::SeqCst);
                return Err(self.failure_kind.clone());
            }
            Ok(OrderResult {
                order_id: "order-1".to_string(),
                market: order.market,
                side: order.side,
                ord_type: order.ord_type,
                price: order.price,
                volume: order.volume,
                executed_volume: order.volume.unwrap_or(dec!(1)),
                remaining_volume: Decimal::ZERO,
                paid_fee: dec!(0.5),
                reserved_fee: Decimal::ZERO,
                locked: Decimal::ZERO,
                trades_count: 1,
                created_at: Utc::now(),
            })
        }

        async fn cancel_order(&self, _order_id: &str) -> Result<(), ExchangeError> {
            Ok(())
        }

        async fn get_order_status(&self, _order_id: &str) -> Result<OrderState, ExchangeError> {
            Ok(OrderState::Done)
        }
    }

    struct MockTradeStore {
        inserted: StdMutex<Vec<TradeRecord>>,
    }

    #[async_trait]
    impl TradeStore for MockTradeStore {
        async fn insert_trade(&self, trade: &TradeRecord) -> Result<(), DomainOrderError> {
            self.inserted.lock().unwrap().push(trade.clone());
            Ok(())
        }

        async fn insert_portfolio_snapshot(
            &self,
            _snapshot: &crate::domain::entities::ledger::PortfolioSnapshotRecord,
        ) -> Result<(), DomainOrderError> {
            Ok(())
        }

        async fn get_trades(
            &self,
            _query: crate::domain::entities::ledger::TradeQuery,
        ) -> Result<Vec<TradeRecord>, DomainOrderError> {
            Ok(self.inserted.lock().unwrap().clone())
        }

        async fn get_latest_portfolio_snapshot(
            &self,
        ) -> Result<Option<crate::domain::entities::ledger::PortfolioSnapshotRecord>, DomainOrderError>
        {
            Ok(None)
        }
    }

    fn krw_accounts(available: Decimal) -> AccountSnapshot {
        vec![AccountBalance {
            currency: "KRW".to_string(),
            balance: available,
            locked: Decimal::ZERO,
            avg_buy_price: Decimal::ZERO,
            unit_currency: "KRW".to_string(),
        }]
    }

    fn bid_order() -> Order {
        Order::new(
            "KRW-BTC",
            OrderSide::Bid,
            OrdType::Limit,
            Some(dec!(100)),
            Some(dec!(1)),
            "strat_1",
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn e2_retry_success_after_two_failures() {
        let exchange = Arc::new(MockExchange {
            accounts: krw_accounts(dec!(1000)),
            failures_then_success: AtomicU32::new(2),
            failure_kind: ExchangeError::RateLimited,
            place_order_calls: StdMutex::new(0),
        });
        let store = Arc::new(MockTradeStore {
            inserted: StdMutex::new(Vec::new()),
        });
        let manager = OrderManager::new(exchange.clone(), store.clone(), 3);

        let result = manager.execute_order(bid_order()).await;

        assert!(result.is_some());
        assert_eq!(*exchange.place_order_calls.lock().unwrap(), 3);
        assert_eq!(store.inserted.lock().unwrap().len(), 1);
        assert_eq!(manager.active_order_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn e3_retry_exhaustion() {
        let exchange = Arc::new(MockExchange {
            accounts: krw_accounts(dec!(1000)),
            failures_then_success: AtomicU32::new(100),
            failure_kind: ExchangeError::ServerError {
                status: 500,
                message: "boom".to_string(),
            },
            place_order_calls: StdMutex::new(0),
        });
        let store = Arc::new(MockTradeStore {
            inserted: StdMutex::new(Vec::new()),
        });
        let manager = OrderManager::new(exchange.clone(), store.clone(), 3);

        let result = manager.execute_order(bid_order()).await;

        assert!(result.is_none());
        assert_eq!(*exchange.place_order_calls.lock().unwrap(), 4);
        assert_eq!(store.inserted.lock().unwrap().len(), 0);
        assert_eq!(manager.active_order_count().await, 0);
    }

    #[tokio::test]
    async fn validation_rejects_without_calling_exchange() {
        let exchange = Arc::new(MockExchange {
            accounts: krw_accounts(dec!(1)),
            failures_then_success: AtomicU32::new(0),
            failure_kind: ExchangeError::RateLimited,
            place_order_calls: StdMutex::new(0),
        });
        let store = Arc::new(MockTradeStore {
            inserted: StdMutex::new(Vec::new()),
        });
        let manager = OrderManager::new(exchange.clone(), store, 3);

        let result = manager.execute_order(bid_order()).await;

        assert!(result.is_none());
        assert_eq!(*exchange.place_order_calls.lock().unwrap(), 0);
    }

    #[test]
    fn build_order_dispatches_market_above_confidence_threshold() {
        let signal = TradingSignal {
            market: "KRW-BTC".to_string(),
            action: SignalAction::Buy,
            confidence: 0.95,
            price: dec!(50000),
            volume: dec!(0.01),
            strategy_id: "strat".to_string(),
            timestamp: Utc::now(),
        };
        let order = build_order(&signal).unwrap();
        assert_eq!(order.ord_type, OrdType::Price);
        assert_eq!(order.side, OrderSide::Bid);
    }

    #[test]
    fn build_order_dispatches_limit_below_confidence_threshold() {
        let signal = TradingSignal {
            market: "KRW-BTC".to_string(),
            action: SignalAction::Sell,
            confidence: 0.5,
            price: dec!(50000),
            volume: dec!(0.01),
            strategy_id: "strat".to_string(),
            timestamp: Utc::now(),
        };
        let order = build_order(&signal).unwrap();
        assert_eq!(order.ord_type, OrdType::Limit);
        assert_eq!(order.side, OrderSide::Ask);
    }

    #[test]
    fn validate_order_is_pure() {
        let accounts = krw_accounts(dec!(500));
        let order = bid_order();
        assert_eq!(validate_order(&order, &accounts), validate_order(&order, &accounts));
    }

    #[test]
    fn validate_order_flags_missing_currency_row() {
        let order = Order::new(
            "KRW-BTC",
            OrderSide::Ask,
            OrdType::Market,
            None,
            Some(dec!(1)),
            "strat_1",
        )
        .unwrap();
        let result = validate_order(&order, &krw_accounts(dec!(1000)));
        assert!(!result.is_valid);
    }
}
