//! `ExchangeClient` — the capability set the order manager (C6) and the
//! strategy runtime consult, independent of the HTTP transport that implements
//! it (C2, under `infrastructure::upbit_client`).
//!
//! Decoupling the trait from the concrete client lets C6/C9 be unit tested
//! against a mock without touching the network.

use async_trait::async_trait;

use crate::domain::entities::account::AccountSnapshot;
use crate::domain::entities::order::{Order, OrderResult, OrderState};
use crate::domain::entities::ticker::Ticker;
use crate::domain::errors::ExchangeError;

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Stores the credential pair in memory and validates it with one
    /// `get_accounts` call.
    async fn authenticate(&self, access_key: &str, secret_key: &str)
        -> Result<(), ExchangeError>;

    async fn get_accounts(&self) -> Result<AccountSnapshot, ExchangeError>;

    async fn get_ticker(&self, market: &str) -> Result<Ticker, ExchangeError>;

    async fn get_markets(&self) -> Result<Vec<String>, ExchangeError>;

    async fn place_order(&self, order: Order) -> Result<OrderResult, ExchangeError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExchangeError>;

    async fn get_order_status(&self, order_id: &str) -> Result<OrderState, ExchangeError>;
}
