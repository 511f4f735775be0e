//! Exchange Client (C2) — HTTP transport against the Upbit REST API: request
//! signing, status-to-error classification, and rate-limiter invocation.

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha512};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::domain::entities::account::{AccountBalance, AccountSnapshot};
use crate::domain::entities::order::{Order, OrderResult, OrderSide, OrderState, OrdType};
use crate::domain::entities::ticker::Ticker;
use crate::domain::errors::ExchangeError;
use crate::domain::repositories::exchange_client::ExchangeClient;
use crate::infrastructure::rate_limiter::{RateLimiter, RateLimiterConfig};

pub struct UpbitClientConfig {
    pub base_url: String,
    pub rate_limiter: RateLimiterConfig,
}

impl Default for UpbitClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.upbit.com".to_string(),
            rate_limiter: RateLimiterConfig::default(),
        }
    }
}

pub struct UpbitClient {
    http: reqwest::Client,
    base_url: String,
    rate_limiter: RateLimiter,
    credentials: StdMutex<Option<(Zeroizing<String>, Zeroizing<String>)>>,
}

impl UpbitClient {
    pub fn new(config: UpbitClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url,
            rate_limiter: RateLimiter::new(config.rate_limiter),
            credentials: StdMutex::new(None),
        }
    }

    fn credentials(&self) -> Result<(String, String), ExchangeError> {
        self.credentials
            .lock()
            .unwrap()
            .as_ref()
            .map(|(a, s)| (a.to_string(), s.to_string()))
            .ok_or_else(|| ExchangeError::AuthError("no credentials loaded".to_string()))
    }

    fn build_auth_header(
        &self,
        access_key: &str,
        secret_key: &str,
        params: &[(String, String)],
    ) -> Result<String, ExchangeError> {
        let nonce = Uuid::new_v4().to_string();
        let mut claims = serde_json::Map::new();
        claims.insert("access_key".to_string(), json!(access_key));
        claims.insert("nonce".to_string(), json!(nonce));

        if !params.is_empty() {
            let query_string = serde_urlencoded::to_string(params)
                .map_err(|e| ExchangeError::AuthError(e.to_string()))?;
            let hash = hex::encode(Sha512::digest(query_string.as_bytes()));
            claims.insert("query_hash".to_string(), json!(hash));
            claims.insert("query_hash_alg".to_string(), json!("SHA512"));
        }

        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256);
        let key = jsonwebtoken::EncodingKey::from_secret(secret_key.as_bytes());
        let token = jsonwebtoken::encode(&header, &serde_json::Value::Object(claims), &key)
            .map_err(|e| ExchangeError::AuthError(e.to_string()))?;
        Ok(format!("Bearer {}", token))
    }

    async fn request<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        path: &str,
        params: Vec<(String, String)>,
        authenticated: bool,
    ) -> Result<T, ExchangeError> {
        loop {
            self.rate_limiter.wait_if_needed().await;

            let url = format!("{}{}", self.base_url, path);
            let mut builder = self.http.request(method.clone(), &url);

            if authenticated {
                let (access_key, secret_key) = self.credentials()?;
                let header = self.build_auth_header(&access_key, &secret_key, &params)?;
                builder = builder.header("Authorization", header);
            }

            builder = match method {
                Method::GET | Method::DELETE => builder.query(&params),
                _ => {
                    let map: serde_json::Map<String, serde_json::Value> = params
                        .iter()
                        .cloned()
                        .map(|(k, v)| (k, json!(v)))
                        .collect();
                    builder.json(&serde_json::Value::Object(map))
                }
            };

            let response = match builder.send().await {
                Ok(r) => r,
                Err(e) => {
                    self.rate_limiter.record_failure();
                    if self.rate_limiter.should_retry() {
                        tokio::time::sleep(self.rate_limiter.backoff_delay()).await;
                        continue;
                    }
                    return Err(ExchangeError::Transport(e.to_string()));
                }
            };

            let status = response.status();
            if status.is_success() {
                self.rate_limiter.record_success();
                return response
                    .json::<T>()
                    .await
                    .map_err(|e| ExchangeError::ParseError(e.to_string()));
            }

            let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
            let message = body
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or_default()
                .to_string();
            let code = body
                .get("error")
                .and_then(|e| e.get("name"))
                .and_then(|n| n.as_str())
                .map(|s| s.to_string());

            if status.as_u16() == 429 {
                self.rate_limiter.record_failure();
                if self.rate_limiter.should_retry() {
                    tokio::time::sleep(self.rate_limiter.backoff_delay()).await;
                    continue;
                }
                return Err(ExchangeError::RateLimited);
            }

            if status.is_server_error() {
                self.rate_limiter.record_failure();
                if self.rate_limiter.should_retry() {
                    tokio::time::sleep(self.rate_limiter.backoff_delay()).await;
                    continue;
                }
                return Err(ExchangeError::ServerError {
                    status: status.as_u16(),
                    message,
                });
            }

            self.rate_limiter.record_failure();
            return Err(ExchangeError::ClientError {
                status: status.as_u16(),
                message,
                code,
            });
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpbitAccountRow {
    currency: String,
    balance: Decimal,
    locked: Decimal,
    avg_buy_price: Decimal,
    unit_currency: String,
}

#[derive(Debug, Deserialize)]
struct UpbitTickerRow {
    market: String,
    trade_price: Decimal,
    trade_volume: Decimal,
    trade_timestamp: i64,
    signed_change_rate: Decimal,
}

#[derive(Debug, Deserialize)]
struct UpbitMarketRow {
    market: String,
}

#[derive(Debug, Deserialize)]
struct UpbitOrderResponse {
    uuid: String,
    market: String,
    side: String,
    ord_type: String,
    price: Option<Decimal>,
    volume: Option<Decimal>,
    #[serde(default)]
    executed_volume: Decimal,
    #[serde(default)]
    remaining_volume: Decimal,
    #[serde(default)]
    paid_fee: Decimal,
    #[serde(default)]
    reserved_fee: Decimal,
    #[serde(default)]
    locked: Decimal,
    #[serde(default)]
    trades_count: u32,
    created_at: String,
}

#[derive(Debug, Deserialize)]
struct UpbitOrderStatusResponse {
    state: String,
}

fn parse_side(raw: &str) -> Result<OrderSide, ExchangeError> {
    match raw {
        "bid" => Ok(OrderSide::Bid),
        "ask" => Ok(OrderSide::Ask),
        other => Err(ExchangeError::ParseError(format!("unknown order side: {}", other))),
    }
}

fn parse_ord_type(raw: &str) -> Result<OrdType, ExchangeError> {
    match raw {
        "limit" => Ok(OrdType::Limit),
        "market" => Ok(OrdType::Market),
        "price" => Ok(OrdType::Price),
        other => Err(ExchangeError::ParseError(format!("unknown ord_type: {}", other))),
    }
}

fn parse_state(raw: &str) -> Result<OrderState, ExchangeError> {
    match raw {
        "wait" | "watch" => Ok(OrderState::Wait),
        "done" => Ok(OrderState::Done),
        "cancel" => Ok(OrderState::Cancel),
        other => Err(ExchangeError::ParseError(format!("unknown order state: {}", other))),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ExchangeError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ExchangeError::ParseError(e.to_string()))
}

fn order_side_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Bid => "bid",
        OrderSide::Ask => "ask",
    }
}

fn ord_type_str(ord_type: OrdType) -> &'static str {
    match ord_type {
        OrdType::Limit => "limit",
        OrdType::Market => "market",
        OrdType::Price => "price",
    }
}

#[async_trait]
impl ExchangeClient for UpbitClient {
    async fn authenticate(&self, access_key: &str, secret_key: &str) -> Result<(), ExchangeError> {
        *self.credentials.lock().unwrap() = Some((
            Zeroizing::new(access_key.to_string()),
            Zeroizing::new(secret_key.to_string()),
        ));
        self.get_accounts().await?;
        Ok(())
    }

    async fn get_accounts(&self) -> Result<AccountSnapshot, ExchangeError> {
        let rows: Vec<UpbitAccountRow> = self
            .request(Method::GET, "/v1/accounts", Vec::new(), true)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| AccountBalance {
                currency: r.currency,
                balance: r.balance,
                locked: r.locked,
                avg_buy_price: r.avg_buy_price,
                unit_currency: r.unit_currency,
            })
            .collect())
    }

    async fn get_ticker(&self, market: &str) -> Result<Ticker, ExchangeError> {
        let rows: Vec<UpbitTickerRow> = self
            .request(
                Method::GET,
                "/v1/ticker",
                vec![("markets".to_string(), market.to_string())],
                false,
            )
            .await?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::ParseError("empty ticker response".to_string()))?;

        let timestamp = DateTime::from_timestamp_millis(row.trade_timestamp)
            .ok_or_else(|| ExchangeError::ParseError("invalid trade_timestamp".to_string()))?;

        Ok(Ticker {
            market: row.market,
            trade_price: row.trade_price,
            trade_volume: row.trade_volume,
            timestamp,
            change_rate: row.signed_change_rate,
        })
    }

    async fn get_markets(&self) -> Result<Vec<String>, ExchangeError> {
        let rows: Vec<UpbitMarketRow> = self
            .request(Method::GET, "/v1/market/all", Vec::new(), false)
            .await?;
        Ok(rows.into_iter().map(|r| r.market).collect())
    }

    async fn place_order(&self, order: Order) -> Result<OrderResult, ExchangeError> {
        let mut params = vec![
            ("market".to_string(), order.market.clone()),
            ("side".to_string(), order_side_str(order.side).to_string()),
            ("ord_type".to_string(), ord_type_str(order.ord_type).to_string()),
            ("identifier".to_string(), order.identifier.clone()),
        ];
        if let Some(price) = order.price {
            params.push(("price".to_string(), price.to_string()));
        }
        if let Some(volume) = order.volume {
            params.push(("volume".to_string(), volume.to_string()));
        }

        let response: UpbitOrderResponse = self
            .request(Method::POST, "/v1/orders", params, true)
            .await?;

        Ok(OrderResult {
            order_id: response.uuid,
            market: response.market,
            side: parse_side(&response.side)?,
            ord_type: parse_ord_type(&response.ord_type)?,
            price: response.price,
            volume: response.volume,
            executed_volume: response.executed_volume,
            remaining_volume: response.remaining_volume,
            paid_fee: response.paid_fee,
            reserved_fee: response.reserved_fee,
            locked: response.locked,
            trades_count: response.trades_count,
            created_at: parse_timestamp(&response.created_at)?,
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExchangeError> {
        let _: serde_json::Value = self
            .request(
                Method::DELETE,
                "/v1/order",
                vec![("uuid".to_string(), order_id.to_string())],
                true,
            )
            .await?;
        Ok(())
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderState, ExchangeError> {
        let response: UpbitOrderStatusResponse = self
            .request(
                Method::GET,
                "/v1/order",
                vec![("uuid".to_string(), order_id.to_string())],
                true,
            )
            .await?;
        parse_state(&response.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_header_is_well_formed() {
        let client = UpbitClient::new(UpbitClientConfig::default());
        let header = client
            .build_auth_header("access", "secret", &[])
            .unwrap();

        assert!(header.starts_with("Bearer "));
        let token = &header["Bearer ".len()..];
        assert!(!token.contains(' '));
        assert_eq!(token.matches('.').count(), 2);
        assert!(token.split('.').all(|part| !part.is_empty()));
    }

    #[test]
    fn auth_header_includes_query_hash_when_params_present() {
        let client = UpbitClient::new(UpbitClientConfig::default());
        let with_params = client
            .build_auth_header("access", "secret", &[("market".to_string(), "KRW-BTC".to_string())])
            .unwrap();
        let without_params = client.build_auth_header("access", "secret", &[]).unwrap();

        assert_ne!(with_params, without_params);
    }

    #[test]
    fn side_and_ord_type_round_trip() {
        assert_eq!(parse_side(order_side_str(OrderSide::Bid)).unwrap(), OrderSide::Bid);
        assert_eq!(parse_side(order_side_str(OrderSide::Ask)).unwrap(), OrderSide::Ask);
        assert_eq!(parse_ord_type(ord_type_str(OrdType::Limit)).unwrap(), OrdType::Limit);
        assert_eq!(parse_ord_type(ord_type_str(OrdType::Market)).unwrap(), OrdType::Market);
        assert_eq!(parse_ord_type(ord_type_str(OrdType::Price)).unwrap(), OrdType::Price);
    }

    #[test]
    fn parse_state_maps_known_states() {
        assert_eq!(parse_state("wait").unwrap(), OrderState::Wait);
        assert_eq!(parse_state("done").unwrap(), OrderState::Done);
        assert_eq!(parse_state("cancel").unwrap(), OrderState::Cancel);
        assert!(parse_state("unknown").is_err());
    }
}
