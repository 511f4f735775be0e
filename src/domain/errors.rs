//! Error taxonomy for the trading core.
//!
//! Each domain concern gets its own `thiserror`-derived enum rather than a single
//! flat error; `anyhow` is reserved for `main()`.

use thiserror::Error;

/// Errors raised by the position manager (C3).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PositionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("a position already exists for {0}")]
    DuplicatePosition(String),

    #[error("no position exists for {0}")]
    NoSuchPosition(String),

    #[error("cannot sell {sell_qty} of {market}: only {available} held")]
    OversellError {
        market: String,
        sell_qty: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },
}

/// Errors raised by the partial-sell ladder and trailing-stop state machines (C4/C5).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StrategyError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Errors raised by the strategy config bundle (C9).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: String,
        min: String,
        max: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Errors surfaced by the exchange client (C2).
#[derive(Debug, Error, Clone)]
pub enum ExchangeError {
    #[error("rate limited")]
    RateLimited,

    #[error("server error {status}: {message}")]
    ServerError { status: u16, message: String },

    #[error("client error {status} ({code:?}): {message}")]
    ClientError {
        status: u16,
        message: String,
        code: Option<String>,
    },

    #[error("authentication error: {0}")]
    AuthError(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not parse response: {0}")]
    ParseError(String),
}

impl ExchangeError {
    /// Whether C1/C2/C6 should retry a request that failed with this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::RateLimited
                | ExchangeError::ServerError { .. }
                | ExchangeError::Transport(_)
        )
    }
}

/// Errors raised while encrypting/decrypting the credential blob.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CredentialError {
    #[error("failed to decrypt credential blob: wrong password or corrupted data")]
    DecryptError,

    #[error("malformed credential blob: {0}")]
    MalformedBlob(String),
}

/// Errors raised by the order manager (C6) and the trade store (C8).
#[derive(Debug, Error, Clone)]
pub enum OrderError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("ledger append failed: {0}")]
    StoreError(String),
}

/// Result of a balance-validation pass ahead of placing an order (C6).
#[derive(Debug, Clone, PartialEq)]
pub struct OrderValidationResult {
    pub is_valid: bool,
    pub error_message: Option<String>,
    pub required_balance: Option<rust_decimal::Decimal>,
    pub available_balance: Option<rust_decimal::Decimal>,
}

impl OrderValidationResult {
    pub fn ok(required: rust_decimal::Decimal, available: rust_decimal::Decimal) -> Self {
        Self {
            is_valid: true,
            error_message: None,
            required_balance: Some(required),
            available_balance: Some(available),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error_message: Some(message.into()),
            required_balance: None,
            available_balance: None,
        }
    }

    pub fn insufficient(
        message: impl Into<String>,
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    ) -> Self {
        Self {
            is_valid: false,
            error_message: Some(message.into()),
            required_balance: Some(required),
            available_balance: Some(available),
        }
    }
}
