//! Application-level configuration bootstrapped from the environment (§10).
//!
//! Strategy parameters live in `domain::services::strategy_config`; this
//! module covers everything around them: which market to trade, the
//! monitoring cadence, and the exchange client's base URL.

use crate::infrastructure::rate_limiter::RateLimiterConfig;
use crate::infrastructure::upbit_client::UpbitClientConfig;

/// Top-level bot configuration, assembled once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub market: String,
    pub database_url: String,
    pub credential_path: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let market = std::env::var("UPBIT_MARKET").unwrap_or_else(|_| "KRW-BTC".to_string());
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://data/upbit.db".to_string());
        let credential_path = std::env::var("CREDENTIAL_PATH")
            .unwrap_or_else(|_| "data/credentials.json".to_string());

        Self {
            market,
            database_url,
            credential_path,
        }
    }
}

impl UpbitClientConfig {
    /// Reads the exchange base URL and rate-limit settings from the
    /// environment, clamping out-of-range values and logging a warning
    /// rather than failing startup (§4.9's `from_env` convention).
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("UPBIT_BASE_URL").unwrap_or_else(|_| "https://api.upbit.com".to_string());

        let max_requests_per_second = std::env::var("UPBIT_MAX_REQUESTS_PER_SECOND")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .map(|v| clamp_and_warn(v, 0.1, 30.0, "UPBIT_MAX_REQUESTS_PER_SECOND"))
            .unwrap_or(8.0);

        let max_retries = std::env::var("UPBIT_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .map(|v| v.clamp(0, 10))
            .unwrap_or(3);

        Self {
            base_url,
            rate_limiter: RateLimiterConfig {
                max_requests_per_second,
                max_retries,
            },
        }
    }
}

fn clamp_and_warn(value: f64, min: f64, max: f64, field: &str) -> f64 {
    if value < min || value > max {
        tracing::warn!(
            "{} = {} out of range [{}, {}], clamping",
            field,
            value,
            min,
            max
        );
        value.clamp(min, max)
    } else {
        value
    }
}
