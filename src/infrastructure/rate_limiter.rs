//! Rate Limiter (C1) — smooths outbound request rate and tracks the
//! consecutive-failure count that drives the exchange client's backoff.
//!
//! This is a hand-rolled service, not a generic token-bucket: the exact
//! backoff formula below is the contract, so `governor` (used elsewhere in
//! this crate for coarse ingress shaping) is the wrong tool for it.

use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct RateLimiterConfig {
    pub max_requests_per_second: f64,
    pub max_retries: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests_per_second: 8.0,
            max_retries: 3,
        }
    }
}

struct State {
    last_request_time: Option<Instant>,
    consecutive_failures: u32,
}

pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<State>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                last_request_time: None,
                consecutive_failures: 0,
            }),
        }
    }

    /// Enforces a minimum inter-request interval, not a sliding window.
    pub async fn wait_if_needed(&self) {
        let min_interval = Duration::from_secs_f64(1.0 / self.config.max_requests_per_second);
        let sleep_for = {
            let mut state = self.state.lock().unwrap();
            let now = Instant::now();
            let sleep_for = match state.last_request_time {
                Some(last) => {
                    let elapsed = now.duration_since(last);
                    min_interval.saturating_sub(elapsed)
                }
                None => Duration::ZERO,
            };
            state.last_request_time = Some(now + sleep_for);
            sleep_for
        };

        if !sleep_for.is_zero() {
            tokio::time::sleep(sleep_for).await;
        }
    }

    /// `0` with no failures; otherwise `min(2^(consecutive_failures-1), 60)`.
    pub fn backoff_delay(&self) -> Duration {
        let failures = self.state.lock().unwrap().consecutive_failures;
        if failures == 0 {
            return Duration::ZERO;
        }
        let seconds = 2u64.saturating_pow(failures - 1).min(60);
        Duration::from_secs(seconds)
    }

    pub fn record_success(&self) {
        self.state.lock().unwrap().consecutive_failures = 0;
    }

    pub fn record_failure(&self) {
        self.state.lock().unwrap().consecutive_failures += 1;
    }

    pub fn should_retry(&self) -> bool {
        self.state.lock().unwrap().consecutive_failures < self.config.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_follows_the_doubling_sequence() {
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        assert_eq!(limiter.backoff_delay(), Duration::ZERO);

        for expected in [1u64, 2, 4, 8, 16, 32, 60, 60] {
            limiter.record_failure();
            assert_eq!(limiter.backoff_delay(), Duration::from_secs(expected));
        }
    }

    #[test]
    fn record_success_resets_failure_count() {
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        limiter.record_failure();
        limiter.record_failure();
        limiter.record_success();
        assert_eq!(limiter.backoff_delay(), Duration::ZERO);
    }

    #[test]
    fn should_retry_respects_max_retries() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_requests_per_second: 8.0,
            max_retries: 2,
        });
        assert!(limiter.should_retry());
        limiter.record_failure();
        assert!(limiter.should_retry());
        limiter.record_failure();
        assert!(!limiter.should_retry());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_if_needed_enforces_minimum_interval() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_requests_per_second: 10.0,
            max_retries: 3,
        });

        let start = tokio::time::Instant::now();
        limiter.wait_if_needed().await;
        limiter.wait_if_needed().await;
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(100));
    }
}
