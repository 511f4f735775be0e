//! Strategy Config (C9) — a validated parameter bundle applied atomically to
//! a running strategy. Dynamic lookup by string key is a convenience at the
//! env-bootstrap boundary (`StrategyConfig::from_env`), not the contract: the
//! runtime `reconfigure` path is strictly typed and all-or-nothing.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::errors::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Percent, expected negative: e.g. `-3.0`.
    pub stop_loss_level: Decimal,
    /// Percent, expected negative: e.g. `-1.0`.
    pub averaging_trigger: Decimal,
    /// Percent, positive: e.g. `1.0`.
    pub target_profit: Decimal,
    pub monitoring_interval_secs: u64,
    pub max_averaging_count: u32,
    pub daily_loss_limit: Decimal,
    pub min_balance: Decimal,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            stop_loss_level: dec!(-3.0),
            averaging_trigger: dec!(-1.0),
            target_profit: dec!(1.0),
            monitoring_interval_secs: 15,
            max_averaging_count: 2,
            daily_loss_limit: dec!(-5.0),
            min_balance: dec!(10000),
        }
    }
}

fn in_range(value: Decimal, min: Decimal, max: Decimal) -> bool {
    value >= min && value <= max
}

impl StrategyConfig {
    /// Validates against the §3 bounds. All-or-nothing: the first violation
    /// found is reported, nothing is partially applied.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !in_range(self.stop_loss_level, dec!(-5), dec!(-1)) {
            return Err(ConfigError::OutOfRange {
                field: "stop_loss_level",
                value: self.stop_loss_level.to_string(),
                min: "-5".into(),
                max: "-1".into(),
            });
        }
        if !in_range(self.averaging_trigger, dec!(-2), dec!(-0.5)) {
            return Err(ConfigError::OutOfRange {
                field: "averaging_trigger",
                value: self.averaging_trigger.to_string(),
                min: "-2".into(),
                max: "-0.5".into(),
            });
        }
        if !in_range(self.target_profit, dec!(0.2), dec!(2.0)) {
            return Err(ConfigError::OutOfRange {
                field: "target_profit",
                value: self.target_profit.to_string(),
                min: "0.2".into(),
                max: "2.0".into(),
            });
        }
        if !(5..=60).contains(&self.monitoring_interval_secs) {
            return Err(ConfigError::OutOfRange {
                field: "monitoring_interval",
                value: self.monitoring_interval_secs.to_string(),
                min: "5".into(),
                max: "60".into(),
            });
        }
        if !(1..=3).contains(&self.max_averaging_count) {
            return Err(ConfigError::OutOfRange {
                field: "max_averaging_count",
                value: self.max_averaging_count.to_string(),
                min: "1".into(),
                max: "3".into(),
            });
        }
        Ok(())
    }

    /// Clamp-and-warn bootstrap from environment variables. Distinct from
    /// `reconfigure`'s strict validation: a bad env value is nudged to the
    /// nearest bound and logged rather than aborting startup.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("STRATEGY_STOP_LOSS_LEVEL") {
            if let Ok(parsed) = value.parse::<Decimal>() {
                config.stop_loss_level = clamp_and_warn(parsed, dec!(-5), dec!(-1), "STRATEGY_STOP_LOSS_LEVEL");
            }
        }
        if let Ok(value) = std::env::var("STRATEGY_AVERAGING_TRIGGER") {
            if let Ok(parsed) = value.parse::<Decimal>() {
                config.averaging_trigger =
                    clamp_and_warn(parsed, dec!(-2), dec!(-0.5), "STRATEGY_AVERAGING_TRIGGER");
            }
        }
        if let Ok(value) = std::env::var("STRATEGY_TARGET_PROFIT") {
            if let Ok(parsed) = value.parse::<Decimal>() {
                config.target_profit = clamp_and_warn(parsed, dec!(0.2), dec!(2.0), "STRATEGY_TARGET_PROFIT");
            }
        }
        if let Ok(value) = std::env::var("STRATEGY_MONITORING_INTERVAL") {
            if let Ok(parsed) = value.parse::<u64>() {
                config.monitoring_interval_secs = parsed.clamp(5, 60);
            }
        }
        if let Ok(value) = std::env::var("STRATEGY_MAX_AVERAGING_COUNT") {
            if let Ok(parsed) = value.parse::<u32>() {
                config.max_averaging_count = parsed.clamp(1, 3);
            }
        }
        if let Ok(value) = std::env::var("STRATEGY_DAILY_LOSS_LIMIT") {
            if let Ok(parsed) = value.parse::<Decimal>() {
                config.daily_loss_limit = parsed;
            }
        }
        if let Ok(value) = std::env::var("STRATEGY_MIN_BALANCE") {
            if let Ok(parsed) = value.parse::<Decimal>() {
                config.min_balance = parsed;
            }
        }

        config
    }
}

fn clamp_and_warn(value: Decimal, min: Decimal, max: Decimal, field: &str) -> Decimal {
    let clamped = value.clamp(min, max);
    if clamped != value {
        tracing::warn!(
            "{} = {} out of range [{}, {}], clamped to {}",
            field,
            value,
            min,
            max,
            clamped
        );
    }
    clamped
}

/// State preserved across a successful `reconfigure` call: position,
/// consecutive losses, daily P&L, suspension. The running parameters are
/// swapped; this state is carried over untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyRuntimeState {
    pub consecutive_losses: u32,
    pub daily_pnl: Decimal,
    pub suspended: bool,
}

/// Holds the live config plus runtime state, and applies reconfiguration
/// atomically: validate first, swap only on success.
#[derive(Debug, Clone)]
pub struct StrategyRuntime {
    config: StrategyConfig,
    state: StrategyRuntimeState,
}

impl StrategyRuntime {
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            config,
            state: StrategyRuntimeState::default(),
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn state(&self) -> &StrategyRuntimeState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut StrategyRuntimeState {
        &mut self.state
    }

    /// Rejected bundles leave `self.config` untouched and surface the error.
    pub fn reconfigure(&mut self, new_config: StrategyConfig) -> Result<(), ConfigError> {
        new_config.validate()?;
        self.config = new_config;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(StrategyConfig::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_stop_loss_is_rejected() {
        let mut config = StrategyConfig::default();
        config.stop_loss_level = dec!(-10);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "stop_loss_level", .. })
        ));
    }

    #[test]
    fn reconfigure_is_atomic_on_rejection() {
        let mut runtime = StrategyRuntime::new(StrategyConfig::default());
        let original = runtime.config().clone();

        let mut bad_config = StrategyConfig::default();
        bad_config.target_profit = dec!(5.0);
        assert!(runtime.reconfigure(bad_config).is_err());

        assert_eq!(runtime.config(), &original);
    }

    #[test]
    fn reconfigure_preserves_runtime_state() {
        let mut runtime = StrategyRuntime::new(StrategyConfig::default());
        runtime.state_mut().consecutive_losses = 2;
        runtime.state_mut().suspended = true;

        let mut new_config = StrategyConfig::default();
        new_config.monitoring_interval_secs = 30;
        runtime.reconfigure(new_config).unwrap();

        assert_eq!(runtime.state().consecutive_losses, 2);
        assert!(runtime.state().suspended);
        assert_eq!(runtime.config().monitoring_interval_secs, 30);
    }

    #[test]
    fn from_env_clamps_out_of_range_values() {
        std::env::set_var("STRATEGY_TARGET_PROFIT", "9.9");
        let config = StrategyConfig::from_env();
        assert_eq!(config.target_profit, dec!(2.0));
        std::env::remove_var("STRATEGY_TARGET_PROFIT");
    }
}
