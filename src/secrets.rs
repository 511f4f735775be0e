//! Secure secret management.
//!
//! Loads the password that unlocks the on-disk credential blob (see
//! `infrastructure::credential_store`) from the environment, wrapped in
//! `Zeroizing` so it is wiped from memory on drop.

use std::env;
use tracing::warn;
use zeroize::Zeroizing;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("environment variable not set: {0}")]
    EnvVarNotSet(String),

    #[error("secret validation failed: {0}")]
    ValidationFailed(String),
}

/// Loads a secret from an environment variable, warning since this is the
/// least secure source available to this crate.
pub fn load_secret(env_var_name: &str) -> Result<Zeroizing<String>, SecretError> {
    warn!("loading secret from environment variable: {}", env_var_name);
    env::var(env_var_name)
        .map(Zeroizing::new)
        .map_err(|_| SecretError::EnvVarNotSet(env_var_name.to_string()))
}

/// Validates that a secret meets minimum strength requirements before use.
pub fn validate_secret_strength(secret: &str, min_length: usize) -> Result<(), SecretError> {
    if secret.len() < min_length {
        return Err(SecretError::ValidationFailed(format!(
            "secret too short: {} characters (minimum: {})",
            secret.len(),
            min_length
        )));
    }

    let weak_patterns = ["test", "demo", "example", "placeholder", "changeme", "12345"];
    let secret_lower = secret.to_lowercase();
    for pattern in &weak_patterns {
        if secret_lower.contains(pattern) {
            return Err(SecretError::ValidationFailed(format!(
                "secret contains weak pattern: {}",
                pattern
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_secret_strength_rejects_short_secrets() {
        assert!(validate_secret_strength("short", 32).is_err());
    }

    #[test]
    fn validate_secret_strength_rejects_weak_patterns() {
        assert!(validate_secret_strength("test_api_key_1234567890123456789", 32).is_err());
    }

    #[test]
    fn validate_secret_strength_accepts_strong_secrets() {
        let strong = "a".repeat(32);
        assert!(validate_secret_strength(&strong, 32).is_ok());
    }

    #[test]
    fn load_secret_reads_env_var() {
        env::set_var("TEST_SECRET_SECRETS_RS", "test_value_12345678901234567890");
        let result = load_secret("TEST_SECRET_SECRETS_RS");
        assert!(result.is_ok());
        assert_eq!(*result.unwrap(), "test_value_12345678901234567890");
        env::remove_var("TEST_SECRET_SECRETS_RS");
    }

    #[test]
    fn load_secret_missing_env_var_errors() {
        assert!(load_secret("NONEXISTENT_VAR_SECRETS_RS").is_err());
    }
}
