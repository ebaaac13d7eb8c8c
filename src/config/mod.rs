//! Configuration management.
//!
//! This module handles:
//! - Default limits for every pipeline stage
//! - Environment variable loading
//! - Range validation
//!
//! # Example
//!
//! ```
//! use idea_guard::config::GuardConfig;
//!
//! let config = GuardConfig::default();
//! assert_eq!(config.max_input_chars, 20_000);
//! assert_eq!(config.max_response_chars, 50_000);
//! ```

mod validation;

pub use validation::{
    validate_config, MAX_JSON_BYTES_CEILING, MAX_RETRIES_CEILING, MAX_TIMEOUT_MS, MIN_TIMEOUT_MS,
};

use crate::error::ConfigError;

/// Default ceiling for user input, in characters.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 20_000;

/// Default ceiling for model responses, in characters.
pub const DEFAULT_MAX_RESPONSE_CHARS: usize = 50_000;

/// Default ceiling for structured text, in bytes (1 MiB).
pub const DEFAULT_MAX_JSON_BYTES: usize = 1_048_576;

/// Default ceiling for structured nesting depth.
pub const DEFAULT_MAX_JSON_DEPTH: usize = 100;

/// Default retry budget for recovery strategies that re-invoke the model.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default base delay between recovery retries, in milliseconds
/// (doubled after each attempt).
pub const DEFAULT_RETRY_DELAY_MS: u64 = 250;

/// Default model invocation timeout, in milliseconds.
pub const DEFAULT_INVOKE_TIMEOUT_MS: u64 = 30_000;

/// Default input length above which the canned template response uses
/// its long structured form, in characters.
pub const DEFAULT_LONG_INPUT_THRESHOLD: usize = 100;

/// Pipeline configuration.
///
/// All limits have safe defaults; use [`GuardConfig::from_env`] to
/// override them from `IDEA_GUARD_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    /// Ceiling for user input, in characters.
    pub max_input_chars: usize,
    /// Ceiling for model responses, in characters.
    pub max_response_chars: usize,
    /// Ceiling for structured text, in bytes.
    pub max_json_bytes: usize,
    /// Ceiling for structured nesting depth.
    pub max_json_depth: usize,
    /// Retry budget for recovery strategies that re-invoke the model.
    pub max_retries: u32,
    /// Base delay between recovery retries, in milliseconds.
    pub retry_delay_ms: u64,
    /// Model invocation timeout, in milliseconds.
    pub invoke_timeout_ms: u64,
    /// Input length above which the canned template response uses its
    /// long structured form, in characters.
    pub long_input_threshold: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            max_response_chars: DEFAULT_MAX_RESPONSE_CHARS,
            max_json_bytes: DEFAULT_MAX_JSON_BYTES,
            max_json_depth: DEFAULT_MAX_JSON_DEPTH,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            invoke_timeout_ms: DEFAULT_INVOKE_TIMEOUT_MS,
            long_input_threshold: DEFAULT_LONG_INPUT_THRESHOLD,
        }
    }
}

impl GuardConfig {
    /// Load configuration from environment variables.
    ///
    /// All variables are optional and fall back to the defaults:
    /// - `IDEA_GUARD_MAX_INPUT_CHARS` (default: `20000`)
    /// - `IDEA_GUARD_MAX_RESPONSE_CHARS` (default: `50000`)
    /// - `IDEA_GUARD_MAX_JSON_BYTES` (default: `1048576`)
    /// - `IDEA_GUARD_MAX_JSON_DEPTH` (default: `100`)
    /// - `IDEA_GUARD_MAX_RETRIES` (default: `2`)
    /// - `IDEA_GUARD_RETRY_DELAY_MS` (default: `250`)
    /// - `IDEA_GUARD_INVOKE_TIMEOUT_MS` (default: `30000`)
    /// - `IDEA_GUARD_LONG_INPUT_THRESHOLD` (default: `100`)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set but not a valid
    /// integer, or if any value fails validation (see
    /// [`validate_config`]).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let config = Self {
            max_input_chars: parse_env_usize("IDEA_GUARD_MAX_INPUT_CHARS", DEFAULT_MAX_INPUT_CHARS)?,
            max_response_chars: parse_env_usize(
                "IDEA_GUARD_MAX_RESPONSE_CHARS",
                DEFAULT_MAX_RESPONSE_CHARS,
            )?,
            max_json_bytes: parse_env_usize("IDEA_GUARD_MAX_JSON_BYTES", DEFAULT_MAX_JSON_BYTES)?,
            max_json_depth: parse_env_usize("IDEA_GUARD_MAX_JSON_DEPTH", DEFAULT_MAX_JSON_DEPTH)?,
            max_retries: parse_env_u32("IDEA_GUARD_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            retry_delay_ms: parse_env_u64("IDEA_GUARD_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS)?,
            invoke_timeout_ms: parse_env_u64(
                "IDEA_GUARD_INVOKE_TIMEOUT_MS",
                DEFAULT_INVOKE_TIMEOUT_MS,
            )?,
            long_input_threshold: parse_env_usize(
                "IDEA_GUARD_LONG_INPUT_THRESHOLD",
                DEFAULT_LONG_INPUT_THRESHOLD,
            )?,
        };

        validate_config(&config)?;
        Ok(config)
    }
}

fn parse_env_usize(var: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            var: var.into(),
            reason: "must be a positive integer".into(),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(var: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            var: var.into(),
            reason: "must be a positive integer".into(),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u32(var: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            var: var.into(),
            reason: "must be a positive integer".into(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_guard_env() {
        for var in [
            "IDEA_GUARD_MAX_INPUT_CHARS",
            "IDEA_GUARD_MAX_RESPONSE_CHARS",
            "IDEA_GUARD_MAX_JSON_BYTES",
            "IDEA_GUARD_MAX_JSON_DEPTH",
            "IDEA_GUARD_MAX_RETRIES",
            "IDEA_GUARD_RETRY_DELAY_MS",
            "IDEA_GUARD_INVOKE_TIMEOUT_MS",
            "IDEA_GUARD_LONG_INPUT_THRESHOLD",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config() {
        let config = GuardConfig::default();
        assert_eq!(config.max_input_chars, 20_000);
        assert_eq!(config.max_response_chars, 50_000);
        assert_eq!(config.max_json_bytes, 1_048_576);
        assert_eq!(config.max_json_depth, 100);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_delay_ms, 250);
        assert_eq!(config.invoke_timeout_ms, 30_000);
        assert_eq!(config.long_input_threshold, 100);
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_guard_env();
        let config = GuardConfig::from_env().unwrap();
        assert_eq!(config, GuardConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_guard_env();
        std::env::set_var("IDEA_GUARD_MAX_INPUT_CHARS", "5000");
        std::env::set_var("IDEA_GUARD_MAX_RETRIES", "4");
        let config = GuardConfig::from_env().unwrap();
        assert_eq!(config.max_input_chars, 5000);
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.max_response_chars, DEFAULT_MAX_RESPONSE_CHARS);
        clear_guard_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_non_numeric() {
        clear_guard_env();
        std::env::set_var("IDEA_GUARD_MAX_RETRIES", "plenty");
        let result = GuardConfig::from_env();
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { var, .. } if var == "IDEA_GUARD_MAX_RETRIES")
        );
        clear_guard_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_out_of_range() {
        clear_guard_env();
        std::env::set_var("IDEA_GUARD_INVOKE_TIMEOUT_MS", "50");
        let result = GuardConfig::from_env();
        assert!(result.is_err());
        clear_guard_env();
    }
}
