//! Configuration validation.
//!
//! This module provides validation logic for configuration values,
//! ensuring they are within acceptable ranges.

use super::GuardConfig;
use crate::error::ConfigError;

/// Minimum allowed invocation timeout in milliseconds (1 second).
pub const MIN_TIMEOUT_MS: u64 = 1000;

/// Maximum allowed invocation timeout in milliseconds (5 minutes).
pub const MAX_TIMEOUT_MS: u64 = 300_000;

/// Maximum allowed retry count.
pub const MAX_RETRIES_CEILING: u32 = 10;

/// Maximum allowed structured-text ceiling (64 MiB).
pub const MAX_JSON_BYTES_CEILING: usize = 64 * 1_048_576;

/// Validate configuration values.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] if any value is out of range:
/// - `IDEA_GUARD_MAX_INPUT_CHARS` must be at least 1
/// - `IDEA_GUARD_MAX_RESPONSE_CHARS` must be at least 1
/// - `IDEA_GUARD_MAX_JSON_BYTES` must be between 1 and 64 MiB
/// - `IDEA_GUARD_MAX_JSON_DEPTH` must be between 1 and 1000
/// - `IDEA_GUARD_MAX_RETRIES` must be between 0 and 10
/// - `IDEA_GUARD_INVOKE_TIMEOUT_MS` must be between 1000 and 300000
#[must_use = "validation result should be checked"]
pub fn validate_config(config: &GuardConfig) -> Result<(), ConfigError> {
    if config.max_input_chars == 0 {
        return Err(ConfigError::InvalidValue {
            var: "IDEA_GUARD_MAX_INPUT_CHARS".into(),
            reason: "must be at least 1".into(),
        });
    }

    if config.max_response_chars == 0 {
        return Err(ConfigError::InvalidValue {
            var: "IDEA_GUARD_MAX_RESPONSE_CHARS".into(),
            reason: "must be at least 1".into(),
        });
    }

    if config.max_json_bytes == 0 || config.max_json_bytes > MAX_JSON_BYTES_CEILING {
        return Err(ConfigError::InvalidValue {
            var: "IDEA_GUARD_MAX_JSON_BYTES".into(),
            reason: format!("must be between 1 and {MAX_JSON_BYTES_CEILING} bytes"),
        });
    }

    if config.max_json_depth == 0 || config.max_json_depth > 1000 {
        return Err(ConfigError::InvalidValue {
            var: "IDEA_GUARD_MAX_JSON_DEPTH".into(),
            reason: "must be between 1 and 1000".into(),
        });
    }

    if config.max_retries > MAX_RETRIES_CEILING {
        return Err(ConfigError::InvalidValue {
            var: "IDEA_GUARD_MAX_RETRIES".into(),
            reason: format!("must be between 0 and {MAX_RETRIES_CEILING}"),
        });
    }

    if config.invoke_timeout_ms < MIN_TIMEOUT_MS || config.invoke_timeout_ms > MAX_TIMEOUT_MS {
        return Err(ConfigError::InvalidValue {
            var: "IDEA_GUARD_INVOKE_TIMEOUT_MS".into(),
            reason: format!("must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS} ms"),
        });
    }

    Ok(())
}
