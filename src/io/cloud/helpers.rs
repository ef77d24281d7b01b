//! Generic helpers shared by the object storage integrations.
//!
//! - [`retry_with_backoff_if`] - Retry with exponential backoff
//! - [`parse_resource_uri`] - Parse cloud resource URIs
//! - [`validate_resource_name`] / [`validate_key_path`] - Validate bucket and key names
//! - [`config_from_env`] - Collect prefixed environment variables

use crate::io::cloud::traits::{CloudIOError, CloudResult, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

// ============================================================================
// Retry Helper
// ============================================================================

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Factor applied to the delay after each attempt; values below 1.0 act as 1.0.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay to wait after `delay_ms`, capped at `max_delay_ms`.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn next_delay(&self, delay_ms: u64) -> u64 {
        // f64 -> u64 casts saturate, and NaN becomes 1.0 through `max`
        let grown = (delay_ms as f64 * self.backoff_multiplier.max(1.0)).round() as u64;
        grown.min(self.max_delay_ms)
    }
}

/// Retry any fallible operation, asking `should_retry` which errors qualify.
///
/// # Errors
///
/// Returns the last error if `should_retry` rejects it or the attempts are exhausted
pub fn retry_with_backoff_if<F, P, T, E>(
    config: &RetryConfig,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay_ms = config.initial_delay_ms;

    loop {
        attempt += 1;
        match operation() {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !should_retry(&err) || attempt >= config.max_attempts {
                    return Err(err);
                }
                debug!(attempt, delay_ms, error = %err, "retrying after transient failure");
                std::thread::sleep(Duration::from_millis(delay_ms));
                delay_ms = config.next_delay(delay_ms);
            }
        }
    }
}

// ============================================================================
// Configuration Helpers
// ============================================================================

/// Helper for loading config from environment variables
///
/// Keys are returned lowercased with the prefix stripped.
#[must_use]
pub fn config_from_env(prefix: &str) -> HashMap<String, String> {
    let mut config = HashMap::new();

    for (key, value) in std::env::vars() {
        if let Some(key_name) = key.strip_prefix(prefix) {
            config.insert(key_name.to_lowercase(), value);
        }
    }

    config
}

// ============================================================================
// Resource Identifier Parsing
// ============================================================================

/// Parse a resource identifier from a URI-like string
///
/// # Examples
/// - `s3://bucket-name/key` -> `("s3", ["bucket-name", "key"])`
/// - `file://exports/daily/merged.csv` -> `("file", ["exports", "daily", "merged.csv"])`
///
/// # Errors
///
/// Returns an error if the URI format is invalid (missing `://` separator)
pub fn parse_resource_uri(uri: &str) -> CloudResult<(String, Vec<String>)> {
    let Some((provider, rest)) = uri.split_once("://") else {
        return Err(CloudIOError::new(
            ErrorKind::InvalidInput,
            format!("Invalid resource URI format: {uri}"),
        ));
    };

    let path_parts: Vec<String> = rest.split('/').map(ToString::to_string).collect();

    Ok((provider.to_string(), path_parts))
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate a resource name according to common cloud provider rules
///
/// # Errors
///
/// Returns an error if:
/// - The resource name is empty
/// - The resource name exceeds 255 characters
/// - The resource name contains invalid characters (only alphanumeric, hyphens, underscores, and periods are allowed)
pub fn validate_resource_name(name: &str) -> CloudResult<()> {
    if name.is_empty() {
        return Err(CloudIOError::new(
            ErrorKind::InvalidInput,
            "Resource name cannot be empty",
        ));
    }

    if name.len() > 255 {
        return Err(CloudIOError::new(
            ErrorKind::InvalidInput,
            "Resource name too long (max 255 characters)",
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(CloudIOError::new(
            ErrorKind::InvalidInput,
            format!("Resource name contains invalid characters: {name}"),
        ));
    }

    Ok(())
}

/// Validate an object key
///
/// # Errors
///
/// Returns an error if the key is empty, absolute, or contains `..` segments
pub fn validate_key_path(path: &str) -> CloudResult<()> {
    if path.is_empty() {
        return Err(CloudIOError::new(
            ErrorKind::InvalidInput,
            "Key path cannot be empty",
        ));
    }

    if path.starts_with('/') {
        return Err(CloudIOError::new(
            ErrorKind::InvalidInput,
            "Key path cannot start with '/'",
        ));
    }

    if path.split('/').any(|segment| segment == "..") {
        return Err(CloudIOError::new(
            ErrorKind::InvalidInput,
            "Key path cannot contain '..' segments",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_wait() -> RetryConfig {
        RetryConfig {
            initial_delay_ms: 0,
            ..RetryConfig::default()
        }
    }

    #[test]
    fn test_retry_predicate_decides() {
        let mut attempts = 0;
        let result = retry_with_backoff_if(&no_wait(), CloudIOError::is_transient, || {
            attempts += 1;
            if attempts < 3 {
                Err(CloudIOError::new(ErrorKind::Network, "Temporary failure"))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts, 3);

        let mut attempts = 0;
        let result: CloudResult<()> = retry_with_backoff_if(&no_wait(), CloudIOError::is_transient, || {
            attempts += 1;
            Err(CloudIOError::new(ErrorKind::NotFound, "gone"))
        });
        assert_eq!(result.unwrap_err().kind, ErrorKind::NotFound);
        assert_eq!(attempts, 1);
    }

    #[test]
    fn test_delay_is_capped() {
        let config = RetryConfig {
            max_delay_ms: 150,
            ..RetryConfig::default()
        };
        assert_eq!(config.next_delay(100), 150);
        let flat = RetryConfig {
            backoff_multiplier: 1.0,
            ..RetryConfig::default()
        };
        assert_eq!(flat.next_delay(100), 100);
    }

    #[test]
    fn test_delay_follows_the_multiplier() {
        let triple = RetryConfig {
            backoff_multiplier: 3.0,
            ..RetryConfig::default()
        };
        assert_eq!(triple.next_delay(100), 300);
        assert_eq!(triple.next_delay(300), 900);
        let gentle = RetryConfig {
            backoff_multiplier: 1.5,
            ..RetryConfig::default()
        };
        assert_eq!(gentle.next_delay(100), 150);
        let shrinking = RetryConfig {
            backoff_multiplier: 0.5,
            ..RetryConfig::default()
        };
        assert_eq!(shrinking.next_delay(100), 100);
        assert_eq!(triple.next_delay(u64::MAX), triple.max_delay_ms);
    }

    #[test]
    fn test_parse_resource_uri() {
        let (provider, parts) = parse_resource_uri("s3://my-bucket/my-key").unwrap();
        assert_eq!(provider, "s3");
        assert_eq!(parts, vec!["my-bucket", "my-key"]);

        assert!(parse_resource_uri("my-bucket/my-key").is_err());
    }

    #[test]
    fn test_validate_resource_name() {
        assert!(validate_resource_name("my-resource").is_ok());
        assert!(validate_resource_name("my_resource").is_ok());
        assert!(validate_resource_name("my.resource").is_ok());
        assert!(validate_resource_name("").is_err());
        assert!(validate_resource_name("invalid name with spaces").is_err());
    }

    #[test]
    fn test_validate_key_path() {
        assert!(validate_key_path("path/to/key").is_ok());
        assert!(validate_key_path("key").is_ok());
        assert!(validate_key_path("").is_err());
        assert!(validate_key_path("/absolute/path").is_err());
        assert!(validate_key_path("a/../b").is_err());
    }
}
