//! Pipeline configuration.
//!
//! [`MergeConfig`] is plain serde data: load it from JSON, layer `STREAMMERGE_*`
//! environment variables on top, then [`MergeConfig::validate`] it.
//!
//! ```
//! use streammerge::config::MergeConfig;
//!
//! let config = MergeConfig::from_json_str(r#"{ "channel_capacity": 4096 }"#).unwrap();
//! assert_eq!(config.channel_capacity, 4096);
//! assert_eq!(config.chunk_size, MergeConfig::default().chunk_size);
//! ```

use crate::error::MergeError;
use crate::io::cloud::helpers::{RetryConfig, config_from_env};
use crate::parser::ParseOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Environment variable prefix read by [`MergeConfig::with_env_overrides`].
pub const ENV_PREFIX: &str = "STREAMMERGE_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Bytes the pipe holds before the merge writer blocks.
    pub channel_capacity: usize,
    /// Bytes per chunk handed to the sink.
    pub chunk_size: usize,
    /// Field delimiter for input and output.
    pub delimiter: char,
    /// Trim whitespace around input fields.
    pub trim: bool,
    /// Decode compressed partitions before parsing.
    pub decompress: bool,
    /// Retry policy for sources wrapped in a `RetryingSource`.
    pub retry: RetryConfig,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64 * 1024,
            chunk_size: 5 * 1024 * 1024,
            delimiter: ',',
            trim: false,
            decompress: true,
            retry: RetryConfig::default(),
        }
    }
}

impl MergeConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the result is invalid.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("parse merge config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or is invalid.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("load config {}", path.display()))
    }

    /// Apply `STREAMMERGE_CHANNEL_CAPACITY`, `STREAMMERGE_CHUNK_SIZE`,
    /// `STREAMMERGE_DELIMITER`, `STREAMMERGE_TRIM`, and `STREAMMERGE_DECOMPRESS`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but unparsable.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(&config_from_env(ENV_PREFIX))
    }

    /// Apply overrides from a lowercase key map (as produced by `config_from_env`).
    ///
    /// # Errors
    ///
    /// Returns an error if a known key has an unparsable value.
    pub fn with_overrides(mut self, vars: &HashMap<String, String>) -> Result<Self> {
        if let Some(v) = vars.get("channel_capacity") {
            self.channel_capacity = v
                .parse()
                .with_context(|| format!("{ENV_PREFIX}CHANNEL_CAPACITY={v}"))?;
        }
        if let Some(v) = vars.get("chunk_size") {
            self.chunk_size = v
                .parse()
                .with_context(|| format!("{ENV_PREFIX}CHUNK_SIZE={v}"))?;
        }
        if let Some(v) = vars.get("delimiter") {
            self.delimiter = v
                .parse()
                .with_context(|| format!("{ENV_PREFIX}DELIMITER={v}"))?;
        }
        if let Some(v) = vars.get("trim") {
            self.trim = v.parse().with_context(|| format!("{ENV_PREFIX}TRIM={v}"))?;
        }
        if let Some(v) = vars.get("decompress") {
            self.decompress = v
                .parse()
                .with_context(|| format!("{ENV_PREFIX}DECOMPRESS={v}"))?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check sizes and the delimiter.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::InvalidConfig`] describing the first bad field.
    pub fn validate(&self) -> Result<(), MergeError> {
        if self.channel_capacity == 0 {
            return Err(MergeError::InvalidConfig(
                "channel_capacity must be greater than zero".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(MergeError::InvalidConfig(
                "chunk_size must be greater than zero".into(),
            ));
        }
        if !self.delimiter.is_ascii() || self.delimiter == '"' || self.delimiter == '\n' {
            return Err(MergeError::InvalidConfig(format!(
                "delimiter {:?} must be a single ASCII byte other than quote or newline",
                self.delimiter
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(MergeError::InvalidConfig(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Dialect options derived from this config.
    #[must_use]
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            delimiter: u8::try_from(self.delimiter).unwrap_or(b','),
            trim: self.trim,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(MergeConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() -> Result<()> {
        let config = MergeConfig::from_json_str(r#"{ "delimiter": ";", "retry": { "max_attempts": 5 } }"#)?;
        assert_eq!(config.parse_options().delimiter, b';');
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay_ms, RetryConfig::default().initial_delay_ms);
        Ok(())
    }

    #[test]
    fn zero_sizes_are_rejected() {
        assert!(MergeConfig::from_json_str(r#"{ "channel_capacity": 0 }"#).is_err());
        assert!(MergeConfig::from_json_str(r#"{ "chunk_size": 0 }"#).is_err());
    }

    #[test]
    fn overrides_apply_and_validate() -> Result<()> {
        let vars: HashMap<String, String> = [
            ("chunk_size".to_string(), "1024".to_string()),
            ("trim".to_string(), "true".to_string()),
        ]
        .into();
        let config = MergeConfig::default().with_overrides(&vars)?;
        assert_eq!(config.chunk_size, 1024);
        assert!(config.trim);

        let bad: HashMap<String, String> = [("channel_capacity".to_string(), "lots".to_string())].into();
        assert!(MergeConfig::default().with_overrides(&bad).is_err());
        Ok(())
    }

    #[test]
    fn non_ascii_delimiter_is_rejected() {
        let config = MergeConfig {
            delimiter: '→',
            ..MergeConfig::default()
        };
        assert!(matches!(config.validate(), Err(MergeError::InvalidConfig(_))));
    }
}
