//! Core configuration.
//!
//! Configuration is loaded from a TOML file and validated eagerly: a config
//! that parses but carries an unusable value (zero capacity, malformed key)
//! is rejected at load time, not at first use.
//!
//! # Recognised keys
//!
//! | key                     | meaning                                | default  |
//! |-------------------------|----------------------------------------|----------|
//! | `mac_key`               | 32-byte hex MAC key (required)         | required |
//! | `window_duration_s`     | limiter window length, seconds         | 60       |
//! | `window_capacity`       | admissions per window                  | 100      |
//! | `max_log_message_bytes` | log message length cap                 | 65536    |
//! | `bundle_max_bytes`      | bundle size budget for a 24 h window   | 5242880  |
//! | `shard_count`           | limiter lock shards                    | 64       |

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::crypto::{KeyParseError, MacKey};


/// Default limiter window duration in seconds.
pub const DEFAULT_WINDOW_DURATION_S: u64 = 60;

/// Default limiter capacity per window.
pub const DEFAULT_WINDOW_CAPACITY: u64 = 100;

/// Default maximum log message length in bytes (64 KiB).
pub const DEFAULT_MAX_LOG_MESSAGE_BYTES: usize = 65_536;

/// Default bundle size budget in bytes (5 MiB for a 24-hour window).
pub const DEFAULT_BUNDLE_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Default number of limiter lock shards.
pub const DEFAULT_SHARD_COUNT: usize = 64;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML or is missing required keys.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The MAC key is malformed.
    #[error("invalid mac_key: {0}")]
    Key(#[from] KeyParseError),

    /// A numeric field holds an unusable value.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// The offending field name.
        field: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    mac_key: String,
    #[serde(default = "default_window_duration_s")]
    window_duration_s: u64,
    #[serde(default = "default_window_capacity")]
    window_capacity: u64,
    #[serde(default = "default_max_log_message_bytes")]
    max_log_message_bytes: usize,
    #[serde(default = "default_bundle_max_bytes")]
    bundle_max_bytes: u64,
    #[serde(default = "default_shard_count")]
    shard_count: usize,
}

const fn default_window_duration_s() -> u64 {
    DEFAULT_WINDOW_DURATION_S
}
const fn default_window_capacity() -> u64 {
    DEFAULT_WINDOW_CAPACITY
}
const fn default_max_log_message_bytes() -> usize {
    DEFAULT_MAX_LOG_MESSAGE_BYTES
}
const fn default_bundle_max_bytes() -> u64 {
    DEFAULT_BUNDLE_MAX_BYTES
}
const fn default_shard_count() -> usize {
    DEFAULT_SHARD_COUNT
}

/// Validated core configuration.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// The process-wide MAC key, read-only after initialization.
    pub mac_key: MacKey,

    /// Limiter window duration in seconds.
    pub window_duration_s: u64,

    /// Limiter capacity per window.
    pub window_capacity: u64,

    /// Maximum log message length in bytes.
    pub max_log_message_bytes: usize,

    /// Bundle size budget in bytes for windows of up to 24 hours.
    pub bundle_max_bytes: u64,

    /// Number of limiter lock shards.
    pub shard_count: usize,
}

impl CoreConfig {
    /// Builds a config with all defaults around the supplied key.
    #[must_use]
    pub fn with_key(mac_key: MacKey) -> Self {
        Self {
            mac_key,
            window_duration_s: DEFAULT_WINDOW_DURATION_S,
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            max_log_message_bytes: DEFAULT_MAX_LOG_MESSAGE_BYTES,
            bundle_max_bytes: DEFAULT_BUNDLE_MAX_BYTES,
            shard_count: DEFAULT_SHARD_COUNT,
        }
    }

    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, the
    /// key is malformed, or any numeric field holds an unusable value.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Same conditions as [`CoreConfig::from_file`], minus I/O.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(raw)?;

        if raw.window_duration_s == 0 {
            return Err(ConfigError::InvalidValue {
                field: "window_duration_s",
                reason: "must be positive",
            });
        }
        if raw.window_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "window_capacity",
                reason: "must be positive",
            });
        }
        if raw.max_log_message_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_log_message_bytes",
                reason: "must be positive",
            });
        }
        if raw.bundle_max_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "bundle_max_bytes",
                reason: "must be positive",
            });
        }
        if raw.shard_count == 0 {
            return Err(ConfigError::InvalidValue {
                field: "shard_count",
                reason: "must be positive",
            });
        }

        Ok(Self {
            mac_key: MacKey::from_hex(&raw.mac_key)?,
            window_duration_s: raw.window_duration_s,
            window_capacity: raw.window_capacity,
            max_log_message_bytes: raw.max_log_message_bytes,
            bundle_max_bytes: raw.bundle_max_bytes,
            shard_count: raw.shard_count,
        })
    }
}
