//! Configuration management for the boxsig client

use crate::retry::RetryPolicy;
use boxsig_errors::Error;
use boxsig_log::LogSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Added to the funding of every replacement write, in micro-units
pub const DEFAULT_FEE_BUFFER: u64 = 100_000;

/// Flat fee for remove, clear and destroy calls, in micro-units
pub const DEFAULT_ELEVATED_FEE: u64 = 2_000;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error
    #[error("io error:: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("toml parsing error:: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("toml serialization error:: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Unknown key or unparsable value
    #[error("invalid value for {key}:: {reason}")]
    InvalidValue { key: String, reason: String },
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// Ledger limits the composer plans writes against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerLimits {
    /// Transactions per atomic group
    pub max_group_size: usize,
    /// Largest value a single box may hold
    pub max_box_size: usize,
    /// Bytes of box I/O each box reference grants a call
    pub box_io_budget: usize,
    /// Box references a single call may carry
    pub max_references_per_call: usize,
}

impl Default for LedgerLimits {
    fn default() -> Self {
        Self {
            max_group_size: 16,
            max_box_size: 32_768,
            box_io_budget: 1_024,
            max_references_per_call: 8,
        }
    }
}

/// Algod endpoint used for suggested parameters and box reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgodConfig {
    pub url: String,
    pub token: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for AlgodConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4001".to_string(),
            token: "a".repeat(64),
            timeout_secs: 30,
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub fee_buffer: u64,
    pub elevated_fee: u64,
    /// Extra bytes the contract stores alongside each signature value
    pub signature_value_overhead: u32,
    pub limits: LedgerLimits,
    pub retry: RetryPolicy,
    pub algod: AlgodConfig,
    pub log: LogSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            fee_buffer: DEFAULT_FEE_BUFFER,
            elevated_fee: DEFAULT_ELEVATED_FEE,
            signature_value_overhead: 0,
            limits: LedgerLimits::default(),
            retry: RetryPolicy::default(),
            algod: AlgodConfig::default(),
            log: LogSettings::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get default configuration directory
    pub fn default_config_dir() -> PathBuf {
        if let Some(home) = dirs::home_dir() {
            home.join(".boxsig")
        } else {
            PathBuf::from(".boxsig")
        }
    }

    /// Get default configuration file path
    pub fn default_config_file() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Load configuration from default location or fall back to defaults
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_file();

        if config_path.exists() {
            Self::load_from_file(config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Set a configuration value by dotted key
    ///
    /// The configuration is left untouched when the new value does not validate.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut next = self.clone();
        next.apply(key, value)?;
        next.validate()?;
        *self = next;
        Ok(())
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "fee_buffer" => self.fee_buffer = parse(key, value)?,
            "elevated_fee" => self.elevated_fee = parse(key, value)?,
            "signature_value_overhead" => self.signature_value_overhead = parse(key, value)?,
            "limits.max_group_size" => self.limits.max_group_size = parse(key, value)?,
            "limits.max_box_size" => self.limits.max_box_size = parse(key, value)?,
            "limits.box_io_budget" => self.limits.box_io_budget = parse(key, value)?,
            "limits.max_references_per_call" => {
                self.limits.max_references_per_call = parse(key, value)?
            }
            "retry.max_attempts" => self.retry.max_attempts = parse(key, value)?,
            "retry.initial_backoff_ms" => self.retry.initial_backoff_ms = parse(key, value)?,
            "retry.max_backoff_ms" => self.retry.max_backoff_ms = parse(key, value)?,
            "algod.url" => self.algod.url = value.to_string(),
            "algod.token" => self.algod.token = value.to_string(),
            "algod.timeout_secs" => self.algod.timeout_secs = parse(key, value)?,
            "log.filter" => self.log.filter = value.to_string(),
            "log.format" => self.log.format = parse(key, value)?,
            _ => {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: "unknown configuration key".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Reject limits no write could be planned against
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, reason: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        // A chunked write needs a funding payment plus at least one call
        if self.limits.max_group_size < 2 {
            return Err(invalid("limits.max_group_size", "must be at least 2"));
        }
        if self.limits.max_box_size == 0 {
            return Err(invalid("limits.max_box_size", "must be non-zero"));
        }
        if self.limits.box_io_budget == 0 {
            return Err(invalid("limits.box_io_budget", "must be non-zero"));
        }
        if self.limits.max_references_per_call == 0 {
            return Err(invalid("limits.max_references_per_call", "must be non-zero"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(invalid(
                "retry.initial_backoff_ms",
                "must not exceed retry.max_backoff_ms",
            ));
        }
        url::Url::parse(&self.algod.url).map_err(|e| invalid("algod.url", &e.to_string()))?;
        self.log
            .validate()
            .map_err(|e| invalid("log.filter", &e.to_string()))?;
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: format!("cannot parse {value:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.fee_buffer, 100_000);
        assert_eq!(config.elevated_fee, 2_000);
        assert_eq!(config.limits.max_group_size, 16);
        assert_eq!(config.limits.max_box_size, 32_768);
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut original = ClientConfig::default();
        original.fee_buffer = 250_000;
        original.algod.url = "https://testnet-api.example.net".to_string();
        original.retry.max_attempts = 5;

        original.save_to_file(&config_path).unwrap();
        let loaded = ClientConfig::load_from_file(&config_path).unwrap();

        assert_eq!(loaded, original);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "fee_buffer = 5000\n").unwrap();

        let loaded = ClientConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.fee_buffer, 5000);
        assert_eq!(loaded.elevated_fee, DEFAULT_ELEVATED_FEE);
        assert_eq!(loaded.limits, LedgerLimits::default());
    }

    #[test]
    fn test_load_rejects_invalid_limits() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[limits]\nmax_group_size = 1\n").unwrap();

        let err = ClientConfig::load_from_file(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "limits.max_group_size"));
    }

    #[test]
    fn test_set_config_values() {
        let mut config = ClientConfig::default();

        config.set("fee_buffer", "42").unwrap();
        assert_eq!(config.fee_buffer, 42);

        config.set("limits.max_box_size", "4096").unwrap();
        assert_eq!(config.limits.max_box_size, 4096);

        config.set("algod.url", "http://127.0.0.1:8080").unwrap();
        assert_eq!(config.algod.url, "http://127.0.0.1:8080");

        assert!(config.set("invalid_key", "value").is_err());
        assert!(config.set("elevated_fee", "lots").is_err());
        assert!(config.set("retry.max_attempts", "0").is_err());
        assert_eq!(config.retry.max_attempts, RetryPolicy::default().max_attempts);
    }

    #[test]
    fn test_log_settings() {
        let mut config = ClientConfig::default();
        config.set("log.format", "compact").unwrap();
        config.set("log.filter", "warn,boxsig_client=debug").unwrap();
        assert_eq!(config.log.format, boxsig_log::LogFormat::Compact);

        let err = config.set("log.filter", "boxsig_client=loud").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "log.filter"));
        assert_eq!(config.log.filter, "warn,boxsig_client=debug");
    }

    #[test]
    fn test_config_error_converts() {
        let err: Error = ConfigError::InvalidValue {
            key: "fee_buffer".to_string(),
            reason: "negative".to_string(),
        }
        .into();
        assert!(matches!(err, Error::Config(_)));
        assert!(!err.is_transient());
    }
}
