//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{PhoenixError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub usb: UsbConfig,
    pub input: InputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// USB transport configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UsbConfig {
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

/// Input translation configuration
#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// Path to the axis map JSON file
    pub axis_map: String,

    #[serde(default = "default_poll_rate_hz")]
    pub poll_rate_hz: u32,

    /// Read unmapped reports instead of translated inputs
    #[serde(default)]
    pub raw: bool,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; empty logs to stderr only
    #[serde(default)]
    pub log_dir: String,

    #[serde(default = "default_status_interval_reads")]
    pub status_interval_reads: u64,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
            status_interval_reads: default_status_interval_reads(),
        }
    }
}

// Default value functions
fn default_read_timeout_ms() -> u64 { 100 }

fn default_poll_rate_hz() -> u32 { 100 }

fn default_log_level() -> String { "info".to_string() }
fn default_status_interval_reads() -> u64 { 500 }

/// Accepted values for `logging.level`
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use phoenix_usb_reader::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Bulk read timeout as a `Duration`
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.usb.read_timeout_ms)
    }

    /// Interval between two reads in the poll loop
    #[must_use]
    pub fn poll_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.input.poll_rate_hz))
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.usb.read_timeout_ms == 0 || self.usb.read_timeout_ms > 10000 {
            return Err(invalid("read_timeout_ms must be between 1 and 10000"));
        }

        if self.input.axis_map.is_empty() {
            return Err(invalid("axis_map path cannot be empty"));
        }

        if self.input.poll_rate_hz == 0 || self.input.poll_rate_hz > 1000 {
            return Err(invalid("poll_rate_hz must be between 1 and 1000"));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "log level must be one of: {}",
                LOG_LEVELS.join(", ")
            )));
        }

        if self.logging.status_interval_reads == 0 {
            return Err(invalid("status_interval_reads must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(message: impl std::fmt::Display) -> PhoenixError {
    PhoenixError::Config(toml::de::Error::custom(message))
}
