//! Runtime configuration.
//!
//! Values come from defaults, then an optional JSON file, then
//! `BLOODVAULT_*` environment variables.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Library configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// SQLite database file
    pub database_path: String,
    /// How long a connection waits on a locked database
    pub busy_timeout_ms: u64,
    /// Fulfillment attempts per request before a conflict is reported
    pub max_fulfill_attempts: u32,
    /// Units expiring within this many days appear in the expiry report
    pub expiry_alert_days: u32,
    /// Donors this close to eligibility get a reminder
    pub reminder_window_days: u32,
    /// Prefix applied when normalizing local phone numbers
    pub phone_country_code: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "bloodvault.db".to_string(),
            busy_timeout_ms: 5_000,
            max_fulfill_attempts: 3,
            expiry_alert_days: 7,
            reminder_window_days: 7,
            phone_country_code: "+971".to_string(),
        }
    }
}

impl Config {
    /// Parse a JSON document. Missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Optional file, then environment.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `BLOODVAULT_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("BLOODVAULT_DATABASE_PATH") {
            self.database_path = value;
        }
        if let Some(value) = lookup("BLOODVAULT_BUSY_TIMEOUT_MS") {
            self.busy_timeout_ms = parse_number("BLOODVAULT_BUSY_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("BLOODVAULT_MAX_FULFILL_ATTEMPTS") {
            self.max_fulfill_attempts = parse_number("BLOODVAULT_MAX_FULFILL_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("BLOODVAULT_EXPIRY_ALERT_DAYS") {
            self.expiry_alert_days = parse_number("BLOODVAULT_EXPIRY_ALERT_DAYS", &value)?;
        }
        if let Some(value) = lookup("BLOODVAULT_REMINDER_WINDOW_DAYS") {
            self.reminder_window_days = parse_number("BLOODVAULT_REMINDER_WINDOW_DAYS", &value)?;
        }
        if let Some(value) = lookup("BLOODVAULT_PHONE_COUNTRY_CODE") {
            self.phone_country_code = value;
        }
        self.validate()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.database_path.trim().is_empty() {
            return Err(invalid("database_path", &self.database_path));
        }
        if self.max_fulfill_attempts == 0 {
            return Err(invalid("max_fulfill_attempts", "0"));
        }
        let code = &self.phone_country_code;
        if !code.starts_with('+') || code.len() < 2 || !code[1..].chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("phone_country_code", code));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
