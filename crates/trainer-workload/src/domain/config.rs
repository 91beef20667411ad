//! Workload bridge configuration with validation.

use crate::domain::circuit_breaker::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "GYM_WORKLOAD_";

/// Main bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Channel names
    pub destinations: DestinationsConfig,
    /// How long a query waits for its reply
    #[serde(with = "crate::domain::humantime_serde")]
    pub reply_timeout: Duration,
    /// Breaker guarding the monthly duration query
    pub query_breaker: CircuitBreakerConfig,
    /// Breaker guarding session notifications
    pub notification_breaker: CircuitBreakerConfig,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            destinations: DestinationsConfig::default(),
            reply_timeout: Duration::from_secs(30),
            query_breaker: CircuitBreakerConfig::default(),
            notification_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Message channel names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationsConfig {
    /// Outbound workload queries
    pub request: String,
    /// Inbound workload replies
    pub reply: String,
    /// Outbound session notifications
    pub notification: String,
    /// Malformed replies; empty disables dead-lettering
    pub dead_letter: String,
}

impl Default for DestinationsConfig {
    fn default() -> Self {
        Self {
            request: "trainer.workload.request".to_string(),
            reply: "trainer.workload.reply".to_string(),
            notification: "trainer.workload.session".to_string(),
            dead_letter: "dlq.trainer-workload".to_string(),
        }
    }
}

impl DestinationsConfig {
    /// Dead-letter destination, if enabled
    pub fn dead_letter(&self) -> Option<&str> {
        if self.dead_letter.is_empty() {
            None
        } else {
            Some(&self.dead_letter)
        }
    }
}

impl WorkloadConfig {
    /// Parse from TOML and validate.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `GYM_WORKLOAD_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary key lookup on the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));
        let mut config = Self::default();

        if let Some(value) = get("REQUEST_DESTINATION") {
            config.destinations.request = value;
        }
        if let Some(value) = get("REPLY_DESTINATION") {
            config.destinations.reply = value;
        }
        if let Some(value) = get("NOTIFICATION_DESTINATION") {
            config.destinations.notification = value;
        }
        if let Some(value) = get("DEAD_LETTER_DESTINATION") {
            config.destinations.dead_letter = value;
        }
        if let Some(value) = get("REPLY_TIMEOUT_MS") {
            config.reply_timeout = Duration::from_millis(parse_env("REPLY_TIMEOUT_MS", &value)?);
        }
        if let Some(value) = get("BREAKER_ENABLED") {
            let enabled: bool = parse_env("BREAKER_ENABLED", &value)?;
            config.query_breaker.enabled = enabled;
            config.notification_breaker.enabled = enabled;
        }
        if let Some(value) = get("BREAKER_COOLDOWN_MS") {
            let cooldown = Duration::from_millis(parse_env("BREAKER_COOLDOWN_MS", &value)?);
            config.query_breaker.open_cooldown = cooldown;
            config.notification_breaker.open_cooldown = cooldown;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reply_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "reply_timeout cannot be 0".into(),
            ));
        }

        validate_breaker("query_breaker", &self.query_breaker)?;
        validate_breaker("notification_breaker", &self.notification_breaker)?;

        let d = &self.destinations;
        let mut names = vec![&d.request, &d.reply, &d.notification];
        if !d.dead_letter.is_empty() {
            names.push(&d.dead_letter);
        }
        if names.iter().any(|name| name.trim().is_empty()) {
            return Err(ConfigError::InvalidDestination(
                "destination names cannot be empty".into(),
            ));
        }
        let unique: HashSet<_> = names.iter().collect();
        if unique.len() != names.len() {
            return Err(ConfigError::InvalidDestination(
                "destination names must be distinct".into(),
            ));
        }

        Ok(())
    }
}

fn validate_breaker(name: &str, config: &CircuitBreakerConfig) -> Result<(), ConfigError> {
    if config.sliding_window_size == 0 {
        return Err(ConfigError::InvalidBreaker(format!(
            "{name}.sliding_window_size cannot be 0"
        )));
    }
    if config.minimum_calls == 0 || config.minimum_calls > config.sliding_window_size {
        return Err(ConfigError::InvalidBreaker(format!(
            "{name}.minimum_calls must be in 1..={}",
            config.sliding_window_size
        )));
    }
    if !(config.failure_rate_threshold > 0.0 && config.failure_rate_threshold <= 100.0) {
        return Err(ConfigError::InvalidBreaker(format!(
            "{name}.failure_rate_threshold must be in (0, 100]"
        )));
    }
    if config.open_cooldown.is_zero() {
        return Err(ConfigError::InvalidTimeout(format!(
            "{name}.open_cooldown cannot be 0"
        )));
    }
    if config.permitted_half_open_calls == 0 {
        return Err(ConfigError::InvalidBreaker(format!(
            "{name}.permitted_half_open_calls cannot be 0"
        )));
    }
    if config.success_threshold == 0
        || config.success_threshold > config.permitted_half_open_calls
    {
        return Err(ConfigError::InvalidBreaker(format!(
            "{name}.success_threshold must be in 1..={}",
            config.permitted_half_open_calls
        )));
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: format!("{ENV_PREFIX}{key}"),
        value: value.to_string(),
    })
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Invalid circuit breaker settings
    #[error("invalid circuit breaker: {0}")]
    InvalidBreaker(String),
    /// Empty or colliding destination names
    #[error("invalid destination: {0}")]
    InvalidDestination(String),
    /// Environment override that does not parse
    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: String, value: String },
    /// Malformed configuration file
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}
