//! Scheduler timing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::ConfigError;

/// Environment variable holding the poll interval in seconds.
pub const POLL_INTERVAL_ENV: &str = "DISPATCH_POLL_INTERVAL_SECS";
/// Environment variable holding the failure interval in seconds.
pub const FAILURE_INTERVAL_ENV: &str = "DISPATCH_FAILURE_INTERVAL_SECS";
/// Environment variable holding the shutdown timeout in seconds.
pub const SHUTDOWN_TIMEOUT_ENV: &str = "DISPATCH_SHUTDOWN_TIMEOUT_SECS";

const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;
const DEFAULT_FAILURE_INTERVAL_MS: u64 = 60_000;
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_WORKER_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Dispatch scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Pause after a cycle that found at least one queue.
    pub poll_interval_ms: u64,
    /// Pause after a cycle with no queues or a configuration failure.
    pub failure_interval_ms: u64,
    /// Bound on each shutdown phase.
    pub shutdown_timeout_ms: u64,
    /// Stack size of the worker thread.
    pub worker_stack_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            failure_interval_ms: DEFAULT_FAILURE_INTERVAL_MS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            worker_stack_size: DEFAULT_WORKER_STACK_SIZE,
        }
    }
}

impl DispatchConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = duration_ms(interval);
        self
    }

    /// Set the failure interval.
    #[must_use]
    pub fn with_failure_interval(mut self, interval: Duration) -> Self {
        self.failure_interval_ms = duration_ms(interval);
        self
    }

    /// Set the shutdown timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = duration_ms(timeout);
        self
    }

    /// Pause after a successful cycle.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Pause after an empty or failed cycle.
    #[must_use]
    pub const fn failure_interval(&self) -> Duration {
        Duration::from_millis(self.failure_interval_ms)
    }

    /// Bound on each shutdown phase.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NonPositive`] for any zero value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::NonPositive("poll interval"));
        }
        if self.failure_interval_ms == 0 {
            return Err(ConfigError::NonPositive("failure interval"));
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(ConfigError::NonPositive("shutdown timeout"));
        }
        if self.worker_stack_size == 0 {
            return Err(ConfigError::NonPositive("worker stack size"));
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON, or a validation error.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from the environment, loading a `.env` file if present.
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for a variable that is not a whole number of
    /// seconds, or a validation error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Some(secs) = env_secs(POLL_INTERVAL_ENV)? {
            cfg.poll_interval_ms = secs.saturating_mul(1000);
        }
        if let Some(secs) = env_secs(FAILURE_INTERVAL_ENV)? {
            cfg.failure_interval_ms = secs.saturating_mul(1000);
        }
        if let Some(secs) = env_secs(SHUTDOWN_TIMEOUT_ENV)? {
            cfg.shutdown_timeout_ms = secs.saturating_mul(1000);
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn env_secs(name: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::Parse(format!("{name}: {e}"))),
        Err(_) => Ok(None),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
