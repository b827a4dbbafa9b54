//! Message buffer configuration.

use std::time::Duration;

use engage_core::defaults::{
    MESSAGE_BATCH_SIZE, MESSAGE_FLUSH_INTERVAL_MS, MESSAGE_FLUSH_TIMEOUT_MS, MESSAGE_MAX_SIZE,
    MESSAGE_RETRY_BUDGET,
};
use engage_core::{Error, Result};
use tracing::warn;

/// Configuration for the message buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferConfig {
    /// Buffer length that triggers a flush.
    pub batch_size: usize,
    /// Admission cap; events beyond it are dropped.
    pub max_size: usize,
    /// Time since the last flush that triggers a flush.
    pub flush_interval_ms: u64,
    /// Re-enqueues allowed per event after failed flushes.
    pub retry_budget: u32,
    /// Deadline for one flush.
    pub flush_timeout_ms: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            batch_size: MESSAGE_BATCH_SIZE,
            max_size: MESSAGE_MAX_SIZE,
            flush_interval_ms: MESSAGE_FLUSH_INTERVAL_MS,
            retry_budget: MESSAGE_RETRY_BUDGET,
            flush_timeout_ms: MESSAGE_FLUSH_TIMEOUT_MS,
        }
    }
}

impl BufferConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `MESSAGE_BUFFER_BATCH_SIZE` | `200` | Flush trigger on buffer length |
    /// | `MESSAGE_BUFFER_MAX_SIZE` | `1000` | Admission cap |
    /// | `MESSAGE_BUFFER_FLUSH_INTERVAL_MS` | `120000` | Flush trigger on elapsed time |
    /// | `MESSAGE_BUFFER_RETRY_BUDGET` | `1` | Re-enqueues per event |
    /// | `MESSAGE_BUFFER_FLUSH_TIMEOUT_MS` | `30000` | Deadline per flush |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env_or("MESSAGE_BUFFER_BATCH_SIZE", defaults.batch_size),
            max_size: env_or("MESSAGE_BUFFER_MAX_SIZE", defaults.max_size),
            flush_interval_ms: env_or("MESSAGE_BUFFER_FLUSH_INTERVAL_MS", defaults.flush_interval_ms),
            retry_budget: env_or("MESSAGE_BUFFER_RETRY_BUDGET", defaults.retry_budget),
            flush_timeout_ms: env_or("MESSAGE_BUFFER_FLUSH_TIMEOUT_MS", defaults.flush_timeout_ms),
        }
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    pub fn with_flush_interval_ms(mut self, ms: u64) -> Self {
        self.flush_interval_ms = ms;
        self
    }

    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    pub fn with_flush_timeout_ms(mut self, ms: u64) -> Self {
        self.flush_timeout_ms = ms;
        self
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    /// Full check for operator-supplied configuration.
    pub fn validate(&self) -> Result<()> {
        self.validate_nonzero()?;
        if self.max_size < self.batch_size {
            return Err(Error::Config(format!(
                "max_size ({}) must be at least batch_size ({})",
                self.max_size, self.batch_size
            )));
        }
        Ok(())
    }

    /// Minimum the buffer needs to run. A `max_size` below `batch_size` is
    /// allowed here; the size trigger then never fires.
    pub(crate) fn validate_nonzero(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be greater than 0".into()));
        }
        if self.max_size == 0 {
            return Err(Error::Config("max_size must be greater than 0".into()));
        }
        if self.flush_interval_ms == 0 {
            return Err(Error::Config("flush_interval_ms must be greater than 0".into()));
        }
        if self.flush_timeout_ms == 0 {
            return Err(Error::Config("flush_timeout_ms must be greater than 0".into()));
        }
        Ok(())
    }
}

fn env_or<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(
                subsystem = "buffer",
                component = "config",
                key,
                value = %raw,
                "Ignoring unparseable setting, using default"
            );
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BufferConfig::default();
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.max_size, 1000);
        assert_eq!(config.flush_interval_ms, 120_000);
        assert_eq!(config.retry_budget, 1);
        assert_eq!(config.flush_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = BufferConfig::default()
            .with_batch_size(5)
            .with_max_size(10)
            .with_flush_interval_ms(1_000)
            .with_retry_budget(0)
            .with_flush_timeout_ms(50);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.max_size, 10);
        assert_eq!(config.flush_interval_ms, 1_000);
        assert_eq!(config.retry_budget, 0);
        assert_eq!(config.flush_timeout_ms, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = BufferConfig::default().with_batch_size(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_max_below_batch() {
        let config = BufferConfig::default().with_batch_size(10).with_max_size(5);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_nonzero_check_allows_small_cap() {
        let config = BufferConfig::default().with_batch_size(1000).with_max_size(3);
        assert!(config.validate_nonzero().is_ok());
        assert!(config.validate().is_err());
        assert!(config.with_max_size(0).validate_nonzero().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval_and_timeout() {
        assert!(BufferConfig::default()
            .with_flush_interval_ms(0)
            .validate()
            .is_err());
        assert!(BufferConfig::default()
            .with_flush_timeout_ms(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("ENGAGE_TEST_BUFFER_GARBAGE", "not-a-number");
        assert_eq!(env_or("ENGAGE_TEST_BUFFER_GARBAGE", 7usize), 7);
        std::env::set_var("ENGAGE_TEST_BUFFER_VALUE", " 42 ");
        assert_eq!(env_or("ENGAGE_TEST_BUFFER_VALUE", 7usize), 42);
        assert_eq!(env_or("ENGAGE_TEST_BUFFER_UNSET", 9u64), 9);
    }
}
