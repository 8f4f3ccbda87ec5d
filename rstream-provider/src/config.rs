//! Provider configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{ProviderError, ProviderResult};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default number of queues
pub const DEFAULT_QUEUE_COUNT: u32 = 8;

/// Default advisory pull interval for the external poller
pub const DEFAULT_PULL_INTERVAL: Duration = Duration::from_millis(100);

// =============================================================================
// Configuration
// =============================================================================

/// Stream provider configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Provider name; also the queue name prefix
    pub provider_name: String,
    /// Store connection string (required)
    pub connection_string: String,
    /// Database index within the store
    pub database: i64,
    /// Number of queues on the hash ring (>= 1)
    pub queue_count: u32,
    /// How often the host should poll each receiver
    pub pull_interval: Duration,
}

impl ProviderConfig {
    /// Create a configuration with defaults for everything but the connection.
    pub fn new(provider_name: impl Into<String>, connection_string: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            connection_string: connection_string.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let provider_name = env::var("RSTREAM_PROVIDER_NAME").unwrap_or_else(|_| "rstream".to_string());
        let connection_string = env::var("RSTREAM_CONNECTION_STRING").unwrap_or_default();
        let database = Self::load_env("RSTREAM_DATABASE", 0i64)?;
        let queue_count = Self::load_env("RSTREAM_QUEUE_COUNT", DEFAULT_QUEUE_COUNT)?;
        let pull_interval_ms = Self::load_env("RSTREAM_PULL_INTERVAL_MS", DEFAULT_PULL_INTERVAL.as_millis() as u64)?;

        let config = Self {
            provider_name,
            connection_string,
            database,
            queue_count,
            pull_interval: Duration::from_millis(pull_interval_ms),
        };
        config.validate()?;
        Ok(config)
    }

    /// Create test configuration backed by a named in-memory log.
    pub fn test(name: &str) -> Self {
        Self {
            provider_name: name.to_string(),
            connection_string: format!("memory://{}", name),
            database: 0,
            queue_count: 4,
            pull_interval: Duration::from_millis(10),
        }
    }

    /// Check the settings that must hold before the provider starts.
    ///
    /// # Errors
    /// `ProviderError::Config` for an empty provider name, an empty or
    /// whitespace connection string, or a zero queue count.
    pub fn validate(&self) -> ProviderResult<()> {
        if self.provider_name.trim().is_empty() {
            return Err(ProviderError::Config("provider name is not set".to_string()));
        }
        if self.connection_string.trim().is_empty() {
            return Err(ProviderError::Config(format!(
                "connection string is not set for provider {}",
                self.provider_name
            )));
        }
        if self.queue_count == 0 {
            return Err(ProviderError::Config(format!(
                "queue count must be at least 1 for provider {}",
                self.provider_name
            )));
        }
        if self.database < 0 {
            return Err(ProviderError::Config(format!("Invalid database index: {}", self.database)));
        }
        Ok(())
    }

    fn load_env<T: FromStr>(key: &str, default: T) -> ProviderResult<T> {
        match env::var(key) {
            Ok(val) => val
                .trim()
                .parse::<T>()
                .map_err(|_| ProviderError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_name: "rstream".to_string(),
            connection_string: String::new(),
            database: 0,
            queue_count: DEFAULT_QUEUE_COUNT,
            pull_interval: DEFAULT_PULL_INTERVAL,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProviderConfig::default();

        assert_eq!(config.queue_count, 8);
        assert_eq!(config.database, 0);
        assert_eq!(config.pull_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_default_config_is_invalid_without_connection() {
        let err = ProviderConfig::default().validate().unwrap_err();
        assert!(matches!(err, ProviderError::Config(ref m) if m.contains("connection string")));
    }

    #[test]
    fn test_whitespace_connection_string_rejected() {
        let config = ProviderConfig::new("orders", "   ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_queue_count_rejected() {
        let config = ProviderConfig {
            queue_count: 0,
            ..ProviderConfig::new("orders", "memory://x")
        };
        assert!(matches!(config.validate(), Err(ProviderError::Config(ref m)) if m.contains("queue count")));
    }

    #[test]
    fn test_test_config_is_valid() {
        let config = ProviderConfig::test("unit");

        assert!(config.validate().is_ok());
        assert_eq!(config.connection_string, "memory://unit");
        assert_eq!(config.queue_count, 4);
    }
}
