//! Storage layer errors

use rstream_domain::DomainError;
use thiserror::Error;

/// Errors that can occur talking to the log store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Consumer group already exists (idempotent create)
    #[error("Consumer group {group} already exists on {key}")]
    GroupExists {
        /// Log key
        key: String,
        /// Group name
        group: String,
    },

    /// Consumer group (or its log) does not exist
    #[error("No consumer group {group} on {key}")]
    NoGroup {
        /// Log key
        key: String,
        /// Group name
        group: String,
    },

    /// Store unreachable or connection dropped
    #[error("Connection error: {0}")]
    Connection(String),

    /// Store rejected a command
    #[error("Command error: {0}")]
    Command(String),

    /// Reply did not have the expected shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation did not finish in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid connection settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Domain error passthrough
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl StoreError {
    /// Create a group-exists error
    pub fn group_exists(key: impl Into<String>, group: impl Into<String>) -> Self {
        Self::GroupExists {
            key: key.into(),
            group: group.into(),
        }
    }

    /// Create a no-group error
    pub fn no_group(key: impl Into<String>, group: impl Into<String>) -> Self {
        Self::NoGroup {
            key: key.into(),
            group: group.into(),
        }
    }

    /// Whether a later attempt may succeed without intervention
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Connection(_) | StoreError::Timeout(_))
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            StoreError::Timeout(err.to_string())
        } else if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            StoreError::Connection(err.to_string())
        } else if err.kind() == redis::ErrorKind::TypeError {
            StoreError::Protocol(err.to_string())
        } else {
            StoreError::Command(err.to_string())
        }
    }
}
