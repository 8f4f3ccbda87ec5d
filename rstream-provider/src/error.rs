//! Provider error types.

use rstream_domain::DomainError;
use rstream_store::StoreError;
use thiserror::Error;

/// Provider-level errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Invalid configuration; fatal at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store unreachable while the provider was starting; fatal
    #[error("Startup connection failed: {0}")]
    Startup(StoreError),

    /// Store error
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Event could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation did not finish in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Receiver is shutting down or closed
    #[error("Receiver closed: {0}")]
    Closed(String),
}

impl From<StoreError> for ProviderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Config(message) => ProviderError::Config(message),
            other => ProviderError::Store(other),
        }
    }
}

impl ProviderError {
    /// Classify a failure to open the store connection at startup.
    pub fn startup(err: StoreError) -> Self {
        match err {
            StoreError::Config(message) => ProviderError::Config(message),
            other => ProviderError::Startup(other),
        }
    }

    /// Whether this error should stop the provider from starting
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProviderError::Config(_) | ProviderError::Startup(_))
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;
