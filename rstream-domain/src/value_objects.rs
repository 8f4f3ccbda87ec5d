//! Value Objects for stream partitioning
//!
//! Immutable, validated identifiers shared by producers and consumers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Entry id is not `<sequenceNumber>-<eventIndex>`
    #[error("Invalid entry id format: {0}")]
    InvalidTokenFormat(String),

    /// Two tokens of different kinds were compared
    #[error("Cannot compare {left} token with {right} token")]
    TokenKindMismatch {
        /// Kind of the receiver token
        left: &'static str,
        /// Kind of the argument token
        right: &'static str,
    },

    /// Queue count must be at least one
    #[error("Invalid queue count: {0}")]
    InvalidQueueCount(String),

    /// A batch container needs at least one entry
    #[error("Batch has no entries")]
    EmptyBatch,

    /// Raw entry does not carry the expected fields
    #[error("Malformed entry {id}: {reason}")]
    MalformedEntry {
        /// Store-assigned entry id
        id: String,
        /// What is missing
        reason: String,
    },
}

// =============================================================================
// StreamIdentity
// =============================================================================

/// Names one logical event stream: `(namespace, key)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamIdentity {
    namespace: String,
    key: String,
}

impl StreamIdentity {
    /// Create a stream identity
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
        }
    }

    /// Stream namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Stream key within the namespace
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for StreamIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.key)
    }
}

// =============================================================================
// QueueId
// =============================================================================

/// Identifies one physical partition (one log).
///
/// The rendered form `<prefix>-<index>` is used as the store's log key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueId {
    prefix: String,
    index: u32,
    ring_position: u32,
}

impl QueueId {
    /// Create a queue id. The prefix is lowercased.
    pub fn new(prefix: &str, index: u32, ring_position: u32) -> Self {
        Self {
            prefix: prefix.to_lowercase(),
            index,
            ring_position,
        }
    }

    /// Provider-derived name prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Position of this queue among all queues (0-based)
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Position of this queue on the hash ring
    pub fn ring_position(&self) -> u32 {
        self.ring_position
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.prefix, self.index)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_identity_accessors() {
        let id = StreamIdentity::new("orders", "42");
        assert_eq!(id.namespace(), "orders");
        assert_eq!(id.key(), "42");
        assert_eq!(id.to_string(), "orders/42");
    }

    #[test]
    fn test_queue_id_display_is_log_key() {
        let queue = QueueId::new("Orders-Provider", 3, 12345);
        assert_eq!(queue.to_string(), "orders-provider-3");
        assert_eq!(queue.index(), 3);
        assert_eq!(queue.ring_position(), 12345);
    }

    #[test]
    fn test_queue_id_equality_is_structural() {
        assert_eq!(QueueId::new("p", 1, 10), QueueId::new("P", 1, 10));
        assert_ne!(QueueId::new("p", 1, 10), QueueId::new("p", 2, 10));
    }
}
