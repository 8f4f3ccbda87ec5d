//! Sequence tokens
//!
//! A token marks the position of one event inside one queue. Tokens are
//! only ordered relative to tokens of the same queue.

use crate::value_objects::DomainError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// SequenceToken
// =============================================================================

/// Position parsed from a store entry id `<sequenceNumber>-<eventIndex>`.
///
/// Ordered by `sequence_number`, then `event_index`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequenceToken {
    sequence_number: i64,
    event_index: i32,
}

impl SequenceToken {
    /// Create a token from its components
    pub fn new(sequence_number: i64, event_index: i32) -> Self {
        Self {
            sequence_number,
            event_index,
        }
    }

    /// Parse a store entry id.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidTokenFormat` unless the id is two
    /// integers joined by a single `-`.
    pub fn parse(entry_id: &str) -> Result<Self, DomainError> {
        let invalid = || DomainError::InvalidTokenFormat(entry_id.to_string());

        let (sequence, index) = entry_id.split_once('-').ok_or_else(invalid)?;
        if index.contains('-') {
            return Err(invalid());
        }

        let sequence_number = sequence.parse::<i64>().map_err(|_| invalid())?;
        let event_index = index.parse::<i32>().map_err(|_| invalid())?;

        Ok(Self::new(sequence_number, event_index))
    }

    /// Sequence number (first component of the entry id)
    pub fn sequence_number(&self) -> i64 {
        self.sequence_number
    }

    /// Event index within the sequence number
    pub fn event_index(&self) -> i32 {
        self.event_index
    }
}

impl FromStr for SequenceToken {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SequenceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.sequence_number, self.event_index)
    }
}

// =============================================================================
// EventSequenceToken
// =============================================================================

/// Generic position token issued by the hosting runtime rather than the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventSequenceToken {
    /// Runtime-assigned sequence number
    pub sequence_number: i64,
    /// Index within the sequence number
    pub event_index: i32,
}

// =============================================================================
// StreamToken
// =============================================================================

/// Any token the provider may be handed.
///
/// Tokens of different kinds carry no common order, so comparison is
/// fallible instead of implementing `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamToken {
    /// Derived from a store entry id
    Log(SequenceToken),
    /// Issued by the hosting runtime
    Event(EventSequenceToken),
}

impl StreamToken {
    /// Short name of the token kind
    pub fn kind(&self) -> &'static str {
        match self {
            StreamToken::Log(_) => "log",
            StreamToken::Event(_) => "event",
        }
    }

    /// Compare two tokens of the same kind.
    ///
    /// # Errors
    /// Returns `DomainError::TokenKindMismatch` when the kinds differ.
    pub fn try_cmp(&self, other: &StreamToken) -> Result<Ordering, DomainError> {
        match (self, other) {
            (StreamToken::Log(a), StreamToken::Log(b)) => Ok(a.cmp(b)),
            (StreamToken::Event(a), StreamToken::Event(b)) => Ok(a.cmp(b)),
            _ => Err(DomainError::TokenKindMismatch {
                left: self.kind(),
                right: other.kind(),
            }),
        }
    }

    /// Store-derived token, if this is one
    pub fn as_log(&self) -> Option<&SequenceToken> {
        match self {
            StreamToken::Log(token) => Some(token),
            StreamToken::Event(_) => None,
        }
    }
}

impl From<SequenceToken> for StreamToken {
    fn from(token: SequenceToken) -> Self {
        StreamToken::Log(token)
    }
}

impl From<EventSequenceToken> for StreamToken {
    fn from(token: EventSequenceToken) -> Self {
        StreamToken::Event(token)
    }
}

impl fmt::Display for StreamToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamToken::Log(token) => write!(f, "log:{}", token),
            StreamToken::Event(token) => {
                write!(f, "event:{}-{}", token.sequence_number, token.event_index)
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
