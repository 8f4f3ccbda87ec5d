//! Batch containers
//!
//! A poll hands back its entries as one container: a single entry when the
//! store returned one record, an aggregate otherwise. Both shapes flatten to
//! the same ordered entry list for decoding and acknowledgment.

use crate::entry::RawEntry;
use crate::registry::{DecodeError, EventTypeRegistry};
use crate::token::SequenceToken;
use crate::value_objects::{DomainError, StreamIdentity};
use std::sync::Arc;

// =============================================================================
// BatchEntry
// =============================================================================

/// One decoded log entry, payload still encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    stream: StreamIdentity,
    event_type: String,
    payload: String,
    token: SequenceToken,
    entry_id: String,
}

impl BatchEntry {
    /// Decode the fixed fields and id of a raw entry.
    ///
    /// # Errors
    /// Returns `DomainError` if the id is not a valid token or fields are missing.
    pub fn from_raw(raw: RawEntry) -> Result<Self, DomainError> {
        let token = raw.token()?;
        let fields = raw.fields()?;

        Ok(Self {
            stream: fields.stream,
            event_type: fields.event_type,
            payload: fields.payload,
            token,
            entry_id: raw.id,
        })
    }

    /// Stream the entry was appended to
    pub fn stream_identity(&self) -> &StreamIdentity {
        &self.stream
    }

    /// Declared type descriptor
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Raw JSON payload
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Position within the queue
    pub fn sequence_token(&self) -> SequenceToken {
        self.token
    }

    /// Store id used for acknowledgment
    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    /// Decode the payload as `T`.
    ///
    /// # Errors
    /// Returns `DecodeError` if the declared type is unknown, not assignable
    /// to `T`, or the payload does not parse.
    pub fn decode<T: 'static>(&self, registry: &EventTypeRegistry) -> Result<(T, SequenceToken), DecodeError> {
        let event = registry.decode::<T>(&self.event_type, &self.payload)?;
        Ok((event, self.token))
    }
}

// =============================================================================
// Batch
// =============================================================================

/// Shape of a poll result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Batch {
    /// Exactly one entry
    Single(BatchEntry),
    /// Several entries, in log order
    Many(Vec<BatchEntry>),
}

impl Batch {
    /// Build the batch shape for a list of entries; `None` when empty.
    pub fn from_entries(mut entries: Vec<BatchEntry>) -> Option<Self> {
        match entries.len() {
            0 => None,
            1 => entries.pop().map(Batch::Single),
            _ => Some(Batch::Many(entries)),
        }
    }

    /// All entries in order
    pub fn entries(&self) -> &[BatchEntry] {
        match self {
            Batch::Single(entry) => std::slice::from_ref(entry),
            Batch::Many(entries) => entries,
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// True only for a hand-built empty `Many`; such a batch cannot be wrapped
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

// =============================================================================
// BatchContainer
// =============================================================================

/// Immutable unit of delivery handed to subscribers.
#[derive(Debug, Clone)]
pub struct BatchContainer {
    batch: Batch,
    registry: Arc<EventTypeRegistry>,
}

impl BatchContainer {
    /// Wrap a batch; decoding goes through `registry`.
    ///
    /// # Errors
    /// `DomainError::EmptyBatch` for `Batch::Many` without entries.
    pub fn new(batch: Batch, registry: Arc<EventTypeRegistry>) -> Result<Self, DomainError> {
        if batch.is_empty() {
            return Err(DomainError::EmptyBatch);
        }
        Ok(Self { batch, registry })
    }

    /// Underlying batch shape
    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    /// Entries in log order, regardless of shape
    pub fn entries(&self) -> &[BatchEntry] {
        self.batch.entries()
    }

    /// True for an aggregated container
    pub fn is_aggregate(&self) -> bool {
        matches!(self.batch, Batch::Many(_))
    }

    /// Stream of the first entry.
    ///
    /// An aggregate may span several streams; see [`BatchEntry::stream_identity`].
    pub fn stream_identity(&self) -> &StreamIdentity {
        self.first().stream_identity()
    }

    /// Position reached by this container (token of its last entry)
    pub fn sequence_token(&self) -> SequenceToken {
        self.last().sequence_token()
    }

    /// Ids of all entries, for acknowledgment
    pub fn entry_ids(&self) -> impl Iterator<Item = &str> {
        self.entries().iter().map(BatchEntry::entry_id)
    }

    /// Events assignable to `T`, paired with their tokens, in entry order.
    ///
    /// Entries whose declared type is unknown or not assignable to `T`
    /// contribute nothing.
    pub fn events_of<T: 'static>(&self) -> Vec<(T, SequenceToken)> {
        self.entries()
            .iter()
            .filter_map(|entry| entry.decode::<T>(&self.registry).ok())
            .collect()
    }

    /// Like [`events_of`](Self::events_of), but report the first decode failure.
    ///
    /// # Errors
    /// Returns the `DecodeError` of the first entry that fails.
    pub fn try_events_of<T: 'static>(&self) -> Result<Vec<(T, SequenceToken)>, DecodeError> {
        self.entries()
            .iter()
            .map(|entry| entry.decode::<T>(&self.registry))
            .collect()
    }

    /// Request context is not carried through the log
    pub fn import_request_context(&self) -> bool {
        false
    }

    fn first(&self) -> &BatchEntry {
        match &self.batch {
            Batch::Single(entry) => entry,
            // Non-empty, checked in `new`.
            Batch::Many(entries) => &entries[0],
        }
    }

    fn last(&self) -> &BatchEntry {
        match &self.batch {
            Batch::Single(entry) => entry,
            Batch::Many(entries) => &entries[entries.len() - 1],
        }
    }
}

/// Every entry id across a set of containers, aggregated or not
pub fn collect_entry_ids(containers: &[BatchContainer]) -> Vec<String> {
    containers
        .iter()
        .flat_map(|container| container.entry_ids())
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
