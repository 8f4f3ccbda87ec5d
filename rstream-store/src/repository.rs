//! Stream log port
//!
//! The command surface the queue adapter needs from a log-structured store.
//! Implementations can be Redis, in-memory, or mock for testing.

use crate::error::StoreError;
use async_trait::async_trait;
use rstream_domain::{EntryFields, RawEntry};

/// Where a consumer-group read starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCursor {
    /// Entries already delivered to this consumer but not yet acknowledged (`0`)
    Backlog,
    /// Entries never delivered to the group (`>`)
    NewOnly,
}

impl ReadCursor {
    /// Id argument understood by the store
    pub fn as_id(&self) -> &'static str {
        match self {
            ReadCursor::Backlog => "0",
            ReadCursor::NewOnly => ">",
        }
    }
}

/// Result of an acknowledge + delete round trip
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckOutcome {
    /// Ids removed from the group's pending list
    pub acknowledged: usize,
    /// Ids removed from the log
    pub deleted: usize,
}

/// Append log with consumer groups, keyed by log name
#[async_trait]
pub trait StreamLog: Send + Sync {
    /// Append one entry; returns the store-assigned id
    async fn append(&self, key: &str, fields: &EntryFields) -> Result<String, StoreError>;

    /// Create `group` on `key` starting after the current last entry,
    /// creating the log if needed.
    ///
    /// Returns `StoreError::GroupExists` if the group is already there.
    async fn create_group(&self, key: &str, group: &str) -> Result<(), StoreError>;

    /// Read up to `count` entries for `consumer` in `group`
    async fn read_group(
        &self,
        key: &str,
        group: &str,
        consumer: &str,
        cursor: ReadCursor,
        count: usize,
    ) -> Result<Vec<RawEntry>, StoreError>;

    /// Acknowledge `ids` for `group` and delete them from the log, in one round trip.
    ///
    /// Unknown or already-acknowledged ids are not an error.
    async fn ack_and_delete(&self, key: &str, group: &str, ids: &[String]) -> Result<AckOutcome, StoreError>;

    /// Number of delivered but unacknowledged entries in `group`
    async fn pending_count(&self, key: &str, group: &str) -> Result<usize, StoreError>;

    /// Number of entries currently in the log (0 if it does not exist)
    async fn log_len(&self, key: &str) -> Result<usize, StoreError>;
}
