//! In-memory stream log
//!
//! Used for testing and development without a store server. Mirrors the
//! consumer-group semantics the adapter relies on: ids are
//! `<millis>-<counter>`, groups track a last-delivered id and a pending
//! list per consumer, and acknowledged ids leave the pending list.

use crate::error::StoreError;
use crate::repository::{AckOutcome, ReadCursor, StreamLog};
use async_trait::async_trait;
use rstream_domain::{EntryFields, RawEntry, SequenceToken};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// One log
#[derive(Default)]
struct MemoryStream {
    entries: BTreeMap<SequenceToken, Vec<(String, String)>>,
    last_id: SequenceToken,
    groups: HashMap<String, ConsumerGroup>,
}

impl MemoryStream {
    fn next_id(&mut self) -> SequenceToken {
        let now = chrono::Utc::now().timestamp_millis();
        let id = if now > self.last_id.sequence_number() {
            SequenceToken::new(now, 0)
        } else {
            SequenceToken::new(self.last_id.sequence_number(), self.last_id.event_index() + 1)
        };
        self.last_id = id;
        id
    }

    fn raw(&self, id: &SequenceToken) -> Option<RawEntry> {
        self.entries
            .get(id)
            .map(|values| RawEntry::new(id.to_string(), values.clone()))
    }
}

/// Cursor and pending list of one group
struct ConsumerGroup {
    last_delivered: SequenceToken,
    /// id -> consumer it was delivered to
    pending: BTreeMap<SequenceToken, String>,
}

/// In-memory stream log for testing
pub struct MemoryStreamLog {
    streams: Mutex<HashMap<String, MemoryStream>>,
    fail_next: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryStreamLog {
    /// Create a new empty log store
    pub fn new() -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            fail_next: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Make the next operation fail with a connection error.
    pub fn set_fail_next(&self, fail: bool) {
        self.fail_next.store(fail, Ordering::SeqCst);
    }

    /// Delay every operation by `latency` before it touches the log.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Ids currently stored under `key`, in order
    pub async fn entry_ids(&self, key: &str) -> Vec<String> {
        let streams = self.streams.lock().await;
        streams
            .get(key)
            .map(|s| s.entries.keys().map(ToString::to_string).collect())
            .unwrap_or_default()
    }

    /// Append an entry with arbitrary field/value pairs, bypassing
    /// [`EntryFields`]. Lets tests store entries other writers could leave.
    pub async fn append_values(&self, key: &str, values: Vec<(String, String)>) -> Result<String, StoreError> {
        self.before_op("append").await?;

        let mut streams = self.streams.lock().await;
        let stream = streams.entry(key.to_string()).or_default();
        let id = stream.next_id();
        stream.entries.insert(id, values);
        Ok(id.to_string())
    }

    /// Whether `group` exists on `key`
    pub async fn has_group(&self, key: &str, group: &str) -> bool {
        let streams = self.streams.lock().await;
        streams.get(key).is_some_and(|s| s.groups.contains_key(group))
    }

    /// Clear all data (useful for test setup)
    pub async fn clear(&self) {
        self.streams.lock().await.clear();
    }

    /// Simulated latency and failure, applied before every operation.
    async fn before_op(&self, op: &str) -> Result<(), StoreError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Connection(format!("Simulated failure during {}", op)));
        }
        Ok(())
    }
}

impl Default for MemoryStreamLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamLog for MemoryStreamLog {
    async fn append(&self, key: &str, fields: &EntryFields) -> Result<String, StoreError> {
        self.before_op("append").await?;

        let mut streams = self.streams.lock().await;
        let stream = streams.entry(key.to_string()).or_default();
        let id = stream.next_id();
        let values = fields
            .to_pairs()
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        stream.entries.insert(id, values);

        Ok(id.to_string())
    }

    async fn create_group(&self, key: &str, group: &str) -> Result<(), StoreError> {
        self.before_op("create_group").await?;

        let mut streams = self.streams.lock().await;
        let stream = streams.entry(key.to_string()).or_default();
        if stream.groups.contains_key(group) {
            return Err(StoreError::group_exists(key, group));
        }

        let last_delivered = stream.last_id;
        stream.groups.insert(
            group.to_string(),
            ConsumerGroup {
                last_delivered,
                pending: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn read_group(
        &self,
        key: &str,
        group: &str,
        consumer: &str,
        cursor: ReadCursor,
        count: usize,
    ) -> Result<Vec<RawEntry>, StoreError> {
        self.before_op("read_group").await?;

        let mut streams = self.streams.lock().await;
        let stream = streams
            .get_mut(key)
            .ok_or_else(|| StoreError::no_group(key, group))?;

        let MemoryStream { entries, groups, .. } = &mut *stream;
        let state = groups.get_mut(group).ok_or_else(|| StoreError::no_group(key, group))?;

        let ids: Vec<SequenceToken> = match cursor {
            ReadCursor::Backlog => state
                .pending
                .iter()
                .filter(|(id, owner)| owner.as_str() == consumer && entries.contains_key(*id))
                .map(|(id, _)| *id)
                .take(count)
                .collect(),
            ReadCursor::NewOnly => {
                let after = state.last_delivered;
                let ids: Vec<SequenceToken> = entries
                    .range(after..)
                    .map(|(id, _)| *id)
                    .filter(|id| *id > after)
                    .take(count)
                    .collect();

                if let Some(last) = ids.last() {
                    state.last_delivered = *last;
                }
                for id in &ids {
                    state.pending.insert(*id, consumer.to_string());
                }
                ids
            },
        };

        let stream = &*stream;
        Ok(ids.iter().filter_map(|id| stream.raw(id)).collect())
    }

    async fn ack_and_delete(&self, key: &str, group: &str, ids: &[String]) -> Result<AckOutcome, StoreError> {
        self.before_op("ack_and_delete").await?;

        let tokens = ids
            .iter()
            .map(|id| SequenceToken::parse(id))
            .collect::<Result<Vec<_>, _>>()?;

        let mut streams = self.streams.lock().await;
        let Some(stream) = streams.get_mut(key) else {
            return Ok(AckOutcome::default());
        };

        let mut outcome = AckOutcome::default();
        if let Some(state) = stream.groups.get_mut(group) {
            outcome.acknowledged = tokens.iter().filter(|id| state.pending.remove(*id).is_some()).count();
        }
        outcome.deleted = tokens.iter().filter(|id| stream.entries.remove(*id).is_some()).count();

        Ok(outcome)
    }

    async fn pending_count(&self, key: &str, group: &str) -> Result<usize, StoreError> {
        self.before_op("pending_count").await?;

        let streams = self.streams.lock().await;
        streams
            .get(key)
            .and_then(|s| s.groups.get(group))
            .map(|g| g.pending.len())
            .ok_or_else(|| StoreError::no_group(key, group))
    }

    async fn log_len(&self, key: &str) -> Result<usize, StoreError> {
        self.before_op("log_len").await?;

        let streams = self.streams.lock().await;
        Ok(streams.get(key).map(|s| s.entries.len()).unwrap_or(0))
    }
}

// =============================================================================
// Tests
// =============================================================================
