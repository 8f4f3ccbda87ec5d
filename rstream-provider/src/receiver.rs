//! Queue receiver: the consumer side of one queue.
//!
//! A receiver is driven by an external poller. It never schedules itself;
//! each `poll`/`acknowledge` call issues at most a couple of store round
//! trips and returns.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized → Initialized → (poll / acknowledge)* → ShuttingDown → Closed
//! ```
//!
//! # Cursor
//!
//! The first successful poll reads this consumer's backlog (entries
//! delivered before a restart but never acknowledged). From then on only
//! entries new to the consumer group are read.
//!
//! # Failure policy
//!
//! Store failures never escape `initialize`, `poll`, `acknowledge` or
//! `shutdown`; they are logged and turned into an empty result. The
//! `try_*` variants return the error for callers that want it.

use crate::error::{ProviderError, ProviderResult};
use rstream_domain::{collect_entry_ids, Batch, BatchContainer, BatchEntry, EventTypeRegistry, QueueId, RawEntry};
use rstream_store::{AckOutcome, ReadCursor, StoreError, StreamLog};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Consumer group used on every queue
pub const CONSUMER_GROUP: &str = "consumer";

// =============================================================================
// State
// =============================================================================

/// Lifecycle state of a receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Created, consumer group not yet ensured
    Uninitialized,
    /// `initialize` ran (successfully or degraded)
    Initialized,
    /// `shutdown` is waiting on outstanding work
    ShuttingDown,
    /// Released; polls return nothing
    Closed,
}

/// Kind of store operation in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Consumer-group read
    Poll,
    /// Acknowledge + delete
    Acknowledge,
}

/// Handle on the most recently issued store operation.
///
/// The operation runs as its own task, so it keeps going if the caller
/// stops waiting; shutdown waits on this handle.
#[derive(Debug)]
struct PendingOperation {
    kind: OperationKind,
    task: JoinHandle<()>,
}

// =============================================================================
// QueueReceiver
// =============================================================================

/// Polls and acknowledges one queue's consumer group.
pub struct QueueReceiver {
    queue_id: QueueId,
    key: String,
    log: Arc<dyn StreamLog>,
    registry: Arc<EventTypeRegistry>,
    cursor: ReadCursor,
    state: ReceiverState,
    pending: Option<PendingOperation>,
}

impl QueueReceiver {
    /// Create a receiver for `queue_id` on `log`.
    pub fn new(queue_id: QueueId, log: Arc<dyn StreamLog>, registry: Arc<EventTypeRegistry>) -> Self {
        let key = queue_id.to_string();
        Self {
            queue_id,
            key,
            log,
            registry,
            cursor: ReadCursor::Backlog,
            state: ReceiverState::Uninitialized,
            pending: None,
        }
    }

    /// Queue this receiver owns
    pub fn queue_id(&self) -> &QueueId {
        &self.queue_id
    }

    /// Current lifecycle state
    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Cursor the next poll will use
    pub fn cursor(&self) -> ReadCursor {
        self.cursor
    }

    /// Kind of the operation still running, if the caller stopped waiting on one
    pub fn pending_operation(&self) -> Option<OperationKind> {
        self.pending
            .as_ref()
            .filter(|op| !op.task.is_finished())
            .map(|op| op.kind)
    }

    // -------------------------------------------------------------------------
    // Initialize
    // -------------------------------------------------------------------------

    /// Ensure the consumer group exists. Never fails; see [`try_initialize`](Self::try_initialize).
    pub async fn initialize(&mut self, timeout: Duration) {
        if let Err(e) = self.try_initialize(timeout).await {
            error!(queue = %self.queue_id, error = %e, "Error initializing queue");
        }
    }

    /// Create the consumer group at the "new entries only" position.
    ///
    /// An existing group counts as success. The receiver moves to
    /// `Initialized` whatever the outcome.
    pub async fn try_initialize(&mut self, timeout: Duration) -> ProviderResult<()> {
        self.ensure_open()?;

        let result = match tokio::time::timeout(timeout, self.log.create_group(&self.key, CONSUMER_GROUP)).await {
            Ok(Ok(())) => {
                debug!(queue = %self.queue_id, "Consumer group created");
                Ok(())
            },
            Ok(Err(StoreError::GroupExists { .. })) => {
                debug!(queue = %self.queue_id, "Consumer group already exists");
                Ok(())
            },
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ProviderError::Timeout(format!(
                "creating consumer group on {} took longer than {:?}",
                self.key, timeout
            ))),
        };

        self.state = ReceiverState::Initialized;
        result
    }

    // -------------------------------------------------------------------------
    // Poll
    // -------------------------------------------------------------------------

    /// Read up to `max_count` entries. Returns zero or one container;
    /// empty means "try again later", never end of stream.
    pub async fn poll(&mut self, max_count: usize) -> Vec<BatchContainer> {
        match self.try_poll(max_count).await {
            Ok(Some(container)) => vec![container],
            Ok(None) => Vec::new(),
            Err(e) => {
                error!(queue = %self.queue_id, error = %e, "Error reading from queue");
                Vec::new()
            },
        }
    }

    /// Read up to `max_count` entries as one container.
    ///
    /// One entry gives a single container, several give one aggregate.
    /// While in backlog mode an empty backlog falls through to new
    /// entries in the same call.
    pub async fn try_poll(&mut self, max_count: usize) -> ProviderResult<Option<BatchContainer>> {
        self.ensure_open()?;
        if max_count == 0 {
            return Ok(None);
        }

        let mut raw = self.read(self.cursor, max_count).await?;
        if self.cursor == ReadCursor::Backlog {
            self.cursor = ReadCursor::NewOnly;
            if raw.is_empty() {
                raw = self.read(ReadCursor::NewOnly, max_count).await?;
            } else {
                info!(queue = %self.queue_id, count = raw.len(), "Redelivering unacknowledged entries");
            }
        }

        let mut entries = Vec::with_capacity(raw.len());
        let mut malformed = Vec::new();
        for entry in raw {
            let id = entry.id.clone();
            match BatchEntry::from_raw(entry) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    error!(queue = %self.queue_id, entry_id = %id, error = %e, "Skipping malformed entry");
                    malformed.push(id);
                },
            }
        }
        if !malformed.is_empty() {
            self.discard(malformed).await;
        }

        let Some(batch) = Batch::from_entries(entries) else {
            return Ok(None);
        };

        debug!(queue = %self.queue_id, count = batch.len(), "Polled entries");
        Ok(Some(BatchContainer::new(batch, Arc::clone(&self.registry))?))
    }

    /// Acknowledge and delete entries that can never be decoded, so they
    /// leave neither the pending list nor the log behind.
    async fn discard(&mut self, ids: Vec<String>) {
        let log = Arc::clone(&self.log);
        let key = self.key.clone();
        let count = ids.len();

        match self
            .track(OperationKind::Acknowledge, async move {
                log.ack_and_delete(&key, CONSUMER_GROUP, &ids).await
            })
            .await
        {
            Ok(outcome) => {
                warn!(queue = %self.queue_id, discarded = outcome.deleted, "Discarded malformed entries");
            },
            Err(e) => {
                // Still pending; redelivered through the backlog after a restart.
                error!(queue = %self.queue_id, count, error = %e, "Error discarding malformed entries");
            },
        }
    }

    async fn read(&mut self, cursor: ReadCursor, count: usize) -> ProviderResult<Vec<RawEntry>> {
        let log = Arc::clone(&self.log);
        let key = self.key.clone();

        // The queue id doubles as the consumer name.
        self.track(OperationKind::Poll, async move {
            log.read_group(&key, CONSUMER_GROUP, &key, cursor, count).await
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Acknowledge
    // -------------------------------------------------------------------------

    /// Acknowledge and purge everything in `delivered`. Never fails; see
    /// [`try_acknowledge`](Self::try_acknowledge).
    pub async fn acknowledge(&mut self, delivered: &[BatchContainer]) {
        if let Err(e) = self.try_acknowledge(delivered).await {
            error!(queue = %self.queue_id, error = %e, "Error acknowledging entries");
        }
    }

    /// Acknowledge every entry id across `delivered` and delete them from
    /// the log in one round trip.
    ///
    /// On error nothing is retried here; the ids stay pending in the store
    /// and come back through the backlog after a restart.
    pub async fn try_acknowledge(&mut self, delivered: &[BatchContainer]) -> ProviderResult<AckOutcome> {
        let ids = collect_entry_ids(delivered);
        if ids.is_empty() {
            return Ok(AckOutcome::default());
        }
        // Acknowledging during shutdown is still allowed; only Closed refuses.
        if self.state == ReceiverState::Closed {
            return Err(ProviderError::Closed(self.key.clone()));
        }

        let log = Arc::clone(&self.log);
        let key = self.key.clone();
        let count = ids.len();

        let outcome = self
            .track(OperationKind::Acknowledge, async move {
                log.ack_and_delete(&key, CONSUMER_GROUP, &ids).await
            })
            .await?;

        if outcome.acknowledged < count || outcome.deleted < count {
            debug!(
                queue = %self.queue_id,
                requested = count,
                acknowledged = outcome.acknowledged,
                deleted = outcome.deleted,
                "Some entries were already acknowledged or purged"
            );
        }
        Ok(outcome)
    }

    // -------------------------------------------------------------------------
    // Shutdown
    // -------------------------------------------------------------------------

    /// Wait up to `timeout` for outstanding work, then close. Never fails.
    pub async fn shutdown(&mut self, timeout: Duration) {
        if let Err(e) = self.try_shutdown(timeout).await {
            warn!(queue = %self.queue_id, error = %e, "Stopped waiting for outstanding operation");
        }
    }

    /// Wait up to `timeout` for the last issued operation, then close.
    ///
    /// On timeout the receiver still closes; the store operation is not
    /// cancelled and may complete server-side.
    pub async fn try_shutdown(&mut self, timeout: Duration) -> ProviderResult<()> {
        if self.state == ReceiverState::Closed {
            return Ok(());
        }
        self.state = ReceiverState::ShuttingDown;

        let result = match self.pending.take() {
            Some(op) if !op.task.is_finished() => {
                debug!(queue = %self.queue_id, operation = ?op.kind, "Waiting for outstanding operation");
                match tokio::time::timeout(timeout, op.task).await {
                    Ok(_) => Ok(()),
                    Err(_) => Err(ProviderError::Timeout(format!(
                        "{:?} on {} still running after {:?}",
                        op.kind, self.key, timeout
                    ))),
                }
            },
            _ => Ok(()),
        };

        self.state = ReceiverState::Closed;
        info!(queue = %self.queue_id, "Shutting down queue");
        result
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn ensure_open(&self) -> ProviderResult<()> {
        match self.state {
            ReceiverState::ShuttingDown | ReceiverState::Closed => Err(ProviderError::Closed(self.key.clone())),
            _ => Ok(()),
        }
    }

    /// Run a store operation as its own task and record it as the pending
    /// operation until it completes.
    async fn track<T, F>(&mut self, kind: OperationKind, operation: F) -> ProviderResult<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, StoreError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let _ = tx.send(operation.await);
        });
        self.pending = Some(PendingOperation { kind, task });

        let result = rx.await;
        // Only reached if the caller kept waiting; otherwise shutdown finds it.
        self.pending = None;

        match result {
            Ok(outcome) => outcome.map_err(ProviderError::from),
            Err(_) => Err(ProviderError::Store(StoreError::Connection(format!(
                "{:?} task on {} ended without a result",
                kind, self.key
            )))),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstream_domain::{EntryFields, StreamEvent, StreamIdentity};
    use rstream_store::MemoryStreamLog;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tick {
        n: u32,
    }

    impl StreamEvent for Tick {
        const EVENT_TYPE: &'static str = "test.Tick";
    }

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn setup() -> (Arc<MemoryStreamLog>, QueueReceiver) {
        let log = Arc::new(MemoryStreamLog::new());
        let registry = Arc::new(EventTypeRegistry::new().with_event::<Tick>());
        let receiver = QueueReceiver::new(QueueId::new("test", 0, 0), log.clone(), registry);
        (log, receiver)
    }

    async fn append(log: &MemoryStreamLog, n: u32) -> String {
        let fields = EntryFields::new(StreamIdentity::new("ns", "k"), Tick::EVENT_TYPE, format!("{{\"n\":{}}}", n));
        log.append("test-0", &fields).await.unwrap()
    }

    #[tokio::test]
    async fn test_initialize_twice_succeeds() {
        let (log, mut receiver) = setup();

        receiver.try_initialize(TIMEOUT).await.unwrap();
        receiver.try_initialize(TIMEOUT).await.unwrap();

        assert_eq!(receiver.state(), ReceiverState::Initialized);
        assert!(log.has_group("test-0", CONSUMER_GROUP).await);
    }

    #[tokio::test]
    async fn test_initialize_failure_is_swallowed() {
        let (log, mut receiver) = setup();
        log.set_fail_next(true);

        assert!(receiver.try_initialize(TIMEOUT).await.is_err());
        assert_eq!(receiver.state(), ReceiverState::Initialized);

        // The non-failing variant logs and moves on.
        log.set_fail_next(true);
        receiver.initialize(TIMEOUT).await;
    }

    #[tokio::test]
    async fn test_poll_empty_returns_nothing() {
        let (_log, mut receiver) = setup();
        receiver.initialize(TIMEOUT).await;

        assert!(receiver.poll(10).await.is_empty());
        assert_eq!(receiver.cursor(), ReadCursor::NewOnly);
    }

    #[tokio::test]
    async fn test_poll_single_and_aggregate() {
        let (log, mut receiver) = setup();
        receiver.initialize(TIMEOUT).await;

        append(&log, 1).await;
        let single = receiver.poll(10).await;
        assert_eq!(single.len(), 1);
        assert!(!single[0].is_aggregate());

        for n in 2..5 {
            append(&log, n).await;
        }
        let aggregate = receiver.poll(10).await;
        assert_eq!(aggregate.len(), 1);
        assert!(aggregate[0].is_aggregate());

        let numbers: Vec<u32> = aggregate[0].events_of::<Tick>().into_iter().map(|(t, _)| t.n).collect();
        assert_eq!(numbers, vec![2, 3, 4]);
    }

    fn missing_payload() -> Vec<(String, String)> {
        vec![
            ("StreamNamespace".to_string(), "ns".to_string()),
            ("StreamKey".to_string(), "k".to_string()),
        ]
    }

    #[tokio::test]
    async fn test_poll_discards_malformed_entries() {
        let (log, mut receiver) = setup();
        receiver.initialize(TIMEOUT).await;

        let bad = log.append_values("test-0", missing_payload()).await.unwrap();
        let good = append(&log, 1).await;

        let delivered = receiver.poll(10).await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].entry_ids().collect::<Vec<_>>(), vec![good.as_str()]);

        // Only the decodable entry is left for the caller to acknowledge.
        assert_eq!(log.entry_ids("test-0").await, vec![good]);
        assert!(!log.entry_ids("test-0").await.contains(&bad));
        assert_eq!(log.pending_count("test-0", CONSUMER_GROUP).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_poll_of_only_malformed_entries_returns_empty() {
        let (log, mut receiver) = setup();
        receiver.initialize(TIMEOUT).await;
        log.append_values("test-0", missing_payload()).await.unwrap();

        assert!(receiver.poll(10).await.is_empty());
        assert!(log.entry_ids("test-0").await.is_empty());
        assert_eq!(log.pending_count("test-0", CONSUMER_GROUP).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_poll_failure_returns_empty_and_keeps_cursor() {
        let (log, mut receiver) = setup();
        receiver.initialize(TIMEOUT).await;
        append(&log, 1).await;

        log.set_fail_next(true);
        assert!(receiver.poll(10).await.is_empty());
        assert_eq!(receiver.cursor(), ReadCursor::Backlog);

        assert_eq!(receiver.poll(10).await.len(), 1);
        assert_eq!(receiver.cursor(), ReadCursor::NewOnly);
    }

    #[tokio::test]
    async fn test_poll_without_group_returns_empty() {
        let (_log, mut receiver) = setup();
        assert!(matches!(
            receiver.try_poll(10).await,
            Err(ProviderError::Store(StoreError::NoGroup { .. }))
        ));
        assert!(receiver.poll(10).await.is_empty());
    }

    #[tokio::test]
    async fn test_acknowledge_purges_entries() {
        let (log, mut receiver) = setup();
        receiver.initialize(TIMEOUT).await;
        append(&log, 1).await;
        append(&log, 2).await;

        let delivered = receiver.poll(10).await;
        let outcome = receiver.try_acknowledge(&delivered).await.unwrap();

        assert_eq!(outcome, AckOutcome { acknowledged: 2, deleted: 2 });
        assert_eq!(log.pending_count("test-0", CONSUMER_GROUP).await.unwrap(), 0);
        assert!(log.entry_ids("test-0").await.is_empty());
    }

    #[tokio::test]
    async fn test_acknowledge_empty_is_noop() {
        let (log, mut receiver) = setup();
        log.set_fail_next(true);

        // No store call is made, so the armed failure is not consumed.
        assert_eq!(receiver.try_acknowledge(&[]).await.unwrap(), AckOutcome::default());
        assert!(log.log_len("x").await.is_err());
    }

    #[tokio::test]
    async fn test_acknowledge_failure_leaves_entries_pending() {
        let (log, mut receiver) = setup();
        receiver.initialize(TIMEOUT).await;
        append(&log, 1).await;

        let delivered = receiver.poll(10).await;
        log.set_fail_next(true);
        receiver.acknowledge(&delivered).await;

        assert_eq!(log.pending_count("test-0", CONSUMER_GROUP).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_receiver() {
        let (_log, mut receiver) = setup();
        receiver.initialize(TIMEOUT).await;

        receiver.try_shutdown(TIMEOUT).await.unwrap();
        assert_eq!(receiver.state(), ReceiverState::Closed);
        assert!(matches!(receiver.try_poll(10).await, Err(ProviderError::Closed(_))));
        assert!(receiver.poll(10).await.is_empty());

        // Idempotent.
        receiver.shutdown(TIMEOUT).await;
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_abandoned_poll() {
        let (log, mut receiver) = setup();
        receiver.initialize(TIMEOUT).await;
        log.set_latency(Duration::from_millis(100));

        // Caller gives up on the poll; the store call keeps running.
        assert!(tokio::time::timeout(Duration::from_millis(10), receiver.poll(10)).await.is_err());
        assert_eq!(receiver.pending_operation(), Some(OperationKind::Poll));

        receiver.try_shutdown(Duration::from_secs(2)).await.unwrap();
        assert_eq!(receiver.state(), ReceiverState::Closed);
        assert_eq!(receiver.pending_operation(), None);
    }

    #[tokio::test]
    async fn test_shutdown_wait_is_bounded() {
        let (log, mut receiver) = setup();
        receiver.initialize(TIMEOUT).await;
        log.set_latency(Duration::from_millis(500));

        assert!(tokio::time::timeout(Duration::from_millis(10), receiver.poll(10)).await.is_err());

        let err = receiver.try_shutdown(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
        assert_eq!(receiver.state(), ReceiverState::Closed);
    }
}
