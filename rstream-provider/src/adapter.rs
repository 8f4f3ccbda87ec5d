//! Queue adapter: the producer side.
//!
//! Appends events to the queue their stream hashes to. Best effort: a
//! failed event is logged and skipped, its siblings are still written.

use crate::error::ProviderResult;
use crate::receiver::QueueReceiver;
use rstream_domain::{EncodeEvent, EntryFields, EventTypeRegistry, HashRingQueueMapper, QueueId, StreamIdentity, StreamToken};
use rstream_store::{ConnectionManager, StreamLog};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Ambient request context offered by the host. Not carried through the log.
pub type RequestContext = HashMap<String, serde_json::Value>;

/// What an adapter can be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProviderDirection {
    /// Consume only
    ReadOnly,
    /// Produce only
    WriteOnly,
    /// Both
    ReadWrite,
}

/// Result of one `append` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReport {
    /// Queue the stream maps to
    pub queue: QueueId,
    /// Entry ids of the events written, in input order
    pub appended: Vec<String>,
    /// Events that could not be encoded or written
    pub failed: usize,
}

/// Writes events to queues and hands out receivers.
#[derive(Clone)]
pub struct QueueAdapter {
    name: String,
    mapper: Arc<HashRingQueueMapper>,
    connection: ConnectionManager,
    registry: Arc<EventTypeRegistry>,
}

impl QueueAdapter {
    /// Create an adapter
    pub fn new(
        name: impl Into<String>,
        mapper: Arc<HashRingQueueMapper>,
        connection: ConnectionManager,
        registry: Arc<EventTypeRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            mapper,
            connection,
            registry,
        }
    }

    /// Provider name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Always [`StreamProviderDirection::ReadWrite`]
    pub fn direction(&self) -> StreamProviderDirection {
        StreamProviderDirection::ReadWrite
    }

    /// Always false: consumers only move forward
    pub fn is_rewindable(&self) -> bool {
        false
    }

    /// Receiver for `queue_id`, sharing this adapter's connection
    pub fn create_receiver(&self, queue_id: QueueId) -> QueueReceiver {
        QueueReceiver::new(queue_id, self.connection.database_handle(), Arc::clone(&self.registry))
    }

    /// Append `events` to the queue `stream` maps to.
    ///
    /// Each event is encoded under its own descriptor and appended on its
    /// own, so a batch of a sum type stores every variant as its concrete
    /// type. Failures are logged and counted in the report; they never stop
    /// the remaining events.
    /// `token` is ignored since the adapter cannot rewind, and `context` is
    /// not persisted.
    pub async fn append<T: EncodeEvent>(
        &self,
        stream: &StreamIdentity,
        events: &[T],
        token: Option<&StreamToken>,
        context: &RequestContext,
    ) -> AppendReport {
        let queue = self.mapper.queue_for(stream).clone();
        if let Some(token) = token {
            debug!(queue = %queue, stream = %stream, token = %token, "Ignoring append token");
        }
        if !context.is_empty() {
            debug!(queue = %queue, entries = context.len(), "Request context is not propagated");
        }

        let log = self.connection.database_handle();
        let key = queue.to_string();
        let mut report = AppendReport {
            queue,
            appended: Vec::with_capacity(events.len()),
            failed: 0,
        };

        for (index, event) in events.iter().enumerate() {
            match Self::try_append_one(log.as_ref(), &key, stream, event).await {
                Ok(id) => report.appended.push(id),
                Err(e) => {
                    report.failed += 1;
                    error!(
                        queue = %report.queue,
                        stream = %stream,
                        event_type = event.event_type(),
                        index,
                        error = %e,
                        "Error appending event"
                    );
                },
            }
        }

        debug!(
            queue = %report.queue,
            stream = %stream,
            appended = report.appended.len(),
            failed = report.failed,
            "Appended events"
        );
        report
    }

    /// Encode one event and append it to `key`.
    ///
    /// # Errors
    /// `ProviderError::Serialization` if the payload cannot be encoded,
    /// `ProviderError::Store` if the append fails.
    pub async fn try_append_one<T: EncodeEvent + ?Sized>(
        log: &dyn StreamLog,
        key: &str,
        stream: &StreamIdentity,
        event: &T,
    ) -> ProviderResult<String> {
        let payload = event.encode_payload()?;
        let fields = EntryFields::new(stream.clone(), event.event_type(), payload);
        Ok(log.append(key, &fields).await?)
    }

    /// Queue mapper in use
    pub fn queue_mapper(&self) -> &HashRingQueueMapper {
        &self.mapper
    }

    /// Store connection shared with every receiver
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }
}
