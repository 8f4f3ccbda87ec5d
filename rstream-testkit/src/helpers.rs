//! Seeding helpers for in-memory logs.

use anyhow::Result;
use rstream_domain::{EntryFields, StreamEvent, StreamIdentity};
use rstream_store::StreamLog;
use uuid::Uuid;

use crate::events::OrderPlaced;

/// Options for appending an entry without going through the adapter.
pub struct AppendRawOptions {
    /// Stream the entry claims to belong to
    pub stream: StreamIdentity,
    /// Declared type descriptor (need not be registered)
    pub event_type: String,
    /// Payload as JSON value
    pub payload: serde_json::Value,
}

impl AppendRawOptions {
    /// Entry with an arbitrary descriptor and an empty object payload
    pub fn with_type(stream: StreamIdentity, event_type: impl Into<String>) -> Self {
        Self {
            stream,
            event_type: event_type.into(),
            payload: serde_json::json!({}),
        }
    }
}

/// Connection string for a fresh, uniquely named in-memory log.
///
/// Memory logs are shared process-wide by name, so tests running in
/// parallel each need their own.
pub fn memory_connection_string(prefix: &str) -> String {
    format!("memory://{}-{}", prefix, Uuid::new_v4().simple())
}

/// Append one entry to `key` as-is and return its id.
pub async fn append_raw(log: &dyn StreamLog, key: &str, options: AppendRawOptions) -> Result<String> {
    let AppendRawOptions {
        stream,
        event_type,
        payload,
    } = options;

    let fields = EntryFields::new(stream, event_type, serde_json::to_string(&payload)?);
    Ok(log.append(key, &fields).await?)
}

/// Append `count` [`OrderPlaced`] events to `key`; returns them with their ids.
///
/// Amounts are 100, 200, ... so tests can check order.
pub async fn seed_orders(
    log: &dyn StreamLog,
    key: &str,
    stream: &StreamIdentity,
    count: u64,
) -> Result<Vec<(OrderPlaced, String)>> {
    let mut seeded = Vec::new();
    for n in 1..=count {
        let event = OrderPlaced::new(n * 100);
        let id = append_raw(
            log,
            key,
            AppendRawOptions {
                stream: stream.clone(),
                event_type: OrderPlaced::EVENT_TYPE.to_string(),
                payload: serde_json::to_value(&event)?,
            },
        )
        .await?;
        seeded.push((event, id));
    }
    Ok(seeded)
}
