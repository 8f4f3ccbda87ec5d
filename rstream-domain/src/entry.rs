//! Raw log entries and their field layout.

use crate::token::SequenceToken;
use crate::value_objects::{DomainError, StreamIdentity};
use serde::{Deserialize, Serialize};

/// Field names written to the log, in write order.
pub const FIELD_NAMES: [&str; 4] = ["StreamNamespace", "StreamKey", "EventType", "Data"];

/// Decoded field set of one entry.
///
/// On write the fields are emitted in [`FIELD_NAMES`] order; on read they
/// are looked up by position, not by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFields {
    /// Stream the event belongs to
    pub stream: StreamIdentity,
    /// Declared event type descriptor
    pub event_type: String,
    /// JSON-encoded event
    pub payload: String,
}

impl EntryFields {
    /// Build the field set for one event
    pub fn new(stream: StreamIdentity, event_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            stream,
            event_type: event_type.into(),
            payload: payload.into(),
        }
    }

    /// Field/value pairs in write order
    pub fn to_pairs(&self) -> [(&'static str, &str); 4] {
        [
            (FIELD_NAMES[0], self.stream.namespace()),
            (FIELD_NAMES[1], self.stream.key()),
            (FIELD_NAMES[2], self.event_type.as_str()),
            (FIELD_NAMES[3], self.payload.as_str()),
        ]
    }
}

/// One record as returned by the store: id plus ordered field/value pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    /// Store-assigned id, `<sequenceNumber>-<eventIndex>`
    pub id: String,
    /// Field/value pairs in stored order
    pub values: Vec<(String, String)>,
}

impl RawEntry {
    /// Create a raw entry
    pub fn new(id: impl Into<String>, values: Vec<(String, String)>) -> Self {
        Self {
            id: id.into(),
            values,
        }
    }

    /// Raw entry for an encoded field set
    pub fn from_fields(id: impl Into<String>, fields: &EntryFields) -> Self {
        let values = fields
            .to_pairs()
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        Self::new(id, values)
    }

    /// Token parsed from the entry id
    ///
    /// # Errors
    /// Returns `DomainError::InvalidTokenFormat` for a malformed id.
    pub fn token(&self) -> Result<SequenceToken, DomainError> {
        SequenceToken::parse(&self.id)
    }

    /// Decode the fixed-position fields.
    ///
    /// # Errors
    /// Returns `DomainError::MalformedEntry` if fewer than four values exist.
    pub fn fields(&self) -> Result<EntryFields, DomainError> {
        let value = |index: usize| {
            self.values
                .get(index)
                .map(|(_, value)| value.clone())
                .ok_or_else(|| DomainError::MalformedEntry {
                    id: self.id.clone(),
                    reason: format!("missing field {} ({})", index, FIELD_NAMES[index]),
                })
        };

        Ok(EntryFields {
            stream: StreamIdentity::new(value(0)?, value(1)?),
            event_type: value(2)?,
            payload: value(3)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_follow_write_order() {
        let fields = EntryFields::new(StreamIdentity::new("orders", "42"), "shop.OrderPlaced", "{}");
        let names: Vec<&str> = fields.to_pairs().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, FIELD_NAMES);
    }

    #[test]
    fn test_fields_read_by_position() {
        // Names are ignored on read; position decides.
        let entry = RawEntry::new(
            "5-0",
            vec![
                ("a".to_string(), "orders".to_string()),
                ("b".to_string(), "42".to_string()),
                ("c".to_string(), "shop.OrderPlaced".to_string()),
                ("d".to_string(), "{\"id\":1}".to_string()),
            ],
        );

        let fields = entry.fields().unwrap();
        assert_eq!(fields.stream, StreamIdentity::new("orders", "42"));
        assert_eq!(fields.event_type, "shop.OrderPlaced");
        assert_eq!(fields.payload, "{\"id\":1}");
        assert_eq!(entry.token().unwrap(), SequenceToken::new(5, 0));
    }

    #[test]
    fn test_missing_fields_is_malformed() {
        let entry = RawEntry::new("1-0", vec![("StreamNamespace".to_string(), "orders".to_string())]);
        assert!(matches!(entry.fields(), Err(DomainError::MalformedEntry { .. })));
    }
}
