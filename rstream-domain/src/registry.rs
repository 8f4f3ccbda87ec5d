//! Event type registry
//!
//! Maps the type descriptor stored with each entry to a decoder. Decoders
//! are registered per (descriptor, target type) pair, so an entry can be
//! decoded as its own type and as any wider type it was registered into.
//!
//! ```rust
//! use rstream_domain::{EventTypeRegistry, StreamEvent};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Deposited { amount: u64 }
//!
//! impl StreamEvent for Deposited {
//!     const EVENT_TYPE: &'static str = "bank.Deposited";
//! }
//!
//! let registry = EventTypeRegistry::new().with_event::<Deposited>();
//! let event: Deposited = registry.decode("bank.Deposited", r#"{"amount":5}"#).unwrap();
//! assert_eq!(event.amount, 5);
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::{type_name, Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// An event that can travel through a queue.
///
/// `EVENT_TYPE` is written next to the payload and must stay stable for as
/// long as entries of this type may sit in a log.
pub trait StreamEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Fully-qualified type descriptor
    const EVENT_TYPE: &'static str;
}

/// Anything the adapter can write: a descriptor and a JSON payload, both
/// taken from the instance.
///
/// Every [`StreamEvent`] is one. A sum type over several events implements
/// it by delegating to the variant, so each entry is stored under its
/// concrete descriptor and decodes as that type:
///
/// ```rust
/// use rstream_domain::{EncodeEvent, StreamEvent};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Opened { id: u32 }
/// impl StreamEvent for Opened { const EVENT_TYPE: &'static str = "bank.Opened"; }
///
/// #[derive(Serialize, Deserialize)]
/// struct Closed { id: u32 }
/// impl StreamEvent for Closed { const EVENT_TYPE: &'static str = "bank.Closed"; }
///
/// enum Account { Opened(Opened), Closed(Closed) }
///
/// impl EncodeEvent for Account {
///     fn event_type(&self) -> &'static str {
///         match self {
///             Account::Opened(e) => e.event_type(),
///             Account::Closed(e) => e.event_type(),
///         }
///     }
///
///     fn encode_payload(&self) -> Result<String, serde_json::Error> {
///         match self {
///             Account::Opened(e) => e.encode_payload(),
///             Account::Closed(e) => e.encode_payload(),
///         }
///     }
/// }
///
/// assert_eq!(Account::Closed(Closed { id: 1 }).event_type(), "bank.Closed");
/// ```
pub trait EncodeEvent: Send + Sync {
    /// Descriptor of this instance's concrete type
    fn event_type(&self) -> &'static str;

    /// JSON payload of this instance, decodable under [`event_type`](Self::event_type)
    fn encode_payload(&self) -> Result<String, serde_json::Error>;
}

impl<E: StreamEvent> EncodeEvent for E {
    fn event_type(&self) -> &'static str {
        E::EVENT_TYPE
    }

    fn encode_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Errors decoding a stored payload
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Descriptor not registered
    #[error("Unknown event type: {0}")]
    UnknownType(String),

    /// Descriptor registered, but not decodable as the requested type
    #[error("Event type {descriptor} is not assignable to {target}")]
    NotAssignable {
        /// Stored descriptor
        descriptor: String,
        /// Requested Rust type
        target: &'static str,
    },

    /// Payload did not match the declared type
    #[error("Invalid payload for {descriptor}: {source}")]
    Payload {
        /// Stored descriptor
        descriptor: String,
        /// JSON error
        #[source]
        source: serde_json::Error,
    },
}

type Decoder = Box<dyn Fn(&str) -> Result<Box<dyn Any + Send>, serde_json::Error> + Send + Sync>;

/// Registry of known event types, populated at startup.
#[derive(Default)]
pub struct EventTypeRegistry {
    known: HashSet<&'static str>,
    decoders: HashMap<(&'static str, TypeId), Decoder>,
}

impl EventTypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `E`, decodable as itself
    pub fn with_event<E: StreamEvent>(mut self) -> Self {
        self.register::<E>();
        self
    }

    /// Register `E` and allow decoding it as the wider type `T`
    pub fn with_event_into<E, T>(mut self) -> Self
    where
        E: StreamEvent + Into<T>,
        T: Send + 'static,
    {
        self.register_into::<E, T>();
        self
    }

    /// Register `E`, decodable as itself
    pub fn register<E: StreamEvent>(&mut self) {
        self.known.insert(E::EVENT_TYPE);
        self.decoders.insert(
            (E::EVENT_TYPE, TypeId::of::<E>()),
            Box::new(|payload| {
                let event: E = serde_json::from_str(payload)?;
                Ok(Box::new(event) as Box<dyn Any + Send>)
            }),
        );
    }

    /// Register `E` and allow decoding it as the wider type `T`
    pub fn register_into<E, T>(&mut self)
    where
        E: StreamEvent + Into<T>,
        T: Send + 'static,
    {
        self.register::<E>();
        self.decoders.insert(
            (E::EVENT_TYPE, TypeId::of::<T>()),
            Box::new(|payload| {
                let event: E = serde_json::from_str(payload)?;
                let wide: T = event.into();
                Ok(Box::new(wide) as Box<dyn Any + Send>)
            }),
        );
    }

    /// Whether the descriptor is known
    pub fn contains(&self, descriptor: &str) -> bool {
        self.known.contains(descriptor)
    }

    /// Whether entries of `descriptor` decode as `T`
    pub fn is_assignable<T: 'static>(&self, descriptor: &str) -> bool {
        self.decoder_for::<T>(descriptor).is_some()
    }

    /// Decode a payload stored under `descriptor` as `T`.
    ///
    /// # Errors
    /// - `UnknownType` if the descriptor was never registered
    /// - `NotAssignable` if it was, but not for `T`
    /// - `Payload` if the JSON does not match
    pub fn decode<T: 'static>(&self, descriptor: &str, payload: &str) -> Result<T, DecodeError> {
        if !self.contains(descriptor) {
            return Err(DecodeError::UnknownType(descriptor.to_string()));
        }

        let decoder = self
            .decoder_for::<T>(descriptor)
            .ok_or_else(|| DecodeError::NotAssignable {
                descriptor: descriptor.to_string(),
                target: type_name::<T>(),
            })?;

        let boxed = decoder(payload).map_err(|source| DecodeError::Payload {
            descriptor: descriptor.to_string(),
            source,
        })?;

        // Keyed by TypeId::of::<T>(), so the downcast cannot miss.
        boxed.downcast::<T>().map(|event| *event).map_err(|_| DecodeError::NotAssignable {
            descriptor: descriptor.to_string(),
            target: type_name::<T>(),
        })
    }

    /// Number of registered descriptors
    pub fn len(&self) -> usize {
        self.known.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    fn decoder_for<T: 'static>(&self, descriptor: &str) -> Option<&Decoder> {
        // Keys hold &'static str; look up through the interned copy.
        let interned = self.known.get(descriptor)?;
        self.decoders.get(&(*interned, TypeId::of::<T>()))
    }
}

impl fmt::Debug for EventTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut known: Vec<&&str> = self.known.iter().collect();
        known.sort();
        f.debug_struct("EventTypeRegistry")
            .field("known", &known)
            .field("decoders", &self.decoders.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Opened {
        account: String,
    }

    impl StreamEvent for Opened {
        const EVENT_TYPE: &'static str = "bank.Opened";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Closed {
        account: String,
    }

    impl StreamEvent for Closed {
        const EVENT_TYPE: &'static str = "bank.Closed";
    }

    #[derive(Debug, PartialEq)]
    enum AccountEvent {
        Opened(Opened),
        Closed(Closed),
    }

    impl From<Opened> for AccountEvent {
        fn from(e: Opened) -> Self {
            AccountEvent::Opened(e)
        }
    }

    impl From<Closed> for AccountEvent {
        fn from(e: Closed) -> Self {
            AccountEvent::Closed(e)
        }
    }

    fn registry() -> EventTypeRegistry {
        EventTypeRegistry::new()
            .with_event_into::<Opened, AccountEvent>()
            .with_event_into::<Closed, AccountEvent>()
    }

    #[test]
    fn test_decode_exact_type() {
        let opened: Opened = registry().decode("bank.Opened", r#"{"account":"a1"}"#).unwrap();
        assert_eq!(opened.account, "a1");
    }

    #[test]
    fn test_decode_into_wider_type() {
        let registry = registry();
        let event: AccountEvent = registry.decode("bank.Closed", r#"{"account":"a2"}"#).unwrap();
        assert_eq!(event, AccountEvent::Closed(Closed { account: "a2".to_string() }));
        assert!(registry.is_assignable::<AccountEvent>("bank.Opened"));
    }

    #[test]
    fn test_unknown_descriptor() {
        let err = registry().decode::<Opened>("bank.Frozen", "{}").unwrap_err();
        assert!(matches!(err, DecodeError::UnknownType(ref d) if d == "bank.Frozen"));
    }

    #[test]
    fn test_not_assignable() {
        let err = registry().decode::<Closed>("bank.Opened", r#"{"account":"a"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::NotAssignable { .. }));
        assert!(!registry().is_assignable::<String>("bank.Opened"));
    }

    #[test]
    fn test_bad_payload() {
        let err = registry().decode::<Opened>("bank.Opened", "not json").unwrap_err();
        assert!(matches!(err, DecodeError::Payload { .. }));
    }

    #[test]
    fn test_len_counts_descriptors() {
        let registry = registry();
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
        assert!(EventTypeRegistry::new().is_empty());
    }

    impl EncodeEvent for AccountEvent {
        fn event_type(&self) -> &'static str {
            match self {
                AccountEvent::Opened(e) => e.event_type(),
                AccountEvent::Closed(e) => e.event_type(),
            }
        }

        fn encode_payload(&self) -> Result<String, serde_json::Error> {
            match self {
                AccountEvent::Opened(e) => e.encode_payload(),
                AccountEvent::Closed(e) => e.encode_payload(),
            }
        }
    }

    #[test]
    fn test_sum_type_encodes_under_variant_descriptor() {
        let registry = registry();
        let events = vec![
            AccountEvent::Opened(Opened { account: "a1".to_string() }),
            AccountEvent::Closed(Closed { account: "a1".to_string() }),
        ];

        let encoded: Vec<(&str, String)> = events
            .iter()
            .map(|e| (e.event_type(), e.encode_payload().unwrap()))
            .collect();
        assert_eq!(encoded[0].0, "bank.Opened");
        assert_eq!(encoded[1].0, "bank.Closed");

        let opened: Opened = registry.decode(encoded[0].0, &encoded[0].1).unwrap();
        let closed: Closed = registry.decode(encoded[1].0, &encoded[1].1).unwrap();
        assert_eq!(opened.account, "a1");
        assert_eq!(closed.account, "a1");

        let wide: AccountEvent = registry.decode(encoded[1].0, &encoded[1].1).unwrap();
        assert_eq!(wide, events[1]);
    }

    #[test]
    fn test_stream_event_encodes_under_its_const() {
        let event = Opened { account: "b".to_string() };
        assert_eq!(event.event_type(), Opened::EVENT_TYPE);
        assert_eq!(event.encode_payload().unwrap(), r#"{"account":"b"}"#);
    }
}
