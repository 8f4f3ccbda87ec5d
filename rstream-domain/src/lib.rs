//! rstream Domain Layer
//!
//! Pure types for routing typed events through partitioned append logs.
//! No I/O: stores, producers and consumers live in the other crates.
//!
//! - **Value objects**: `StreamIdentity`, `QueueId`
//! - **Tokens**: `SequenceToken` parsed from store entry ids, `StreamToken`
//! - **Entries and batches**: `RawEntry`, `BatchEntry`, `Batch`, `BatchContainer`
//! - **Registry**: descriptor-to-decoder map for lazy payload decoding
//! - **Mapper**: hash ring from streams to queues

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod batch;
pub mod entry;
pub mod mapper;
pub mod registry;
pub mod token;
pub mod value_objects;

// Re-export commonly used types
pub use batch::{collect_entry_ids, Batch, BatchContainer, BatchEntry};
pub use entry::{EntryFields, RawEntry, FIELD_NAMES};
pub use mapper::{uniform_hash, HashRingQueueMapper};
pub use registry::{DecodeError, EncodeEvent, EventTypeRegistry, StreamEvent};
pub use token::{EventSequenceToken, SequenceToken, StreamToken};
pub use value_objects::{DomainError, QueueId, StreamIdentity};
