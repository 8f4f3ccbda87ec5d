//! rstream Provider
//!
//! Persistent, partitioned event streams on a consumer-group log.
//!
//! # Architecture
//!
//! ```text
//! producer → QueueAdapter → HashRingQueueMapper → StreamLog (queue <name>-<i>)
//!                                                      ↓
//! external poller → QueueReceiver.poll → BatchContainer → subscribers
//!                 → QueueReceiver.acknowledge (ack + delete)
//!                                                      ↓
//!                     delivery failures → StreamFailureHandler → FailureBus
//! ```
//!
//! # Components
//!
//! - **StreamProvider**: startup wiring and factory
//! - **QueueAdapter**: appends events to the queue their stream maps to
//! - **QueueReceiver**: consumer-group reads, acknowledgment, bounded shutdown
//! - **Failure handling**: logs failures and republishes them on a bus
//! - **Config**: environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use rstream_provider::{ProviderConfig, StreamProvider};
//! use rstream_domain::EventTypeRegistry;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ProviderConfig::from_env().expect("Failed to load config");
//!     let provider = StreamProvider::start(config, Arc::new(EventTypeRegistry::new()))
//!         .await
//!         .expect("Provider error");
//!     let receiver = provider.create_receiver(provider.queue_mapper().all_queues()[0].clone());
//! }
//! ```

#![warn(clippy::all)]

pub mod adapter;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod failure;
pub mod provider;
pub mod receiver;

// Re-exports for convenience
pub use adapter::{AppendReport, QueueAdapter, RequestContext, StreamProviderDirection};
pub use config::{ProviderConfig, DEFAULT_PULL_INTERVAL, DEFAULT_QUEUE_COUNT};
pub use error::{ProviderError, ProviderResult};
pub use event_bus::{FailureBus, FailureKind, FailureNotice, FailureReceiver};
pub use failure::{LoggingFailureHandler, StreamFailureHandler};
pub use provider::StreamProvider;
pub use receiver::{OperationKind, QueueReceiver, ReceiverState, CONSUMER_GROUP};
