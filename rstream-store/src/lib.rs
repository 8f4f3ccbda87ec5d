//! rstream Storage Layer
//!
//! Append logs with consumer groups, behind one port.
//!
//! # Architecture
//!
//! - **`StreamLog` trait**: the store command surface (port)
//! - **In-memory log**: consumer-group semantics in process, for tests
//! - **Redis log**: Redis Streams (feature `redis`)
//! - **Connection manager**: picks the backend from a connection string
//!
//! # Usage
//!
//! ```rust
//! use rstream_domain::{EntryFields, StreamIdentity};
//! use rstream_store::{MemoryStreamLog, ReadCursor, StreamLog};
//!
//! #[tokio::main]
//! async fn main() {
//!     let log = MemoryStreamLog::new();
//!     log.create_group("orders-0", "consumer").await.unwrap();
//!
//!     let fields = EntryFields::new(StreamIdentity::new("orders", "42"), "shop.OrderPlaced", "{}");
//!     log.append("orders-0", &fields).await.unwrap();
//!
//!     let entries = log
//!         .read_group("orders-0", "consumer", "orders-0", ReadCursor::NewOnly, 10)
//!         .await
//!         .unwrap();
//!     println!("Read {} entries", entries.len());
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod connection;
mod error;
mod memory;
#[cfg(feature = "redis")]
mod redis_log;
mod repository;

// Re-exports
pub use connection::{Backend, ConnectionManager, MEMORY_SCHEME};
pub use error::StoreError;
pub use memory::MemoryStreamLog;
#[cfg(feature = "redis")]
pub use redis_log::RedisStreamLog;
pub use repository::{AckOutcome, ReadCursor, StreamLog};
