//! Test helpers for rstream tests.
//!
//! Provides sample order events, a registry that knows them, and seeding
//! helpers for in-memory logs.

mod events;
mod helpers;

pub use events::{test_registry, OrderEvent, OrderPlaced, OrderShipped};
pub use helpers::{append_raw, memory_connection_string, seed_orders, AppendRawOptions};

/// Install a test-friendly tracing subscriber.
///
/// Safe to call from every test; only the first call installs anything.
/// Filter comes from `RUST_LOG`, default `warn`.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
