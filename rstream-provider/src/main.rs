//! rstream probe
//!
//! Starts a provider from the environment, makes sure every queue has its
//! consumer group, reports queue depth, and shuts the receivers down.
//!
//! # Usage
//!
//! ```bash
//! RSTREAM_CONNECTION_STRING=memory://probe cargo run -p rstream-provider
//!
//! RSTREAM_CONNECTION_STRING=redis://127.0.0.1:6379 RSTREAM_QUEUE_COUNT=4 \
//!     cargo run -p rstream-provider --features redis
//! ```
//!
//! # Environment Variables
//!
//! - `RSTREAM_PROVIDER_NAME`: Provider name and queue prefix (default: rstream)
//! - `RSTREAM_CONNECTION_STRING`: Store connection string (required)
//! - `RSTREAM_DATABASE`: Database index (default: 0)
//! - `RSTREAM_QUEUE_COUNT`: Number of queues (default: 8)
//! - `RSTREAM_PULL_INTERVAL_MS`: Advisory poll interval (default: 100)

use rstream_domain::EventTypeRegistry;
use rstream_provider::{ProviderConfig, StreamProvider, CONSUMER_GROUP};
use rstream_store::ConnectionManager;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("rstream_provider=info".parse()?)
                .add_directive("rstream_store=info".parse()?),
        )
        .init();

    // Load configuration
    let config = ProviderConfig::from_env()?;
    let timeout = config.pull_interval * 10;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        provider = %config.provider_name,
        database = config.database,
        queues = config.queue_count,
        "rstream probe"
    );

    let connection = ConnectionManager::connect(&config.connection_string, config.database).await?;
    let log = connection.database_handle();
    let provider = StreamProvider::with_connection(config, connection, Arc::new(EventTypeRegistry::new()))?;

    for queue in provider.queue_mapper().all_queues() {
        let mut receiver = provider.create_receiver(queue.clone());
        receiver.initialize(timeout).await;

        let key = queue.to_string();
        match (log.log_len(&key).await, log.pending_count(&key, CONSUMER_GROUP).await) {
            (Ok(length), Ok(pending)) => {
                info!(queue = %queue, ring_position = queue.ring_position(), length, pending, "Queue ready")
            },
            (Err(e), _) | (_, Err(e)) => warn!(queue = %queue, error = %e, "Queue not inspectable"),
        }

        receiver.shutdown(timeout).await;
    }

    Ok(())
}
