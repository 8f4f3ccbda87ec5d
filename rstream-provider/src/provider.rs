//! Stream provider: wires configuration, connection, mapper and adapter.
//!
//! Created once at host startup. Only configuration and connection errors
//! escape from here; everything after startup degrades to logged outcomes.

use crate::adapter::QueueAdapter;
use crate::config::ProviderConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::event_bus::FailureBus;
use crate::failure::{LoggingFailureHandler, StreamFailureHandler};
use crate::receiver::QueueReceiver;
use rstream_domain::{EventTypeRegistry, HashRingQueueMapper, QueueId};
use rstream_store::ConnectionManager;
use std::sync::Arc;
use tracing::{debug, info};

/// Factory for the adapter, receivers and failure handlers of one provider
pub struct StreamProvider {
    config: ProviderConfig,
    mapper: Arc<HashRingQueueMapper>,
    adapter: QueueAdapter,
    failure_bus: Arc<FailureBus>,
    failure_handler: Arc<LoggingFailureHandler>,
}

impl StreamProvider {
    /// Validate `config`, connect to the store and build the hash ring.
    ///
    /// # Errors
    /// `ProviderError::Config` for invalid settings, `ProviderError::Startup`
    /// when the store cannot be reached. Both are fatal.
    pub async fn start(config: ProviderConfig, registry: Arc<EventTypeRegistry>) -> ProviderResult<Self> {
        config.validate()?;
        let connection = ConnectionManager::connect(&config.connection_string, config.database)
            .await
            .map_err(ProviderError::startup)?;
        Self::with_connection(config, connection, registry)
    }

    /// Build a provider on an existing connection.
    pub fn with_connection(
        config: ProviderConfig,
        connection: ConnectionManager,
        registry: Arc<EventTypeRegistry>,
    ) -> ProviderResult<Self> {
        config.validate()?;
        let mapper = Arc::new(HashRingQueueMapper::new(&config.provider_name, config.queue_count)?);
        let adapter = QueueAdapter::new(
            config.provider_name.clone(),
            Arc::clone(&mapper),
            connection.clone(),
            registry,
        );
        let failure_bus = Arc::new(FailureBus::default());
        let failure_handler = Arc::new(LoggingFailureHandler::new(Arc::clone(&failure_bus)));

        info!(
            provider = %config.provider_name,
            backend = %connection.backend(),
            database = connection.database(),
            queues = mapper.queue_count(),
            "Stream provider started"
        );

        Ok(Self {
            config,
            mapper,
            adapter,
            failure_bus,
            failure_handler,
        })
    }

    /// Provider name
    pub fn name(&self) -> &str {
        &self.config.provider_name
    }

    /// Configuration the provider started with
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// The adapter; cheap to clone
    pub fn adapter(&self) -> &QueueAdapter {
        &self.adapter
    }

    /// Queue mapper shared by the adapter
    pub fn queue_mapper(&self) -> &HashRingQueueMapper {
        &self.mapper
    }

    /// New receiver for `queue_id`
    pub fn create_receiver(&self, queue_id: QueueId) -> QueueReceiver {
        debug!(provider = %self.config.provider_name, queue = %queue_id, "Creating receiver");
        self.adapter.create_receiver(queue_id)
    }

    /// Failure handler for `queue_id`. The same handler serves every queue.
    pub fn failure_handler(&self, _queue_id: &QueueId) -> Arc<dyn StreamFailureHandler> {
        self.failure_handler.clone()
    }

    /// Bus the failure handler publishes on
    pub fn failure_bus(&self) -> Arc<FailureBus> {
        Arc::clone(&self.failure_bus)
    }
}
