//! Stream failure handling.
//!
//! The host reports delivery and subscription failures after it hands a
//! batch to subscribers. Handling is observational: the failure is logged
//! and published, and the subscription is always faulted.

use crate::event_bus::{FailureBus, FailureKind, FailureNotice};
use async_trait::async_trait;
use chrono::Utc;
use rstream_domain::{StreamIdentity, StreamToken};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

/// Sink for failures reported by the hosting runtime
#[async_trait]
pub trait StreamFailureHandler: Send + Sync {
    /// Whether a subscription that hit an error should be torn down
    fn should_fault_subscription_on_error(&self) -> bool;

    /// A batch could not be delivered to `subscription_id`
    async fn on_delivery_failure(
        &self,
        subscription_id: Uuid,
        provider_name: &str,
        stream: &StreamIdentity,
        token: &StreamToken,
    );

    /// `subscription_id` faulted
    async fn on_subscription_failure(
        &self,
        subscription_id: Uuid,
        provider_name: &str,
        stream: &StreamIdentity,
        token: &StreamToken,
    );
}

/// Logs every failure and republishes it on a [`FailureBus`].
pub struct LoggingFailureHandler {
    bus: Arc<FailureBus>,
}

impl LoggingFailureHandler {
    /// Create a handler publishing on `bus`
    pub fn new(bus: Arc<FailureBus>) -> Self {
        Self { bus }
    }

    fn publish(
        &self,
        kind: FailureKind,
        subscription_id: Uuid,
        provider_name: &str,
        stream: &StreamIdentity,
        token: &StreamToken,
    ) {
        self.bus.send(FailureNotice {
            kind,
            subscription_id,
            provider_name: provider_name.to_string(),
            stream: stream.clone(),
            token: *token,
            occurred_at: Utc::now(),
        });
    }
}

#[async_trait]
impl StreamFailureHandler for LoggingFailureHandler {
    fn should_fault_subscription_on_error(&self) -> bool {
        true
    }

    async fn on_delivery_failure(
        &self,
        subscription_id: Uuid,
        provider_name: &str,
        stream: &StreamIdentity,
        token: &StreamToken,
    ) {
        error!(
            subscription_id = %subscription_id,
            provider = provider_name,
            stream = %stream,
            token = %token,
            "Delivery failure"
        );
        self.publish(FailureKind::Delivery, subscription_id, provider_name, stream, token);
    }

    async fn on_subscription_failure(
        &self,
        subscription_id: Uuid,
        provider_name: &str,
        stream: &StreamIdentity,
        token: &StreamToken,
    ) {
        error!(
            subscription_id = %subscription_id,
            provider = provider_name,
            stream = %stream,
            token = %token,
            "Subscription failure"
        );
        self.publish(FailureKind::Subscription, subscription_id, provider_name, stream, token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstream_domain::{EventSequenceToken, SequenceToken};

    #[tokio::test]
    async fn test_always_faults() {
        let handler = LoggingFailureHandler::new(Arc::new(FailureBus::default()));
        assert!(handler.should_fault_subscription_on_error());
    }

    #[tokio::test]
    async fn test_failures_are_published() {
        let bus = Arc::new(FailureBus::new(8));
        let mut receiver = bus.subscribe();
        let handler = LoggingFailureHandler::new(bus);

        let subscription = Uuid::new_v4();
        let stream = StreamIdentity::new("orders", "42");
        let log_token = StreamToken::from(SequenceToken::new(7, 1));
        let event_token = StreamToken::from(EventSequenceToken { sequence_number: 2, event_index: 0 });

        handler.on_delivery_failure(subscription, "orders", &stream, &log_token).await;
        handler.on_subscription_failure(subscription, "orders", &stream, &event_token).await;

        let first = receiver.recv().await.unwrap().unwrap();
        assert_eq!(first.kind, FailureKind::Delivery);
        assert_eq!(first.subscription_id, subscription);
        assert_eq!(first.token, log_token);

        let second = receiver.recv().await.unwrap().unwrap();
        assert_eq!(second.kind, FailureKind::Subscription);
        assert_eq!(second.token, event_token);
    }

    #[tokio::test]
    async fn test_no_listener_is_fine() {
        let handler = LoggingFailureHandler::new(Arc::new(FailureBus::default()));
        let token = StreamToken::from(SequenceToken::new(1, 0));
        handler
            .on_delivery_failure(Uuid::new_v4(), "p", &StreamIdentity::new("a", "b"), &token)
            .await;
    }
}
