//! Failure notification bus.
//!
//! Lets the host observe delivery and subscription failures reported to
//! the failure handler, without the handler knowing who listens.
//!
//! Uses tokio broadcast channels for fan-out to multiple receivers.

use chrono::{DateTime, Utc};
use rstream_domain::{StreamIdentity, StreamToken};
use tokio::sync::broadcast;
use uuid::Uuid;

// =============================================================================
// Notice Types
// =============================================================================

/// What failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A batch could not be delivered to a subscriber
    Delivery,
    /// A subscription faulted
    Subscription,
}

/// One reported failure.
#[derive(Debug, Clone)]
pub struct FailureNotice {
    /// Delivery or subscription
    pub kind: FailureKind,
    /// Subscription the failure belongs to
    pub subscription_id: Uuid,
    /// Provider that delivered the batch
    pub provider_name: String,
    /// Stream being delivered
    pub stream: StreamIdentity,
    /// Position of the failed delivery
    pub token: StreamToken,
    /// When the failure was reported
    pub occurred_at: DateTime<Utc>,
}

// =============================================================================
// Failure Bus
// =============================================================================

/// Broadcast bus for failure notices.
pub struct FailureBus {
    sender: broadcast::Sender<FailureNotice>,
}

impl FailureBus {
    /// Create a new bus with specified capacity.
    ///
    /// Capacity determines how many notices can be buffered before
    /// slow receivers start missing them (lagging).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a notice. Returns the number of receivers reached (0 if none).
    pub fn send(&self, notice: FailureNotice) -> usize {
        self.sender.send(notice).unwrap_or(0)
    }

    /// Subscribe to notices sent after this call.
    pub fn subscribe(&self) -> FailureReceiver {
        FailureReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for FailureBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Receiver for failure notices.
pub struct FailureReceiver {
    receiver: broadcast::Receiver<FailureNotice>,
}

impl FailureReceiver {
    /// Receive the next notice.
    ///
    /// Returns `None` if the bus has been dropped.
    /// Returns error description if the receiver lagged (missed notices).
    pub async fn recv(&mut self) -> Option<Result<FailureNotice, String>> {
        match self.receiver.recv().await {
            Ok(notice) => Some(Ok(notice)),
            Err(broadcast::error::RecvError::Closed) => None,
            Err(broadcast::error::RecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} notices", count)))
            },
        }
    }

    /// Try to receive a notice without blocking.
    pub fn try_recv(&mut self) -> Option<Result<FailureNotice, String>> {
        match self.receiver.try_recv() {
            Ok(notice) => Some(Ok(notice)),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Closed) => None,
            Err(broadcast::error::TryRecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} notices", count)))
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstream_domain::SequenceToken;

    fn notice(kind: FailureKind) -> FailureNotice {
        FailureNotice {
            kind,
            subscription_id: Uuid::new_v4(),
            provider_name: "orders".to_string(),
            stream: StreamIdentity::new("orders", "42"),
            token: SequenceToken::new(1, 0).into(),
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_bus_send_recv() {
        let bus = FailureBus::new(10);
        let mut receiver = bus.subscribe();

        assert_eq!(bus.send(notice(FailureKind::Delivery)), 1);

        let received = receiver.recv().await.unwrap().unwrap();
        assert_eq!(received.kind, FailureKind::Delivery);
        assert_eq!(received.stream, StreamIdentity::new("orders", "42"));
    }

    #[tokio::test]
    async fn test_bus_multiple_receivers() {
        let bus = FailureBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.receiver_count(), 2);

        bus.send(notice(FailureKind::Subscription));

        assert!(first.recv().await.unwrap().is_ok());
        assert!(second.recv().await.unwrap().is_ok());
    }

    #[test]
    fn test_bus_no_receivers() {
        let bus = FailureBus::default();
        assert_eq!(bus.send(notice(FailureKind::Delivery)), 0);
    }

    #[test]
    fn test_bus_lag_reported() {
        let bus = FailureBus::new(1);
        let mut receiver = bus.subscribe();

        bus.send(notice(FailureKind::Delivery));
        bus.send(notice(FailureKind::Delivery));

        assert!(matches!(receiver.try_recv(), Some(Err(_))));
        assert!(matches!(receiver.try_recv(), Some(Ok(_))));
        assert!(receiver.try_recv().is_none());
    }
}
