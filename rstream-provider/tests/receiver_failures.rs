//! Receiver behavior when the store misbehaves: failures degrade to empty
//! results and no-ops, and the next call recovers.

use rstream_domain::StreamIdentity;
use rstream_provider::{
    OperationKind, ProviderConfig, ProviderError, ReceiverState, RequestContext, StreamProvider, CONSUMER_GROUP,
};
use rstream_store::{Backend, ConnectionManager, MemoryStreamLog, ReadCursor, StreamLog};
use rstream_testkit::{init_test_tracing, test_registry, OrderPlaced};
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(1);

fn start(name: &str) -> (Arc<MemoryStreamLog>, StreamProvider) {
    init_test_tracing();
    let log = Arc::new(MemoryStreamLog::new());
    let connection = ConnectionManager::from_log(log.clone(), Backend::Memory, 0);
    let provider = StreamProvider::with_connection(ProviderConfig::test(name), connection, test_registry()).unwrap();
    (log, provider)
}

#[tokio::test]
async fn test_initialize_failure_does_not_block() {
    let (log, provider) = start("init-fail");
    let queue = provider.queue_mapper().all_queues()[0].clone();
    let mut receiver = provider.create_receiver(queue.clone());

    log.set_fail_next(true);
    receiver.initialize(TIMEOUT).await;
    assert_eq!(receiver.state(), ReceiverState::Initialized);

    // Missing group surfaces on poll, as an empty result.
    assert!(receiver.poll(10).await.is_empty());
    assert!(!log.has_group(&queue.to_string(), CONSUMER_GROUP).await);

    receiver.try_initialize(TIMEOUT).await.unwrap();
    assert!(log.has_group(&queue.to_string(), CONSUMER_GROUP).await);
}

#[tokio::test]
async fn test_poll_failure_recovers_on_next_call() {
    let (log, provider) = start("poll-fail");
    let stream = StreamIdentity::new("orders", "1");
    let mut receiver = provider.create_receiver(provider.queue_mapper().queue_for(&stream).clone());
    receiver.initialize(TIMEOUT).await;

    provider
        .adapter()
        .append(&stream, &[OrderPlaced::new(10)], None, &RequestContext::new())
        .await;

    log.set_fail_next(true);
    assert!(receiver.poll(10).await.is_empty());
    assert_eq!(receiver.cursor(), ReadCursor::Backlog);

    let delivered = receiver.poll(10).await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(receiver.cursor(), ReadCursor::NewOnly);
}

#[tokio::test]
async fn test_acknowledge_failure_keeps_entries_pending() {
    let (log, provider) = start("ack-fail");
    let stream = StreamIdentity::new("orders", "2");
    let queue = provider.queue_mapper().queue_for(&stream).clone();
    let mut receiver = provider.create_receiver(queue.clone());
    receiver.initialize(TIMEOUT).await;

    provider
        .adapter()
        .append(&stream, &[OrderPlaced::new(1), OrderPlaced::new(2)], None, &RequestContext::new())
        .await;
    let delivered = receiver.poll(10).await;

    log.set_fail_next(true);
    assert!(matches!(receiver.try_acknowledge(&delivered).await, Err(ProviderError::Store(_))));
    assert_eq!(log.pending_count(&queue.to_string(), CONSUMER_GROUP).await.unwrap(), 2);
    assert_eq!(log.log_len(&queue.to_string()).await.unwrap(), 2);

    // Not redelivered to the running receiver, only after a restart.
    assert!(receiver.poll(10).await.is_empty());

    receiver.acknowledge(&delivered).await;
    assert_eq!(log.pending_count(&queue.to_string(), CONSUMER_GROUP).await.unwrap(), 0);
    assert_eq!(log.log_len(&queue.to_string()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_append_failure_skips_only_failed_event() {
    let (log, provider) = start("append-fail");
    let stream = StreamIdentity::new("orders", "3");

    log.set_fail_next(true);
    let report = provider
        .adapter()
        .append(
            &stream,
            &[OrderPlaced::new(1), OrderPlaced::new(2), OrderPlaced::new(3)],
            None,
            &RequestContext::new(),
        )
        .await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.appended.len(), 2);
    assert_eq!(log.entry_ids(&report.queue.to_string()).await, report.appended);
}

#[tokio::test]
async fn test_shutdown_waits_for_slow_poll() {
    let (log, provider) = start("slow-poll");
    let mut receiver = provider.create_receiver(provider.queue_mapper().all_queues()[1].clone());
    receiver.initialize(TIMEOUT).await;

    log.set_latency(Duration::from_millis(50));
    let abandoned = tokio::time::timeout(Duration::from_millis(5), receiver.poll(10)).await;
    assert!(abandoned.is_err());
    assert_eq!(receiver.pending_operation(), Some(OperationKind::Poll));

    receiver.try_shutdown(TIMEOUT).await.unwrap();
    assert_eq!(receiver.state(), ReceiverState::Closed);
    assert!(receiver.poll(10).await.is_empty());
}

#[tokio::test]
async fn test_shutdown_stops_waiting_after_timeout() {
    let (log, provider) = start("stuck-poll");
    let mut receiver = provider.create_receiver(provider.queue_mapper().all_queues()[1].clone());
    receiver.initialize(TIMEOUT).await;

    log.set_latency(Duration::from_millis(400));
    assert!(tokio::time::timeout(Duration::from_millis(5), receiver.poll(10)).await.is_err());

    let started = std::time::Instant::now();
    receiver.shutdown(Duration::from_millis(20)).await;
    assert!(started.elapsed() < Duration::from_millis(300));
    assert_eq!(receiver.state(), ReceiverState::Closed);
}
