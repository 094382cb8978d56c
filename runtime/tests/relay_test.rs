//! Integration tests for `OutboxRelay`
//!
//! Records are enqueued through the in-memory store's append path and drained
//! with a `RecordingPublisher`, so batching and the polling loop are tested
//! against the same outbox semantics the PostgreSQL store provides.

use borrowing_core::environment::Clock;
use borrowing_core::event::SerializedEvent;
use borrowing_core::event_store::{AppendRequest, EventStore};
use borrowing_core::outbox::OutboxMessage;
use borrowing_core::stream::{StreamId, TenantId, Version};
use borrowing_runtime::relay::{OutboxRelay, RelayConfig};
use borrowing_runtime::retry::RedeliveryPolicy;
use borrowing_testing::{InMemoryEventStore, ManualClock, RecordingPublisher};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

#[allow(clippy::expect_used)]
async fn enqueue(store: &InMemoryEventStore, stream: &str, count: usize) {
    let messages: Vec<OutboxMessage> = (0..count)
        .map(|n| OutboxMessage {
            message_type: "ShelfNote".to_string(),
            payload: serde_json::json!({ "n": n }),
        })
        .collect();
    let request = AppendRequest::new(TenantId::from("T1"), StreamId::new(stream), Version::INITIAL)
        .with_event(SerializedEvent::new("Opened.v1".to_string(), vec![1], None))
        .with_messages(messages);

    store.append(request).await.expect("append should succeed");
}

fn config(batch_size: usize) -> RelayConfig {
    RelayConfig {
        batch_size,
        poll_interval: Duration::from_millis(5),
        redelivery: RedeliveryPolicy::builder()
            .max_attempts(2)
            .initial_delay(Duration::from_secs(1))
            .build(),
    }
}

#[tokio::test]
#[allow(clippy::expect_used)]
async fn test_batch_size_bounds_each_pass() {
    let store = Arc::new(InMemoryEventStore::new());
    enqueue(&store, "shelf-1", 3).await;
    let publisher = Arc::new(RecordingPublisher::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let relay = OutboxRelay::new(Arc::clone(&store), Arc::clone(&publisher), clock, config(2));

    assert_eq!(relay.run_once().await.expect("pass 1").delivered, 2);
    assert_eq!(relay.run_once().await.expect("pass 2").delivered, 1);
    assert_eq!(relay.run_once().await.expect("pass 3").total(), 0);

    // Commit order is preserved across passes
    let order: Vec<serde_json::Value> = publisher
        .published()
        .iter()
        .map(|m| m.message.payload["n"].clone())
        .collect();
    assert_eq!(order, vec![serde_json::json!(0), serde_json::json!(1), serde_json::json!(2)]);
}

#[tokio::test]
#[allow(clippy::expect_used)]
async fn test_one_failure_does_not_block_the_batch() {
    let store = Arc::new(InMemoryEventStore::new());
    enqueue(&store, "shelf-1", 3).await;
    let publisher = Arc::new(RecordingPublisher::new());
    publisher.fail_next(1);
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let relay = OutboxRelay::new(Arc::clone(&store), Arc::clone(&publisher), Arc::clone(&clock) as Arc<dyn Clock>, config(10));

    let report = relay.run_once().await.expect("pass should succeed");
    assert_eq!(report.delivered, 2);
    assert_eq!(report.rescheduled, 1);

    // Second failure with max_attempts = 2 gives up
    publisher.fail_next(1);
    clock.advance(chrono::Duration::seconds(1));
    let report = relay.run_once().await.expect("pass should succeed");
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(store.dead_letters().len(), 1);
    assert_eq!(store.delivered_ids().len(), 2);
}

#[tokio::test]
#[allow(clippy::expect_used)]
async fn test_run_drains_until_shutdown() {
    let store = Arc::new(InMemoryEventStore::new());
    enqueue(&store, "shelf-1", 2).await;
    enqueue(&store, "shelf-2", 1).await;
    let publisher = Arc::new(RecordingPublisher::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let relay = Arc::new(OutboxRelay::new(
        Arc::clone(&store),
        Arc::clone(&publisher),
        clock,
        config(1),
    ));

    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn({
        let relay = Arc::clone(&relay);
        async move {
            relay
                .run(async {
                    let _ = stopped.await;
                })
                .await;
        }
    });

    for _ in 0..200 {
        if store.delivered_ids().len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(store.delivered_ids().len(), 3);

    stop.send(()).expect("relay should still be listening");
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("relay should stop promptly")
        .expect("relay task should not panic");
    assert_eq!(publisher.published().len(), 3);
}
