//! Outbox relay over committed pickup messages: delivery, backoff, dead letters.

use borrowing_core::environment::Clock;
use borrowing_core::stream::TenantId;
use borrowing_holds::{BookFormat, BookId, HoldPolicy, HoldRegisterService, MemberId};
use borrowing_runtime::relay::{OutboxRelay, RelayConfig, RelayReport};
use borrowing_runtime::retry::RedeliveryPolicy;
use borrowing_testing::{InMemoryEventStore, ManualClock, RecordingPublisher, test_clock};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Commits one `HoldReady` and its two pickup messages.
#[allow(clippy::expect_used)]
async fn store_with_pickup_messages() -> Arc<InMemoryEventStore> {
    let store = Arc::new(InMemoryEventStore::new());
    let service = HoldRegisterService::new(
        Arc::clone(&store),
        Arc::new(test_clock()),
        HoldPolicy::default(),
    );
    let tenant = TenantId::from("mason.lms.com");
    let member = MemberId::new();
    let book = BookId::new();

    service.join(&tenant, member).await.expect("join should succeed");
    service
        .place_hold(&tenant, member, book, BookFormat::Hardbound, "\"1\"")
        .await
        .expect("place should succeed");
    service
        .mark_ready(&tenant, member, book, BookFormat::Hardbound, "\"2\"")
        .await
        .expect("mark ready should succeed");

    assert_eq!(store.outbox_messages().len(), 2);
    store
}

fn config(max_attempts: u32) -> RelayConfig {
    RelayConfig {
        batch_size: 10,
        poll_interval: Duration::from_millis(10),
        redelivery: RedeliveryPolicy::builder()
            .max_attempts(max_attempts)
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(60))
            .build(),
    }
}

#[tokio::test]
#[allow(clippy::expect_used)]
async fn test_relay_delivers_committed_messages_once() {
    let store = store_with_pickup_messages().await;
    let publisher = Arc::new(RecordingPublisher::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let relay = OutboxRelay::new(Arc::clone(&store), Arc::clone(&publisher), clock, config(3));

    let report = relay.run_once().await.expect("relay pass should succeed");
    assert_eq!(
        report,
        RelayReport {
            delivered: 2,
            rescheduled: 0,
            dead_lettered: 0,
        }
    );

    let published: Vec<String> = publisher
        .published()
        .iter()
        .map(|m| m.message.message_type.clone())
        .collect();
    assert_eq!(published, vec!["BookReadyForPickup", "CheckIfPickupExpired"]);
    assert_eq!(store.delivered_ids().len(), 2);

    let second = relay.run_once().await.expect("relay pass should succeed");
    assert_eq!(second.total(), 0);
    assert_eq!(publisher.attempts(), 2);
}

#[tokio::test]
#[allow(clippy::expect_used)]
async fn test_failed_delivery_is_retried_after_backoff() {
    let store = store_with_pickup_messages().await;
    let publisher = Arc::new(RecordingPublisher::new());
    publisher.fail_next(2);
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let relay = OutboxRelay::new(
        Arc::clone(&store),
        Arc::clone(&publisher),
        Arc::clone(&clock) as Arc<dyn Clock>,
        config(3),
    );

    let first = relay.run_once().await.expect("relay pass should succeed");
    assert_eq!(first.rescheduled, 2);
    assert!(store.delivered_ids().is_empty());

    // Not due yet
    let early = relay.run_once().await.expect("relay pass should succeed");
    assert_eq!(early.total(), 0);

    clock.advance(chrono::Duration::seconds(1));
    let retried = relay.run_once().await.expect("relay pass should succeed");
    assert_eq!(retried.delivered, 2);
    assert_eq!(store.delivered_ids().len(), 2);
    assert!(store.outbox_messages().iter().all(|m| m.attempts == 1));
}

#[tokio::test]
#[allow(clippy::expect_used)]
async fn test_exhausted_records_are_dead_lettered() {
    let store = store_with_pickup_messages().await;
    let publisher = Arc::new(RecordingPublisher::failing());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let relay = OutboxRelay::new(
        Arc::clone(&store),
        Arc::clone(&publisher),
        Arc::clone(&clock) as Arc<dyn Clock>,
        config(3),
    );

    assert_eq!(relay.run_once().await.expect("pass 1").rescheduled, 2);
    clock.advance(chrono::Duration::seconds(1));
    assert_eq!(relay.run_once().await.expect("pass 2").rescheduled, 2);
    clock.advance(chrono::Duration::seconds(2));
    assert_eq!(relay.run_once().await.expect("pass 3").dead_lettered, 2);

    let dead = store.dead_letters();
    assert_eq!(dead.len(), 2);
    assert!(dead.iter().all(|m| m.attempts == 3 && m.last_error.is_some()));

    // Dead letters stay put even once the publisher recovers
    publisher.recover();
    clock.advance(chrono::Duration::minutes(10));
    assert_eq!(relay.run_once().await.expect("pass 4").total(), 0);
    assert!(publisher.published().is_empty());
}
