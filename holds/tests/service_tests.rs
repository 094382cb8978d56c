//! The service facade: validation, conditional tokens, pickup window and queries.

use borrowing_core::aggregate::AggregateId;
use borrowing_core::stream::{TenantId, Version};
use borrowing_holds::service::etag;
use borrowing_holds::{
    BookFormat, BookId, BookMemberHoldProjection, HoldPolicy, HoldRegisterError,
    HoldRegisterEvent, HoldRegisterService, MemberId, StatusClass,
};
use borrowing_runtime::session::Initiated;
use borrowing_testing::{InMemoryEventStore, test_clock, test_epoch};
use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

fn service() -> (Arc<InMemoryEventStore>, HoldRegisterService<InMemoryEventStore>) {
    let store = Arc::new(InMemoryEventStore::new().with_projection(Arc::new(BookMemberHoldProjection)));
    let service = HoldRegisterService::new(
        Arc::clone(&store),
        Arc::new(test_clock()),
        HoldPolicy::default(),
    );
    (store, service)
}

#[tokio::test]
#[allow(clippy::expect_used)]
async fn test_join_place_and_query() {
    let (_store, service) = service();
    let tenant = TenantId::from("mason.lms.com");
    let member = MemberId::new();
    let book = BookId::new();

    let joined = service.join(&tenant, member).await.expect("join should succeed");
    assert_eq!(joined, Initiated::Created(Version::new(1)));
    let again = service.join(&tenant, member).await.expect("joining twice is fine");
    assert_eq!(again, Initiated::AlreadyExists(Version::new(1)));

    let placed = service
        .place_hold(&tenant, member, book, BookFormat::Hardbound, "W/\"1\"")
        .await
        .expect("place should succeed");
    assert_eq!(etag(placed.version), "\"2\"");

    let loaded = service
        .holds(&tenant, member)
        .await
        .expect("load should succeed")
        .expect("member joined");
    assert_eq!(loaded.version, Version::new(2));
    assert_eq!(loaded.state.holds()[0].placed_on, test_epoch());

    let active = service
        .active_holds(&tenant, member)
        .await
        .expect("read model should answer");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].book_id, book);
    assert_eq!(active[0].requested_on, test_epoch());
}

#[tokio::test]
#[allow(clippy::expect_used)]
async fn test_mark_ready_uses_the_pickup_window() {
    let (store, service) = service();
    let tenant = TenantId::from("cin.lms.com");
    let member = MemberId::new();
    let book = BookId::new();

    service.join(&tenant, member).await.expect("join should succeed");
    service
        .place_hold(&tenant, member, book, BookFormat::Paperback, "1")
        .await
        .expect("place should succeed");

    let ready = service
        .mark_ready(&tenant, member, book, BookFormat::Paperback, "\"2\"")
        .await
        .expect("mark ready should succeed");

    assert!(matches!(
        ready.event,
        HoldRegisterEvent::HoldReady(ref e)
            if e.ready_on == test_epoch() && e.expire_on == test_epoch() + Duration::days(5)
    ));

    let outbox = store.outbox_messages();
    assert_eq!(outbox.len(), 2);
    assert_eq!(outbox[0].stream_id, member.stream_id());
    assert_eq!(
        outbox[0].message.payload["pick_by"],
        serde_json::to_value(test_epoch() + Duration::days(5)).expect("timestamp should encode")
    );
}

#[tokio::test]
async fn test_errors_carry_status_classes() {
    let (store, service) = service();
    let tenant = TenantId::from("mason.lms.com");
    let member = MemberId::new();
    let book = BookId::new();

    // Unknown member
    let missing = service
        .place_hold(&tenant, member, book, BookFormat::Hardbound, "\"1\"")
        .await;
    assert!(matches!(missing, Err(ref e) if e.status() == StatusClass::NotFound));

    assert!(service.join(&tenant, member).await.is_ok());

    // Malformed token
    let malformed = service
        .place_hold(&tenant, member, book, BookFormat::Hardbound, "latest")
        .await;
    assert!(matches!(malformed, Err(ref e) if e.status() == StatusClass::BadRequest));

    // Malformed command
    let no_format = service
        .place_hold(&tenant, member, book, BookFormat::None, "\"1\"")
        .await;
    assert!(matches!(no_format, Err(ref e) if e.status() == StatusClass::BadRequest));

    let nil_book = service
        .cancel_hold(&tenant, member, BookId::from_uuid(Uuid::nil()), BookFormat::Hardbound, "\"1\"")
        .await;
    assert!(matches!(nil_book, Err(ref e) if e.status() == StatusClass::BadRequest));

    let nil_member = service.join(&tenant, MemberId::from_uuid(Uuid::nil())).await;
    assert!(matches!(nil_member, Err(ref e) if e.status() == StatusClass::BadRequest));

    // Stale token
    assert!(service
        .place_hold(&tenant, member, book, BookFormat::Hardbound, "\"1\"")
        .await
        .is_ok());
    let stale = service
        .cancel_hold(&tenant, member, book, BookFormat::Hardbound, "\"1\"")
        .await;
    assert!(matches!(stale, Err(ref e) if e.status() == StatusClass::PreconditionFailed));

    // Business rule
    let unknown = service
        .cancel_hold(&tenant, member, book, BookFormat::Paperback, "\"2\"")
        .await;
    assert!(matches!(
        unknown,
        Err(ref e) if e.status() == StatusClass::Internal
            && e.rejection() == Some(&HoldRegisterError::HoldNotFound)
    ));

    assert_eq!(store.events(&tenant, &member.stream_id()).len(), 2);
    assert!(store.outbox_messages().is_empty());
}

#[tokio::test]
#[allow(clippy::expect_used)]
async fn test_hold_report_covers_active_tenants() {
    let (_store, service) = service();
    let member = MemberId::new();
    let mason = TenantId::from("mason.lms.com");

    service.join(&mason, member).await.expect("join should succeed");
    service
        .place_hold(&mason, member, BookId::new(), BookFormat::Hardbound, "\"1\"")
        .await
        .expect("place should succeed");

    let report = service.hold_report(member).await.expect("report should load");

    assert_eq!(report.len(), 2);
    assert_eq!(report[0].tenant_id, mason);
    assert_eq!(
        report[0].register.as_ref().map(|r| r.state.holds().len()),
        Some(1)
    );
    assert_eq!(report[1].tenant_id.as_str(), "cin.lms.com");
    assert!(report[1].register.is_none());
}
