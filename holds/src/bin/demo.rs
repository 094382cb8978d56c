//! Member Hold Register Demo
//!
//! Walks one member through the hold lifecycle against `PostgreSQL`:
//! - join a tenant's register
//! - place and cancel a hold (the read model follows)
//! - fill the register and hit the capacity limit
//! - mark a hold ready, which enqueues pickup messages
//! - relay the outbox to a logging publisher
//!
//! # Usage
//!
//! ```bash
//! # Start PostgreSQL
//! docker run -d -p 5432:5432 -e POSTGRES_PASSWORD=postgres -e POSTGRES_DB=borrowing postgres:16
//!
//! # Run demo
//! cargo run --bin holds-demo
//! ```

use anyhow::Context;
use borrowing_core::environment::{Clock, SystemClock};
use borrowing_core::stream::TenantId;
use borrowing_holds::publisher::TracingPublisher;
use borrowing_holds::service::etag;
use borrowing_holds::telemetry::init_tracing;
use borrowing_holds::{
    BookFormat, BookId, BookMemberHoldProjection, Config, HoldRegisterService, MemberId,
};
use borrowing_postgres::PostgresEventStore;
use borrowing_runtime::relay::OutboxRelay;
use borrowing_runtime::session::Initiated;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_tracing(&config.log);

    let store = PostgresEventStore::connect(&config.database.url, &config.pool_settings())
        .await
        .context("connecting to PostgreSQL")?
        .with_projection(Arc::new(BookMemberHoldProjection));
    store.migrate().await.context("running migrations")?;
    let store = Arc::new(store);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let service = HoldRegisterService::new(Arc::clone(&store), Arc::clone(&clock), config.policy());

    let tenant = config
        .policy()
        .active_tenants
        .first()
        .cloned()
        .unwrap_or_else(|| TenantId::from("mason.lms.com"));
    let member = MemberId::new();
    tracing::info!(%tenant, %member, "Demo scenario starting");

    // 1. Join
    let joined = service.join(&tenant, member).await?;
    tracing::info!(?joined, "Member joined");
    let (Initiated::Created(mut version) | Initiated::AlreadyExists(mut version)) = joined;

    // 2. Place and cancel
    let first_book = BookId::new();
    let placed = service
        .place_hold(&tenant, member, first_book, BookFormat::Hardbound, &etag(version))
        .await?;
    version = placed.version;
    tracing::info!(
        active = service.active_holds(&tenant, member).await?.len(),
        "Hold placed"
    );

    let canceled = service
        .cancel_hold(&tenant, member, first_book, BookFormat::Hardbound, &etag(version))
        .await?;
    version = canceled.version;
    tracing::info!(
        active = service.active_holds(&tenant, member).await?.len(),
        "Hold canceled"
    );

    // 3. Fill the register, then one more
    let mut books = Vec::new();
    for _ in 0..borrowing_holds::MAX_HOLDS {
        let book = BookId::new();
        version = service
            .place_hold(&tenant, member, book, BookFormat::Paperback, &etag(version))
            .await?
            .version;
        books.push(book);
    }

    match service
        .place_hold(&tenant, member, BookId::new(), BookFormat::Paperback, &etag(version))
        .await
    {
        Ok(_) => tracing::warn!("Sixth hold was accepted"),
        Err(error) => tracing::info!(status = ?error.status(), %error, "Sixth hold rejected"),
    }

    // 4. Mark one ready
    if let Some(book) = books.first() {
        let ready = service
            .mark_ready(&tenant, member, *book, BookFormat::Paperback, &etag(version))
            .await?;
        tracing::info!(version = %ready.version, "Hold ready for pickup");
    }

    // 5. Relay the outbox once
    let relay = OutboxRelay::new(
        Arc::new(store.outbox()),
        Arc::new(TracingPublisher),
        clock,
        config.relay_config(),
    );
    let report = relay.run_once().await?;
    tracing::info!(delivered = report.delivered, "Outbox relayed");

    for entry in service.hold_report(member).await? {
        tracing::info!(
            tenant = %entry.tenant_id,
            holds = entry.register.as_ref().map_or(0, |r| r.state.holds().len()),
            "Hold report"
        );
    }

    Ok(())
}
