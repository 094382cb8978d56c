//! `PostgreSQL` storage for the borrowing service.
//!
//! This crate provides the production implementations of the storage contracts
//! from `borrowing-core`. It uses sqlx and supports:
//!
//! - Event persistence with optimistic concurrency, per tenant and stream
//! - Inline projections applied in the append transaction
//! - A transactional outbox with retry bookkeeping and dead-lettering
//! - Connection pooling and embedded migrations
//!
//! # Example
//!
//! ```ignore
//! use borrowing_postgres::PostgresEventStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresEventStore::new("postgres://localhost/borrowing")
//!         .await?
//!         .with_projection(Arc::new(BookMemberHoldProjection));
//!     store.migrate().await?;
//!     let outbox = store.outbox();
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod event_store;
pub mod outbox;
mod schema;

pub use event_store::{PoolSettings, PostgresEventStore};
pub use outbox::{DeadLetteredRecord, PostgresOutbox};
pub use schema::create_table_sql;
