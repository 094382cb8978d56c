//! # Borrowing Runtime
//!
//! The imperative shell around the pure aggregates in `borrowing-core`.
//!
//! ## Core Components
//!
//! - **Storage Session** ([`session`]): load, decide, append with optimistic
//!   concurrency; duplicate stream creation is absorbed
//! - **Outbox Relay** ([`relay`]): background, at-least-once delivery of outbox records
//! - **Redelivery Policy** ([`retry`]): exponential backoff and dead-letter threshold
//!
//! ## Example
//!
//! ```ignore
//! use borrowing_runtime::session::StorageSession;
//!
//! let session = StorageSession::new(store);
//! session
//!     .get_and_update_aggregate::<MemberHoldRegister, _>(
//!         &tenant,
//!         &member_id,
//!         expected_version,
//!         |register| register.place_hold(&command),
//!         Vec::new(),
//!     )
//!     .await?;
//! ```

/// Outbox relay
pub mod relay;

/// Redelivery backoff for the outbox relay
pub mod retry;

/// Storage session over an event store
pub mod session;

pub use relay::{OutboxRelay, RelayConfig, RelayReport};
pub use retry::RedeliveryPolicy;
pub use session::{Committed, Initiated, Loaded, SessionError, StorageSession};
