//! # Borrowing Holds
//!
//! The member hold register: a library member's book holds as an event-sourced
//! aggregate, with an inline read model and outbox messages for pickup.
//!
//! ## Layout
//!
//! - [`types`], [`commands`], [`events`], [`messages`]: the data model
//! - [`register`]: the [`MemberHoldRegister`] aggregate and its business rules
//! - [`handlers`]: one adapter per command over a `StorageSession`
//! - [`projection`]: the `book_member_holds` table
//! - [`validation`]: shape checks run before handlers
//! - [`service`]: the facade used by edge adapters
//! - [`config`], [`telemetry`], [`publisher`]: process wiring
//!
//! ## Example
//!
//! ```no_run
//! use borrowing_core::environment::SystemClock;
//! use borrowing_core::stream::TenantId;
//! use borrowing_holds::{BookFormat, BookId, BookMemberHoldProjection, HoldPolicy, HoldRegisterService, MemberId};
//! use borrowing_testing::InMemoryEventStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), borrowing_holds::CommandError> {
//! let store = Arc::new(InMemoryEventStore::new().with_projection(Arc::new(BookMemberHoldProjection)));
//! let service = HoldRegisterService::new(store, Arc::new(SystemClock), HoldPolicy::default());
//!
//! let tenant = TenantId::from("mason.lms.com");
//! let member = MemberId::new();
//! service.join(&tenant, member).await?;
//! service.place_hold(&tenant, member, BookId::new(), BookFormat::Hardbound, "\"1\"").await?;
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod config;
pub mod events;
pub mod handlers;
pub mod messages;
pub mod projection;
pub mod publisher;
pub mod register;
pub mod service;
pub mod telemetry;
pub mod types;
pub mod validation;

pub use commands::{CancelHold, InitiateHoldRegister, MarkHoldReady, PlaceHold, VersionedCommand};
pub use config::Config;
pub use events::HoldRegisterEvent;
pub use messages::{BookReadyForPickup, CheckIfPickupExpired};
pub use projection::{BOOK_MEMBER_HOLDS, BookMemberHold, BookMemberHoldProjection};
pub use register::{HoldRegisterError, MAX_HOLDS, MemberHoldRegister};
pub use service::{CommandError, HoldPolicy, HoldRegisterService, StatusClass, TenantHolds};
pub use types::{BookFormat, BookId, Hold, MemberId};
pub use validation::{Validate, ValidationError};
