//! # Borrowing Core
//!
//! Core traits and types for the event-sourced borrowing services.
//!
//! This crate contains no I/O. It defines the contracts the rest of the workspace
//! is written against:
//!
//! - [`stream`]: tenant, stream and version identifiers
//! - [`event`]: the `Event` trait and stored event shapes
//! - [`aggregate`]: aggregates folded from their own streams
//! - [`event_store`]: atomic append of events, projection rows and outbox messages
//! - [`projection`]: inline projections and tenant-scoped readers
//! - [`outbox`]: outbox records, relay storage contract and publisher collaborator
//! - [`environment`]: injected dependencies such as the clock
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell: aggregates decide, sessions persist
//! - Tenancy is explicit on every call, never ambient
//! - One local transaction per command: event, read model and outbox together

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod aggregate;
pub mod event;
pub mod event_store;
pub mod outbox;
pub mod projection;
pub mod stream;

/// Environment module - Dependency injection traits
///
/// External dependencies of the domain are abstracted behind traits and injected,
/// so tests can pin them down.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use borrowing_core::environment::{Clock, SystemClock};
    ///
    /// let before = chrono::Utc::now();
    /// assert!(SystemClock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
