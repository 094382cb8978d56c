//! # Borrowing Testing
//!
//! Testing utilities for the borrowing workspace.
//!
//! This crate provides:
//! - [`InMemoryEventStore`]: event store, outbox and projection reader in one
//!   lock-protected map, with the same atomicity as the PostgreSQL store
//! - [`RecordingPublisher`]: a message publisher that records what it was given
//!   and fails on request
//! - [`FixedClock`] and [`ManualClock`]: deterministic time
//! - [`AggregateTest`]: Given/When/Then harness for aggregate decisions
//! - [`InterleavingEventStore`]: lets a competing append land between a load and
//!   the caller's append
//!
//! ## Example
//!
//! ```ignore
//! use borrowing_testing::InMemoryEventStore;
//! use borrowing_runtime::StorageSession;
//!
//! #[tokio::test]
//! async fn test_join() {
//!     let store = Arc::new(InMemoryEventStore::new().with_projection(Arc::new(BookMemberHoldProjection)));
//!     let session = StorageSession::new(store.clone());
//!     // ...
//! }
//! ```

use borrowing_core::environment::Clock;
use chrono::{DateTime, Utc};

pub mod aggregate_test;
pub mod event_store;
pub mod interleaving;
pub mod publisher;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use borrowing_testing::mocks::FixedClock;
    /// use borrowing_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// A clock that only moves when told to.
    ///
    /// Used where tests need time to pass, such as outbox redelivery backoff.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Start at `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }

    /// 2025-01-01 00:00:00 UTC, the instant [`test_clock`] is pinned to.
    #[must_use]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }
}

// Re-export commonly used items
pub use aggregate_test::AggregateTest;
pub use event_store::InMemoryEventStore;
pub use interleaving::InterleavingEventStore;
pub use mocks::{FixedClock, ManualClock, test_clock, test_epoch};
pub use publisher::RecordingPublisher;
