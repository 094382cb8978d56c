//! Event store trait and related types.
//!
//! An event store keeps one append-only stream per (tenant, aggregate). Besides the
//! events, a single [`EventStore::append`] call commits:
//!
//! - the row changes of every registered [`crate::projection::InlineProjection`];
//! - the [`OutboxMessage`]s that must reach other services.
//!
//! All of it succeeds or fails as a unit. This is the only write path, so a read
//! model row or an outbound message can never exist without the event that
//! produced it.
//!
//! # Implementations
//!
//! - `PostgresEventStore` (in `borrowing-postgres`): production implementation
//! - `InMemoryEventStore` (in `borrowing-testing`): fast, deterministic testing
//!
//! # Example
//!
//! ```no_run
//! use borrowing_core::event::SerializedEvent;
//! use borrowing_core::event_store::{AppendRequest, EventStore, EventStoreError};
//! use borrowing_core::stream::{StreamId, TenantId, Version};
//!
//! async fn example<E: EventStore>(store: &E, event: SerializedEvent) -> Result<(), EventStoreError> {
//!     let tenant = TenantId::new("mason.lms.com");
//!     let stream = StreamId::new("member-1");
//!
//!     // Create the stream: it must not exist yet.
//!     let version = store
//!         .append(AppendRequest::new(tenant.clone(), stream.clone(), Version::INITIAL).with_event(event))
//!         .await?;
//!     assert_eq!(version, Version::new(1));
//!
//!     let history = store.load_events(tenant, stream, None).await?;
//!     assert_eq!(history.len(), 1);
//!     Ok(())
//! }
//! ```

use crate::event::{RecordedEvent, SerializedEvent};
use crate::outbox::OutboxMessage;
use crate::stream::{StreamId, TenantId, Version};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event store operations.
#[derive(Error, Debug)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict: expected version doesn't match current version.
    ///
    /// Another writer appended to the stream after the caller last read it. The
    /// caller should reload and decide again.
    #[error("Concurrency conflict on {stream_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The stream where the conflict occurred.
        stream_id: StreamId,
        /// The version the caller expected.
        expected: Version,
        /// The stream's version at the time of the check.
        actual: Version,
    },

    /// An append carried no events.
    #[error("Cannot append an empty event list to {0}")]
    EmptyAppend(StreamId),

    /// An inline projection rejected an event or produced an invalid row change.
    #[error("Projection {projection} failed: {message}")]
    Projection {
        /// Name of the failing projection.
        projection: &'static str,
        /// Failure description.
        message: String,
    },

    /// Database connection or query error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl EventStoreError {
    /// True for [`EventStoreError::ConcurrencyConflict`].
    #[must_use]
    pub const fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// One atomic write: events for a single stream plus the outbox messages they imply.
#[derive(Clone, Debug)]
pub struct AppendRequest {
    /// Tenant that owns the stream.
    pub tenant_id: TenantId,

    /// Target stream.
    pub stream_id: StreamId,

    /// Version the stream must be at for the append to succeed.
    ///
    /// [`Version::INITIAL`] means "the stream must not exist yet".
    pub expected_version: Version,

    /// Events to append, in order. Must not be empty.
    pub events: Vec<SerializedEvent>,

    /// External messages committed in the same transaction.
    pub messages: Vec<OutboxMessage>,
}

impl AppendRequest {
    /// Start a request with no events and no messages.
    #[must_use]
    pub const fn new(tenant_id: TenantId, stream_id: StreamId, expected_version: Version) -> Self {
        Self {
            tenant_id,
            stream_id,
            expected_version,
            events: Vec::new(),
            messages: Vec::new(),
        }
    }

    /// Add one event.
    #[must_use]
    pub fn with_event(mut self, event: SerializedEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Add outbox messages.
    #[must_use]
    pub fn with_messages(mut self, messages: impl IntoIterator<Item = OutboxMessage>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Version the stream will be at after this request commits.
    #[must_use]
    pub fn resulting_version(&self) -> Version {
        self.expected_version + self.events.len() as u64
    }
}

/// Event store abstraction for tenant-scoped, append-only streams.
///
/// # Optimistic Concurrency
///
/// Every append states the version it expects. The store compares it with the
/// stream's current version and the comparison and the write happen atomically,
/// so of several concurrent appends with the same expectation exactly one
/// succeeds and the others get [`EventStoreError::ConcurrencyConflict`].
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so it can be used as `Arc<dyn EventStore>`.
pub trait EventStore: Send + Sync {
    /// Atomically append events, apply inline projections and enqueue outbox messages.
    ///
    /// Returns the stream's new version. For a stream at version 5 and three events,
    /// that is version 8; the events are recorded at versions 6, 7 and 8.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: the stream is not at `expected_version`
    /// - `EmptyAppend`: the request has no events
    /// - `Projection`: an inline projection failed; nothing was written
    /// - `DatabaseError`: the backend failed; nothing was written
    fn append(
        &self,
        request: AppendRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>>;

    /// Load a stream's events in version order.
    ///
    /// `from_version`, when given, is inclusive. A stream that does not exist yields
    /// an empty list, not an error.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the backend failed
    fn load_events(
        &self,
        tenant_id: TenantId,
        stream_id: StreamId,
        from_version: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RecordedEvent>, EventStoreError>> + Send + '_>>;

    /// Current version of a stream; [`Version::INITIAL`] when it does not exist.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the backend failed
    fn stream_version(
        &self,
        tenant_id: TenantId,
        stream_id: StreamId,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>>;
}
