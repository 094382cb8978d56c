//! Storage session: load, decide and commit one aggregate per call.
//!
//! The session is the only component that talks to the [`EventStore`] on the
//! command path. It offers two writes:
//!
//! - [`StorageSession::initiate_aggregate`] creates a stream and treats an existing
//!   one as success, so retried creation commands are harmless;
//! - [`StorageSession::get_and_update_aggregate`] folds the current state, lets the
//!   caller decide the next event and appends it under an optimistic version check.
//!
//! Both commit the event, the inline projection rows and the outbox messages in one
//! [`AppendRequest`], so the messages exist only if the event does.

use borrowing_core::aggregate::{Aggregate, AggregateId};
use borrowing_core::event::{Event, EventError, SerializedEvent};
use borrowing_core::event_store::{AppendRequest, EventStore, EventStoreError};
use borrowing_core::outbox::OutboxMessage;
use borrowing_core::stream::{StreamId, TenantId, Version};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the storage session.
///
/// `E` is the aggregate's business-rule rejection type.
#[derive(Error, Debug)]
pub enum SessionError<E> {
    /// A mutating command targeted a stream that does not exist.
    #[error("{aggregate} with id '{id}' was not found.")]
    AggregateNotFound {
        /// Aggregate type name.
        aggregate: &'static str,
        /// Identifier of the missing aggregate.
        id: String,
    },

    /// The stream moved past the caller's expected version.
    #[error("Concurrency conflict on {stream_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The contested stream.
        stream_id: StreamId,
        /// Version the caller expected.
        expected: Version,
        /// Version the stream was at.
        actual: Version,
    },

    /// The aggregate rejected the command.
    #[error(transparent)]
    Rejected(E),

    /// An event could not be encoded or a stored event could not be decoded.
    #[error(transparent)]
    Event(#[from] EventError),

    /// Any other store failure.
    #[error(transparent)]
    Store(EventStoreError),
}

impl<E> From<EventStoreError> for SessionError<E> {
    fn from(error: EventStoreError) -> Self {
        match error {
            EventStoreError::ConcurrencyConflict {
                stream_id,
                expected,
                actual,
            } => Self::ConcurrencyConflict {
                stream_id,
                expected,
                actual,
            },
            other => Self::Store(other),
        }
    }
}

/// Folded state of an aggregate together with its stream version.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<A> {
    /// Current state.
    pub state: A,
    /// Version of the last event folded into `state`.
    pub version: Version,
}

/// Outcome of [`StorageSession::initiate_aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initiated {
    /// The stream was created and is now at this version.
    Created(Version),
    /// The stream already existed; nothing was written.
    AlreadyExists(Version),
}

/// A committed decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<Ev> {
    /// The event that was appended.
    pub event: Ev,
    /// The stream's version after the append.
    pub version: Version,
}

/// Per-call persistence for event-sourced aggregates.
///
/// The session holds no state besides the store handle; clone it freely.
pub struct StorageSession<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for StorageSession<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> StorageSession<S>
where
    S: EventStore + ?Sized,
{
    /// Create a session over `store`.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Load and fold an aggregate. Returns `None` when its stream does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Event`] for undecodable events and
    /// [`SessionError::Store`] for backend failures.
    #[tracing::instrument(skip_all, fields(aggregate = A::TYPE_NAME, tenant = %tenant_id, id = %id))]
    pub async fn load<A: Aggregate>(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
    ) -> Result<Option<Loaded<A>>, SessionError<A::Error>> {
        let recorded = self
            .store
            .load_events(tenant_id.clone(), id.stream_id(), None)
            .await?;

        let Some(version) = recorded.last().map(|entry| entry.version) else {
            return Ok(None);
        };

        let mut state = None;
        for entry in &recorded {
            let event: A::Event = entry.decode()?;
            state = A::fold(state, &event);
        }

        Ok(state.map(|state| Loaded { state, version }))
    }

    /// Create the aggregate's stream with `seed` as its first event.
    ///
    /// If the stream already exists the call writes nothing, enqueues nothing and
    /// returns [`Initiated::AlreadyExists`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Event`] if `seed` cannot be encoded and
    /// [`SessionError::Store`] for backend failures.
    #[tracing::instrument(skip_all, fields(aggregate = A::TYPE_NAME, tenant = %tenant_id, id = %id))]
    pub async fn initiate_aggregate<A: Aggregate>(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
        seed: &A::Event,
        messages: Vec<OutboxMessage>,
    ) -> Result<Initiated, SessionError<A::Error>> {
        let request = AppendRequest::new(tenant_id.clone(), id.stream_id(), Version::INITIAL)
            .with_event(SerializedEvent::from_event(seed, None)?)
            .with_messages(messages);

        match self.store.append(request).await {
            Ok(version) => Ok(Initiated::Created(version)),
            Err(EventStoreError::ConcurrencyConflict { actual, .. }) => {
                tracing::debug!(
                    version = %actual,
                    "Stream already exists, ignoring duplicate initiation"
                );
                Ok(Initiated::AlreadyExists(actual))
            }
            Err(other) => Err(SessionError::Store(other)),
        }
    }

    /// Fold the aggregate, decide the next event and append it at `expected_version`.
    ///
    /// The append is conditioned on the version the state was folded at. A commit
    /// that lands between the load and the append fails the call.
    ///
    /// `messages` are committed with the event and dropped if anything fails.
    ///
    /// # Errors
    ///
    /// - [`SessionError::AggregateNotFound`]: the stream does not exist
    /// - [`SessionError::Rejected`]: `decide` rejected the command
    /// - [`SessionError::ConcurrencyConflict`]: the stream is not at `expected_version`
    /// - [`SessionError::Event`] / [`SessionError::Store`]: encoding or backend failure
    #[tracing::instrument(
        skip_all,
        fields(aggregate = A::TYPE_NAME, tenant = %tenant_id, id = %id, expected = %expected_version)
    )]
    pub async fn get_and_update_aggregate<A, F>(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
        expected_version: Version,
        decide: F,
        messages: Vec<OutboxMessage>,
    ) -> Result<Committed<A::Event>, SessionError<A::Error>>
    where
        A: Aggregate,
        F: FnOnce(&A) -> Result<A::Event, A::Error> + Send,
    {
        let Some(loaded) = self.load::<A>(tenant_id, id).await? else {
            return Err(SessionError::AggregateNotFound {
                aggregate: A::TYPE_NAME,
                id: id.to_string(),
            });
        };

        let event = decide(&loaded.state).map_err(SessionError::Rejected)?;

        // The decision is only valid for the state it was made on.
        if loaded.version != expected_version {
            return Err(SessionError::ConcurrencyConflict {
                stream_id: id.stream_id(),
                expected: expected_version,
                actual: loaded.version,
            });
        }

        let request = AppendRequest::new(tenant_id.clone(), id.stream_id(), loaded.version)
            .with_event(SerializedEvent::from_event(&event, None)?)
            .with_messages(messages);

        let version = self.store.append(request).await?;

        tracing::debug!(version = %version, event_type = event.event_type(), "Aggregate updated");

        Ok(Committed { event, version })
    }
}
