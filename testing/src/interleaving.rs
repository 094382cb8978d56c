//! An event store that lets another writer in between a load and the next append.

use crate::event_store::InMemoryEventStore;
use borrowing_core::event::RecordedEvent;
use borrowing_core::event_store::{AppendRequest, EventStore, EventStoreError};
use borrowing_core::stream::{StreamId, TenantId, Version};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

/// Wraps an [`InMemoryEventStore`] and commits a queued append right after the
/// next `load_events` has read the stream.
///
/// The caller sees the stream as it was before the queued append, which is the
/// window a concurrent writer hits between loading and appending.
///
/// # Example
///
/// ```
/// use borrowing_testing::{InMemoryEventStore, InterleavingEventStore};
/// use std::sync::Arc;
///
/// let inner = Arc::new(InMemoryEventStore::new());
/// let store = InterleavingEventStore::new(Arc::clone(&inner));
/// assert!(!store.has_pending());
/// ```
#[derive(Debug)]
pub struct InterleavingEventStore {
    inner: Arc<InMemoryEventStore>,
    after_load: Mutex<Option<AppendRequest>>,
}

impl InterleavingEventStore {
    /// Wrap `inner`.
    #[must_use]
    pub const fn new(inner: Arc<InMemoryEventStore>) -> Self {
        Self {
            inner,
            after_load: Mutex::new(None),
        }
    }

    /// Commit `request` once the next load has read its events.
    pub fn commit_after_next_load(&self, request: AppendRequest) {
        *self.after_load.lock().unwrap_or_else(PoisonError::into_inner) = Some(request);
    }

    /// Whether a queued append is still waiting for a load.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.after_load
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The wrapped store.
    #[must_use]
    pub const fn inner(&self) -> &Arc<InMemoryEventStore> {
        &self.inner
    }
}

impl EventStore for InterleavingEventStore {
    fn append(
        &self,
        request: AppendRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        self.inner.append(request)
    }

    fn load_events(
        &self,
        tenant_id: TenantId,
        stream_id: StreamId,
        from_version: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RecordedEvent>, EventStoreError>> + Send + '_>>
    {
        Box::pin(async move {
            let events = self.inner.load_events(tenant_id, stream_id, from_version).await?;

            let queued = self
                .after_load
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(request) = queued {
                self.inner.append(request).await?;
            }

            Ok(events)
        })
    }

    fn stream_version(
        &self,
        tenant_id: TenantId,
        stream_id: StreamId,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        self.inner.stream_version(tenant_id, stream_id)
    }
}
