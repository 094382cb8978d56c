//! In-memory event store for fast, deterministic tests.
//!
//! Streams, projection tables and the outbox live behind one lock. An append
//! checks the version, runs every registered inline projection and validates the
//! resulting row changes before it mutates anything, so a failed append leaves
//! the store exactly as it was.

use borrowing_core::event::RecordedEvent;
use borrowing_core::event_store::{AppendRequest, EventStore, EventStoreError};
use borrowing_core::outbox::{
    DEFAULT_CLAIM_TIMEOUT, FailureDisposition, Outbox, OutboxError, PendingMessage, claimed_until,
};
use borrowing_core::projection::{
    InlineProjection, ProjectionError, ProjectionReader, Row, RowChange, TENANT_COLUMN,
    TableSchema,
};
use borrowing_core::stream::{StreamId, TenantId, Version};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

type StreamKey = (TenantId, StreamId);
type Table = BTreeMap<Row, Row>;

#[derive(Debug, Clone)]
struct OutboxRecord {
    message: PendingMessage,
    next_attempt_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
    dead_lettered: bool,
}

#[derive(Debug, Default)]
struct State {
    streams: HashMap<StreamKey, Vec<RecordedEvent>>,
    tables: HashMap<&'static str, Table>,
    outbox: BTreeMap<i64, OutboxRecord>,
    next_outbox_id: i64,
}

enum Staged {
    Insert { table: &'static str, key: Row, row: Row },
    Delete { table: &'static str, key: Row },
}

/// In-memory implementation of [`EventStore`], [`Outbox`] and [`ProjectionReader`].
///
/// Clones share the same data.
///
/// # Example
///
/// ```
/// use borrowing_testing::InMemoryEventStore;
/// use borrowing_core::event::SerializedEvent;
/// use borrowing_core::event_store::{AppendRequest, EventStore};
/// use borrowing_core::stream::{StreamId, TenantId, Version};
///
/// # tokio_test::block_on(async {
/// let store = InMemoryEventStore::new();
/// let request = AppendRequest::new(TenantId::new("T1"), StreamId::new("s-1"), Version::INITIAL)
///     .with_event(SerializedEvent::new("Opened.v1".into(), vec![0], None));
///
/// let version = store.append(request).await.unwrap();
/// assert_eq!(version, Version::new(1));
/// # });
/// ```
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    state: Arc<RwLock<State>>,
    projections: Vec<Arc<dyn InlineProjection>>,
}

impl std::fmt::Debug for InMemoryEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventStore")
            .field("state", &self.state)
            .field("projections", &self.projections.len())
            .finish()
    }
}

impl InMemoryEventStore {
    /// Create an empty store with no projections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an inline projection applied on every append.
    #[must_use]
    pub fn with_projection(mut self, projection: Arc<dyn InlineProjection>) -> Self {
        self.projections.push(projection);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// All events of a stream, oldest first.
    #[must_use]
    pub fn events(&self, tenant_id: &TenantId, stream_id: &StreamId) -> Vec<RecordedEvent> {
        self.read()
            .streams
            .get(&(tenant_id.clone(), stream_id.clone()))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of streams across all tenants.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.read().streams.len()
    }

    /// Every row of a projection table, across tenants.
    #[must_use]
    pub fn table_rows(&self, table: &str) -> Vec<Row> {
        self.read()
            .tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every outbox record ever enqueued, in commit order.
    #[must_use]
    pub fn outbox_messages(&self) -> Vec<PendingMessage> {
        self.read()
            .outbox
            .values()
            .map(|record| record.message.clone())
            .collect()
    }

    /// Ids of delivered outbox records.
    #[must_use]
    pub fn delivered_ids(&self) -> Vec<i64> {
        self.read()
            .outbox
            .iter()
            .filter(|(_, record)| record.delivered_at.is_some())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Dead-lettered outbox records.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<PendingMessage> {
        self.read()
            .outbox
            .values()
            .filter(|record| record.dead_lettered)
            .map(|record| record.message.clone())
            .collect()
    }

    fn stage_changes(
        &self,
        recorded: &[RecordedEvent],
    ) -> Result<Vec<Staged>, EventStoreError> {
        let mut staged = Vec::new();
        for event in recorded {
            for projection in &self.projections {
                let fail = |e: ProjectionError| EventStoreError::Projection {
                    projection: projection.name(),
                    message: e.to_string(),
                };
                for change in projection.project(event).map_err(fail)? {
                    change.validate().map_err(fail)?;
                    staged.push(match change {
                        RowChange::InsertIfAbsent { table, row } => Staged::Insert {
                            table: table.name,
                            key: table.key_of(&row).map_err(fail)?,
                            row,
                        },
                        RowChange::Delete { table, key } => Staged::Delete {
                            table: table.name,
                            key,
                        },
                    });
                }
            }
        }
        Ok(staged)
    }

    fn commit(&self, request: AppendRequest) -> Result<Version, EventStoreError> {
        if request.events.is_empty() {
            return Err(EventStoreError::EmptyAppend(request.stream_id.clone()));
        }

        let mut state = self.write();
        let key = (request.tenant_id.clone(), request.stream_id.clone());
        let current = state
            .streams
            .get(&key)
            .map_or(Version::INITIAL, |events| Version::new(events.len() as u64));

        if current != request.expected_version {
            return Err(EventStoreError::ConcurrencyConflict {
                stream_id: request.stream_id.clone(),
                expected: request.expected_version,
                actual: current,
            });
        }

        let now = Utc::now();
        let recorded: Vec<RecordedEvent> = request
            .events
            .iter()
            .zip(1_u64..)
            .map(|(event, offset)| RecordedEvent {
                tenant_id: request.tenant_id.clone(),
                stream_id: request.stream_id.clone(),
                version: current + offset,
                event_type: event.event_type.clone(),
                data: event.data.clone(),
                metadata: event.metadata.clone(),
                recorded_at: now,
            })
            .collect();

        let staged = self.stage_changes(&recorded)?;
        let new_version = request.resulting_version();

        state.streams.entry(key).or_default().extend(recorded);

        for change in staged {
            match change {
                Staged::Insert { table, key, row } => {
                    state.tables.entry(table).or_default().entry(key).or_insert(row);
                }
                Staged::Delete { table, key } => {
                    if let Some(rows) = state.tables.get_mut(table) {
                        rows.remove(&key);
                    }
                }
            }
        }

        for message in request.messages {
            state.next_outbox_id += 1;
            let id = state.next_outbox_id;
            state.outbox.insert(
                id,
                OutboxRecord {
                    message: PendingMessage {
                        id,
                        tenant_id: request.tenant_id.clone(),
                        stream_id: request.stream_id.clone(),
                        message,
                        attempts: 0,
                        last_error: None,
                        enqueued_at: now,
                    },
                    next_attempt_at: now,
                    delivered_at: None,
                    dead_lettered: false,
                },
            );
        }

        Ok(new_version)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        request: AppendRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        let result = self.commit(request);
        Box::pin(async move { result })
    }

    fn load_events(
        &self,
        tenant_id: TenantId,
        stream_id: StreamId,
        from_version: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RecordedEvent>, EventStoreError>> + Send + '_>>
    {
        let from = from_version.unwrap_or(Version::INITIAL);
        let events: Vec<RecordedEvent> = self
            .events(&tenant_id, &stream_id)
            .into_iter()
            .filter(|event| event.version >= from)
            .collect();

        Box::pin(async move { Ok(events) })
    }

    fn stream_version(
        &self,
        tenant_id: TenantId,
        stream_id: StreamId,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        let version = self
            .read()
            .streams
            .get(&(tenant_id, stream_id))
            .map_or(Version::INITIAL, |events| Version::new(events.len() as u64));

        Box::pin(async move { Ok(version) })
    }
}

impl ProjectionReader for InMemoryEventStore {
    fn fetch_rows(
        &self,
        tenant_id: TenantId,
        table: &'static TableSchema,
        filter: Row,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Row>, ProjectionError>> + Send + '_>> {
        let result = table.validate_filter(&filter).map(|()| {
            let tenant = tenant_id.as_str();
            self.read()
                .tables
                .get(table.name)
                .map(|rows| {
                    rows.values()
                        .filter(|row| row.text(TENANT_COLUMN).is_ok_and(|t| t == tenant))
                        .filter(|row| row.matches(&filter))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        });

        Box::pin(async move { result })
    }
}

impl Outbox for InMemoryEventStore {
    fn fetch_pending(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PendingMessage>, OutboxError>> + Send + '_>> {
        let until = claimed_until(now, DEFAULT_CLAIM_TIMEOUT);
        let pending: Vec<PendingMessage> = self
            .write()
            .outbox
            .values_mut()
            .filter(|record| {
                record.delivered_at.is_none()
                    && !record.dead_lettered
                    && record.next_attempt_at <= now
            })
            .take(limit)
            .map(|record| {
                record.next_attempt_at = until;
                record.message.clone()
            })
            .collect();

        Box::pin(async move { Ok(pending) })
    }

    fn mark_delivered(
        &self,
        id: i64,
        delivered_at: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<(), OutboxError>> + Send + '_>> {
        let result = match self.write().outbox.get_mut(&id) {
            Some(record) => {
                record.delivered_at.get_or_insert(delivered_at);
                Ok(())
            }
            None => Err(OutboxError::NotFound(id)),
        };

        Box::pin(async move { result })
    }

    fn record_failure(
        &self,
        id: i64,
        error: String,
        disposition: FailureDisposition,
    ) -> Pin<Box<dyn Future<Output = Result<(), OutboxError>> + Send + '_>> {
        let result = match self.write().outbox.get_mut(&id) {
            Some(record) => {
                record.message.attempts = record.message.attempts.saturating_add(1);
                record.message.last_error = Some(error);
                match disposition {
                    FailureDisposition::RetryAt(at) => record.next_attempt_at = at,
                    FailureDisposition::DeadLetter => record.dead_lettered = true,
                }
                Ok(())
            }
            None => Err(OutboxError::NotFound(id)),
        };

        Box::pin(async move { result })
    }
}
