//! `PostgreSQL` implementation of [`EventStore`].
//!
//! Each append runs in one transaction:
//!
//! 1. read the stream's current version and compare it with the expected one;
//! 2. insert the events (the `(tenant_id, stream_id, version)` primary key catches
//!    writers that passed step 1 concurrently);
//! 3. apply the row changes of every registered inline projection;
//! 4. insert the outbox records;
//! 5. commit.
//!
//! Any failure rolls the whole transaction back.

use crate::outbox::PostgresOutbox;
use crate::schema;
use borrowing_core::event::RecordedEvent;
use borrowing_core::event_store::{AppendRequest, EventStore, EventStoreError};
use borrowing_core::projection::{
    InlineProjection, ProjectionError, ProjectionReader, Row, RowChange, TableSchema,
};
use borrowing_core::stream::{StreamId, TenantId, Version};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

fn database_error(e: sqlx::Error) -> EventStoreError {
    EventStoreError::DatabaseError(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION)
}

/// Connection pool settings for [`PostgresEventStore::connect`].
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// How long to wait for a connection before failing.
    pub connect_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// `PostgreSQL`-backed event store with inline projections and a transactional outbox.
///
/// # Example
///
/// ```no_run
/// use borrowing_postgres::PostgresEventStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresEventStore::new("postgres://localhost/borrowing").await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
    projections: Vec<Arc<dyn InlineProjection>>,
}

impl PostgresEventStore {
    /// Connect with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::DatabaseError`] if the connection fails.
    pub async fn new(database_url: &str) -> Result<Self, EventStoreError> {
        Self::connect(database_url, &PoolSettings::default()).await
    }

    /// Connect with explicit pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::DatabaseError`] if the connection fails.
    pub async fn connect(
        database_url: &str,
        settings: &PoolSettings,
    ) -> Result<Self, EventStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.connect_timeout)
            .connect(database_url)
            .await
            .map_err(|e| EventStoreError::DatabaseError(format!("Failed to connect: {e}")))?;

        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            projections: Vec::new(),
        }
    }

    /// Register an inline projection applied on every append.
    #[must_use]
    pub fn with_projection(mut self, projection: Arc<dyn InlineProjection>) -> Self {
        self.projections.push(projection);
        self
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Outbox view over the same database.
    #[must_use]
    pub fn outbox(&self) -> PostgresOutbox {
        PostgresOutbox::new(self.pool.clone())
    }

    /// Create the event and outbox tables, then every registered projection table.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::DatabaseError`] if a migration fails and
    /// [`EventStoreError::Projection`] for invalid projection schemas.
    pub async fn migrate(&self) -> Result<(), EventStoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| EventStoreError::DatabaseError(format!("Migration failed: {e}")))?;

        for projection in &self.projections {
            for table in projection.tables() {
                let ddl = schema::create_table_sql(table).map_err(|e| EventStoreError::Projection {
                    projection: projection.name(),
                    message: e.to_string(),
                })?;
                sqlx::query(&ddl)
                    .execute(&self.pool)
                    .await
                    .map_err(database_error)?;
            }
            tracing::debug!(projection = projection.name(), "Projection tables ready");
        }

        Ok(())
    }

    async fn current_version(
        conn: &mut PgConnection,
        tenant_id: &TenantId,
        stream_id: &StreamId,
    ) -> Result<Version, EventStoreError> {
        let (version,): (i64,) = sqlx::query_as(
            r"
            SELECT COALESCE(MAX(version), 0)
            FROM events
            WHERE tenant_id = $1 AND stream_id = $2
            ",
        )
        .bind(tenant_id.as_str())
        .bind(stream_id.as_str())
        .fetch_one(conn)
        .await
        .map_err(database_error)?;

        Ok(Version::from_i64(version))
    }

    async fn apply_projections(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &RecordedEvent,
    ) -> Result<(), EventStoreError> {
        for projection in &self.projections {
            let fail = |e: ProjectionError| EventStoreError::Projection {
                projection: projection.name(),
                message: e.to_string(),
            };

            for change in projection.project(event).map_err(fail)? {
                change.validate().map_err(fail)?;
                let mut statement = match &change {
                    RowChange::InsertIfAbsent { table, row } => schema::insert_if_absent(table, row),
                    RowChange::Delete { table, key } => schema::delete_by_key(table, key),
                };
                statement
                    .build()
                    .execute(&mut **tx)
                    .await
                    .map_err(database_error)?;
            }
        }
        Ok(())
    }

    async fn commit(&self, request: AppendRequest) -> Result<Version, EventStoreError> {
        if request.events.is_empty() {
            return Err(EventStoreError::EmptyAppend(request.stream_id));
        }

        let mut tx = self.pool.begin().await.map_err(database_error)?;

        let current =
            Self::current_version(&mut *tx, &request.tenant_id, &request.stream_id).await?;
        if current != request.expected_version {
            metrics::counter!("event_store.concurrency_conflicts").increment(1);
            return Err(EventStoreError::ConcurrencyConflict {
                stream_id: request.stream_id,
                expected: request.expected_version,
                actual: current,
            });
        }

        let recorded_at: DateTime<Utc> = Utc::now();
        for (event, offset) in request.events.iter().zip(1_u64..) {
            let recorded = RecordedEvent {
                tenant_id: request.tenant_id.clone(),
                stream_id: request.stream_id.clone(),
                version: current + offset,
                event_type: event.event_type.clone(),
                data: event.data.clone(),
                metadata: event.metadata.clone(),
                recorded_at,
            };

            let inserted = sqlx::query(
                r"
                INSERT INTO events (tenant_id, stream_id, version, event_type, event_data, metadata, recorded_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(recorded.tenant_id.as_str())
            .bind(recorded.stream_id.as_str())
            .bind(recorded.version.as_i64())
            .bind(&recorded.event_type)
            .bind(&recorded.data)
            .bind(&recorded.metadata)
            .bind(recorded.recorded_at)
            .execute(&mut *tx)
            .await;

            if let Err(e) = inserted {
                if !is_unique_violation(&e) {
                    return Err(database_error(e));
                }
                drop(tx);
                metrics::counter!("event_store.concurrency_conflicts").increment(1);
                let mut conn = self.pool.acquire().await.map_err(database_error)?;
                let actual =
                    Self::current_version(&mut conn, &request.tenant_id, &request.stream_id)
                        .await?;
                return Err(EventStoreError::ConcurrencyConflict {
                    stream_id: request.stream_id,
                    expected: request.expected_version,
                    actual,
                });
            }

            self.apply_projections(&mut tx, &recorded).await?;
        }

        for message in &request.messages {
            sqlx::query(
                r"
                INSERT INTO outbox (tenant_id, stream_id, message_type, payload, enqueued_at, next_attempt_at)
                VALUES ($1, $2, $3, $4, $5, $5)
                ",
            )
            .bind(request.tenant_id.as_str())
            .bind(request.stream_id.as_str())
            .bind(&message.message_type)
            .bind(&message.payload)
            .bind(recorded_at)
            .execute(&mut *tx)
            .await
            .map_err(database_error)?;
        }

        tx.commit().await.map_err(database_error)?;

        let new_version = request.resulting_version();
        tracing::debug!(
            tenant = %request.tenant_id,
            stream_id = %request.stream_id,
            version = %new_version,
            events = request.events.len(),
            messages = request.messages.len(),
            "Appended events"
        );
        metrics::counter!("event_store.events_appended").increment(request.events.len() as u64);
        if !request.messages.is_empty() {
            metrics::counter!("outbox.enqueued").increment(request.messages.len() as u64);
        }

        Ok(new_version)
    }
}

impl EventStore for PostgresEventStore {
    fn append(
        &self,
        request: AppendRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        Box::pin(self.commit(request))
    }

    fn load_events(
        &self,
        tenant_id: TenantId,
        stream_id: StreamId,
        from_version: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RecordedEvent>, EventStoreError>> + Send + '_>>
    {
        Box::pin(async move {
            let from = from_version.unwrap_or(Version::INITIAL);
            let rows: Vec<(i64, String, Vec<u8>, Option<serde_json::Value>, DateTime<Utc>)> =
                sqlx::query_as(
                    r"
                    SELECT version, event_type, event_data, metadata, recorded_at
                    FROM events
                    WHERE tenant_id = $1 AND stream_id = $2 AND version >= $3
                    ORDER BY version ASC
                    ",
                )
                .bind(tenant_id.as_str())
                .bind(stream_id.as_str())
                .bind(from.as_i64())
                .fetch_all(&self.pool)
                .await
                .map_err(database_error)?;

            Ok(rows
                .into_iter()
                .map(|(version, event_type, data, metadata, recorded_at)| RecordedEvent {
                    tenant_id: tenant_id.clone(),
                    stream_id: stream_id.clone(),
                    version: Version::from_i64(version),
                    event_type,
                    data,
                    metadata,
                    recorded_at,
                })
                .collect())
        })
    }

    fn stream_version(
        &self,
        tenant_id: TenantId,
        stream_id: StreamId,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await.map_err(database_error)?;
            Self::current_version(&mut conn, &tenant_id, &stream_id).await
        })
    }
}

impl ProjectionReader for PostgresEventStore {
    fn fetch_rows(
        &self,
        tenant_id: TenantId,
        table: &'static TableSchema,
        filter: Row,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Row>, ProjectionError>> + Send + '_>> {
        Box::pin(async move {
            table.validate_filter(&filter)?;
            let mut query = schema::select_rows(table, tenant_id.as_str(), &filter);
            let rows = query
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(|e| ProjectionError::Storage(e.to_string()))?;

            rows.iter().map(|row| schema::decode_row(table, row)).collect()
        })
    }
}
