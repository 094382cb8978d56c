//! Outbox storage for the relay, with dead-letter inspection.
//!
//! Records are written by [`crate::PostgresEventStore`] inside the append
//! transaction. This module reads them back for delivery, tracks attempts and
//! keeps records that exhausted their retries for manual follow-up.

use borrowing_core::outbox::{
    DEFAULT_CLAIM_TIMEOUT, FailureDisposition, Outbox, OutboxError, OutboxMessage, PendingMessage,
    claimed_until,
};
use borrowing_core::stream::{StreamId, TenantId};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const RECORD_COLUMNS: &str =
    "id, tenant_id, stream_id, message_type, payload, attempts, last_error, enqueued_at";

const CLAIMED_COLUMNS: &str = "o.id, o.tenant_id, o.stream_id, o.message_type, o.payload, \
     o.attempts, o.last_error, o.enqueued_at";

fn storage_error(e: sqlx::Error) -> OutboxError {
    OutboxError::Storage(e.to_string())
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// A record that gave up on delivery.
#[derive(Debug, Clone)]
pub struct DeadLetteredRecord {
    /// The record as it was last attempted.
    pub record: PendingMessage,

    /// When the relay gave up.
    pub dead_lettered_at: DateTime<Utc>,
}

/// `PostgreSQL`-backed [`Outbox`].
///
/// `fetch_pending` claims rows with `FOR UPDATE SKIP LOCKED` and pushes their
/// `next_attempt_at` past the claim timeout, so relays running side by side
/// never hand out the same record at once.
///
/// # Example
///
/// ```no_run
/// use borrowing_postgres::PostgresOutbox;
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let outbox = PostgresOutbox::new(pool);
///
/// // Inspect records that exhausted their retries
/// for dead in outbox.list_dead_lettered(100).await? {
///     println!("{} failed: {:?}", dead.record.message, dead.record.last_error);
///     outbox.requeue(dead.record.id).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresOutbox {
    pool: PgPool,
    claim_timeout: Duration,
}

impl PostgresOutbox {
    /// Create an outbox over the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self {
            pool,
            claim_timeout: DEFAULT_CLAIM_TIMEOUT,
        }
    }

    /// How long a fetched record is hidden from other relays before it is
    /// handed out again. Should exceed the time a relay needs for one batch.
    #[must_use]
    pub const fn with_claim_timeout(mut self, claim_timeout: Duration) -> Self {
        self.claim_timeout = claim_timeout;
        self
    }

    /// Dead-lettered records, oldest failure first.
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError::Storage`] if the query fails.
    pub async fn list_dead_lettered(
        &self,
        limit: usize,
    ) -> Result<Vec<DeadLetteredRecord>, OutboxError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {RECORD_COLUMNS}, dead_lettered_at
            FROM outbox
            WHERE dead_lettered_at IS NOT NULL
            ORDER BY dead_lettered_at ASC, id ASC
            LIMIT $1
            "
        ))
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.iter()
            .map(|row| {
                Ok(DeadLetteredRecord {
                    record: Self::row_to_record(row)?,
                    dead_lettered_at: row.try_get("dead_lettered_at").map_err(storage_error)?,
                })
            })
            .collect()
    }

    /// Put a dead-lettered record back in the delivery queue with a fresh attempt budget.
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError::NotFound`] when no dead-lettered record has this id.
    pub async fn requeue(&self, id: i64) -> Result<(), OutboxError> {
        let result = sqlx::query(
            r"
            UPDATE outbox
            SET dead_lettered_at = NULL, attempts = 0, next_attempt_at = now()
            WHERE id = $1 AND dead_lettered_at IS NOT NULL
            ",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(OutboxError::NotFound(id));
        }

        tracing::info!(outbox_id = id, "Dead-lettered outbox record requeued");
        Ok(())
    }

    /// Records not yet delivered or dead-lettered, due or not.
    ///
    /// Useful for monitoring and health checks.
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError::Storage`] if the query fails.
    pub async fn count_undelivered(&self) -> Result<i64, OutboxError> {
        let (count,): (i64,) = sqlx::query_as(
            r"
            SELECT COUNT(*)
            FROM outbox
            WHERE delivered_at IS NULL AND dead_lettered_at IS NULL
            ",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(count)
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<PendingMessage, OutboxError> {
        let tenant: String = row.try_get("tenant_id").map_err(storage_error)?;
        let stream: String = row.try_get("stream_id").map_err(storage_error)?;
        let attempts: i32 = row.try_get("attempts").map_err(storage_error)?;

        Ok(PendingMessage {
            id: row.try_get("id").map_err(storage_error)?,
            tenant_id: TenantId::new(tenant),
            stream_id: StreamId::new(stream),
            message: OutboxMessage {
                message_type: row.try_get("message_type").map_err(storage_error)?,
                payload: row.try_get("payload").map_err(storage_error)?,
            },
            attempts: u32::try_from(attempts).unwrap_or(0),
            last_error: row.try_get("last_error").map_err(storage_error)?,
            enqueued_at: row.try_get("enqueued_at").map_err(storage_error)?,
        })
    }
}

impl Outbox for PostgresOutbox {
    fn fetch_pending(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PendingMessage>, OutboxError>> + Send + '_>> {
        Box::pin(async move {
            // Rows locked by a concurrent claim are skipped, not waited on.
            let rows = sqlx::query(&format!(
                r"
                WITH due AS (
                    SELECT id
                    FROM outbox
                    WHERE delivered_at IS NULL
                      AND dead_lettered_at IS NULL
                      AND next_attempt_at <= $1
                    ORDER BY id ASC
                    LIMIT $2
                    FOR UPDATE SKIP LOCKED
                )
                UPDATE outbox AS o
                SET next_attempt_at = $3
                FROM due
                WHERE o.id = due.id
                RETURNING {CLAIMED_COLUMNS}
                "
            ))
            .bind(now)
            .bind(sql_limit(limit))
            .bind(claimed_until(now, self.claim_timeout))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

            let mut claimed = rows
                .iter()
                .map(Self::row_to_record)
                .collect::<Result<Vec<_>, _>>()?;
            claimed.sort_by_key(|record| record.id);
            Ok(claimed)
        })
    }

    fn mark_delivered(
        &self,
        id: i64,
        delivered_at: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<(), OutboxError>> + Send + '_>> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE outbox
                SET delivered_at = COALESCE(delivered_at, $2)
                WHERE id = $1
                ",
            )
            .bind(id)
            .bind(delivered_at)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

            if result.rows_affected() == 0 {
                return Err(OutboxError::NotFound(id));
            }
            Ok(())
        })
    }

    fn record_failure(
        &self,
        id: i64,
        error: String,
        disposition: FailureDisposition,
    ) -> Pin<Box<dyn Future<Output = Result<(), OutboxError>> + Send + '_>> {
        Box::pin(async move {
            let query = match disposition {
                FailureDisposition::RetryAt(at) => sqlx::query(
                    r"
                    UPDATE outbox
                    SET attempts = attempts + 1, last_error = $2, next_attempt_at = $3
                    WHERE id = $1
                    ",
                )
                .bind(id)
                .bind(error)
                .bind(at),
                FailureDisposition::DeadLetter => sqlx::query(
                    r"
                    UPDATE outbox
                    SET attempts = attempts + 1, last_error = $2, dead_lettered_at = now()
                    WHERE id = $1
                    ",
                )
                .bind(id)
                .bind(error),
            };

            let result = query.execute(&self.pool).await.map_err(storage_error)?;
            if result.rows_affected() == 0 {
                return Err(OutboxError::NotFound(id));
            }
            Ok(())
        })
    }
}
