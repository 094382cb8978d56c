//! Transactional outbox: external messages committed together with the events that
//! caused them.
//!
//! # Overview
//!
//! A command may need to notify other bounded contexts ("book ready for pickup").
//! Publishing straight to a bus from the command path would either lose messages
//! (crash after commit, before publish) or send messages for rejected commands
//! (publish before commit). Instead, messages ride along in the event store's
//! append as [`OutboxMessage`]s and are written to an outbox table in the same local
//! transaction. A relay reads pending records through the [`Outbox`] contract and
//! forwards them to a [`MessagePublisher`], marking each delivered afterwards.
//!
//! Delivery is at-least-once: a relay that crashes between publishing and marking a
//! record republishes it on restart. Consumers deduplicate on [`PendingMessage::id`].

use crate::stream::{StreamId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by outbox storage and publishers.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// The message payload could not be encoded.
    #[error("Failed to encode outbox message: {0}")]
    Serialization(String),

    /// Storage backend failure.
    #[error("Outbox storage error: {0}")]
    Storage(String),

    /// No outbox record with this id.
    #[error("Outbox record {0} not found")]
    NotFound(i64),

    /// The publisher could not deliver the message.
    #[error("Publish failed: {0}")]
    Publish(String),
}

/// A message destined for another bounded context.
///
/// Implemented by the closed set of messages a service emits. The payload is
/// stored as JSON so that relays and other services can read it without sharing
/// Rust types.
pub trait ExternalMessage: Serialize + Send + Sync {
    /// Stable message type name, e.g. `"BookReadyForPickup"`.
    fn message_type(&self) -> &'static str;

    /// Encode this message for the outbox.
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError::Serialization`] if the payload cannot be encoded.
    fn to_outbox(&self) -> Result<OutboxMessage, OutboxError> {
        let payload =
            serde_json::to_value(self).map_err(|e| OutboxError::Serialization(e.to_string()))?;
        Ok(OutboxMessage {
            message_type: self.message_type().to_string(),
            payload,
        })
    }
}

/// An encoded external message waiting to be committed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    /// Message type name.
    pub message_type: String,

    /// JSON payload.
    pub payload: serde_json::Value,
}

impl fmt::Display for OutboxMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.message_type, self.payload)
    }
}

/// A committed outbox record.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingMessage {
    /// Record id, unique per store and increasing in commit order.
    pub id: i64,

    /// Tenant of the stream that produced the message.
    pub tenant_id: TenantId,

    /// Stream that produced the message.
    pub stream_id: StreamId,

    /// The message itself.
    pub message: OutboxMessage,

    /// Delivery attempts made so far.
    pub attempts: u32,

    /// Error of the most recent failed attempt.
    pub last_error: Option<String>,

    /// When the record was committed.
    pub enqueued_at: DateTime<Utc>,
}

/// What to do with a record after a failed delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Try again once `next_attempt_at` has passed.
    RetryAt(DateTime<Utc>),

    /// Stop delivering; keep the record for inspection and manual requeue.
    DeadLetter,
}

/// How long a fetched record stays claimed by the relay that fetched it.
///
/// A relay that dies mid-batch releases its records when the claim lapses.
pub const DEFAULT_CLAIM_TIMEOUT: Duration = Duration::from_secs(30);

/// `now` plus a claim timeout, saturating at `now` when the sum does not fit.
#[must_use]
pub fn claimed_until(now: DateTime<Utc>, claim_timeout: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(claim_timeout)
        .ok()
        .and_then(|claim| now.checked_add_signed(claim))
        .unwrap_or(now)
}

/// Storage side of the outbox, as seen by a relay.
///
/// Writing records is not part of this trait: that happens inside
/// [`crate::event_store::EventStore::append`].
pub trait Outbox: Send + Sync {
    /// Claim undelivered, live records whose next attempt is due at `now`, oldest first.
    ///
    /// Claimed records are not returned again, to this or any other relay, until
    /// [`Outbox::record_failure`] reschedules them or the claim times out.
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError::Storage`] on backend failure.
    fn fetch_pending(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PendingMessage>, OutboxError>> + Send + '_>>;

    /// Mark a record delivered. Marking an already delivered record is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError::NotFound`] for unknown ids.
    fn mark_delivered(
        &self,
        id: i64,
        delivered_at: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<(), OutboxError>> + Send + '_>>;

    /// Record a failed attempt and schedule the next one or dead-letter the record.
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError::NotFound`] for unknown ids.
    fn record_failure(
        &self,
        id: i64,
        error: String,
        disposition: FailureDisposition,
    ) -> Pin<Box<dyn Future<Output = Result<(), OutboxError>> + Send + '_>>;
}

/// Transport collaborator that hands a message to the bus.
pub trait MessagePublisher: Send + Sync {
    /// Publish one record.
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError::Publish`] when the transport rejects the message.
    fn publish<'a>(
        &'a self,
        message: &'a PendingMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), OutboxError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct ShelfCleared {
        shelf: String,
    }

    impl ExternalMessage for ShelfCleared {
        fn message_type(&self) -> &'static str {
            "ShelfCleared"
        }
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn external_messages_encode_as_json() {
        let message = ShelfCleared {
            shelf: "A1".into(),
        }
        .to_outbox()
        .expect("message should encode");

        assert_eq!(message.message_type, "ShelfCleared");
        assert_eq!(message.payload, serde_json::json!({ "shelf": "A1" }));
        assert!(message.to_string().starts_with("ShelfCleared "));
    }

    #[test]
    fn error_display() {
        assert_eq!(
            OutboxError::NotFound(42).to_string(),
            "Outbox record 42 not found"
        );
    }

    #[test]
    fn claims_saturate_instead_of_overflowing() {
        let now = DateTime::<Utc>::MAX_UTC - chrono::Duration::seconds(1);
        assert_eq!(claimed_until(now, Duration::from_secs(60)), now);

        let start = Utc::now();
        assert_eq!(
            claimed_until(start, DEFAULT_CLAIM_TIMEOUT),
            start + chrono::Duration::seconds(30)
        );
    }
}
