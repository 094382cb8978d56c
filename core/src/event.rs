//! Domain events and their stored representations.
//!
//! Events are immutable facts. They travel through three shapes:
//!
//! - the typed domain value implementing [`Event`] (usually an enum, one variant per fact);
//! - [`SerializedEvent`], the bincode payload handed to an event store for appending;
//! - [`RecordedEvent`], a committed entry read back from a stream, carrying its tenant,
//!   stream, version and commit timestamp.
//!
//! # Example
//!
//! ```
//! use borrowing_core::event::{Event, SerializedEvent};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
//! enum ShelfEvent {
//!     BookShelved { shelf: String },
//! }
//!
//! impl Event for ShelfEvent {
//!     fn event_type(&self) -> &'static str {
//!         match self {
//!             ShelfEvent::BookShelved { .. } => "BookShelved.v1",
//!         }
//!     }
//! }
//!
//! let event = ShelfEvent::BookShelved { shelf: "A1".into() };
//! let serialized = SerializedEvent::from_event(&event, None).unwrap();
//! assert_eq!(serialized.event_type, "BookShelved.v1");
//! ```

use crate::stream::{StreamId, TenantId, Version};
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Errors raised while encoding or decoding events.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),

    /// The stored type name does not match the decoded payload.
    #[error("Unexpected event type {found}, payload decodes as {decoded}")]
    TypeMismatch {
        /// Type name stored next to the payload.
        found: String,
        /// Type name reported by the decoded value.
        decoded: &'static str,
    },
}

/// A fact that can be appended to a stream and replayed.
///
/// `event_type` must return a stable, versioned name such as `"HoldPlaced.v1"`.
/// The name is stored next to the payload and lets readers (projections, tooling)
/// route an entry without decoding it.
pub trait Event: Send + Sync + 'static {
    /// Stable versioned type name of this event.
    fn event_type(&self) -> &'static str;

    /// Encode this event with bincode.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if encoding fails.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        bincode::serialize(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Decode an event previously encoded with [`Event::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] when the bytes are corrupt or
    /// belong to an incompatible schema.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        bincode::deserialize(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// An encoded event ready to be appended.
#[derive(Clone, Debug, PartialEq)]
pub struct SerializedEvent {
    /// Versioned type name, e.g. `"HoldPlaced.v1"`.
    pub event_type: String,

    /// The bincode payload.
    pub data: Vec<u8>,

    /// Optional JSON metadata (correlation ids, causation ids, actor).
    pub metadata: Option<serde_json::Value>,
}

impl SerializedEvent {
    /// Create a serialized event from its parts.
    #[must_use]
    pub const fn new(
        event_type: String,
        data: Vec<u8>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            data,
            metadata,
        }
    }

    /// Encode a typed event.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the event cannot be encoded.
    pub fn from_event<E: Event + Serialize>(
        event: &E,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            data: event.to_bytes()?,
            metadata,
        })
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.event_type, self.data.len())
    }
}

/// A committed stream entry.
///
/// This is what inline projections receive and what [`crate::event_store::EventStore::load_events`]
/// returns. `version` is the position of this entry: the first event of a stream is
/// recorded at version 1.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedEvent {
    /// Tenant the stream belongs to.
    pub tenant_id: TenantId,

    /// Stream the entry was appended to.
    pub stream_id: StreamId,

    /// Position of this entry in its stream.
    pub version: Version,

    /// Versioned type name.
    pub event_type: String,

    /// The bincode payload.
    pub data: Vec<u8>,

    /// Optional JSON metadata.
    pub metadata: Option<serde_json::Value>,

    /// Commit timestamp assigned by the store.
    pub recorded_at: DateTime<Utc>,
}

impl RecordedEvent {
    /// Decode the payload as `E` and check that its type name matches the stored one.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] for corrupt payloads and
    /// [`EventError::TypeMismatch`] when the stored name disagrees with the value.
    pub fn decode<E>(&self) -> Result<E, EventError>
    where
        E: Event + DeserializeOwned,
    {
        let event = E::from_bytes(&self.data)?;
        if event.event_type() != self.event_type {
            return Err(EventError::TypeMismatch {
                found: self.event_type.clone(),
                decoded: event.event_type(),
            });
        }
        Ok(event)
    }
}

impl fmt::Display for RecordedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{} {}",
            self.tenant_id, self.stream_id, self.version, self.event_type
        )
    }
}
