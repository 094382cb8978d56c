//! Hold register events.
//!
//! Events are immutable facts, appended in order to the member's stream and folded
//! by [`crate::register::MemberHoldRegister`]. Each has a stable versioned type
//! name used as the stored `event_type`.

use crate::types::{BookFormat, BookId, MemberId};
use borrowing_core::event::Event;
use borrowing_core::stream::TenantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A register was opened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldRegisterInitiated {
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Member the register belongs to
    pub member_id: MemberId,
}

/// A hold was placed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldPlaced {
    /// Member holding the book
    pub member_id: MemberId,
    /// Held book
    pub book_id: BookId,
    /// Held format
    pub format: BookFormat,
    /// When the hold was requested
    pub requested_on: DateTime<Utc>,
}

/// A hold was canceled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldCanceled {
    /// Member that held the book
    pub member_id: MemberId,
    /// Released book
    pub book_id: BookId,
    /// Released format
    pub format: BookFormat,
    /// When the cancellation was requested
    pub requested_on: DateTime<Utc>,
}

/// A copy was set aside for pickup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldReady {
    /// Member the copy is reserved for
    pub member_id: MemberId,
    /// Held book
    pub book_id: BookId,
    /// Held format
    pub format: BookFormat,
    /// When the copy was set aside
    pub ready_on: DateTime<Utc>,
    /// Pickup deadline
    pub expire_on: DateTime<Utc>,
}

/// A ready hold was not picked up in time.
///
/// Raised by the pickup scheduler; no command in this service produces it yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldExpired {
    /// Member the copy was reserved for
    pub member_id: MemberId,
    /// Held book
    pub book_id: BookId,
    /// Held format
    pub format: BookFormat,
    /// When the pickup window closed
    pub expired_on: DateTime<Utc>,
}

/// Every event of the hold register stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoldRegisterEvent {
    /// See [`HoldRegisterInitiated`]
    HoldRegisterInitiated(HoldRegisterInitiated),
    /// See [`HoldPlaced`]
    HoldPlaced(HoldPlaced),
    /// See [`HoldCanceled`]
    HoldCanceled(HoldCanceled),
    /// See [`HoldReady`]
    HoldReady(HoldReady),
    /// See [`HoldExpired`]
    HoldExpired(HoldExpired),
}

impl HoldRegisterEvent {
    /// Stored type name of [`HoldRegisterInitiated`].
    pub const INITIATED: &'static str = "HoldRegisterInitiated.v1";
    /// Stored type name of [`HoldPlaced`].
    pub const PLACED: &'static str = "HoldPlaced.v1";
    /// Stored type name of [`HoldCanceled`].
    pub const CANCELED: &'static str = "HoldCanceled.v1";
    /// Stored type name of [`HoldReady`].
    pub const READY: &'static str = "HoldReady.v1";
    /// Stored type name of [`HoldExpired`].
    pub const EXPIRED: &'static str = "HoldExpired.v1";
}

impl Event for HoldRegisterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::HoldRegisterInitiated(_) => Self::INITIATED,
            Self::HoldPlaced(_) => Self::PLACED,
            Self::HoldCanceled(_) => Self::CANCELED,
            Self::HoldReady(_) => Self::READY,
            Self::HoldExpired(_) => Self::EXPIRED,
        }
    }
}

impl From<HoldRegisterInitiated> for HoldRegisterEvent {
    fn from(event: HoldRegisterInitiated) -> Self {
        Self::HoldRegisterInitiated(event)
    }
}

impl From<HoldPlaced> for HoldRegisterEvent {
    fn from(event: HoldPlaced) -> Self {
        Self::HoldPlaced(event)
    }
}

impl From<HoldCanceled> for HoldRegisterEvent {
    fn from(event: HoldCanceled) -> Self {
        Self::HoldCanceled(event)
    }
}

impl From<HoldReady> for HoldRegisterEvent {
    fn from(event: HoldReady) -> Self {
        Self::HoldReady(event)
    }
}

impl From<HoldExpired> for HoldRegisterEvent {
    fn from(event: HoldExpired) -> Self {
        Self::HoldExpired(event)
    }
}
