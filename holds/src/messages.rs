//! Messages published to other bounded contexts through the outbox.
//!
//! These are never folded into the register. They are serialized to JSON when the
//! command that implies them is committed.

use crate::commands::MarkHoldReady;
use crate::types::{BookFormat, BookId, MemberId};
use borrowing_core::outbox::ExternalMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tells the member a copy is waiting at the desk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookReadyForPickup {
    /// Member the copy is reserved for
    pub member_id: MemberId,
    /// Reserved book
    pub book_id: BookId,
    /// Reserved format
    pub format: BookFormat,
    /// When the copy was set aside
    pub ready_on: DateTime<Utc>,
    /// Last moment the copy can be collected
    pub pick_by: DateTime<Utc>,
}

impl ExternalMessage for BookReadyForPickup {
    fn message_type(&self) -> &'static str {
        "BookReadyForPickup"
    }
}

/// Asks the pickup scheduler to check back once the window closes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckIfPickupExpired {
    /// Member the copy is reserved for
    pub member_id: MemberId,
    /// Reserved book
    pub book_id: BookId,
    /// Reserved format
    pub format: BookFormat,
    /// When the copy was set aside
    pub ready_on: DateTime<Utc>,
    /// When the window closes
    pub expire_on: DateTime<Utc>,
}

impl ExternalMessage for CheckIfPickupExpired {
    fn message_type(&self) -> &'static str {
        "CheckIfPickupExpired"
    }
}

impl From<&MarkHoldReady> for BookReadyForPickup {
    fn from(command: &MarkHoldReady) -> Self {
        Self {
            member_id: command.member_id,
            book_id: command.book_id,
            format: command.format,
            ready_on: command.ready_on,
            pick_by: command.expire_on,
        }
    }
}

impl From<&MarkHoldReady> for CheckIfPickupExpired {
    fn from(command: &MarkHoldReady) -> Self {
        Self {
            member_id: command.member_id,
            book_id: command.book_id,
            format: command.format,
            ready_on: command.ready_on,
            expire_on: command.expire_on,
        }
    }
}
