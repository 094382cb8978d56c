//! Commands: intent that has not been accepted yet.

use crate::types::{BookFormat, BookId, MemberId};
use borrowing_core::stream::{TenantId, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Open a hold register for a member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateHoldRegister {
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Member the register belongs to
    pub member_id: MemberId,
}

/// Ask for a book to be held.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceHold {
    /// Member placing the hold
    pub member_id: MemberId,
    /// Requested book
    pub book_id: BookId,
    /// Requested format
    pub format: BookFormat,
    /// When the request was made
    pub requested_on: DateTime<Utc>,
}

/// Withdraw a hold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelHold {
    /// Member canceling the hold
    pub member_id: MemberId,
    /// Held book
    pub book_id: BookId,
    /// Held format
    pub format: BookFormat,
    /// When the request was made
    pub requested_on: DateTime<Utc>,
}

/// Record that a copy has been set aside for pickup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkHoldReady {
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

/// A mutating command plus the stream version the caller last observed.
///
/// The expected version plays the role of an HTTP `If-Match` token: the command is
/// applied only if nobody else wrote to the register since.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedCommand<C> {
    /// The wrapped command
    pub command: C,
    /// Version the register must be at
    pub expected_version: Version,
}

impl<C> VersionedCommand<C> {
    /// Wrap `command` with the caller's expected version.
    #[must_use]
    pub const fn new(command: C, expected_version: Version) -> Self {
        Self {
            command,
            expected_version,
        }
    }

    /// Split into command and expected version.
    #[must_use]
    pub fn into_parts(self) -> (C, Version) {
        (self.command, self.expected_version)
    }
}
