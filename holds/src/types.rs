//! Domain types for the member hold register.
//!
//! Identifiers are UUID newtypes so a member can never be passed where a book is
//! expected. [`Hold`] is the value object owned by the register.

use borrowing_core::aggregate::AggregateId;
use borrowing_core::stream::StreamId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a library member. Also the key of the member's hold register stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberId(Uuid);

impl MemberId {
    /// Creates a new random `MemberId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `MemberId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// True for the all-zero UUID, which never names a real member.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for MemberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AggregateId for MemberId {
    fn stream_id(&self) -> StreamId {
        StreamId::from(self.0)
    }
}

/// Identifier of a catalogued book.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BookId(Uuid);

impl BookId {
    /// Creates a new random `BookId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `BookId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// True for the all-zero UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for BookId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Book format
// ============================================================================

/// Physical format of a held copy.
///
/// `None` is the unset value of incoming requests; it is never valid on a hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BookFormat {
    /// No format given.
    None,
    /// Hardcover edition.
    Hardbound,
    /// Softcover edition.
    Paperback,
}

impl BookFormat {
    /// Integer stored in the read model.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Hardbound => 1,
            Self::Paperback => 2,
        }
    }

    /// Inverse of [`BookFormat::as_i32`].
    #[must_use]
    pub const fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Hardbound),
            2 => Some(Self::Paperback),
            _ => None,
        }
    }
}

impl fmt::Display for BookFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Hardbound => write!(f, "Hardbound"),
            Self::Paperback => write!(f, "Paperback"),
        }
    }
}

// ============================================================================
// Hold
// ============================================================================

/// A member's request to borrow one book in one format.
///
/// Two holds are the same hold when book and format match; timestamps do not take
/// part in identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Hold {
    /// Requested book
    pub book_id: BookId,
    /// Requested format
    pub format: BookFormat,
    /// When the hold was placed
    pub placed_on: DateTime<Utc>,
    /// When a copy was set aside, if it has been
    pub ready_on: Option<DateTime<Utc>>,
    /// Pickup deadline, set together with `ready_on`
    pub expire_on: Option<DateTime<Utc>>,
}

impl Hold {
    /// A fresh, not yet ready hold.
    #[must_use]
    pub const fn placed(book_id: BookId, format: BookFormat, placed_on: DateTime<Utc>) -> Self {
        Self {
            book_id,
            format,
            placed_on,
            ready_on: None,
            expire_on: None,
        }
    }

    /// True when this hold is for `book_id` in `format`.
    #[must_use]
    pub fn is_for(&self, book_id: BookId, format: BookFormat) -> bool {
        self.book_id == book_id && self.format == format
    }

    /// True once a copy has been set aside.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.ready_on.is_some()
    }
}

impl PartialEq for Hold {
    fn eq(&self, other: &Self) -> bool {
        self.is_for(other.book_id, other.format)
    }
}

impl Eq for Hold {}
