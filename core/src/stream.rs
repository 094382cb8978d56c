//! Stream addressing and versioning.
//!
//! Every event stream lives inside exactly one tenant. A stream is addressed by the
//! pair ([`TenantId`], [`StreamId`]) and its position is tracked with [`Version`].
//! Tenancy is never ambient: each store call takes the tenant explicitly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error returned when an identifier fails to parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseIdError {
    /// The tenant identifier was empty or whitespace.
    #[error("Tenant ID cannot be empty")]
    EmptyTenant,

    /// The stream identifier was empty.
    #[error("Stream ID cannot be empty")]
    EmptyStream,
}

/// Identifier of the tenant that owns a stream, a projection row or an outbox record.
///
/// For the borrowing service a tenant is a library branch host name, such as
/// `"mason.lms.com"`.
///
/// # Examples
///
/// ```
/// use borrowing_core::stream::TenantId;
///
/// let tenant: TenantId = "mason.lms.com".parse().unwrap();
/// assert_eq!(tenant.as_str(), "mason.lms.com");
/// assert!("  ".parse::<TenantId>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    /// Wrap a trusted tenant identifier without validation.
    ///
    /// Use [`FromStr`] for input that comes from outside the process.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The tenant identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the identifier is empty or only whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TenantId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseIdError::EmptyTenant);
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of one aggregate's event stream within a tenant.
///
/// Aggregates keyed by a UUID use its hyphenated form, so the same member id maps
/// to the same stream id in every tenant.
///
/// # Examples
///
/// ```
/// use borrowing_core::stream::StreamId;
/// use uuid::Uuid;
///
/// let id = Uuid::nil();
/// assert_eq!(StreamId::from(id).as_str(), "00000000-0000-0000-0000-000000000000");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    /// Wrap a trusted stream identifier without validation.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The stream identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the identifier and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StreamId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseIdError::EmptyStream);
        }
        Ok(Self(s.to_string()))
    }
}

impl From<Uuid> for StreamId {
    fn from(id: Uuid) -> Self {
        Self(id.hyphenated().to_string())
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Position of a stream: the number of events it holds.
///
/// A stream that does not exist is at [`Version::INITIAL`]. Appending N events to
/// a stream at version V leaves it at V + N, and the k-th event ever appended is
/// recorded with version k. Callers echo the version they last observed as the
/// expected version of their next write.
///
/// # Examples
///
/// ```
/// use borrowing_core::stream::Version;
///
/// let created = Version::INITIAL.next();
/// assert_eq!(created, Version::new(1));
/// assert_eq!(created + 4, Version::new(5));
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Version of a stream that holds no events.
    pub const INITIAL: Self = Self(0);

    /// Create a version from its numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The numeric value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The version after one more event.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// True for a stream with no events.
    #[must_use]
    pub const fn is_initial(self) -> bool {
        self.0 == 0
    }

    /// Signed representation used by SQL `BIGINT` columns.
    ///
    /// Values above `i64::MAX` saturate; no stream gets anywhere near that length.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }

    /// Build a version from a SQL `BIGINT`; negative values clamp to zero.
    #[must_use]
    pub fn from_i64(value: i64) -> Self {
        Self(u64::try_from(value).unwrap_or(0))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

impl std::ops::Add<u64> for Version {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}
