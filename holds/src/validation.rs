//! Shape checks run before a command reaches the register.
//!
//! These reject malformed input (nil ids, missing format, inverted pickup window).
//! Business rules such as capacity are the register's job and are not repeated here.

use crate::commands::{CancelHold, InitiateHoldRegister, MarkHoldReady, PlaceHold};
use crate::types::{BookFormat, BookId, MemberId};
use std::fmt;

/// Every rule a command failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Human-readable failures, in rule order.
    pub failures: Vec<String>,
}

impl ValidationError {
    /// A single failure.
    #[must_use]
    pub fn single(failure: impl Into<String>) -> Self {
        Self {
            failures: vec![failure.into()],
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed: {}", self.failures.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// A command that can check its own shape.
pub trait Validate {
    /// Check every rule and report all failures at once.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] listing each failing rule.
    fn validate(&self) -> Result<(), ValidationError>;
}

#[derive(Default)]
struct Failures(Vec<String>);

impl Failures {
    fn check(&mut self, ok: bool, failure: &str) {
        if !ok {
            self.0.push(failure.to_string());
        }
    }

    fn hold_target(&mut self, member_id: MemberId, book_id: BookId, format: BookFormat) {
        self.check(!member_id.is_nil(), "MemberId must not be empty.");
        self.check(!book_id.is_nil(), "BookId must not be empty.");
        self.check(format != BookFormat::None, "Format must be Hardbound or Paperback.");
    }

    fn finish(self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { failures: self.0 })
        }
    }
}

impl Validate for InitiateHoldRegister {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut failures = Failures::default();
        failures.check(!self.tenant_id.is_blank(), "TenantId must not be empty.");
        failures.check(!self.member_id.is_nil(), "MemberId must not be empty.");
        failures.finish()
    }
}

impl Validate for PlaceHold {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut failures = Failures::default();
        failures.hold_target(self.member_id, self.book_id, self.format);
        failures.finish()
    }
}

impl Validate for CancelHold {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut failures = Failures::default();
        failures.hold_target(self.member_id, self.book_id, self.format);
        failures.finish()
    }
}

impl Validate for MarkHoldReady {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut failures = Failures::default();
        failures.hold_target(self.member_id, self.book_id, self.format);
        failures.check(self.expire_on > self.ready_on, "ExpireOn must be after ReadyOn.");
        failures.finish()
    }
}
