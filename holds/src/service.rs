//! Service facade for callers at the edge (HTTP handlers, jobs, the demo binary).
//!
//! Turns caller intent into validated, versioned commands, fills in the clock and
//! the pickup window, dispatches to [`crate::handlers`] and classifies failures.

use crate::commands::{CancelHold, InitiateHoldRegister, MarkHoldReady, PlaceHold, VersionedCommand};
use crate::events::HoldRegisterEvent;
use crate::handlers::{self, HandlerResult};
use crate::projection::{self, BookMemberHold};
use crate::register::{HoldRegisterError, MemberHoldRegister};
use crate::types::{BookFormat, BookId, MemberId};
use crate::validation::{Validate, ValidationError};
use borrowing_core::environment::Clock;
use borrowing_core::event_store::EventStore;
use borrowing_core::projection::{ProjectionError, ProjectionReader};
use borrowing_core::stream::{TenantId, Version};
use borrowing_runtime::session::{Committed, Initiated, Loaded, SessionError, StorageSession};
use chrono::Duration;
use futures::future::try_join_all;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by [`HoldRegisterService`].
#[derive(Error, Debug)]
pub enum CommandError {
    /// The request was malformed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The session or the register refused the command.
    #[error(transparent)]
    Session(#[from] SessionError<HoldRegisterError>),

    /// The read model could not be queried.
    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

/// Coarse outcome class, in HTTP terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 400
    BadRequest,
    /// 404
    NotFound,
    /// 412
    PreconditionFailed,
    /// 500
    Internal,
}

impl CommandError {
    /// How an edge adapter should report this error.
    ///
    /// Business-rule rejections are not singled out and report as `Internal`.
    #[must_use]
    pub const fn status(&self) -> StatusClass {
        match self {
            Self::Validation(_) => StatusClass::BadRequest,
            Self::Session(SessionError::AggregateNotFound { .. }) => StatusClass::NotFound,
            Self::Session(SessionError::ConcurrencyConflict { .. }) => {
                StatusClass::PreconditionFailed
            }
            Self::Session(_) | Self::Projection(_) => StatusClass::Internal,
        }
    }

    /// The register's rejection, if that is what this is.
    #[must_use]
    pub const fn rejection(&self) -> Option<&HoldRegisterError> {
        match self {
            Self::Session(SessionError::Rejected(rejection)) => Some(rejection),
            _ => None,
        }
    }
}

/// Parse an `If-Match` style token into the expected stream version.
///
/// Accepts `"3"`, `3` and `W/"3"`.
///
/// # Errors
///
/// Returns [`ValidationError`] unless the version is a run of ASCII digits.
pub fn parse_etag(token: &str) -> Result<Version, ValidationError> {
    let token = token.trim();
    let token = token.strip_prefix("W/").unwrap_or(token);
    let token = token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token);

    // `u64::from_str` also takes a leading '+'
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(not_a_version(token));
    }
    token
        .parse::<u64>()
        .map(Version::new)
        .map_err(|_| not_a_version(token))
}

fn not_a_version(token: &str) -> ValidationError {
    ValidationError::single(format!("If-Match '{token}' is not a stream version."))
}

/// The token a caller should send back to update a register at `version`.
#[must_use]
pub fn etag(version: Version) -> String {
    format!("\"{version}\"")
}

/// Domain policy for holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldPolicy {
    /// Time a member has to collect a ready hold.
    pub pickup_window: Duration,
    /// Tenants covered by [`HoldRegisterService::hold_report`].
    pub active_tenants: Vec<TenantId>,
}

impl Default for HoldPolicy {
    fn default() -> Self {
        Self {
            pickup_window: Duration::days(5),
            active_tenants: vec![TenantId::from("mason.lms.com"), TenantId::from("cin.lms.com")],
        }
    }
}

/// A member's register in one tenant, as reported by [`HoldRegisterService::hold_report`].
#[derive(Debug, Clone, PartialEq)]
pub struct TenantHolds {
    /// The tenant looked at.
    pub tenant_id: TenantId,
    /// The register, if the member joined in this tenant.
    pub register: Option<Loaded<MemberHoldRegister>>,
}

/// Entry point for hold register commands and queries.
pub struct HoldRegisterService<S: ?Sized> {
    session: StorageSession<S>,
    clock: Arc<dyn Clock>,
    policy: HoldPolicy,
}

impl<S: ?Sized> Clone for HoldRegisterService<S> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            clock: Arc::clone(&self.clock),
            policy: self.policy.clone(),
        }
    }
}

impl<S> HoldRegisterService<S>
where
    S: EventStore + ProjectionReader + ?Sized,
{
    /// Create a service over `store`.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, policy: HoldPolicy) -> Self {
        Self {
            session: StorageSession::new(store),
            clock,
            policy,
        }
    }

    /// The storage session commands go through.
    #[must_use]
    pub const fn session(&self) -> &StorageSession<S> {
        &self.session
    }

    /// The policy in force.
    #[must_use]
    pub const fn policy(&self) -> &HoldPolicy {
        &self.policy
    }

    /// Open a register for `member_id`. Joining twice is not an error.
    ///
    /// # Errors
    ///
    /// [`CommandError::Validation`] for a blank tenant or nil member.
    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, member = %member_id))]
    pub async fn join(
        &self,
        tenant_id: &TenantId,
        member_id: MemberId,
    ) -> Result<Initiated, CommandError> {
        let command = InitiateHoldRegister {
            tenant_id: tenant_id.clone(),
            member_id,
        };

        let result = match command.validate() {
            Ok(()) => handlers::initiate_hold_register(&self.session, command)
                .await
                .map_err(CommandError::from),
            Err(invalid) => Err(invalid.into()),
        };
        record("initiate_hold_register", &result);
        result
    }

    /// Place a hold, conditional on `if_match`.
    ///
    /// # Errors
    ///
    /// See [`CommandError`]; business-rule rejections are reachable through
    /// [`CommandError::rejection`].
    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, member = %member_id))]
    pub async fn place_hold(
        &self,
        tenant_id: &TenantId,
        member_id: MemberId,
        book_id: BookId,
        format: BookFormat,
        if_match: &str,
    ) -> Result<Committed<HoldRegisterEvent>, CommandError> {
        let command = PlaceHold {
            member_id,
            book_id,
            format,
            requested_on: self.clock.now(),
        };

        let result = self
            .dispatch(command, if_match, |command| {
                handlers::place_hold(&self.session, tenant_id, command)
            })
            .await;
        record("place_hold", &result);
        result
    }

    /// Cancel a hold, conditional on `if_match`.
    ///
    /// # Errors
    ///
    /// See [`HoldRegisterService::place_hold`].
    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, member = %member_id))]
    pub async fn cancel_hold(
        &self,
        tenant_id: &TenantId,
        member_id: MemberId,
        book_id: BookId,
        format: BookFormat,
        if_match: &str,
    ) -> Result<Committed<HoldRegisterEvent>, CommandError> {
        let command = CancelHold {
            member_id,
            book_id,
            format,
            requested_on: self.clock.now(),
        };

        let result = self
            .dispatch(command, if_match, |command| {
                handlers::cancel_hold(&self.session, tenant_id, command)
            })
            .await;
        record("cancel_hold", &result);
        result
    }

    /// Mark a hold ready now, to be collected within the pickup window.
    ///
    /// # Errors
    ///
    /// See [`HoldRegisterService::place_hold`].
    #[tracing::instrument(skip_all, fields(tenant = %tenant_id, member = %member_id))]
    pub async fn mark_ready(
        &self,
        tenant_id: &TenantId,
        member_id: MemberId,
        book_id: BookId,
        format: BookFormat,
        if_match: &str,
    ) -> Result<Committed<HoldRegisterEvent>, CommandError> {
        let ready_on = self.clock.now();
        let command = MarkHoldReady {
            member_id,
            book_id,
            format,
            ready_on,
            expire_on: ready_on + self.policy.pickup_window,
        };

        let result = self
            .dispatch(command, if_match, |command| {
                handlers::mark_hold_ready(&self.session, tenant_id, command)
            })
            .await;
        record("mark_hold_ready", &result);
        result
    }

    /// The member's register in `tenant_id`, or `None` if they never joined.
    ///
    /// # Errors
    ///
    /// [`CommandError::Session`] when the stream cannot be read.
    pub async fn holds(
        &self,
        tenant_id: &TenantId,
        member_id: MemberId,
    ) -> Result<Option<Loaded<MemberHoldRegister>>, CommandError> {
        Ok(self
            .session
            .load::<MemberHoldRegister>(tenant_id, &member_id)
            .await?)
    }

    /// The member's register in every active tenant, in policy order.
    ///
    /// # Errors
    ///
    /// Fails if any tenant's stream cannot be read.
    #[tracing::instrument(skip_all, fields(member = %member_id))]
    pub async fn hold_report(&self, member_id: MemberId) -> Result<Vec<TenantHolds>, CommandError> {
        try_join_all(self.policy.active_tenants.iter().map(|tenant_id| async move {
            Ok::<_, CommandError>(TenantHolds {
                tenant_id: tenant_id.clone(),
                register: self.holds(tenant_id, member_id).await?,
            })
        }))
        .await
    }

    /// Active holds from the read model.
    ///
    /// # Errors
    ///
    /// [`CommandError::Projection`] when the read model cannot be queried.
    pub async fn active_holds(
        &self,
        tenant_id: &TenantId,
        member_id: MemberId,
    ) -> Result<Vec<BookMemberHold>, CommandError> {
        Ok(projection::active_holds(self.session.store().as_ref(), tenant_id, member_id).await?)
    }

    async fn dispatch<C, F, Fut>(
        &self,
        command: C,
        if_match: &str,
        handle: F,
    ) -> Result<Committed<HoldRegisterEvent>, CommandError>
    where
        C: Validate,
        F: FnOnce(VersionedCommand<C>) -> Fut,
        Fut: Future<Output = HandlerResult<Committed<HoldRegisterEvent>>>,
    {
        command.validate()?;
        let expected_version = parse_etag(if_match)?;
        Ok(handle(VersionedCommand::new(command, expected_version)).await?)
    }
}

fn record<T>(command: &'static str, result: &Result<T, CommandError>) {
    let outcome = match result {
        Ok(_) => "accepted",
        Err(error) if error.rejection().is_some() => "rejected",
        Err(error) => match error.status() {
            StatusClass::BadRequest => "invalid",
            StatusClass::NotFound => "not_found",
            StatusClass::PreconditionFailed => "conflict",
            StatusClass::Internal => "failed",
        },
    };

    if let Err(error) = result {
        tracing::debug!(command, outcome, error = %error, "Command not applied");
    }
    metrics::counter!("holds.commands", "command" => command, "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use borrowing_core::stream::StreamId;

    #[test]
    fn etag_forms_are_accepted() {
        assert_eq!(parse_etag("\"3\""), Ok(Version::new(3)));
        assert_eq!(parse_etag("3"), Ok(Version::new(3)));
        assert_eq!(parse_etag(" W/\"12\" "), Ok(Version::new(12)));
        assert_eq!(parse_etag(&etag(Version::new(7))), Ok(Version::new(7)));
    }

    #[test]
    fn malformed_etag_is_a_validation_failure() {
        for token in ["", "\"\"", "abc", "\"-1\"", "\"3"] {
            assert!(parse_etag(token).is_err(), "{token} should not parse");
        }
    }

    #[test]
    fn etag_version_must_be_plain_digits() {
        for token in ["+3", "\"+3\"", "W/\"+3\"", "\" 3\"", "3_0", "\"99999999999999999999\""] {
            assert!(parse_etag(token).is_err(), "{token} should not parse");
        }
        assert_eq!(parse_etag("\"007\""), Ok(Version::new(7)));
    }

    #[test]
    fn errors_map_to_status_classes() {
        let conflict = CommandError::from(SessionError::ConcurrencyConflict {
            stream_id: StreamId::from("member"),
            expected: Version::new(1),
            actual: Version::new(2),
        });
        assert_eq!(conflict.status(), StatusClass::PreconditionFailed);

        let missing = CommandError::from(SessionError::AggregateNotFound {
            aggregate: "MemberHoldRegister",
            id: "member".to_string(),
        });
        assert_eq!(missing.status(), StatusClass::NotFound);
        assert_eq!(missing.to_string(), "MemberHoldRegister with id 'member' was not found.");

        let invalid = CommandError::from(ValidationError::single("BookId must not be empty."));
        assert_eq!(invalid.status(), StatusClass::BadRequest);

        let rejected = CommandError::from(SessionError::Rejected(HoldRegisterError::CapacityExceeded));
        assert_eq!(rejected.status(), StatusClass::Internal);
        assert_eq!(rejected.rejection(), Some(&HoldRegisterError::CapacityExceeded));
    }

    #[test]
    fn default_policy_matches_library_defaults() {
        let policy = HoldPolicy::default();
        assert_eq!(policy.pickup_window, Duration::days(5));
        assert_eq!(policy.active_tenants.len(), 2);
    }
}
