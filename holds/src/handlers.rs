//! One handler per command.
//!
//! Handlers unwrap the versioned envelope, let the register decide through the
//! storage session and attach the outbox messages a command implies. They do not
//! validate; see [`crate::validation`].

use crate::commands::{CancelHold, InitiateHoldRegister, MarkHoldReady, PlaceHold, VersionedCommand};
use crate::events::HoldRegisterEvent;
use crate::messages::{BookReadyForPickup, CheckIfPickupExpired};
use crate::register::{HoldRegisterError, MemberHoldRegister};
use borrowing_core::event_store::{EventStore, EventStoreError};
use borrowing_core::outbox::{ExternalMessage, OutboxError, OutboxMessage};
use borrowing_core::stream::TenantId;
use borrowing_runtime::session::{Committed, Initiated, SessionError, StorageSession};

/// Result of a hold register handler.
pub type HandlerResult<T> = Result<T, SessionError<HoldRegisterError>>;

/// Create the member's register. A register that already exists is left untouched.
///
/// # Errors
///
/// Returns [`SessionError`] for encoding and storage failures.
pub async fn initiate_hold_register<S>(
    session: &StorageSession<S>,
    command: InitiateHoldRegister,
) -> HandlerResult<Initiated>
where
    S: EventStore + ?Sized,
{
    let seed = MemberHoldRegister::initiate(&command);
    session
        .initiate_aggregate::<MemberHoldRegister>(&command.tenant_id, &command.member_id, &seed, Vec::new())
        .await
}

/// Place a hold at the caller's expected version.
///
/// # Errors
///
/// Returns [`SessionError::Rejected`] for business-rule rejections,
/// [`SessionError::AggregateNotFound`] and [`SessionError::ConcurrencyConflict`].
pub async fn place_hold<S>(
    session: &StorageSession<S>,
    tenant_id: &TenantId,
    command: VersionedCommand<PlaceHold>,
) -> HandlerResult<Committed<HoldRegisterEvent>>
where
    S: EventStore + ?Sized,
{
    let (command, expected_version) = command.into_parts();
    session
        .get_and_update_aggregate::<MemberHoldRegister, _>(
            tenant_id,
            &command.member_id,
            expected_version,
            |register| register.place_hold(&command),
            Vec::new(),
        )
        .await
}

/// Cancel a hold at the caller's expected version.
///
/// # Errors
///
/// Same as [`place_hold`].
pub async fn cancel_hold<S>(
    session: &StorageSession<S>,
    tenant_id: &TenantId,
    command: VersionedCommand<CancelHold>,
) -> HandlerResult<Committed<HoldRegisterEvent>>
where
    S: EventStore + ?Sized,
{
    let (command, expected_version) = command.into_parts();
    session
        .get_and_update_aggregate::<MemberHoldRegister, _>(
            tenant_id,
            &command.member_id,
            expected_version,
            |register| register.cancel_hold(&command),
            Vec::new(),
        )
        .await
}

/// Mark a hold ready and notify the member and the pickup scheduler.
///
/// [`BookReadyForPickup`] and [`CheckIfPickupExpired`] are committed with the
/// `HoldReady` event, or not at all.
///
/// # Errors
///
/// Same as [`place_hold`], plus [`SessionError::Store`] if a message cannot be encoded.
pub async fn mark_hold_ready<S>(
    session: &StorageSession<S>,
    tenant_id: &TenantId,
    command: VersionedCommand<MarkHoldReady>,
) -> HandlerResult<Committed<HoldRegisterEvent>>
where
    S: EventStore + ?Sized,
{
    let (command, expected_version) = command.into_parts();
    let messages = pickup_messages(&command).map_err(|e| {
        SessionError::Store(EventStoreError::SerializationError(e.to_string()))
    })?;

    session
        .get_and_update_aggregate::<MemberHoldRegister, _>(
            tenant_id,
            &command.member_id,
            expected_version,
            |register| register.mark_hold_ready(&command),
            messages,
        )
        .await
}

fn pickup_messages(command: &MarkHoldReady) -> Result<Vec<OutboxMessage>, OutboxError> {
    Ok(vec![
        BookReadyForPickup::from(command).to_outbox()?,
        CheckIfPickupExpired::from(command).to_outbox()?,
    ])
}
