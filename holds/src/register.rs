//! The member hold register aggregate.
//!
//! One register per member per tenant. Decisions are pure: they look at the folded
//! state and either return the event to append or a [`HoldRegisterError`].

use crate::commands::{CancelHold, InitiateHoldRegister, MarkHoldReady, PlaceHold};
use crate::events::{
    HoldCanceled, HoldPlaced, HoldReady, HoldRegisterEvent, HoldRegisterInitiated,
};
use crate::types::{BookFormat, BookId, Hold, MemberId};
use borrowing_core::aggregate::Aggregate;
use borrowing_core::stream::{TenantId, Version};
use thiserror::Error;

/// Most holds a member may have at once.
pub const MAX_HOLDS: usize = 5;

/// Business-rule rejections.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HoldRegisterError {
    /// The member already holds [`MAX_HOLDS`] books.
    #[error("Member can not hold more than 5 books.")]
    CapacityExceeded,

    /// The book is already held in this format.
    #[error("A hold for requested book already exists.")]
    DuplicateHold,

    /// No hold matches the book and format.
    #[error("No such hold.")]
    HoldNotFound,
}

/// Folded state of a member's holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberHoldRegister {
    id: MemberId,
    tenant_id: TenantId,
    version: Version,
    holds: Vec<Hold>,
}

impl MemberHoldRegister {
    /// Owning tenant.
    #[must_use]
    pub const fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Holds in the order they were placed.
    #[must_use]
    pub fn holds(&self) -> &[Hold] {
        &self.holds
    }

    fn find(&self, book_id: BookId, format: BookFormat) -> Option<&Hold> {
        self.holds.iter().find(|hold| hold.is_for(book_id, format))
    }

    // ------------------------------------------------------------------------
    // Decisions
    // ------------------------------------------------------------------------

    /// Open a register. Never fails; an existing stream is the session's concern.
    #[must_use]
    pub fn initiate(command: &InitiateHoldRegister) -> HoldRegisterEvent {
        HoldRegisterInitiated {
            tenant_id: command.tenant_id.clone(),
            member_id: command.member_id,
        }
        .into()
    }

    /// Place a hold.
    ///
    /// # Errors
    ///
    /// [`HoldRegisterError::CapacityExceeded`] when the register is full, otherwise
    /// [`HoldRegisterError::DuplicateHold`] when the book is already held in this format.
    pub fn place_hold(&self, command: &PlaceHold) -> Result<HoldRegisterEvent, HoldRegisterError> {
        if self.holds.len() >= MAX_HOLDS {
            return Err(HoldRegisterError::CapacityExceeded);
        }
        if self.find(command.book_id, command.format).is_some() {
            return Err(HoldRegisterError::DuplicateHold);
        }

        Ok(HoldPlaced {
            member_id: command.member_id,
            book_id: command.book_id,
            format: command.format,
            requested_on: command.requested_on,
        }
        .into())
    }

    /// Cancel a hold.
    ///
    /// # Errors
    ///
    /// [`HoldRegisterError::HoldNotFound`] when no hold matches.
    pub fn cancel_hold(&self, command: &CancelHold) -> Result<HoldRegisterEvent, HoldRegisterError> {
        if self.find(command.book_id, command.format).is_none() {
            return Err(HoldRegisterError::HoldNotFound);
        }

        Ok(HoldCanceled {
            member_id: command.member_id,
            book_id: command.book_id,
            format: command.format,
            requested_on: command.requested_on,
        }
        .into())
    }

    /// Mark a hold ready for pickup. A hold that is already ready may be marked again.
    ///
    /// # Errors
    ///
    /// [`HoldRegisterError::HoldNotFound`] when no hold matches.
    pub fn mark_hold_ready(
        &self,
        command: &MarkHoldReady,
    ) -> Result<HoldRegisterEvent, HoldRegisterError> {
        if self.find(command.book_id, command.format).is_none() {
            return Err(HoldRegisterError::HoldNotFound);
        }

        Ok(HoldReady {
            member_id: command.member_id,
            book_id: command.book_id,
            format: command.format,
            ready_on: command.ready_on,
            expire_on: command.expire_on,
        }
        .into())
    }

    // ------------------------------------------------------------------------
    // Fold
    // ------------------------------------------------------------------------

    fn apply(&mut self, event: &HoldRegisterEvent) {
        match event {
            HoldRegisterEvent::HoldRegisterInitiated(_) | HoldRegisterEvent::HoldExpired(_) => {}
            HoldRegisterEvent::HoldPlaced(e) => {
                self.holds
                    .push(Hold::placed(e.book_id, e.format, e.requested_on));
            }
            HoldRegisterEvent::HoldCanceled(e) => {
                self.holds.retain(|hold| !hold.is_for(e.book_id, e.format));
            }
            HoldRegisterEvent::HoldReady(e) => {
                if let Some(hold) = self
                    .holds
                    .iter_mut()
                    .find(|hold| hold.is_for(e.book_id, e.format) && !hold.is_ready())
                {
                    hold.ready_on = Some(e.ready_on);
                    hold.expire_on = Some(e.expire_on);
                }
            }
        }
        self.version = self.version.next();
    }
}

impl Aggregate for MemberHoldRegister {
    type Id = MemberId;
    type Event = HoldRegisterEvent;
    type Error = HoldRegisterError;

    const TYPE_NAME: &'static str = "MemberHoldRegister";

    fn id(&self) -> &MemberId {
        &self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn fold(state: Option<Self>, event: &HoldRegisterEvent) -> Option<Self> {
        match (state, event) {
            (None, HoldRegisterEvent::HoldRegisterInitiated(e)) => Some(Self {
                id: e.member_id,
                tenant_id: e.tenant_id.clone(),
                version: Version::new(1),
                holds: Vec::new(),
            }),
            (Some(mut register), event) => {
                register.apply(event);
                Some(register)
            }
            (None, _) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::HoldExpired;
    use borrowing_core::aggregate::replay;
    use borrowing_testing::{AggregateTest, test_epoch};
    use chrono::Duration;

    fn initiated(member: MemberId) -> HoldRegisterEvent {
        MemberHoldRegister::initiate(&InitiateHoldRegister {
            tenant_id: TenantId::from("mason.lms.com"),
            member_id: member,
        })
    }

    fn placed(member: MemberId, book: BookId, format: BookFormat) -> HoldRegisterEvent {
        HoldPlaced {
            member_id: member,
            book_id: book,
            format,
            requested_on: test_epoch(),
        }
        .into()
    }

    fn ready(member: MemberId, book: BookId, format: BookFormat, days: i64) -> HoldRegisterEvent {
        HoldReady {
            member_id: member,
            book_id: book,
            format,
            ready_on: test_epoch() + Duration::days(days),
            expire_on: test_epoch() + Duration::days(days + 5),
        }
        .into()
    }

    fn place(member: MemberId, book: BookId, format: BookFormat) -> PlaceHold {
        PlaceHold {
            member_id: member,
            book_id: book,
            format,
            requested_on: test_epoch(),
        }
    }

    fn full_register(member: MemberId) -> Vec<HoldRegisterEvent> {
        std::iter::once(initiated(member))
            .chain((0..MAX_HOLDS).map(|_| placed(member, BookId::new(), BookFormat::Hardbound)))
            .collect()
    }

    #[test]
    fn initiation_starts_an_empty_register_at_version_one() {
        let member = MemberId::new();
        let register: Option<MemberHoldRegister> = replay(&[initiated(member)]);

        assert!(matches!(
            register,
            Some(ref r) if r.version() == Version::new(1)
                && r.holds().is_empty()
                && *r.id() == member
                && r.tenant_id().as_str() == "mason.lms.com"
        ));
    }

    #[test]
    fn events_before_initiation_produce_no_state() {
        let member = MemberId::new();
        let register: Option<MemberHoldRegister> =
            replay(&[placed(member, BookId::new(), BookFormat::Paperback)]);
        assert!(register.is_none());
    }

    #[test]
    fn place_hold_appends_an_unready_hold() {
        let member = MemberId::new();
        let book = BookId::new();

        AggregateTest::<MemberHoldRegister>::new()
            .given([initiated(member)])
            .when(move |register| register.place_hold(&place(member, book, BookFormat::Hardbound)))
            .then_event(move |event| {
                assert_eq!(event, &placed(member, book, BookFormat::Hardbound));
            })
            .then_state(move |register| {
                assert_eq!(register.version(), Version::new(2));
                assert_eq!(register.holds().len(), 1);
                assert!(register.holds()[0].is_for(book, BookFormat::Hardbound));
                assert!(!register.holds()[0].is_ready());
            })
            .run();
    }

    #[test]
    fn sixth_hold_exceeds_capacity() {
        let member = MemberId::new();

        AggregateTest::<MemberHoldRegister>::new()
            .given(full_register(member))
            .when(move |register| register.place_hold(&place(member, BookId::new(), BookFormat::Paperback)))
            .then_error(|error| {
                assert_eq!(error, &HoldRegisterError::CapacityExceeded);
                assert_eq!(error.to_string(), "Member can not hold more than 5 books.");
            })
            .then_state(|register| assert_eq!(register.holds().len(), MAX_HOLDS))
            .run();
    }

    #[test]
    fn capacity_is_checked_before_duplicates() {
        let member = MemberId::new();
        let book = BookId::new();
        let mut history = vec![initiated(member), placed(member, book, BookFormat::Hardbound)];
        history.extend((1..MAX_HOLDS).map(|_| placed(member, BookId::new(), BookFormat::Hardbound)));

        AggregateTest::<MemberHoldRegister>::new()
            .given(history)
            .when(move |register| register.place_hold(&place(member, book, BookFormat::Hardbound)))
            .then_error(|error| assert_eq!(error, &HoldRegisterError::CapacityExceeded))
            .run();
    }

    #[test]
    fn same_book_and_format_is_a_duplicate() {
        let member = MemberId::new();
        let book = BookId::new();

        AggregateTest::<MemberHoldRegister>::new()
            .given([initiated(member), placed(member, book, BookFormat::Paperback)])
            .when(move |register| register.place_hold(&place(member, book, BookFormat::Paperback)))
            .then_error(|error| {
                assert_eq!(error.to_string(), "A hold for requested book already exists.");
            })
            .run();
    }

    #[test]
    fn same_book_in_another_format_is_allowed() {
        let member = MemberId::new();
        let book = BookId::new();

        AggregateTest::<MemberHoldRegister>::new()
            .given([initiated(member), placed(member, book, BookFormat::Paperback)])
            .when(move |register| register.place_hold(&place(member, book, BookFormat::Hardbound)))
            .then_state(|register| assert_eq!(register.holds().len(), 2))
            .run();
    }

    #[test]
    fn cancel_removes_the_hold_and_frees_the_slot() {
        let member = MemberId::new();
        let book = BookId::new();

        AggregateTest::<MemberHoldRegister>::new()
            .given([initiated(member), placed(member, book, BookFormat::Hardbound)])
            .when(move |register| {
                register.cancel_hold(&CancelHold {
                    member_id: member,
                    book_id: book,
                    format: BookFormat::Hardbound,
                    requested_on: test_epoch(),
                })
            })
            .then_state(move |register| {
                assert!(register.holds().is_empty());
                assert!(register.place_hold(&place(member, book, BookFormat::Hardbound)).is_ok());
            })
            .run();
    }

    #[test]
    fn cancel_of_unknown_hold_is_rejected() {
        let member = MemberId::new();
        let book = BookId::new();

        AggregateTest::<MemberHoldRegister>::new()
            .given([initiated(member), placed(member, book, BookFormat::Hardbound)])
            .when(move |register| {
                register.cancel_hold(&CancelHold {
                    member_id: member,
                    book_id: book,
                    format: BookFormat::Paperback,
                    requested_on: test_epoch(),
                })
            })
            .then_error(|error| {
                assert_eq!(error, &HoldRegisterError::HoldNotFound);
                assert_eq!(error.to_string(), "No such hold.");
            })
            .run();
    }

    #[test]
    fn mark_ready_sets_pickup_window() {
        let member = MemberId::new();
        let book = BookId::new();
        let ready_on = test_epoch() + Duration::days(2);

        AggregateTest::<MemberHoldRegister>::new()
            .given([initiated(member), placed(member, book, BookFormat::Paperback)])
            .when(move |register| {
                register.mark_hold_ready(&MarkHoldReady {
                    member_id: member,
                    book_id: book,
                    format: BookFormat::Paperback,
                    ready_on,
                    expire_on: ready_on + Duration::days(5),
                })
            })
            .then_state(move |register| {
                let hold = &register.holds()[0];
                assert_eq!(hold.ready_on, Some(ready_on));
                assert_eq!(hold.expire_on, Some(ready_on + Duration::days(5)));
            })
            .run();
    }

    #[test]
    fn mark_ready_of_unknown_hold_is_rejected() {
        let member = MemberId::new();

        AggregateTest::<MemberHoldRegister>::new()
            .given([initiated(member)])
            .when(move |register| {
                register.mark_hold_ready(&MarkHoldReady {
                    member_id: member,
                    book_id: BookId::new(),
                    format: BookFormat::Paperback,
                    ready_on: test_epoch(),
                    expire_on: test_epoch() + Duration::days(5),
                })
            })
            .then_error(|error| assert_eq!(error, &HoldRegisterError::HoldNotFound))
            .run();
    }

    #[test]
    fn ready_hold_can_be_marked_again() {
        let member = MemberId::new();
        let book = BookId::new();

        AggregateTest::<MemberHoldRegister>::new()
            .given([
                initiated(member),
                placed(member, book, BookFormat::Paperback),
                ready(member, book, BookFormat::Paperback, 1),
            ])
            .when(move |register| {
                register.mark_hold_ready(&MarkHoldReady {
                    member_id: member,
                    book_id: book,
                    format: BookFormat::Paperback,
                    ready_on: test_epoch() + Duration::days(3),
                    expire_on: test_epoch() + Duration::days(8),
                })
            })
            .then_event(|event| assert!(matches!(event, HoldRegisterEvent::HoldReady(_))))
            .then_state(|register| {
                // The first ready event wins on fold.
                assert_eq!(
                    register.holds()[0].ready_on,
                    Some(test_epoch() + Duration::days(1))
                );
            })
            .run();
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn replayed_ready_event_is_a_noop() {
        let member = MemberId::new();
        let book = BookId::new();
        let other = BookId::new();

        let register: MemberHoldRegister = replay(&[
            initiated(member),
            placed(member, book, BookFormat::Hardbound),
            placed(member, other, BookFormat::Hardbound),
            ready(member, book, BookFormat::Hardbound, 1),
            ready(member, book, BookFormat::Hardbound, 1),
        ])
        .expect("initiated history should fold");

        assert_eq!(register.version(), Version::new(5));
        assert_eq!(register.holds().len(), 2);
        // Readied holds keep their position.
        assert!(register.holds()[0].is_for(book, BookFormat::Hardbound));
        assert!(register.holds()[0].is_ready());
        assert!(!register.holds()[1].is_ready());
    }

    #[test]
    fn replayed_cancel_and_unknown_ready_are_noops() {
        let member = MemberId::new();
        let book = BookId::new();
        let cancel: HoldRegisterEvent = HoldCanceled {
            member_id: member,
            book_id: book,
            format: BookFormat::Paperback,
            requested_on: test_epoch(),
        }
        .into();

        let register: Option<MemberHoldRegister> = replay(&[
            initiated(member),
            placed(member, book, BookFormat::Paperback),
            cancel.clone(),
            cancel,
            ready(member, book, BookFormat::Paperback, 1),
            HoldExpired {
                member_id: member,
                book_id: book,
                format: BookFormat::Paperback,
                expired_on: test_epoch(),
            }
            .into(),
        ]);

        assert!(matches!(
            register,
            Some(ref r) if r.holds().is_empty() && r.version() == Version::new(6)
        ));
    }
}
