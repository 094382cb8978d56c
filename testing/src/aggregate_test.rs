//! Ergonomic testing utilities for aggregates
//!
//! This module provides a fluent API for testing aggregate decisions with readable
//! Given-When-Then syntax: replay a history, make one decision, assert on the
//! produced event or rejection and on the state after folding it.

#![allow(clippy::module_name_repetitions)] // AggregateTest is the natural name

use borrowing_core::aggregate::{Aggregate, replay};

type Decision<A> =
    Box<dyn FnOnce(&A) -> Result<<A as Aggregate>::Event, <A as Aggregate>::Error>>;

type EventAssertion<E> = Box<dyn FnOnce(&E)>;

type ErrorAssertion<E> = Box<dyn FnOnce(&E)>;

type StateAssertion<A> = Box<dyn FnOnce(&A)>;

/// Fluent API for testing aggregates with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// use borrowing_testing::AggregateTest;
///
/// AggregateTest::<MemberHoldRegister>::new()
///     .given([initiated, placed])
///     .when(|register| register.cancel_hold(&cancel))
///     .then_event(|event| assert!(matches!(event, HoldRegisterEvent::HoldCanceled(_))))
///     .then_state(|register| assert!(register.holds().is_empty()))
///     .run();
/// ```
pub struct AggregateTest<A: Aggregate> {
    history: Vec<A::Event>,
    decision: Option<Decision<A>>,
    event_assertions: Vec<EventAssertion<A::Event>>,
    error_assertions: Vec<ErrorAssertion<A::Error>>,
    state_assertions: Vec<StateAssertion<A>>,
}

impl<A: Aggregate> Default for AggregateTest<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Aggregate> AggregateTest<A> {
    /// Create an empty test
    #[must_use]
    pub const fn new() -> Self {
        Self {
            history: Vec::new(),
            decision: None,
            event_assertions: Vec::new(),
            error_assertions: Vec::new(),
            state_assertions: Vec::new(),
        }
    }

    /// Events already in the stream, oldest first (Given)
    #[must_use]
    pub fn given(mut self, events: impl IntoIterator<Item = A::Event>) -> Self {
        self.history.extend(events);
        self
    }

    /// The decision under test (When)
    #[must_use]
    pub fn when<F>(mut self, decide: F) -> Self
    where
        F: FnOnce(&A) -> Result<A::Event, A::Error> + 'static,
    {
        self.decision = Some(Box::new(decide));
        self
    }

    /// Expect the decision to produce an event and check it (Then)
    #[must_use]
    pub fn then_event<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&A::Event) + 'static,
    {
        self.event_assertions.push(Box::new(assertion));
        self
    }

    /// Expect the decision to be rejected and check the error (Then)
    #[must_use]
    pub fn then_error<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&A::Error) + 'static,
    {
        self.error_assertions.push(Box::new(assertion));
        self
    }

    /// Check the state after the produced event is folded, or the unchanged
    /// state after a rejection (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&A) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if the history does not produce a state, no decision was set, the
    /// outcome is not the one asserted on, or any assertion fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let state: A = replay(&self.history).expect("given() events must produce a state");
        let decide = self.decision.expect("Decision must be set with when()");

        match decide(&state) {
            Ok(event) => {
                assert!(
                    self.error_assertions.is_empty(),
                    "Expected a rejection, but the decision produced {event:?}"
                );
                for assertion in self.event_assertions {
                    assertion(&event);
                }
                let next = A::fold(Some(state), &event)
                    .expect("folding the decided event must keep a state");
                for assertion in self.state_assertions {
                    assertion(&next);
                }
            }
            Err(error) => {
                assert!(
                    self.event_assertions.is_empty(),
                    "Expected an event, but the decision was rejected: {error}"
                );
                for assertion in self.error_assertions {
                    assertion(&error);
                }
                for assertion in self.state_assertions {
                    assertion(&state);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use borrowing_core::aggregate::AggregateId;
    use borrowing_core::event::Event;
    use borrowing_core::stream::{StreamId, Version};
    use serde::{Deserialize, Serialize};
    use std::fmt;

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct CartId;

    impl fmt::Display for CartId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("cart")
        }
    }

    impl AggregateId for CartId {
        fn stream_id(&self) -> StreamId {
            StreamId::new("cart")
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    enum CartEvent {
        Opened,
        ItemAdded,
    }

    impl Event for CartEvent {
        fn event_type(&self) -> &'static str {
            match self {
                Self::Opened => "Opened.v1",
                Self::ItemAdded => "ItemAdded.v1",
            }
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("cart is full")]
    struct Full;

    struct Cart {
        id: CartId,
        version: Version,
        items: usize,
    }

    impl Cart {
        fn add(&self) -> Result<CartEvent, Full> {
            if self.items >= 1 { Err(Full) } else { Ok(CartEvent::ItemAdded) }
        }
    }

    impl Aggregate for Cart {
        type Id = CartId;
        type Event = CartEvent;
        type Error = Full;
        const TYPE_NAME: &'static str = "Cart";

        fn id(&self) -> &CartId {
            &self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn fold(state: Option<Self>, event: &CartEvent) -> Option<Self> {
            match (state, event) {
                (None, CartEvent::Opened) => Some(Self {
                    id: CartId,
                    version: Version::new(1),
                    items: 0,
                }),
                (Some(mut cart), CartEvent::ItemAdded) => {
                    cart.items += 1;
                    cart.version = cart.version.next();
                    Some(cart)
                }
                (state, _) => state,
            }
        }
    }

    #[test]
    fn accepted_decision_is_folded() {
        AggregateTest::<Cart>::new()
            .given([CartEvent::Opened])
            .when(Cart::add)
            .then_event(|event| assert_eq!(*event, CartEvent::ItemAdded))
            .then_state(|cart| {
                assert_eq!(cart.items, 1);
                assert_eq!(cart.version(), Version::new(2));
            })
            .run();
    }

    #[test]
    fn rejected_decision_leaves_state_alone() {
        AggregateTest::<Cart>::new()
            .given([CartEvent::Opened, CartEvent::ItemAdded])
            .when(Cart::add)
            .then_error(|error| assert_eq!(error.to_string(), "cart is full"))
            .then_state(|cart| assert_eq!(cart.items, 1))
            .run();
    }

    #[test]
    #[should_panic(expected = "Expected a rejection")]
    fn asserting_a_rejection_on_success_fails() {
        AggregateTest::<Cart>::new()
            .given([CartEvent::Opened])
            .when(Cart::add)
            .then_error(|_| {})
            .run();
    }
}
