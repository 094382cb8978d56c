//! Event-sourced aggregates.
//!
//! An aggregate is a consistency boundary whose state is nothing but the fold of
//! its own stream. Deciding what happens next is the aggregate's business; loading,
//! version checks and committing belong to the storage session in
//! `borrowing-runtime`.

use crate::event::Event;
use crate::stream::{StreamId, Version};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt;

/// Typed identifier of an aggregate instance.
///
/// The identifier decides which stream the aggregate lives in.
pub trait AggregateId: Clone + fmt::Display + Send + Sync + 'static {
    /// Stream holding this aggregate's events.
    fn stream_id(&self) -> StreamId;
}

/// An event-sourced aggregate.
///
/// `fold` must be deterministic and must be applied to events in stream order.
/// Folding `None` with the aggregate's creation event yields the initial state;
/// folding `None` with any other event is undefined and may return `None`.
///
/// # Example
///
/// ```
/// use borrowing_core::aggregate::{Aggregate, AggregateId, replay};
/// use borrowing_core::event::Event;
/// use borrowing_core::stream::{StreamId, Version};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Debug, PartialEq, Eq)]
/// struct ShelfId(u32);
///
/// impl std::fmt::Display for ShelfId {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         write!(f, "shelf-{}", self.0)
///     }
/// }
///
/// impl AggregateId for ShelfId {
///     fn stream_id(&self) -> StreamId {
///         StreamId::new(self.to_string())
///     }
/// }
///
/// #[derive(Clone, Debug, Serialize, Deserialize)]
/// enum ShelfEvent {
///     Opened { id: u32 },
///     BookAdded,
/// }
///
/// impl Event for ShelfEvent {
///     fn event_type(&self) -> &'static str {
///         match self {
///             ShelfEvent::Opened { .. } => "Opened.v1",
///             ShelfEvent::BookAdded => "BookAdded.v1",
///         }
///     }
/// }
///
/// struct Shelf {
///     id: ShelfId,
///     version: Version,
///     books: usize,
/// }
///
/// impl Aggregate for Shelf {
///     type Id = ShelfId;
///     type Event = ShelfEvent;
///     type Error = std::convert::Infallible;
///     const TYPE_NAME: &'static str = "Shelf";
///
///     fn id(&self) -> &ShelfId { &self.id }
///     fn version(&self) -> Version { self.version }
///
///     fn fold(state: Option<Self>, event: &ShelfEvent) -> Option<Self> {
///         match (state, event) {
///             (None, ShelfEvent::Opened { id }) => Some(Shelf {
///                 id: ShelfId(*id),
///                 version: Version::new(1),
///                 books: 0,
///             }),
///             (Some(mut shelf), ShelfEvent::BookAdded) => {
///                 shelf.books += 1;
///                 shelf.version = shelf.version.next();
///                 Some(shelf)
///             }
///             (state, _) => state,
///         }
///     }
/// }
///
/// let shelf: Shelf = replay(&[ShelfEvent::Opened { id: 7 }, ShelfEvent::BookAdded]).unwrap();
/// assert_eq!(shelf.books, 1);
/// assert_eq!(shelf.version(), Version::new(2));
/// ```
pub trait Aggregate: Sized + Send + Sync + 'static {
    /// Identifier type.
    type Id: AggregateId;

    /// The closed set of events this aggregate folds.
    type Event: Event + Serialize + DeserializeOwned + Clone + fmt::Debug;

    /// Business-rule rejection raised by decisions.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Human-readable type name, used in "not found" errors and logs.
    const TYPE_NAME: &'static str;

    /// The aggregate's identifier.
    fn id(&self) -> &Self::Id;

    /// Number of events folded into this state.
    fn version(&self) -> Version;

    /// Apply one event.
    fn fold(state: Option<Self>, event: &Self::Event) -> Option<Self>;
}

/// Fold a sequence of events, oldest first.
pub fn replay<'a, A>(events: impl IntoIterator<Item = &'a A::Event>) -> Option<A>
where
    A: Aggregate,
{
    events
        .into_iter()
        .fold(None, |state, event| A::fold(state, event))
}
