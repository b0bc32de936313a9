//! Write-model layer (spec §4.3, §9 "Aggregates as replayed state, not
//! persisted rows"). An aggregate's state is never stored directly; it is
//! rebuilt on every command by folding [`crate::event::StoreEvent`]s with
//! [`Aggregate::apply_event`].

pub mod instance;
pub mod org;
pub mod policy;
pub mod project;
pub mod session;
pub mod user;

use crate::event::StoreEvent;
use crate::types::{InstanceId, SequenceNumber};

/// The Aggregate trait validates commands, maps commands to events, and
/// applies events onto state (grounded on `esrs::Aggregate`; purposefully
/// synchronous for the same reason: an aggregate must not have side
/// effects, so replay and testing stay trivial).
pub trait Aggregate {
    /// Dotted, stable name used as the `aggregate_type` value (spec §3).
    const NAME: crate::types::AggregateType;

    /// Current schema version emitted on new events of this aggregate type.
    const VERSION: i32;

    type State: Default + Clone + Send + Sync;
    type Command: Clone + Send;
    type Event: crate::event::Event + Send + Sync;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Validates `command` against `state` and produces the events it
    /// emits, or a domain error. Must be deterministic and side-effect free.
    fn handle_command(state: &Self::State, command: Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Folds one event onto `state`. Assumes the event can be legally
    /// applied; implementations may panic otherwise (replay should never
    /// present an event the reducer can't handle — §9).
    fn apply_event(state: Self::State, event: Self::Event) -> Self::State;

    /// The dotted event type string stored on the event store row for a
    /// given in-memory event. Used by the Command Engine to fill in
    /// `StoreEvent::event_type` before calling `push`.
    fn event_type(event: &Self::Event) -> &'static str;

    /// Unique-constraint registry operations (spec §4.2) this event implies,
    /// e.g. an event that claims a username reserves it here so the Command
    /// Engine submits it atomically with the event itself. Most event types
    /// touch no unique constraint and simply keep the default empty list.
    fn unique_constraints(_event: &Self::Event) -> Vec<crate::store::UniqueConstraintOp> {
        Vec::new()
    }
}

/// Transient state computed by replaying an aggregate's events (spec §3
/// "Write-Model", §9). Never cached across commands for correctness, though
/// a caller MAY cache under a staleness bound that re-validates `sequence`
/// against the store before use.
#[derive(Debug, Clone)]
pub struct AggregateState<S> {
    instance_id: InstanceId,
    aggregate_id: String,
    sequence: SequenceNumber,
    /// The highest event `position` folded in so far, `None` until the
    /// first event. Lets a command caller `wait_for_projection` on exactly
    /// the write it just made (spec §9 "read-your-writes").
    position: Option<crate::types::Position>,
    inner: S,
}

impl<S: Default> AggregateState<S> {
    /// A fresh write-model for an aggregate that has not yet emitted any
    /// events (`sequence = 0`, equivalent to `expected_sequence = None`
    /// on the next `push`).
    pub fn new(instance_id: impl Into<InstanceId>, aggregate_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            aggregate_id: aggregate_id.into(),
            sequence: 0,
            position: None,
            inner: Default::default(),
        }
    }
}

impl<S> AggregateState<S> {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    pub fn position(&self) -> Option<crate::types::Position> {
        self.position
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Folds a batch of previously-persisted [`StoreEvent`]s onto this
    /// state using `apply_event`, advancing `sequence`/`position` to the
    /// last event's.
    pub fn apply_store_events<A>(mut self, events: Vec<StoreEvent>) -> Self
    where
        A: Aggregate<State = S>,
    {
        for store_event in events {
            self.sequence = store_event.sequence;
            self.position = Some(store_event.position);
            let event: A::Event = store_event
                .decode()
                .expect("events of a known aggregate type must decode into its event enum");
            self.inner = A::apply_event(self.inner, event);
        }
        self
    }
}

/// A small FSM over an aggregate's lifecycle (spec §4.3 "State machine").
/// Concrete aggregate states implement this so the Command Engine's
/// precondition check can be shared rather than re-implemented per command.
pub trait Lifecycle {
    /// Whether a command may be handled while the aggregate is in this
    /// lifecycle state. Aggregates that are `Removed`, for instance, refuse
    /// every command.
    fn allows_commands(&self) -> bool;
}
