//! The Event Store (spec §4.1): a durable, append-only log keyed by
//! `(instance_id, aggregate_type, aggregate_id)`, with a single monotonically
//! increasing global `position` and a gapless per-aggregate `sequence`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::StoreError;
use crate::event::{EventFilter, StoreEvent};
use crate::types::{AggregateType, Editor, InstanceId, Position, ResourceOwnerId, SequenceNumber};

#[cfg(feature = "postgres")]
pub mod postgres;

/// A single event a command wants appended, before it has been assigned a
/// `sequence`/`position` (spec §4.1 `push`'s write tuple).
#[derive(Debug, Clone)]
pub struct EventWrite {
    pub event_type: String,
    pub aggregate_version: i32,
    pub payload: serde_json::Value,
    pub editor: Editor,
    pub resource_owner: ResourceOwnerId,
}

/// A request to atomically append one or more events to a single aggregate's
/// stream, plus any unique-constraint side effects (spec §4.1/§4.2).
#[derive(Debug, Clone)]
pub struct PushRequest {
    pub command_id: Uuid,
    pub instance_id: InstanceId,
    pub aggregate_type: AggregateType,
    pub aggregate_id: String,
    /// `None` means "this aggregate must not already exist" — equivalent to
    /// `expected_sequence = 0` (spec §4.1 step 2).
    pub expected_sequence: Option<SequenceNumber>,
    pub events: Vec<EventWrite>,
    pub unique_constraints: Vec<UniqueConstraintOp>,
}

/// An "add" or "remove" operation against the Unique Constraint Registry
/// (spec §4.2), submitted as part of a `push` so it commits atomically with
/// the events that justify it.
#[derive(Debug, Clone)]
pub enum UniqueConstraintOp {
    Add {
        unique_type: String,
        unique_field: String,
        case_insensitive: bool,
        error_message: String,
    },
    Remove {
        unique_type: String,
        unique_field: String,
        case_insensitive: bool,
    },
}

/// The Event Store contract (spec §4.1).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends the writes of `request` under optimistic concurrency and
    /// returns the newly assigned events, in the order they were supplied.
    ///
    /// Fails the whole batch with [`StoreError::ConcurrencyConflict`] if
    /// `expected_sequence` is stale, or with
    /// [`StoreError::UniqueConstraintViolation`] if an "add" operation
    /// collides with an already-reserved tuple. No partial effects survive
    /// either failure (spec §4.1 step 6).
    async fn push(&self, request: PushRequest) -> Result<Vec<StoreEvent>, StoreError>;

    /// Returns events matching `filter`, ordered by `(position ASC)`, the
    /// inter-event tiebreak already folded into `position` itself (see
    /// DESIGN.md).
    async fn query(&self, filter: EventFilter) -> Result<Vec<StoreEvent>, StoreError>;

    /// Streams events matching `filter`. When `follow` is `false` the stream
    /// ends once the events currently visible are exhausted; when `true` it
    /// blocks and yields newly appended matching events (spec §4.1 `stream`).
    fn stream<'s>(&'s self, filter: EventFilter, follow: bool) -> BoxStream<'s, Result<StoreEvent, StoreError>>;

    /// The highest `position` committed so far, optionally scoped to one
    /// instance. `None` if the (scoped) log is empty.
    async fn latest_position(&self, instance_id: Option<&str>) -> Result<Option<Position>, StoreError>;
}

/// Timestamp helper shared by the lock and failed-event tables.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}
