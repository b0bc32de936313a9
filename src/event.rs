//! The immutable, append-only fact (spec §3 "Event") and the filter language
//! the Event Store's `query`/`stream` operations accept (spec §4.1).

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::types::{AggregateType, InstanceId, Position, ResourceOwnerId, SequenceNumber};

/// An immutable fact appended to the log. Every field listed in spec §3.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub position: Position,
    pub sequence: SequenceNumber,
    pub instance_id: InstanceId,
    pub aggregate_type: AggregateType,
    pub aggregate_id: String,
    pub aggregate_version: i32,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub editor_user: Option<String>,
    pub editor_service: Option<String>,
    pub resource_owner: ResourceOwnerId,
    pub created_at: DateTime<Utc>,
    pub command_id: Uuid,
}

impl StoreEvent {
    /// Decodes [`Self::payload`] into a concrete event payload type.
    ///
    /// Decoding is defensive (§9 "Event schema evolution"): unknown fields are
    /// tolerated by `serde`'s default behavior, and callers should treat a
    /// decode failure of an event outside their own aggregate type as a
    /// programmer error rather than attempt recovery.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Inclusive/exclusive filter language for `query`/`stream` (spec §4.1).
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub instance_ids: Vec<InstanceId>,
    pub aggregate_types: Vec<AggregateType>,
    pub aggregate_ids: Vec<String>,
    pub event_types: Vec<String>,
    pub editor_users: Vec<String>,
    pub from_position: Option<Position>,
    pub to_position: Option<Position>,
    pub limit: Option<i64>,
    pub descending: bool,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instance_id(mut self, instance_id: impl Into<InstanceId>) -> Self {
        self.instance_ids.push(instance_id.into());
        self
    }

    pub fn aggregate_type(mut self, aggregate_type: AggregateType) -> Self {
        self.aggregate_types.push(aggregate_type);
        self
    }

    pub fn aggregate_id(mut self, aggregate_id: impl Into<String>) -> Self {
        self.aggregate_ids.push(aggregate_id.into());
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types.push(event_type.into());
        self
    }

    pub fn editor_user(mut self, editor_user: impl Into<String>) -> Self {
        self.editor_users.push(editor_user.into());
        self
    }

    pub fn from_position(mut self, from_position: Position) -> Self {
        self.from_position = Some(from_position);
        self
    }

    pub fn to_position(mut self, to_position: Position) -> Self {
        self.to_position = Some(to_position);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }
}

/// Marker trait for event payload types. Mirrors `esrs::event::Event`; kept
/// as a trait (rather than a type alias bound) so aggregate-specific event
/// enums can opt in with a one-line `impl Event for ...`.
pub trait Event: Serialize + DeserializeOwned {}
