use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::event::StoreEvent;

/// Row shape of the `events` table, decoupled from [`StoreEvent`] so a
/// malformed `aggregate_type` column can be reported as a [`StoreError`]
/// instead of panicking inside a `FromRow` impl (grounded on
/// `esrs::sql::event::DbEvent`, which performs the same kind of decode step
/// between the raw row and the public event type).
#[derive(sqlx::FromRow, Debug)]
pub(super) struct DbEvent {
    pub position: i64,
    pub sequence: i64,
    pub instance_id: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub aggregate_version: i32,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub editor_user: Option<String>,
    pub editor_service: Option<String>,
    pub resource_owner: String,
    pub created_at: DateTime<Utc>,
    pub command_id: Uuid,
}

impl DbEvent {
    pub(super) fn try_into_store_event(self) -> Result<StoreEvent, StoreError> {
        Ok(StoreEvent {
            position: self.position,
            sequence: self.sequence,
            instance_id: self.instance_id,
            aggregate_type: self.aggregate_type.parse().map_err(|_| {
                StoreError::Fatal(sqlx::Error::Decode(
                    format!("unknown aggregate_type column value: {}", self.aggregate_type).into(),
                ))
            })?,
            aggregate_id: self.aggregate_id,
            aggregate_version: self.aggregate_version,
            event_type: self.event_type,
            payload: self.payload,
            editor_user: self.editor_user,
            editor_service: self.editor_service,
            resource_owner: self.resource_owner,
            created_at: self.created_at,
            command_id: self.command_id,
        })
    }
}
