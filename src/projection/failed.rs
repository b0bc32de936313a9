use sqlx::PgPool;

use crate::error::ProjectionError;
use crate::event::StoreEvent;

/// A row of `projection_failed_events`: one event a [`crate::projection::Projection`]
/// could not apply, kept durable so an operator can inspect and resolve it
/// (spec §4.4 "poisoned event handling") instead of the worker silently
/// stalling or dropping the event.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FailedEvent {
    pub projection_name: String,
    pub failed_sequence: i64,
    pub instance_id: String,
    pub failure_count: i32,
    pub last_error: String,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub skipped: bool,
}

pub struct FailedEventStore;

impl FailedEventStore {
    /// Records (or bumps the failure count of) a poisoned event. Keyed by
    /// `(projection_name, position, instance_id)`, since `position` is
    /// globally unique while an aggregate's own `sequence` is not.
    pub async fn record(
        pool: &PgPool,
        projection_name: &'static str,
        event: &StoreEvent,
        error: &ProjectionError,
    ) -> Result<(), ProjectionError> {
        sqlx::query(
            "INSERT INTO projection_failed_events \
             (projection_name, failed_sequence, instance_id, failure_count, last_error, \
              event_type, aggregate_type, aggregate_id, first_failed_at, last_failed_at, skipped) \
             VALUES ($1, $2, $3, 1, $4, $5, $6, $7, now(), now(), false) \
             ON CONFLICT (projection_name, failed_sequence, instance_id) DO UPDATE \
             SET failure_count = projection_failed_events.failure_count + 1, \
                 last_error = EXCLUDED.last_error, \
                 last_failed_at = now()",
        )
        .bind(projection_name)
        .bind(event.position)
        .bind(&event.instance_id)
        .bind(error.to_string())
        .bind(&event.event_type)
        .bind(event.aggregate_type.as_str())
        .bind(&event.aggregate_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Lists unresolved failures for a projection across every tenant,
    /// oldest first (operator-facing: a dashboard over every poisoned event).
    pub async fn list_unresolved(pool: &PgPool, projection_name: &str) -> Result<Vec<FailedEvent>, ProjectionError> {
        let rows = sqlx::query_as::<_, FailedEvent>(
            "SELECT projection_name, failed_sequence, instance_id, failure_count, last_error, \
                    event_type, aggregate_type, aggregate_id, skipped \
             FROM projection_failed_events \
             WHERE projection_name = $1 AND skipped = false \
             ORDER BY failed_sequence ASC",
        )
        .bind(projection_name)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Lists unresolved failures for one `(projection_name, instance_id)`
    /// pair, oldest first. Used by [`crate::projection::ProjectionWorker`]
    /// to re-attempt events a non-strict-order projection already advanced
    /// its cursor past.
    pub async fn list_unresolved_for_instance(
        pool: &PgPool,
        projection_name: &str,
        instance_id: &str,
    ) -> Result<Vec<FailedEvent>, ProjectionError> {
        let rows = sqlx::query_as::<_, FailedEvent>(
            "SELECT projection_name, failed_sequence, instance_id, failure_count, last_error, \
                    event_type, aggregate_type, aggregate_id, skipped \
             FROM projection_failed_events \
             WHERE projection_name = $1 AND instance_id = $2 AND skipped = false \
             ORDER BY failed_sequence ASC",
        )
        .bind(projection_name)
        .bind(instance_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Returns the current failure count for one failed event, or `None` if
    /// it has no row (never failed, or already deleted after a successful
    /// retry). A row an operator has marked [`ResolveDecision::Skip`] still
    /// counts as failed here — callers that only care about the quarantine
    /// cap should use [`Self::status`] instead, which distinguishes the two.
    pub async fn failure_count(
        pool: &PgPool,
        projection_name: &str,
        instance_id: &str,
        failed_sequence: i64,
    ) -> Result<Option<i32>, ProjectionError> {
        Ok(Self::status(pool, projection_name, instance_id, failed_sequence)
            .await?
            .map(|status| status.failure_count))
    }

    /// Returns the current failure count and skip decision for one failed
    /// event, or `None` if it has no row.
    pub async fn status(
        pool: &PgPool,
        projection_name: &str,
        instance_id: &str,
        failed_sequence: i64,
    ) -> Result<Option<FailedStatus>, ProjectionError> {
        let row: Option<(i32, bool)> = sqlx::query_as(
            "SELECT failure_count, skipped FROM projection_failed_events \
             WHERE projection_name = $1 AND instance_id = $2 AND failed_sequence = $3",
        )
        .bind(projection_name)
        .bind(instance_id)
        .bind(failed_sequence)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|(failure_count, skipped)| FailedStatus { failure_count, skipped }))
    }

    /// Deletes a failed-event row once a retry has succeeded (spec §4.4:
    /// "delete any prior failed-event record ... on success").
    pub async fn delete(
        pool: &PgPool,
        projection_name: &str,
        instance_id: &str,
        failed_sequence: i64,
    ) -> Result<(), ProjectionError> {
        sqlx::query(
            "DELETE FROM projection_failed_events \
             WHERE projection_name = $1 AND instance_id = $2 AND failed_sequence = $3",
        )
        .bind(projection_name)
        .bind(instance_id)
        .bind(failed_sequence)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// The operator-facing `resolve_failed_event` operation (spec §4.4): once
    /// a projection's failure cap is hit, the event is quarantined and the
    /// worker stops auto-retrying it until an operator calls this with a
    /// [`ResolveDecision`].
    pub async fn resolve(
        pool: &PgPool,
        projection_name: &str,
        instance_id: &str,
        failed_sequence: i64,
        decision: ResolveDecision,
    ) -> Result<(), ProjectionError> {
        match decision {
            // Clears the quarantine cap and any earlier skip decision so the
            // worker's next tick attempts the handler again, rather than
            // replaying it here directly — the worker is the only thing
            // holding a `Projection` handle.
            ResolveDecision::Retry => {
                sqlx::query(
                    "UPDATE projection_failed_events SET failure_count = 0, skipped = false \
                     WHERE projection_name = $1 AND instance_id = $2 AND failed_sequence = $3",
                )
                .bind(projection_name)
                .bind(instance_id)
                .bind(failed_sequence)
                .execute(pool)
                .await?;
            }
            // Marks the event as permanently skipped without reprocessing it.
            ResolveDecision::Skip => {
                sqlx::query(
                    "UPDATE projection_failed_events SET skipped = true \
                     WHERE projection_name = $1 AND instance_id = $2 AND failed_sequence = $3",
                )
                .bind(projection_name)
                .bind(instance_id)
                .bind(failed_sequence)
                .execute(pool)
                .await?;
            }
        }
        Ok(())
    }
}

/// A failed event's current retry state, as distinct from [`FailedEvent`]
/// (the full row): just enough for the worker to decide whether to retry,
/// quarantine, or skip past an event on its next tick.
#[derive(Debug, Clone, Copy)]
pub struct FailedStatus {
    pub failure_count: i32,
    pub skipped: bool,
}

/// An operator's decision on a quarantined failed event (spec §4.4
/// `resolve_failed_event`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveDecision {
    /// Re-attempt the event with the projection's current handler.
    Retry,
    /// Mark the event permanently skipped; it is never replayed again.
    Skip,
}
