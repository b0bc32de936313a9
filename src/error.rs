//! Error taxonomy shared by the Event Store, Command Engine and Projection
//! Engine (spec §7). Every error crosses a component boundary typed, with a
//! human message and, where applicable, the `command_id` correlation id.

use uuid::Uuid;

/// Errors raised by the Event Store (`push`/`query`/`stream`/`latest_position`).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The aggregate's sequence at push time did not match `expected_sequence`.
    #[error("concurrency conflict on aggregate {aggregate_type}/{aggregate_id}: expected sequence {expected}, found {actual}")]
    ConcurrencyConflict {
        aggregate_type: &'static str,
        aggregate_id: String,
        expected: i64,
        actual: i64,
    },

    /// A unique constraint "add" collided with an already-reserved tuple.
    #[error("{message}")]
    UniqueConstraintViolation {
        unique_type: String,
        unique_field: String,
        message: String,
    },

    /// A batch exceeded the maximum size the position tiebreak can encode.
    #[error("push batch of {0} events exceeds the maximum of {max} events per command", max = crate::types::IN_TX_ORDER_WIDTH)]
    BatchTooLarge(usize),

    /// Database timeout, connection loss, or any other retryable storage failure.
    #[error("transient storage failure: {0}")]
    TransientStorage(#[source] sqlx::Error),

    /// A structural invariant was broken (e.g. the events table is unreadable).
    #[error("fatal event store error: {0}")]
    Fatal(#[source] sqlx::Error),

    /// An event payload could not be serialized/deserialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => {
                StoreError::TransientStorage(err)
            }
            _ => StoreError::Fatal(err),
        }
    }
}

/// Errors surfaced by the Command Engine around a domain error `E` produced
/// by an [`crate::aggregate::Aggregate::handle_command`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum CommandError<E>
where
    E: std::error::Error + 'static,
{
    /// Malformed command input, never retried.
    #[error("invalid command (command_id={command_id}): {message}")]
    Validation { command_id: Uuid, message: String },

    /// Business rule violation or FSM-forbidden transition.
    #[error("precondition failed (command_id={command_id}): {0}", command_id = .command_id)]
    PreconditionFailed { command_id: Uuid, source: E },

    /// The aggregate-specific domain error returned by `handle_command`.
    #[error("domain error (command_id={command_id}): {source}")]
    Domain { command_id: Uuid, source: E },

    /// `expected_sequence` went stale `attempts` times in a row.
    #[error("concurrency conflict exhausted retries (command_id={command_id}, attempts={attempts})")]
    ConcurrencyConflictExhausted { command_id: Uuid, attempts: u32 },

    /// Propagated verbatim from the Event Store.
    #[error("store error (command_id={command_id}): {source}")]
    Store {
        command_id: Uuid,
        #[source]
        source: StoreError,
    },
}

/// Errors raised while a [`crate::projection::Projection`] applies a single event.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// Transient failure (e.g. a deadlock or timeout); the event is retried.
    #[error("transient handler failure: {0}")]
    Transient(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A structural, non-retryable failure in the projection's own logic.
    #[error("handler failure: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Errors raised by Query Façade accessors.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("not found")]
    NotFound,

    #[error("invalid pagination cursor")]
    InvalidCursor,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
