//! The Command Engine (spec §4.3): validates a command's intent, replays the
//! target aggregate's state, and appends the events it produces under
//! optimistic concurrency, retrying a bounded number of times on conflict
//! (grounded on `esrs::manager::AggregateManager`, generalized from a single
//! bound `Aggregate` type parameter to one chosen per `execute` call, and
//! with the retry loop the teacher's manager left to its callers made
//! explicit here).

use std::time::Duration;

use rand::Rng;
use uuid::Uuid;

use crate::aggregate::{Aggregate, AggregateState};
use crate::error::{CommandError, StoreError};
use crate::event::EventFilter;
use crate::store::{EventStore, EventWrite, PushRequest};
use crate::types::{Editor, InstanceId, ResourceOwnerId};

/// One inbound request to change an aggregate's state.
pub struct Command<A: Aggregate> {
    pub command_id: Uuid,
    pub instance_id: InstanceId,
    pub aggregate_id: String,
    pub editor: Editor,
    pub resource_owner: ResourceOwnerId,
    pub body: A::Command,
}

/// Default number of `push` attempts before giving up on a concurrency
/// conflict (spec §4.3 "bounded retry").
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Drives commands against one [`EventStore`] for whichever [`Aggregate`]
/// type each `execute` call names.
pub struct CommandEngine<S> {
    store: S,
    max_attempts: u32,
}

impl<S> CommandEngine<S>
where
    S: EventStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replays `aggregate_id`'s events into a fresh [`AggregateState`] (spec
    /// §4.3 step "replay aggregate state").
    pub async fn load<A>(&self, instance_id: &str, aggregate_id: &str) -> Result<AggregateState<A::State>, StoreError>
    where
        A: Aggregate,
    {
        let filter = EventFilter::new()
            .instance_id(instance_id)
            .aggregate_type(A::NAME)
            .aggregate_id(aggregate_id);
        let events = self.store.query(filter).await?;
        Ok(AggregateState::new(instance_id, aggregate_id).apply_store_events::<A>(events))
    }

    /// Validates, replays, and appends, retrying on
    /// [`StoreError::ConcurrencyConflict`] with jittered backoff (spec §4.3
    /// step "append under optimistic concurrency").
    pub async fn execute<A>(&self, command: Command<A>) -> Result<AggregateState<A::State>, CommandError<A::Error>>
    where
        A: Aggregate,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let state = self
                .load::<A>(&command.instance_id, &command.aggregate_id)
                .await
                .map_err(|source| CommandError::Store {
                    command_id: command.command_id,
                    source,
                })?;

            let events =
                A::handle_command(state.inner(), command.body.clone()).map_err(|source| CommandError::Domain {
                    command_id: command.command_id,
                    source,
                })?;

            if events.is_empty() {
                return Ok(state);
            }

            let unique_constraints = events.iter().flat_map(A::unique_constraints).collect();

            let writes = events
                .iter()
                .map(|event| {
                    Ok(EventWrite {
                        event_type: A::event_type(event).to_string(),
                        aggregate_version: A::VERSION,
                        payload: serde_json::to_value(event)?,
                        editor: command.editor.clone(),
                        resource_owner: command.resource_owner.clone(),
                    })
                })
                .collect::<Result<Vec<_>, serde_json::Error>>()
                .map_err(StoreError::from)
                .map_err(|source| CommandError::Store {
                    command_id: command.command_id,
                    source,
                })?;

            let expected_sequence = if state.sequence() == 0 { None } else { Some(state.sequence()) };

            let request = PushRequest {
                command_id: command.command_id,
                instance_id: command.instance_id.clone(),
                aggregate_type: A::NAME,
                aggregate_id: command.aggregate_id.clone(),
                expected_sequence,
                events: writes,
                unique_constraints,
            };

            match self.store.push(request).await {
                Ok(store_events) => return Ok(state.apply_store_events::<A>(store_events)),
                Err(StoreError::ConcurrencyConflict { .. }) if attempt < self.max_attempts => {
                    backoff(attempt).await;
                    continue;
                }
                Err(StoreError::ConcurrencyConflict { .. }) => {
                    return Err(CommandError::ConcurrencyConflictExhausted {
                        command_id: command.command_id,
                        attempts: attempt,
                    })
                }
                Err(source) => {
                    return Err(CommandError::Store {
                        command_id: command.command_id,
                        source,
                    })
                }
            }
        }
    }
}

/// `10ms * 2^(attempt - 1)`, plus up to 10ms of jitter to keep competing
/// retries from lockstepping against the same advisory lock.
async fn backoff(attempt: u32) {
    let base_ms = 10u64.saturating_mul(1u64 << attempt.saturating_sub(1).min(8));
    let jitter_ms = rand::thread_rng().gen_range(0..10);
    tokio::time::sleep(Duration::from_millis(base_ms + jitter_ms)).await;
}
