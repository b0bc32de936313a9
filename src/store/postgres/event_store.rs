use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::error::StoreError;
use crate::event::{EventFilter, StoreEvent};
use crate::store::postgres::row::DbEvent;
use crate::store::{now, EventStore, PushRequest, UniqueConstraintOp};
use crate::types::{Position, IN_TX_ORDER_WIDTH};

/// Default Postgres implementation of [`EventStore`] (grounded on
/// `esrs::store::postgres::PgStore`, generalized from one table per
/// aggregate type to the single shared `events` table spec §3 requires).
///
/// Cheaply `Clone`: the pool is itself reference-counted internally by
/// `sqlx`.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
    poll_interval: std::time::Duration,
}

impl PgEventStore {
    pub(super) fn new(pool: PgPool, poll_interval: std::time::Duration) -> Self {
        Self { pool, poll_interval }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Stable 64-bit key for `pg_advisory_xact_lock`, keyed by the aggregate
    /// triple (spec §4.1 step 1: "use a row-level advisory lock keyed by the
    /// aggregate triple").
    fn advisory_key(instance_id: &str, aggregate_type: &str, aggregate_id: &str) -> i64 {
        let mut hasher = DefaultHasher::new();
        instance_id.hash(&mut hasher);
        aggregate_type.hash(&mut hasher);
        aggregate_id.hash(&mut hasher);
        hasher.finish() as i64
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    #[tracing::instrument(skip_all, fields(aggregate_type = %request.aggregate_type, aggregate_id = %request.aggregate_id), err)]
    async fn push(&self, request: PushRequest) -> Result<Vec<StoreEvent>, StoreError> {
        if request.events.len() > IN_TX_ORDER_WIDTH as usize {
            return Err(StoreError::BatchTooLarge(request.events.len()));
        }

        let aggregate_type_str = request.aggregate_type.as_str();
        let key = Self::advisory_key(&request.instance_id, aggregate_type_str, &request.aggregate_id);

        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;

        let current_sequence: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence), 0) FROM events \
             WHERE instance_id = $1 AND aggregate_type = $2 AND aggregate_id = $3",
        )
        .bind(&request.instance_id)
        .bind(aggregate_type_str)
        .bind(&request.aggregate_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        let expected = request.expected_sequence.unwrap_or(0);
        if expected != current_sequence {
            return Err(StoreError::ConcurrencyConflict {
                aggregate_type: aggregate_type_str,
                aggregate_id: request.aggregate_id.clone(),
                expected,
                actual: current_sequence,
            });
        }

        for op in &request.unique_constraints {
            apply_unique_constraint_op(&mut tx, &request.instance_id, &request.aggregate_id, op).await?;
        }

        let tx_position: i64 = sqlx::query_scalar("SELECT nextval('event_store_tx_position')")
            .fetch_one(&mut *tx)
            .await
            .map_err(StoreError::from)?;

        let created_at = now();
        let mut store_events = Vec::with_capacity(request.events.len());

        for (i, write) in request.events.into_iter().enumerate() {
            let sequence = current_sequence + 1 + i as i64;
            let position: Position = tx_position * IN_TX_ORDER_WIDTH + i as i64;

            sqlx::query(
                "INSERT INTO events \
                 (position, sequence, instance_id, aggregate_type, aggregate_id, aggregate_version, \
                  event_type, payload, editor_user, editor_service, resource_owner, created_at, command_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            )
            .bind(position)
            .bind(sequence)
            .bind(&request.instance_id)
            .bind(aggregate_type_str)
            .bind(&request.aggregate_id)
            .bind(write.aggregate_version)
            .bind(&write.event_type)
            .bind(&write.payload)
            .bind(&write.editor.user)
            .bind(&write.editor.service)
            .bind(&write.resource_owner)
            .bind(created_at)
            .bind(request.command_id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;

            store_events.push(StoreEvent {
                position,
                sequence,
                instance_id: request.instance_id.clone(),
                aggregate_type: request.aggregate_type,
                aggregate_id: request.aggregate_id.clone(),
                aggregate_version: write.aggregate_version,
                event_type: write.event_type,
                payload: write.payload,
                editor_user: write.editor.user,
                editor_service: write.editor.service,
                resource_owner: write.resource_owner,
                created_at,
                command_id: request.command_id,
            });
        }

        tx.commit().await.map_err(StoreError::from)?;

        Ok(store_events)
    }

    async fn query(&self, filter: EventFilter) -> Result<Vec<StoreEvent>, StoreError> {
        let mut builder = select_builder(&filter);
        let rows: Vec<DbEvent> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;
        rows.into_iter().map(DbEvent::try_into_store_event).collect()
    }

    fn stream<'s>(&'s self, filter: EventFilter, follow: bool) -> BoxStream<'s, Result<StoreEvent, StoreError>> {
        let poll_interval = self.poll_interval;

        struct State {
            filter: EventFilter,
            buffer: std::collections::VecDeque<StoreEvent>,
            caught_up: bool,
        }

        let state = State {
            filter,
            buffer: std::collections::VecDeque::new(),
            caught_up: false,
        };

        stream::unfold((self.clone(), state), move |(store, mut state)| async move {
            loop {
                if let Some(event) = state.buffer.pop_front() {
                    state.filter.from_position = Some(event.position + 1);
                    return Some((Ok(event), (store, state)));
                }

                if state.caught_up && !follow {
                    return None;
                }

                match store.query(state.filter.clone()).await {
                    Ok(events) if events.is_empty() => {
                        if !follow {
                            return None;
                        }
                        state.caught_up = true;
                        tokio::time::sleep(poll_interval).await;
                    }
                    Ok(events) => {
                        state.caught_up = false;
                        state.buffer.extend(events);
                    }
                    Err(err) => return Some((Err(err), (store, state))),
                }
            }
        })
        .boxed()
    }

    async fn latest_position(&self, instance_id: Option<&str>) -> Result<Option<Position>, StoreError> {
        let row = match instance_id {
            Some(instance_id) => {
                sqlx::query("SELECT MAX(position) AS max_position FROM events WHERE instance_id = $1")
                    .bind(instance_id)
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT MAX(position) AS max_position FROM events")
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .map_err(StoreError::from)?;

        row.try_get::<Option<i64>, _>("max_position").map_err(StoreError::from)
    }
}

async fn apply_unique_constraint_op(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    instance_id: &str,
    aggregate_id: &str,
    op: &UniqueConstraintOp,
) -> Result<(), StoreError> {
    match op {
        UniqueConstraintOp::Add {
            unique_type,
            unique_field,
            case_insensitive,
            error_message,
        } => {
            let field = normalize(unique_field, *case_insensitive);
            let result = sqlx::query(
                "INSERT INTO unique_constraints (instance_id, unique_type, unique_field, aggregate_id) \
                 VALUES ($1, $2, $3, $4) ON CONFLICT (instance_id, unique_type, unique_field) DO NOTHING",
            )
            .bind(instance_id)
            .bind(unique_type)
            .bind(&field)
            .bind(aggregate_id)
            .execute(&mut **tx)
            .await
            .map_err(StoreError::from)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::UniqueConstraintViolation {
                    unique_type: unique_type.clone(),
                    unique_field: field,
                    message: error_message.clone(),
                });
            }
        }
        UniqueConstraintOp::Remove {
            unique_type,
            unique_field,
            case_insensitive,
        } => {
            let field = normalize(unique_field, *case_insensitive);
            sqlx::query(
                "DELETE FROM unique_constraints WHERE instance_id = $1 AND unique_type = $2 AND unique_field = $3",
            )
            .bind(instance_id)
            .bind(unique_type)
            .bind(&field)
            .execute(&mut **tx)
            .await
            .map_err(StoreError::from)?;
        }
    }

    Ok(())
}

fn normalize(field: &str, case_insensitive: bool) -> String {
    if case_insensitive {
        field.to_lowercase()
    } else {
        field.to_string()
    }
}

fn select_builder(filter: &EventFilter) -> QueryBuilder<'static, Postgres> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT position, sequence, instance_id, aggregate_type, aggregate_id, aggregate_version, \
         event_type, payload, editor_user, editor_service, resource_owner, created_at, command_id \
         FROM events WHERE 1 = 1",
    );

    if !filter.instance_ids.is_empty() {
        builder.push(" AND instance_id = ANY(");
        builder.push_bind(filter.instance_ids.clone());
        builder.push(")");
    }

    if !filter.aggregate_types.is_empty() {
        let names: Vec<&'static str> = filter.aggregate_types.iter().map(|a| a.as_str()).collect();
        builder.push(" AND aggregate_type = ANY(");
        builder.push_bind(names);
        builder.push(")");
    }

    if !filter.aggregate_ids.is_empty() {
        builder.push(" AND aggregate_id = ANY(");
        builder.push_bind(filter.aggregate_ids.clone());
        builder.push(")");
    }

    if !filter.event_types.is_empty() {
        builder.push(" AND event_type = ANY(");
        builder.push_bind(filter.event_types.clone());
        builder.push(")");
    }

    if !filter.editor_users.is_empty() {
        builder.push(" AND editor_user = ANY(");
        builder.push_bind(filter.editor_users.clone());
        builder.push(")");
    }

    if let Some(from_position) = filter.from_position {
        builder.push(" AND position >= ");
        builder.push_bind(from_position);
    }

    if let Some(to_position) = filter.to_position {
        builder.push(" AND position <= ");
        builder.push_bind(to_position);
    }

    builder.push(if filter.descending {
        " ORDER BY position DESC"
    } else {
        " ORDER BY position ASC"
    });

    if let Some(limit) = filter.limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit);
    }

    builder
}
