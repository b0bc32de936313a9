//! Query Façade (spec §4.5): read-only, paginated access to the read models
//! the Projection Engine maintains, plus a `wait_for_projection` helper for
//! read-your-writes consistency (spec §9).

mod orgs;
mod users;

pub use orgs::{Org, OrgsQuery};
pub use users::{User, UsersQuery};

use std::time::Duration;

use crate::error::{ProjectionError, QueryError};
use crate::types::Position;

/// A single page of results plus the cursor to fetch the next one.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<Cursor>,
}

/// Opaque forward-pagination cursor: the last id seen on the previous page.
/// Callers should treat the inner value as opaque and round-trip it
/// verbatim rather than construct one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(pub String);

pub(crate) const DEFAULT_PAGE_SIZE: i64 = 50;
pub(crate) const MAX_PAGE_SIZE: i64 = 200;

pub(crate) fn clamp_page_size(requested: Option<i64>) -> i64 {
    requested.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

/// Blocks until `store`'s committed log has reached at least `position` for
/// `instance_id` and the projection has caught up to it, so a caller that
/// just issued a command can immediately read its own write (spec §9
/// "read-your-writes"). Polls rather than subscribes, matching the
/// [`EventStore::stream`] polling model.
///
/// Returns `Ok(true)` once caught up, `Ok(false)` if `deadline` elapses
/// first (spec §6 `wait_for_projection(...) -> bool`); a timeout is not a
/// `QueryError::NotFound` (that variant means "the entity doesn't exist",
/// not "hasn't caught up yet") and is left for the caller to decide how to
/// react to. An `Err` is a genuine storage failure.
pub async fn wait_for_projection(
    pool: &sqlx::PgPool,
    projection_name: &str,
    instance_id: &str,
    position: Position,
    timeout: Duration,
) -> Result<bool, QueryError> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let caught_up: Option<(i64,)> = sqlx::query_as(
            "SELECT last_processed_position FROM projection_positions \
             WHERE projection_name = $1 AND instance_id = $2 AND last_processed_position >= $3",
        )
        .bind(projection_name)
        .bind(instance_id)
        .bind(position)
        .fetch_optional(pool)
        .await?;

        if caught_up.is_some() {
            return Ok(true);
        }

        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

impl From<ProjectionError> for QueryError {
    fn from(err: ProjectionError) -> Self {
        match err {
            ProjectionError::Sqlx(source) => QueryError::Sqlx(source),
            other => QueryError::Sqlx(sqlx::Error::Protocol(other.to_string())),
        }
    }
}
