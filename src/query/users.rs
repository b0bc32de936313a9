use sqlx::PgPool;

use crate::error::QueryError;
use crate::query::{clamp_page_size, Cursor, Page};

/// Read-only projection of `users_read_model` (spec §4.5).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub email_verified: bool,
    pub first_name: String,
    pub last_name: String,
    pub status: String,
}

/// Query façade over the users read model.
pub struct UsersQuery<'a> {
    pool: &'a PgPool,
}

impl<'a> UsersQuery<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, instance_id: &str, user_id: &str) -> Result<User, QueryError> {
        sqlx::query_as::<_, User>(
            "SELECT user_id, username, email, email_verified, first_name, last_name, status \
             FROM users_read_model WHERE instance_id = $1 AND user_id = $2",
        )
        .bind(instance_id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(QueryError::NotFound)
    }

    pub async fn get_by_username(&self, instance_id: &str, username: &str) -> Result<User, QueryError> {
        sqlx::query_as::<_, User>(
            "SELECT user_id, username, email, email_verified, first_name, last_name, status \
             FROM users_read_model WHERE instance_id = $1 AND lower(username) = lower($2)",
        )
        .bind(instance_id)
        .bind(username)
        .fetch_optional(self.pool)
        .await?
        .ok_or(QueryError::NotFound)
    }

    /// Lists active (non-removed) users in `instance_id`, ordered by
    /// `user_id`, paginated with a forward keyset cursor.
    pub async fn list_active(
        &self,
        instance_id: &str,
        after: Option<Cursor>,
        limit: Option<i64>,
    ) -> Result<Page<User>, QueryError> {
        let limit = clamp_page_size(limit);
        let after_id = after.map(|c| c.0).unwrap_or_default();

        let mut rows: Vec<User> = sqlx::query_as(
            "SELECT user_id, username, email, email_verified, first_name, last_name, status \
             FROM users_read_model \
             WHERE instance_id = $1 AND status != 'removed' AND user_id > $2 \
             ORDER BY user_id \
             LIMIT $3",
        )
        .bind(instance_id)
        .bind(after_id)
        .bind(limit + 1)
        .fetch_all(self.pool)
        .await?;

        let next_cursor = if rows.len() as i64 > limit {
            rows.truncate(limit as usize);
            rows.last().map(|u| Cursor(u.user_id.clone()))
        } else {
            None
        };

        Ok(Page { items: rows, next_cursor })
    }
}
