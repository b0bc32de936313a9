use sqlx::PgPool;

use crate::error::QueryError;
use crate::query::{clamp_page_size, Cursor, Page};

/// Read-only projection of `orgs_read_model` (spec §4.5).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Org {
    pub org_id: String,
    pub name: String,
    pub status: String,
}

/// Query façade over the organizations read model.
pub struct OrgsQuery<'a> {
    pool: &'a PgPool,
}

impl<'a> OrgsQuery<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, instance_id: &str, org_id: &str) -> Result<Org, QueryError> {
        sqlx::query_as::<_, Org>(
            "SELECT org_id, name, status FROM orgs_read_model WHERE instance_id = $1 AND org_id = $2",
        )
        .bind(instance_id)
        .bind(org_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(QueryError::NotFound)
    }

    pub async fn get_by_name(&self, instance_id: &str, name: &str) -> Result<Org, QueryError> {
        sqlx::query_as::<_, Org>(
            "SELECT org_id, name, status FROM orgs_read_model WHERE instance_id = $1 AND lower(name) = lower($2)",
        )
        .bind(instance_id)
        .bind(name)
        .fetch_optional(self.pool)
        .await?
        .ok_or(QueryError::NotFound)
    }

    /// Lists active (non-removed) orgs in `instance_id`, ordered by
    /// `org_id`, paginated with a forward keyset cursor.
    pub async fn list_active(
        &self,
        instance_id: &str,
        after: Option<Cursor>,
        limit: Option<i64>,
    ) -> Result<Page<Org>, QueryError> {
        let limit = clamp_page_size(limit);
        let after_id = after.map(|c| c.0).unwrap_or_default();

        let mut rows: Vec<Org> = sqlx::query_as(
            "SELECT org_id, name, status FROM orgs_read_model \
             WHERE instance_id = $1 AND status != 'removed' AND org_id > $2 \
             ORDER BY org_id \
             LIMIT $3",
        )
        .bind(instance_id)
        .bind(after_id)
        .bind(limit + 1)
        .fetch_all(self.pool)
        .await?;

        let next_cursor = if rows.len() as i64 > limit {
            rows.truncate(limit as usize);
            rows.last().map(|o| Cursor(o.org_id.clone()))
        } else {
            None
        };

        Ok(Page { items: rows, next_cursor })
    }
}
