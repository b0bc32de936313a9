use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::ProjectionError;
use crate::types::InstanceId;

/// A leased row in `projection_locks`, scoped to one `(projection_name,
/// instance_id)` pair (spec §4.4 "isolated by lock" / tenant isolation): a
/// slow or stuck tenant only ever holds its own row, so other tenants' work
/// on the same projection is never blocked behind it.
pub struct ProjectionLock {
    projection_name: &'static str,
    instance_id: InstanceId,
    worker_id: Uuid,
    ttl: Duration,
}

impl ProjectionLock {
    /// Attempts to take the lock for `instance_id`. Returns `Ok(None)` (not
    /// an error) if another worker currently holds an unexpired lease — the
    /// caller should simply skip this tenant this cycle.
    pub async fn acquire(
        pool: &PgPool,
        projection_name: &'static str,
        instance_id: &str,
        ttl: Duration,
    ) -> Result<Option<Self>, ProjectionError> {
        let worker_id = Uuid::new_v4();
        let ttl_seconds = ttl.as_secs() as i32;

        let result = sqlx::query(
            "INSERT INTO projection_locks (projection_name, instance_id, worker_id, acquired_at, ttl_seconds) \
             VALUES ($1, $2, $3, now(), $4) \
             ON CONFLICT (projection_name, instance_id) DO UPDATE \
             SET worker_id = EXCLUDED.worker_id, acquired_at = now(), ttl_seconds = EXCLUDED.ttl_seconds \
             WHERE projection_locks.acquired_at + (projection_locks.ttl_seconds || ' seconds')::interval < now()",
        )
        .bind(projection_name)
        .bind(instance_id)
        .bind(worker_id)
        .bind(ttl_seconds)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Ok(Some(Self {
            projection_name,
            instance_id: instance_id.to_string(),
            worker_id,
            ttl,
        }))
    }

    /// Extends the lease. Called between events so a slow batch doesn't
    /// outlive its own lock.
    pub async fn renew(&self, pool: &PgPool) -> Result<(), ProjectionError> {
        sqlx::query(
            "UPDATE projection_locks SET acquired_at = now() \
             WHERE projection_name = $1 AND instance_id = $2 AND worker_id = $3",
        )
        .bind(self.projection_name)
        .bind(&self.instance_id)
        .bind(self.worker_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Releases the lock early by expiring it, rather than waiting out the
    /// remainder of the lease.
    pub async fn release(self, pool: &PgPool) -> Result<(), ProjectionError> {
        sqlx::query(
            "UPDATE projection_locks SET acquired_at = now() - ((ttl_seconds + 1) || ' seconds')::interval \
             WHERE projection_name = $1 AND instance_id = $2 AND worker_id = $3",
        )
        .bind(self.projection_name)
        .bind(&self.instance_id)
        .bind(self.worker_id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
