use std::time::Duration;

use sqlx::PgPool;

use crate::store::postgres::schema::MIGRATIONS;
use crate::store::postgres::PgEventStore;

/// Builder for [`PgEventStore`] (grounded on `esrs::store::postgres::PgStoreBuilder`):
/// runs the fixed [`MIGRATIONS`] list once at startup unless explicitly disabled.
pub struct PgEventStoreBuilder {
    pool: PgPool,
    run_migrations: bool,
    poll_interval: Duration,
}

impl PgEventStoreBuilder {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            run_migrations: true,
            poll_interval: Duration::from_millis(200),
        }
    }

    /// Skips running [`MIGRATIONS`]. Intended for call sites that already
    /// ran them once at process startup on a shared pool.
    pub fn without_running_migrations(mut self) -> Self {
        self.run_migrations = false;
        self
    }

    /// How long a `follow = true` [`crate::store::EventStore::stream`] sleeps
    /// between polls once it has caught up.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Runs migrations (unless disabled) and returns the built store.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if running the migrations fails.
    pub async fn try_build(self) -> Result<PgEventStore, sqlx::Error> {
        if self.run_migrations {
            let mut tx = self.pool.begin().await?;
            for migration in MIGRATIONS {
                sqlx::query(migration).execute(&mut *tx).await?;
            }
            tx.commit().await?;
        }

        Ok(PgEventStore::new(self.pool, self.poll_interval))
    }
}
