use crate::aggregate::org::OrgEvent;
use crate::error::ProjectionError;
use crate::event::StoreEvent;
use crate::projection::Projection;

/// Maintains `orgs_read_model`, one row per `(instance_id, org_id)` (spec
/// §4.5, backs the Organizations query façade).
pub struct OrgsProjection;

const EVENT_TYPES: &[&str] = &[
    "org.created",
    "org.renamed",
    "org.deactivated",
    "org.reactivated",
    "org.removed",
];

#[async_trait::async_trait]
impl Projection for OrgsProjection {
    fn name(&self) -> &'static str {
        "orgs"
    }

    fn event_types(&self) -> &'static [&'static str] {
        EVENT_TYPES
    }

    async fn project(
        &self,
        event: &StoreEvent,
        transaction: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<(), ProjectionError> {
        let payload: OrgEvent = event.decode()?;

        match payload {
            OrgEvent::Created { name } => {
                sqlx::query(
                    "INSERT INTO orgs_read_model (instance_id, org_id, name, status, updated_at) \
                     VALUES ($1, $2, $3, 'active', $4) \
                     ON CONFLICT (instance_id, org_id) DO UPDATE \
                     SET name = EXCLUDED.name, status = 'active', updated_at = EXCLUDED.updated_at",
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(name)
                .bind(event.created_at)
                .execute(&mut **transaction)
                .await?;
            }
            OrgEvent::Renamed { name } => {
                sqlx::query("UPDATE orgs_read_model SET name = $3, updated_at = $4 WHERE instance_id = $1 AND org_id = $2")
                    .bind(&event.instance_id)
                    .bind(&event.aggregate_id)
                    .bind(name)
                    .bind(event.created_at)
                    .execute(&mut **transaction)
                    .await?;
            }
            OrgEvent::Deactivated => set_status(transaction, event, "inactive").await?,
            OrgEvent::Reactivated => set_status(transaction, event, "active").await?,
            OrgEvent::Removed { .. } => set_status(transaction, event, "removed").await?,
        }

        Ok(())
    }
}

async fn set_status(
    transaction: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    event: &StoreEvent,
    status: &str,
) -> Result<(), ProjectionError> {
    sqlx::query("UPDATE orgs_read_model SET status = $3, updated_at = $4 WHERE instance_id = $1 AND org_id = $2")
        .bind(&event.instance_id)
        .bind(&event.aggregate_id)
        .bind(status)
        .bind(event.created_at)
        .execute(&mut **transaction)
        .await?;
    Ok(())
}
