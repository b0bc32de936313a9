use crate::aggregate::user::UserEvent;
use crate::error::ProjectionError;
use crate::event::StoreEvent;
use crate::projection::Projection;

/// Maintains `users_read_model`, one row per `(instance_id, user_id)` (spec
/// §4.5, backs the Users query façade).
pub struct UsersProjection;

const EVENT_TYPES: &[&str] = &[
    "user.human_added",
    "user.email_changed",
    "user.email_verified",
    "user.deactivated",
    "user.reactivated",
    "user.removed",
];

#[async_trait::async_trait]
impl Projection for UsersProjection {
    fn name(&self) -> &'static str {
        "users"
    }

    fn event_types(&self) -> &'static [&'static str] {
        EVENT_TYPES
    }

    async fn project(
        &self,
        event: &StoreEvent,
        transaction: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<(), ProjectionError> {
        let payload: UserEvent = event.decode()?;

        match payload {
            UserEvent::HumanAdded {
                username,
                email,
                first_name,
                last_name,
                ..
            } => {
                sqlx::query(
                    "INSERT INTO users_read_model \
                     (instance_id, user_id, username, email, email_verified, first_name, last_name, status, updated_at) \
                     VALUES ($1, $2, $3, $4, false, $5, $6, 'active', $7) \
                     ON CONFLICT (instance_id, user_id) DO UPDATE \
                     SET username = EXCLUDED.username, email = EXCLUDED.email, first_name = EXCLUDED.first_name, \
                         last_name = EXCLUDED.last_name, status = 'active', updated_at = EXCLUDED.updated_at",
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(username)
                .bind(email)
                .bind(first_name)
                .bind(last_name)
                .bind(event.created_at)
                .execute(&mut **transaction)
                .await?;
            }
            UserEvent::EmailChanged { email } => {
                sqlx::query(
                    "UPDATE users_read_model SET email = $3, email_verified = false, updated_at = $4 \
                     WHERE instance_id = $1 AND user_id = $2",
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(email)
                .bind(event.created_at)
                .execute(&mut **transaction)
                .await?;
            }
            UserEvent::EmailVerified => {
                sqlx::query(
                    "UPDATE users_read_model SET email_verified = true, updated_at = $3 \
                     WHERE instance_id = $1 AND user_id = $2",
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(event.created_at)
                .execute(&mut **transaction)
                .await?;
            }
            UserEvent::Deactivated => {
                set_status(transaction, event, "inactive").await?;
            }
            UserEvent::Reactivated => {
                set_status(transaction, event, "active").await?;
            }
            UserEvent::Removed { .. } => {
                set_status(transaction, event, "removed").await?;
            }
        }

        Ok(())
    }
}

async fn set_status(
    transaction: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    event: &StoreEvent,
    status: &str,
) -> Result<(), ProjectionError> {
    sqlx::query("UPDATE users_read_model SET status = $3, updated_at = $4 WHERE instance_id = $1 AND user_id = $2")
        .bind(&event.instance_id)
        .bind(&event.aggregate_id)
        .bind(status)
        .bind(event.created_at)
        .execute(&mut **transaction)
        .await?;
    Ok(())
}
