//! Exercises the Projection Engine end to end (spec §4.4, §8 scenario 3
//! "Projection idempotence on replay").

use std::sync::Arc;

use sqlx::{Pool, Postgres};
use uuid::Uuid;

use iam_core::aggregate::user::{User, UserCommand};
use iam_core::command::{Command, CommandEngine};
use iam_core::projection::{ProjectionWorker, UsersProjection};
use iam_core::query::UsersQuery;
use iam_core::types::Editor;
use iam_core::PgEventStoreBuilder;

fn add_human(username: &str) -> UserCommand {
    UserCommand::AddHuman {
        username: username.to_string(),
        email: format!("{username}@example.test"),
        first_name: "First".to_string(),
        last_name: "Last".to_string(),
        password_hash: None,
    }
}

fn command(instance_id: &str, aggregate_id: &str, body: UserCommand) -> Command<User> {
    Command {
        command_id: Uuid::new_v4(),
        instance_id: instance_id.to_string(),
        aggregate_id: aggregate_id.to_string(),
        editor: Editor::user("admin"),
        resource_owner: "org-1".to_string(),
        body,
    }
}

#[sqlx::test]
async fn applies_new_events_into_the_read_model(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool.clone()).try_build().await.unwrap();
    let engine = CommandEngine::new(store.clone());

    engine.execute(command("inst1", "u1", add_human("grace"))).await.unwrap();
    engine
        .execute(command(
            "inst1",
            "u1",
            UserCommand::ChangeEmail {
                email: "grace2@example.test".to_string(),
            },
        ))
        .await
        .unwrap();

    let worker = ProjectionWorker::new(store, pool.clone(), Arc::new(UsersProjection));
    let applied = worker.run_once_for_instance("inst1").await.unwrap();
    assert_eq!(applied, 2);

    let row = UsersQuery::new(&pool).get("inst1", "u1").await.unwrap();
    assert_eq!(row.username, "grace");
    assert_eq!(row.email, "grace2@example.test");
    assert_eq!(row.status, "active");

    // A second tick with nothing new to apply is a no-op.
    let applied_again = worker.run_once_for_instance("inst1").await.unwrap();
    assert_eq!(applied_again, 0);
}

#[sqlx::test]
async fn replaying_from_zero_reproduces_an_identical_read_model(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool.clone()).try_build().await.unwrap();
    let engine = CommandEngine::new(store.clone());

    for i in 0..5 {
        let username = format!("user{i}");
        engine.execute(command("inst1", &username, add_human(&username))).await.unwrap();
    }

    let worker = ProjectionWorker::new(store, pool.clone(), Arc::new(UsersProjection));
    worker.run_once_for_instance("inst1").await.unwrap();

    let before = UsersQuery::new(&pool).list_active("inst1", None, None).await.unwrap();
    assert_eq!(before.items.len(), 5);

    // Operator-initiated reset (spec §4.4 "Schema changes ... handled by
    // operator-initiated reset"): drop the read model and the cursor, then
    // replay the whole log from position 0.
    sqlx::query("DELETE FROM users_read_model WHERE instance_id = $1")
        .bind("inst1")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("DELETE FROM projection_positions WHERE projection_name = 'users' AND instance_id = $1")
        .bind("inst1")
        .execute(&pool)
        .await
        .unwrap();

    worker.run_once_for_instance("inst1").await.unwrap();

    let after = UsersQuery::new(&pool).list_active("inst1", None, None).await.unwrap();
    assert_eq!(after.items.len(), before.items.len());
    for (a, b) in after.items.iter().zip(before.items.iter()) {
        assert_eq!(a.user_id, b.user_id);
        assert_eq!(a.username, b.username);
        assert_eq!(a.email, b.email);
    }
}
