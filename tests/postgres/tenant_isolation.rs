//! Spec §8 scenario 5 "Tenant isolation": two instances may each own an
//! aggregate with the same id, and queries scoped to one instance never
//! leak the other's rows.

use std::sync::Arc;

use sqlx::{Pool, Postgres};
use uuid::Uuid;

use iam_core::aggregate::user::{User, UserCommand};
use iam_core::command::{Command, CommandEngine};
use iam_core::projection::{ProjectionWorker, UsersProjection};
use iam_core::query::UsersQuery;
use iam_core::types::Editor;
use iam_core::PgEventStoreBuilder;

fn add_human(username: &str, email: &str) -> UserCommand {
    UserCommand::AddHuman {
        username: username.to_string(),
        email: email.to_string(),
        first_name: "First".to_string(),
        last_name: "Last".to_string(),
        password_hash: None,
    }
}

fn command(instance_id: &str, body: UserCommand) -> Command<User> {
    Command {
        command_id: Uuid::new_v4(),
        instance_id: instance_id.to_string(),
        aggregate_id: "u1".to_string(),
        editor: Editor::user("admin"),
        resource_owner: "org-1".to_string(),
        body,
    }
}

#[sqlx::test]
async fn the_same_aggregate_id_in_two_instances_yields_two_distinct_rows(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool.clone()).try_build().await.unwrap();
    let engine = CommandEngine::new(store.clone());

    engine
        .execute(command("inst1", add_human("u1", "inst1@example.test")))
        .await
        .unwrap();
    engine
        .execute(command("inst2", add_human("u1", "inst2@example.test")))
        .await
        .unwrap();

    let worker = ProjectionWorker::new(store, pool.clone(), Arc::new(UsersProjection));
    worker.run_once().await.unwrap();

    let query = UsersQuery::new(&pool);
    let inst1_user = query.get("inst1", "u1").await.unwrap();
    let inst2_user = query.get("inst2", "u1").await.unwrap();

    assert_eq!(inst1_user.email, "inst1@example.test");
    assert_eq!(inst2_user.email, "inst2@example.test");

    let inst1_page = query.list_active("inst1", None, None).await.unwrap();
    assert_eq!(inst1_page.items.len(), 1);
    assert!(inst1_page.items.iter().all(|u| u.user_id == "u1"));
}
