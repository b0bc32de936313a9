//! Exercises the Command Engine against a real `PgEventStore` (spec §4.3,
//! §8 scenarios 1 "Optimistic concurrency" and 2 "Unique username").

use sqlx::{Pool, Postgres};
use uuid::Uuid;

use iam_core::aggregate::user::{User, UserCommand, UserError};
use iam_core::command::{Command, CommandEngine};
use iam_core::types::Editor;
use iam_core::{CommandError, PgEventStoreBuilder};

fn add_human(username: &str) -> UserCommand {
    UserCommand::AddHuman {
        username: username.to_string(),
        email: format!("{username}@example.test"),
        first_name: "First".to_string(),
        last_name: "Last".to_string(),
        password_hash: None,
    }
}

fn command(aggregate_id: &str, body: UserCommand) -> Command<User> {
    Command {
        command_id: Uuid::new_v4(),
        instance_id: "inst1".to_string(),
        aggregate_id: aggregate_id.to_string(),
        editor: Editor::user("admin"),
        resource_owner: "org-1".to_string(),
        body,
    }
}

#[sqlx::test]
async fn add_then_change_email_is_reflected_in_the_replayed_state(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let engine = CommandEngine::new(store);

    engine.execute(command("u1", add_human("grace"))).await.unwrap();

    let state = engine
        .execute(command(
            "u1",
            UserCommand::ChangeEmail {
                email: "new@example.test".to_string(),
            },
        ))
        .await
        .unwrap();

    assert_eq!(state.inner().email.as_deref(), Some("new@example.test"));
    assert_eq!(state.sequence(), 2);
}

#[sqlx::test]
async fn a_command_on_a_not_yet_added_user_fails_the_precondition(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let engine = CommandEngine::new(store);

    let err = engine.execute(command("ghost", UserCommand::VerifyEmail)).await.unwrap_err();

    assert!(matches!(err, CommandError::Domain { source: UserError::NotActive, .. }));
}

#[sqlx::test]
async fn a_second_username_claim_is_a_unique_constraint_violation(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let engine = CommandEngine::new(store);

    engine.execute(command("u1", add_human("alice"))).await.unwrap();

    let err = engine.execute(command("u2", add_human("alice"))).await.unwrap_err();

    assert!(matches!(err, CommandError::Store { .. }));
}

#[sqlx::test]
async fn the_same_username_is_free_again_in_a_different_instance(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let engine = CommandEngine::new(store);

    engine.execute(command("u1", add_human("alice"))).await.unwrap();

    let other_instance = Command {
        instance_id: "inst2".to_string(),
        ..command("u1", add_human("alice"))
    };
    engine.execute(other_instance).await.unwrap();
}

#[sqlx::test]
async fn removing_a_user_frees_its_username_for_reuse(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let engine = CommandEngine::new(store);

    engine.execute(command("u1", add_human("alice"))).await.unwrap();
    engine.execute(command("u1", UserCommand::Remove)).await.unwrap();

    // alice is released by the Removed event's unique-constraint op, so a
    // brand new user may claim it again (spec §4.2 "idempotence rule").
    engine.execute(command("u2", add_human("alice"))).await.unwrap();
}
