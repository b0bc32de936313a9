//! Exercises the Event Store contract directly (spec §4.1, §8 "Optimistic
//! concurrency" / "Unique username"), grounded on the teacher's
//! `tests/postgres/pg_store.rs` (`#[sqlx::test]` with an injected, freshly
//! migrated pool per test).

use sqlx::{Pool, Postgres};
use uuid::Uuid;

use iam_core::event::EventFilter;
use iam_core::store::{EventStore, EventWrite, PushRequest, UniqueConstraintOp};
use iam_core::types::{AggregateType, Editor};
use iam_core::PgEventStoreBuilder;

fn human_added(username: &str) -> EventWrite {
    EventWrite {
        event_type: "user.human_added".to_string(),
        aggregate_version: 1,
        payload: serde_json::json!({ "event_type": "human_added", "username": username, "email": "a@x.test", "first_name": "A", "last_name": "B", "password_hash": null }),
        editor: Editor::user("admin"),
        resource_owner: "org-1".to_string(),
    }
}

fn email_verified() -> EventWrite {
    EventWrite {
        event_type: "user.email_verified".to_string(),
        aggregate_version: 1,
        payload: serde_json::json!({ "event_type": "email_verified" }),
        editor: Editor::user("admin"),
        resource_owner: "org-1".to_string(),
    }
}

fn push_request(instance_id: &str, aggregate_id: &str, expected_sequence: Option<i64>, events: Vec<EventWrite>) -> PushRequest {
    PushRequest {
        command_id: Uuid::new_v4(),
        instance_id: instance_id.to_string(),
        aggregate_type: AggregateType::User,
        aggregate_id: aggregate_id.to_string(),
        expected_sequence,
        events,
        unique_constraints: Vec::new(),
    }
}

#[sqlx::test]
async fn push_assigns_gapless_sequence_and_monotonic_position(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();

    let events = store
        .push(push_request("inst1", "user-1", None, vec![human_added("grace"), email_verified()]))
        .await
        .unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].sequence, 1);
    assert_eq!(events[1].sequence, 2);
    assert!(events[1].position > events[0].position);
    assert_eq!(events[0].command_id, events[1].command_id);
}

#[sqlx::test]
async fn second_push_continues_the_sequence_from_the_prior_tail(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();

    store
        .push(push_request("inst1", "user-1", None, vec![human_added("grace")]))
        .await
        .unwrap();

    let events = store
        .push(push_request("inst1", "user-1", Some(1), vec![email_verified()]))
        .await
        .unwrap();

    assert_eq!(events[0].sequence, 2);
}

#[sqlx::test]
async fn stale_expected_sequence_is_a_concurrency_conflict(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();

    store
        .push(push_request("inst1", "user-1", None, vec![human_added("grace")]))
        .await
        .unwrap();

    // The aggregate is now at sequence 1; a second command that also loaded
    // at sequence 0 must be rejected rather than silently reordered.
    let err = store
        .push(push_request("inst1", "user-1", None, vec![email_verified()]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        iam_core::StoreError::ConcurrencyConflict { expected: 0, actual: 1, .. }
    ));
}

#[sqlx::test]
async fn adding_an_already_reserved_unique_constraint_fails_the_whole_push(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();

    let mut first = push_request("inst1", "user-1", None, vec![human_added("alice")]);
    first.unique_constraints.push(UniqueConstraintOp::Add {
        unique_type: "user.username".to_string(),
        unique_field: "alice".to_string(),
        case_insensitive: true,
        error_message: "username alice is already taken".to_string(),
    });
    store.push(first).await.unwrap();

    let mut second = push_request("inst1", "user-2", None, vec![human_added("alice")]);
    second.unique_constraints.push(UniqueConstraintOp::Add {
        unique_type: "user.username".to_string(),
        unique_field: "ALICE".to_string(),
        case_insensitive: true,
        error_message: "username alice is already taken".to_string(),
    });
    let err = store.push(second).await.unwrap_err();
    assert!(matches!(err, iam_core::StoreError::UniqueConstraintViolation { .. }));

    // The rejected push must not have left a dangling event for user-2 (spec
    // §4.1 step 6: "on any failure, the entire batch rolls back").
    let events = store
        .query(EventFilter::new().instance_id("inst1").aggregate_id("user-2"))
        .await
        .unwrap();
    assert!(events.is_empty());
}

#[sqlx::test]
async fn the_same_unique_field_is_free_again_in_a_different_instance(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();

    for instance_id in ["inst1", "inst2"] {
        let mut request = push_request(instance_id, "user-1", None, vec![human_added("alice")]);
        request.unique_constraints.push(UniqueConstraintOp::Add {
            unique_type: "user.username".to_string(),
            unique_field: "alice".to_string(),
            case_insensitive: true,
            error_message: "username alice is already taken".to_string(),
        });
        store.push(request).await.unwrap();
    }
}

#[sqlx::test]
async fn query_with_no_filter_is_ordered_strictly_by_position(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();

    store
        .push(push_request("inst1", "user-1", None, vec![human_added("grace")]))
        .await
        .unwrap();
    store
        .push(push_request("inst1", "user-2", None, vec![human_added("ada")]))
        .await
        .unwrap();
    store
        .push(push_request("inst1", "user-1", Some(1), vec![email_verified()]))
        .await
        .unwrap();

    let events = store.query(EventFilter::new().instance_id("inst1")).await.unwrap();
    assert_eq!(events.len(), 3);
    assert!(events.windows(2).all(|w| w[0].position < w[1].position));
}
