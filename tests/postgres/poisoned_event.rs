//! Spec §8 scenario 4 "Poisoned event retry": a handler that fails on a
//! specific event is retried (non-strict: cursor advances past it and a
//! later tick re-attempts it from `projection_failed_events`; strict-order:
//! the cursor never advances past it and the next tick sees it first again),
//! and `resolve_failed_event` lets an operator force either outcome once a
//! handler is quarantined.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use sqlx::{Pool, Postgres};
use uuid::Uuid;

use iam_core::aggregate::user::{User, UserCommand};
use iam_core::command::{Command, CommandEngine};
use iam_core::error::ProjectionError;
use iam_core::event::StoreEvent;
use iam_core::projection::{FailedEventStore, Projection, ProjectionWorker, ResolveDecision};
use iam_core::types::Editor;
use iam_core::PgEventStoreBuilder;

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

fn add_human(username: &str) -> UserCommand {
    UserCommand::AddHuman {
        username: username.to_string(),
        email: format!("{username}@example.test"),
        first_name: "First".to_string(),
        last_name: "Last".to_string(),
        password_hash: None,
    }
}

/// Fails every event until it has seen `fail_until` attempts for it, then
/// succeeds; never mutates a real read model, just counts attempts.
struct FlakyProjection {
    strict: bool,
    fail_until: u32,
    attempts: AtomicU32,
}

impl FlakyProjection {
    fn new(strict: bool, fail_until: u32) -> Self {
        Self {
            strict,
            fail_until,
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait::async_trait]
impl Projection for FlakyProjection {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[]
    }

    fn strict_order(&self) -> bool {
        self.strict
    }

    async fn project(
        &self,
        _event: &StoreEvent,
        _transaction: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<(), ProjectionError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_until {
            return Err(ProjectionError::Handler("simulated handler failure".into()));
        }
        Ok(())
    }
}

/// Fails every attempt against one specific `aggregate_id`, forever; succeeds
/// immediately on anything else. Used where a test needs a poisoned event
/// that never clears on its own, alongside other events that must still go
/// through normally.
struct PoisonedAggregate {
    strict: bool,
    poisoned_aggregate_id: &'static str,
    attempts: AtomicU32,
}

impl PoisonedAggregate {
    fn new(strict: bool, poisoned_aggregate_id: &'static str) -> Self {
        Self {
            strict,
            poisoned_aggregate_id,
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait::async_trait]
impl Projection for PoisonedAggregate {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[]
    }

    fn strict_order(&self) -> bool {
        self.strict
    }

    async fn project(
        &self,
        event: &StoreEvent,
        _transaction: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<(), ProjectionError> {
        if event.aggregate_id == self.poisoned_aggregate_id {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            return Err(ProjectionError::Handler("simulated handler failure".into()));
        }
        Ok(())
    }
}

#[sqlx::test]
async fn non_strict_projection_retries_a_failed_event_on_a_later_tick(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool.clone()).try_build().await.unwrap();
    let engine = CommandEngine::new(store.clone());
    engine.execute(command("inst1", "u1", add_human("grace"))).await.unwrap();

    let projection = Arc::new(FlakyProjection::new(false, 1));
    let worker = ProjectionWorker::new(store, pool.clone(), projection.clone());

    // First tick: the handler fails once, the cursor advances past the
    // event anyway (non-strict), and the failure is recorded.
    let applied = worker.run_once_for_instance("inst1").await.unwrap();
    assert_eq!(applied, 0);

    let failures = FailedEventStore::list_unresolved(&pool, "flaky").await.unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].failure_count, 1);

    // Second tick: nothing new in the normal stream, but the retry pass
    // picks the failed event back up and this time the handler succeeds.
    let applied = worker.run_once_for_instance("inst1").await.unwrap();
    assert_eq!(applied, 1);

    let failures = FailedEventStore::list_unresolved(&pool, "flaky").await.unwrap();
    assert!(failures.is_empty());
}

#[sqlx::test]
async fn strict_order_projection_halts_on_a_failed_event_until_it_resolves(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool.clone()).try_build().await.unwrap();
    let engine = CommandEngine::new(store.clone());
    engine.execute(command("inst1", "u1", add_human("grace"))).await.unwrap();
    engine.execute(command("inst1", "u2", add_human("ada"))).await.unwrap();

    let projection = Arc::new(FlakyProjection::new(true, 1));
    let worker = ProjectionWorker::new(store, pool.clone(), projection.clone());

    // First tick: the first event fails and, being strict-order, the cursor
    // does not advance past it, so the second event is never even attempted.
    let applied = worker.run_once_for_instance("inst1").await.unwrap();
    assert_eq!(applied, 0);
    assert_eq!(projection.attempts.load(Ordering::SeqCst), 1);

    // Second tick: the same event resurfaces first and now succeeds, so the
    // cursor advances and the second event is applied too.
    let applied = worker.run_once_for_instance("inst1").await.unwrap();
    assert_eq!(applied, 2);

    let failures = FailedEventStore::list_unresolved(&pool, "flaky").await.unwrap();
    assert!(failures.is_empty());
}

#[sqlx::test]
async fn quarantine_cap_stops_auto_retry_until_an_operator_resolves_it(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool.clone()).try_build().await.unwrap();
    let engine = CommandEngine::new(store.clone());
    engine.execute(command("inst1", "u1", add_human("grace"))).await.unwrap();

    // Always fails: attempts never exceed `fail_until`.
    let projection = Arc::new(FlakyProjection::new(false, u32::MAX));
    let worker = ProjectionWorker::new(store, pool.clone(), projection.clone()).with_quarantine_cap(2);

    worker.run_once_for_instance("inst1").await.unwrap();
    worker.run_once_for_instance("inst1").await.unwrap();

    let failures_before = FailedEventStore::list_unresolved(&pool, "flaky").await.unwrap();
    assert_eq!(failures_before[0].failure_count, 2);
    let attempts_before = projection.attempts.load(Ordering::SeqCst);

    // A third tick is quarantined: the handler is not invoked again.
    worker.run_once_for_instance("inst1").await.unwrap();
    assert_eq!(projection.attempts.load(Ordering::SeqCst), attempts_before);

    // An operator clears the quarantine by asking for a retry; the next
    // tick attempts the handler again (and still fails, bumping the count).
    FailedEventStore::resolve(&pool, "flaky", "inst1", failures_before[0].failed_sequence, ResolveDecision::Retry)
        .await
        .unwrap();
    worker.run_once_for_instance("inst1").await.unwrap();
    assert!(projection.attempts.load(Ordering::SeqCst) > attempts_before);

    // An operator can instead permanently skip it; no further attempts ever
    // occur and it disappears from the unresolved list.
    let failures = FailedEventStore::list_unresolved(&pool, "flaky").await.unwrap();
    FailedEventStore::resolve(&pool, "flaky", "inst1", failures[0].failed_sequence, ResolveDecision::Skip)
        .await
        .unwrap();
    let attempts_after_skip = projection.attempts.load(Ordering::SeqCst);
    worker.run_once_for_instance("inst1").await.unwrap();
    assert_eq!(projection.attempts.load(Ordering::SeqCst), attempts_after_skip);
    assert!(FailedEventStore::list_unresolved(&pool, "flaky").await.unwrap().is_empty());
}

#[sqlx::test]
async fn skipping_a_strict_order_event_advances_past_it_without_reapplying(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool.clone()).try_build().await.unwrap();
    let engine = CommandEngine::new(store.clone());
    engine.execute(command("inst1", "u1", add_human("grace"))).await.unwrap();
    engine.execute(command("inst1", "u2", add_human("ada"))).await.unwrap();

    // u1 always fails; u2 would succeed immediately if the worker ever reaches it.
    let projection = Arc::new(PoisonedAggregate::new(true, "u1"));
    let worker = ProjectionWorker::new(store, pool.clone(), projection.clone()).with_quarantine_cap(2);

    worker.run_once_for_instance("inst1").await.unwrap();
    worker.run_once_for_instance("inst1").await.unwrap();

    let failures = FailedEventStore::list_unresolved(&pool, "flaky").await.unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].failure_count, 2);
    let attempts_before = projection.attempts.load(Ordering::SeqCst);

    // Quarantined: a third tick does not invoke the handler again.
    worker.run_once_for_instance("inst1").await.unwrap();
    assert_eq!(projection.attempts.load(Ordering::SeqCst), attempts_before);

    // An operator permanently skips the poisoned event. The worker must
    // advance past it — not silently treat the skip as "no failures on
    // record" and retry the handler forever.
    FailedEventStore::resolve(&pool, "flaky", "inst1", failures[0].failed_sequence, ResolveDecision::Skip)
        .await
        .unwrap();

    let applied = worker.run_once_for_instance("inst1").await.unwrap();
    assert_eq!(projection.attempts.load(Ordering::SeqCst), attempts_before);
    assert_eq!(applied, 1, "the second event should now be reached and applied");
    assert!(FailedEventStore::list_unresolved(&pool, "flaky").await.unwrap().is_empty());
}
