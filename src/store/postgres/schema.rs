//! DDL for the shared `events` table, the global position sequence, the
//! unique-constraint registry, and the projection bookkeeping tables (spec
//! §6 "Persisted layout").

/// Table shared by every aggregate type, unlike the teacher crate's
/// per-aggregate-type `{name}_events` tables: spec §3 keys events by
/// `(instance_id, aggregate_type, aggregate_id)`, not by a table-per-type
/// split, because the global `position` must order across aggregate types.
pub const CREATE_EVENTS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS events
(
    position            BIGINT      NOT NULL,
    sequence            BIGINT      NOT NULL,
    instance_id         TEXT        NOT NULL,
    aggregate_type      TEXT        NOT NULL,
    aggregate_id        TEXT        NOT NULL,
    aggregate_version   INT         NOT NULL,
    event_type          TEXT        NOT NULL,
    payload             JSONB       NOT NULL,
    editor_user         TEXT,
    editor_service      TEXT,
    resource_owner      TEXT        NOT NULL,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT current_timestamp,
    command_id          UUID        NOT NULL,
    CONSTRAINT events_pkey PRIMARY KEY (position),
    CONSTRAINT events_aggregate_sequence_key
        UNIQUE (instance_id, aggregate_type, aggregate_id, sequence)
)";

pub const CREATE_EVENTS_POSITION_INDEX: &str = "
CREATE INDEX IF NOT EXISTS events_position_idx ON events (position)";

pub const CREATE_EVENTS_TYPE_INDEX: &str = "
CREATE INDEX IF NOT EXISTS events_instance_event_type_idx ON events (instance_id, event_type)";

pub const CREATE_EVENTS_COMMAND_INDEX: &str = "
CREATE INDEX IF NOT EXISTS events_command_id_idx ON events (command_id)";

/// Backs [`crate::types::Position`] assignment: one value is drawn per
/// `push` transaction (not per event), see DESIGN.md.
pub const CREATE_POSITION_SEQUENCE: &str = "
CREATE SEQUENCE IF NOT EXISTS event_store_tx_position";

pub const CREATE_UNIQUE_CONSTRAINTS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS unique_constraints
(
    instance_id     TEXT NOT NULL,
    unique_type     TEXT NOT NULL,
    unique_field    TEXT NOT NULL,
    aggregate_id    TEXT NOT NULL,
    CONSTRAINT unique_constraints_pkey PRIMARY KEY (instance_id, unique_type, unique_field)
)";

pub const CREATE_PROJECTION_POSITIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS projection_positions
(
    projection_name     TEXT        NOT NULL,
    instance_id         TEXT        NOT NULL,
    last_processed_position BIGINT  NOT NULL,
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT current_timestamp,
    CONSTRAINT projection_positions_pkey PRIMARY KEY (projection_name, instance_id)
)";

pub const CREATE_PROJECTION_LOCKS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS projection_locks
(
    projection_name TEXT        NOT NULL,
    instance_id     TEXT        NOT NULL,
    worker_id       TEXT        NOT NULL,
    acquired_at     TIMESTAMPTZ NOT NULL,
    ttl_seconds     INT         NOT NULL,
    CONSTRAINT projection_locks_pkey PRIMARY KEY (projection_name, instance_id)
)";

pub const CREATE_FAILED_EVENTS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS projection_failed_events
(
    projection_name TEXT        NOT NULL,
    failed_sequence BIGINT      NOT NULL,
    instance_id     TEXT        NOT NULL,
    failure_count   INT         NOT NULL,
    last_error      TEXT        NOT NULL,
    event_type      TEXT        NOT NULL,
    aggregate_type  TEXT        NOT NULL,
    aggregate_id    TEXT        NOT NULL,
    first_failed_at TIMESTAMPTZ NOT NULL,
    last_failed_at  TIMESTAMPTZ NOT NULL,
    skipped         BOOLEAN     NOT NULL DEFAULT false,
    CONSTRAINT projection_failed_events_pkey PRIMARY KEY (projection_name, failed_sequence, instance_id)
)";

/// Read model backing [`crate::projection::UsersProjection`].
pub const CREATE_USERS_READ_MODEL_TABLE: &str = "
CREATE TABLE IF NOT EXISTS users_read_model
(
    instance_id     TEXT        NOT NULL,
    user_id         TEXT        NOT NULL,
    username        TEXT        NOT NULL,
    email           TEXT        NOT NULL,
    email_verified  BOOLEAN     NOT NULL,
    first_name      TEXT        NOT NULL,
    last_name       TEXT        NOT NULL,
    status          TEXT        NOT NULL,
    updated_at      TIMESTAMPTZ NOT NULL,
    CONSTRAINT users_read_model_pkey PRIMARY KEY (instance_id, user_id)
)";

/// Read model backing [`crate::projection::OrgsProjection`].
pub const CREATE_ORGS_READ_MODEL_TABLE: &str = "
CREATE TABLE IF NOT EXISTS orgs_read_model
(
    instance_id     TEXT        NOT NULL,
    org_id          TEXT        NOT NULL,
    name            TEXT        NOT NULL,
    status          TEXT        NOT NULL,
    updated_at      TIMESTAMPTZ NOT NULL,
    CONSTRAINT orgs_read_model_pkey PRIMARY KEY (instance_id, org_id)
)";

/// All statements run once at store startup, in order. Mirrors
/// `esrs::store::postgres::PgStoreBuilder::try_build`'s migration step, but
/// as one fixed migration list instead of one generated per aggregate name,
/// since this store's table is shared.
pub const MIGRATIONS: &[&str] = &[
    CREATE_POSITION_SEQUENCE,
    CREATE_EVENTS_TABLE,
    CREATE_EVENTS_POSITION_INDEX,
    CREATE_EVENTS_TYPE_INDEX,
    CREATE_EVENTS_COMMAND_INDEX,
    CREATE_UNIQUE_CONSTRAINTS_TABLE,
    CREATE_PROJECTION_POSITIONS_TABLE,
    CREATE_PROJECTION_LOCKS_TABLE,
    CREATE_FAILED_EVENTS_TABLE,
    CREATE_USERS_READ_MODEL_TABLE,
    CREATE_ORGS_READ_MODEL_TABLE,
];
