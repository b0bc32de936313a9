//! Multi-tenant identity and access management core: an append-only Event
//! Store, a Command Engine that validates intent and replays aggregate
//! state, a Projection Engine that derives read models asynchronously, and
//! a small Unique Constraint Registry shared by all three.
//!
//! This crate is the write/read-model core only. HTTP/gRPC handlers, OIDC
//! flows, notifications, password hashing and encryption implementations,
//! id generation, and config loading all live in the service that embeds
//! it; this crate exposes trait seams for them (see [`services`]) rather
//! than implementations.

pub mod aggregate;
pub mod command;
pub mod error;
pub mod event;
pub mod services;
pub mod store;
pub mod types;

#[cfg(feature = "postgres")]
pub mod projection;
#[cfg(feature = "postgres")]
pub mod query;

pub use aggregate::{Aggregate, AggregateState, Lifecycle};
pub use command::{Command, CommandEngine};
pub use error::{CommandError, QueryError, StoreError};
pub use event::{Event, EventFilter, StoreEvent};
pub use store::{EventStore, EventWrite, PushRequest, UniqueConstraintOp};
pub use types::{AggregateType, Editor, InstanceId, Position, ResourceOwnerId, SequenceNumber};

#[cfg(feature = "postgres")]
pub use error::ProjectionError;
#[cfg(feature = "postgres")]
pub use store::postgres::{PgEventStore, PgEventStoreBuilder};
