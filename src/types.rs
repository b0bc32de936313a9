use std::fmt;

/// Per-aggregate, 1-based, gapless ordering (§3 "Sequence").
pub type SequenceNumber = i64;

/// Global, strictly monotonic ordering across the whole event log (§3 "Position").
///
/// Assigned as `tx_position * 1000 + in_tx_order` (see DESIGN.md, Open Questions):
/// the high digits come from a single `BIGSERIAL` drawn once per `push`
/// transaction, the low three digits break ties between events committed by
/// the same transaction in caller-supplied order.
pub type Position = i64;

pub(crate) const IN_TX_ORDER_WIDTH: i64 = 1000;

/// The outermost tenant boundary. Every persisted row is scoped by it.
pub type InstanceId = String;

/// The owning organization of an aggregate within an instance (§3 "Resource Owner").
pub type ResourceOwnerId = String;

/// Tagged union over the aggregate types known to this core (§9 "Polymorphism
/// across aggregate types" — modeled as a tagged variant, not an inheritance
/// tree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateType {
    User,
    Org,
    Project,
    Instance,
    Session,
    Policy,
}

impl AggregateType {
    /// The dotted, stable name used as the leading component of event types
    /// and as the `aggregate_type` column value.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Org => "org",
            Self::Project => "project",
            Self::Instance => "instance",
            Self::Session => "session",
            Self::Policy => "policy",
        }
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AggregateType {
    type Err = UnknownAggregateType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "org" => Ok(Self::Org),
            "project" => Ok(Self::Project),
            "instance" => Ok(Self::Instance),
            "session" => Ok(Self::Session),
            "policy" => Ok(Self::Policy),
            other => Err(UnknownAggregateType(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown aggregate type: {0}")]
pub struct UnknownAggregateType(pub String);

/// Identifies who (human or service) caused a command to be executed.
/// Carried verbatim onto every event the command produces (§3 `editor_user`/`editor_service`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Editor {
    pub user: Option<String>,
    pub service: Option<String>,
}

impl Editor {
    pub fn user(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            service: None,
        }
    }

    pub fn service(service: impl Into<String>) -> Self {
        Self {
            user: None,
            service: Some(service.into()),
        }
    }
}
