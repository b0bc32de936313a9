//! The `policy` aggregate (spec §GLOSSARY "Policy"): a named access rule
//! attached to a resource owner. Same `Initial -> Active -> Removed` shape
//! as [`crate::aggregate::project`] — policies are versioned by replacing
//! their statement, not by a separate active/inactive toggle.

use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, Lifecycle};
use crate::store::UniqueConstraintOp;
use crate::types::AggregateType;

pub struct Policy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyLifecycle {
    #[default]
    Initial,
    Active,
    Removed,
}

impl Lifecycle for PolicyLifecycle {
    fn allows_commands(&self) -> bool {
        !matches!(self, Self::Removed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PolicyState {
    pub name: Option<String>,
    pub statement: Option<serde_json::Value>,
    pub lifecycle: PolicyLifecycle,
}

#[derive(Debug, Clone)]
pub enum PolicyCommand {
    Create { name: String, statement: serde_json::Value },
    UpdateStatement { statement: serde_json::Value },
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum PolicyEvent {
    Created { name: String, statement: serde_json::Value },
    StatementUpdated { statement: serde_json::Value },
    Removed,
}

impl crate::event::Event for PolicyEvent {}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("policy already exists")]
    AlreadyExists,

    #[error("name must not be empty")]
    EmptyName,

    #[error("command not allowed in the policy's current lifecycle state")]
    NotActive,
}

impl Aggregate for Policy {
    const NAME: AggregateType = AggregateType::Policy;
    const VERSION: i32 = 1;

    type State = PolicyState;
    type Command = PolicyCommand;
    type Event = PolicyEvent;
    type Error = PolicyError;

    fn handle_command(state: &Self::State, command: Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PolicyCommand::Create { name, statement } => {
                if state.lifecycle != PolicyLifecycle::Initial {
                    return Err(PolicyError::AlreadyExists);
                }
                if name.trim().is_empty() {
                    return Err(PolicyError::EmptyName);
                }
                Ok(vec![PolicyEvent::Created { name, statement }])
            }
            PolicyCommand::UpdateStatement { statement } => {
                if state.lifecycle != PolicyLifecycle::Active {
                    return Err(PolicyError::NotActive);
                }
                Ok(vec![PolicyEvent::StatementUpdated { statement }])
            }
            PolicyCommand::Remove => {
                if state.lifecycle != PolicyLifecycle::Active {
                    return Err(PolicyError::NotActive);
                }
                Ok(vec![PolicyEvent::Removed])
            }
        }
    }

    fn apply_event(mut state: Self::State, event: Self::Event) -> Self::State {
        match event {
            PolicyEvent::Created { name, statement } => {
                state.name = Some(name);
                state.statement = Some(statement);
                state.lifecycle = PolicyLifecycle::Active;
            }
            PolicyEvent::StatementUpdated { statement } => state.statement = Some(statement),
            PolicyEvent::Removed => state.lifecycle = PolicyLifecycle::Removed,
        }
        state
    }

    fn event_type(event: &Self::Event) -> &'static str {
        match event {
            PolicyEvent::Created { .. } => "policy.created",
            PolicyEvent::StatementUpdated { .. } => "policy.statement_updated",
            PolicyEvent::Removed => "policy.removed",
        }
    }

    fn unique_constraints(_event: &Self::Event) -> Vec<UniqueConstraintOp> {
        Vec::new()
    }
}
