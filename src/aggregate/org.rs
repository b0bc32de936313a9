//! The `org` aggregate (spec §GLOSSARY "Organization"). Same
//! `Initial -> Active -> Inactive -> Removed` shape as [`crate::aggregate::user`]
//! but with a narrower command surface.

use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, Lifecycle};
use crate::store::UniqueConstraintOp;
use crate::types::AggregateType;

pub struct Org;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrgLifecycle {
    #[default]
    Initial,
    Active,
    Inactive,
    Removed,
}

impl Lifecycle for OrgLifecycle {
    fn allows_commands(&self) -> bool {
        !matches!(self, Self::Removed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrgState {
    pub name: Option<String>,
    pub lifecycle: OrgLifecycle,
}

#[derive(Debug, Clone)]
pub enum OrgCommand {
    Create { name: String },
    Rename { name: String },
    Deactivate,
    Reactivate,
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum OrgEvent {
    Created { name: String },
    Renamed { name: String },
    Deactivated,
    Reactivated,
    Removed { name: String },
}

impl crate::event::Event for OrgEvent {}

#[derive(Debug, thiserror::Error)]
pub enum OrgError {
    #[error("org already exists")]
    AlreadyExists,

    #[error("name must not be empty")]
    EmptyName,

    #[error("command not allowed in the org's current lifecycle state")]
    NotActive,
}

impl Aggregate for Org {
    const NAME: AggregateType = AggregateType::Org;
    const VERSION: i32 = 1;

    type State = OrgState;
    type Command = OrgCommand;
    type Event = OrgEvent;
    type Error = OrgError;

    fn handle_command(state: &Self::State, command: Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrgCommand::Create { name } => {
                if state.lifecycle != OrgLifecycle::Initial {
                    return Err(OrgError::AlreadyExists);
                }
                if name.trim().is_empty() {
                    return Err(OrgError::EmptyName);
                }
                Ok(vec![OrgEvent::Created { name }])
            }
            OrgCommand::Rename { name } => {
                if state.lifecycle != OrgLifecycle::Active {
                    return Err(OrgError::NotActive);
                }
                if name.trim().is_empty() {
                    return Err(OrgError::EmptyName);
                }
                Ok(vec![OrgEvent::Renamed { name }])
            }
            OrgCommand::Deactivate => {
                if state.lifecycle != OrgLifecycle::Active {
                    return Err(OrgError::NotActive);
                }
                Ok(vec![OrgEvent::Deactivated])
            }
            OrgCommand::Reactivate => {
                if state.lifecycle != OrgLifecycle::Inactive {
                    return Err(OrgError::NotActive);
                }
                Ok(vec![OrgEvent::Reactivated])
            }
            OrgCommand::Remove => {
                if !matches!(state.lifecycle, OrgLifecycle::Active | OrgLifecycle::Inactive) {
                    return Err(OrgError::NotActive);
                }
                let name = state.name.clone().expect("an org past Initial always has a name");
                Ok(vec![OrgEvent::Removed { name }])
            }
        }
    }

    fn apply_event(mut state: Self::State, event: Self::Event) -> Self::State {
        match event {
            OrgEvent::Created { name } => {
                state.name = Some(name);
                state.lifecycle = OrgLifecycle::Active;
            }
            OrgEvent::Renamed { name } => state.name = Some(name),
            OrgEvent::Deactivated => state.lifecycle = OrgLifecycle::Inactive,
            OrgEvent::Reactivated => state.lifecycle = OrgLifecycle::Active,
            OrgEvent::Removed { .. } => state.lifecycle = OrgLifecycle::Removed,
        }
        state
    }

    fn event_type(event: &Self::Event) -> &'static str {
        match event {
            OrgEvent::Created { .. } => "org.created",
            OrgEvent::Renamed { .. } => "org.renamed",
            OrgEvent::Deactivated => "org.deactivated",
            OrgEvent::Reactivated => "org.reactivated",
            OrgEvent::Removed { .. } => "org.removed",
        }
    }

    fn unique_constraints(event: &Self::Event) -> Vec<UniqueConstraintOp> {
        match event {
            OrgEvent::Created { name } => vec![UniqueConstraintOp::Add {
                unique_type: "org.name".to_string(),
                unique_field: name.clone(),
                case_insensitive: true,
                error_message: format!("org name {name} is already taken"),
            }],
            OrgEvent::Removed { name } => vec![UniqueConstraintOp::Remove {
                unique_type: "org.name".to_string(),
                unique_field: name.clone(),
                case_insensitive: true,
            }],
            _ => Vec::new(),
        }
    }
}
