//! The `instance` aggregate (spec §GLOSSARY "Instance"): the tenant itself.
//! An instance is provisioned once and only ever renamed or removed; it has
//! no separate active/inactive toggle because deactivating the tenant
//! boundary that every other aggregate is scoped by has no well-defined
//! meaning here.

use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, Lifecycle};
use crate::store::UniqueConstraintOp;
use crate::types::AggregateType;

pub struct Instance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstanceLifecycle {
    #[default]
    Initial,
    Active,
    Removed,
}

impl Lifecycle for InstanceLifecycle {
    fn allows_commands(&self) -> bool {
        !matches!(self, Self::Removed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstanceState {
    pub name: Option<String>,
    pub lifecycle: InstanceLifecycle,
}

#[derive(Debug, Clone)]
pub enum InstanceCommand {
    Provision { name: String },
    Rename { name: String },
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum InstanceEvent {
    Provisioned { name: String },
    Renamed { name: String },
    Removed { name: String },
}

impl crate::event::Event for InstanceEvent {}

#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    #[error("instance already provisioned")]
    AlreadyExists,

    #[error("name must not be empty")]
    EmptyName,

    #[error("command not allowed in the instance's current lifecycle state")]
    NotActive,
}

impl Aggregate for Instance {
    const NAME: AggregateType = AggregateType::Instance;
    const VERSION: i32 = 1;

    type State = InstanceState;
    type Command = InstanceCommand;
    type Event = InstanceEvent;
    type Error = InstanceError;

    fn handle_command(state: &Self::State, command: Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InstanceCommand::Provision { name } => {
                if state.lifecycle != InstanceLifecycle::Initial {
                    return Err(InstanceError::AlreadyExists);
                }
                if name.trim().is_empty() {
                    return Err(InstanceError::EmptyName);
                }
                Ok(vec![InstanceEvent::Provisioned { name }])
            }
            InstanceCommand::Rename { name } => {
                if state.lifecycle != InstanceLifecycle::Active {
                    return Err(InstanceError::NotActive);
                }
                if name.trim().is_empty() {
                    return Err(InstanceError::EmptyName);
                }
                Ok(vec![InstanceEvent::Renamed { name }])
            }
            InstanceCommand::Remove => {
                if state.lifecycle != InstanceLifecycle::Active {
                    return Err(InstanceError::NotActive);
                }
                let name = state.name.clone().expect("a provisioned instance always has a name");
                Ok(vec![InstanceEvent::Removed { name }])
            }
        }
    }

    fn apply_event(mut state: Self::State, event: Self::Event) -> Self::State {
        match event {
            InstanceEvent::Provisioned { name } => {
                state.name = Some(name);
                state.lifecycle = InstanceLifecycle::Active;
            }
            InstanceEvent::Renamed { name } => state.name = Some(name),
            InstanceEvent::Removed { .. } => state.lifecycle = InstanceLifecycle::Removed,
        }
        state
    }

    fn event_type(event: &Self::Event) -> &'static str {
        match event {
            InstanceEvent::Provisioned { .. } => "instance.provisioned",
            InstanceEvent::Renamed { .. } => "instance.renamed",
            InstanceEvent::Removed { .. } => "instance.removed",
        }
    }

    fn unique_constraints(event: &Self::Event) -> Vec<UniqueConstraintOp> {
        match event {
            InstanceEvent::Provisioned { name } => vec![UniqueConstraintOp::Add {
                unique_type: "instance.name".to_string(),
                unique_field: name.clone(),
                case_insensitive: true,
                error_message: format!("instance name {name} is already taken"),
            }],
            InstanceEvent::Removed { name } => vec![UniqueConstraintOp::Remove {
                unique_type: "instance.name".to_string(),
                unique_field: name.clone(),
                case_insensitive: true,
            }],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provision_then_rename() {
        let events = Instance::handle_command(
            &InstanceState::default(),
            InstanceCommand::Provision { name: "acme-prod".into() },
        )
        .unwrap();
        let state = Instance::apply_event(InstanceState::default(), events.into_iter().next().unwrap());
        assert_eq!(state.lifecycle, InstanceLifecycle::Active);

        let events = Instance::handle_command(&state, InstanceCommand::Rename { name: "acme-prod-2".into() }).unwrap();
        let state = Instance::apply_event(state, events.into_iter().next().unwrap());
        assert_eq!(state.name.as_deref(), Some("acme-prod-2"));
    }
}
