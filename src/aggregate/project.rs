//! The `project` aggregate (spec §GLOSSARY "Project"): a resource scoped to
//! one organization. Lighter command surface than [`crate::aggregate::user`]
//! or [`crate::aggregate::org`] — no deactivate/reactivate cycle, since a
//! project has no independent lifecycle beyond existing or being removed.

use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, Lifecycle};
use crate::store::UniqueConstraintOp;
use crate::types::AggregateType;

pub struct Project;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectLifecycle {
    #[default]
    Initial,
    Active,
    Removed,
}

impl Lifecycle for ProjectLifecycle {
    fn allows_commands(&self) -> bool {
        !matches!(self, Self::Removed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectState {
    pub name: Option<String>,
    pub org_id: Option<String>,
    pub lifecycle: ProjectLifecycle,
}

#[derive(Debug, Clone)]
pub enum ProjectCommand {
    Create { name: String, org_id: String },
    Rename { name: String },
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ProjectEvent {
    Created { name: String, org_id: String },
    Renamed { name: String },
    Removed,
}

impl crate::event::Event for ProjectEvent {}

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("project already exists")]
    AlreadyExists,

    #[error("name must not be empty")]
    EmptyName,

    #[error("command not allowed in the project's current lifecycle state")]
    NotActive,
}

impl Aggregate for Project {
    const NAME: AggregateType = AggregateType::Project;
    const VERSION: i32 = 1;

    type State = ProjectState;
    type Command = ProjectCommand;
    type Event = ProjectEvent;
    type Error = ProjectError;

    fn handle_command(state: &Self::State, command: Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProjectCommand::Create { name, org_id } => {
                if state.lifecycle != ProjectLifecycle::Initial {
                    return Err(ProjectError::AlreadyExists);
                }
                if name.trim().is_empty() {
                    return Err(ProjectError::EmptyName);
                }
                Ok(vec![ProjectEvent::Created { name, org_id }])
            }
            ProjectCommand::Rename { name } => {
                if state.lifecycle != ProjectLifecycle::Active {
                    return Err(ProjectError::NotActive);
                }
                if name.trim().is_empty() {
                    return Err(ProjectError::EmptyName);
                }
                Ok(vec![ProjectEvent::Renamed { name }])
            }
            ProjectCommand::Remove => {
                if state.lifecycle != ProjectLifecycle::Active {
                    return Err(ProjectError::NotActive);
                }
                Ok(vec![ProjectEvent::Removed])
            }
        }
    }

    fn apply_event(mut state: Self::State, event: Self::Event) -> Self::State {
        match event {
            ProjectEvent::Created { name, org_id } => {
                state.name = Some(name);
                state.org_id = Some(org_id);
                state.lifecycle = ProjectLifecycle::Active;
            }
            ProjectEvent::Renamed { name } => state.name = Some(name),
            ProjectEvent::Removed => state.lifecycle = ProjectLifecycle::Removed,
        }
        state
    }

    fn event_type(event: &Self::Event) -> &'static str {
        match event {
            ProjectEvent::Created { .. } => "project.created",
            ProjectEvent::Renamed { .. } => "project.renamed",
            ProjectEvent::Removed => "project.removed",
        }
    }

    fn unique_constraints(_event: &Self::Event) -> Vec<UniqueConstraintOp> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_remove() {
        let events = Project::handle_command(
            &ProjectState::default(),
            ProjectCommand::Create { name: "api".into(), org_id: "org-1".into() },
        )
        .unwrap();
        let state = Project::apply_event(ProjectState::default(), events.into_iter().next().unwrap());
        assert_eq!(state.lifecycle, ProjectLifecycle::Active);

        let events = Project::handle_command(&state, ProjectCommand::Remove).unwrap();
        let state = Project::apply_event(state, events.into_iter().next().unwrap());
        assert_eq!(state.lifecycle, ProjectLifecycle::Removed);
    }
}
