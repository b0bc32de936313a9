//! The `session` aggregate (spec §GLOSSARY "Session"): a login session tied
//! to one user. Deliberately two-state (`Active`/`Terminated`, no
//! `Inactive`) — a session that isn't active is over, there is nothing to
//! reactivate.

use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, Lifecycle};
use crate::store::UniqueConstraintOp;
use crate::types::AggregateType;

pub struct Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionLifecycle {
    #[default]
    Initial,
    Active,
    Terminated,
}

impl Lifecycle for SessionLifecycle {
    fn allows_commands(&self) -> bool {
        !matches!(self, Self::Terminated)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub user_id: Option<String>,
    pub lifecycle: SessionLifecycle,
}

#[derive(Debug, Clone)]
pub enum SessionCommand {
    Start { user_id: String },
    Touch,
    Terminate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum SessionEvent {
    Started { user_id: String },
    Touched,
    Terminated,
}

impl crate::event::Event for SessionEvent {}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session already started")]
    AlreadyStarted,

    #[error("command not allowed in the session's current lifecycle state")]
    NotActive,
}

impl Aggregate for Session {
    const NAME: AggregateType = AggregateType::Session;
    const VERSION: i32 = 1;

    type State = SessionState;
    type Command = SessionCommand;
    type Event = SessionEvent;
    type Error = SessionError;

    fn handle_command(state: &Self::State, command: Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SessionCommand::Start { user_id } => {
                if state.lifecycle != SessionLifecycle::Initial {
                    return Err(SessionError::AlreadyStarted);
                }
                Ok(vec![SessionEvent::Started { user_id }])
            }
            SessionCommand::Touch => {
                if state.lifecycle != SessionLifecycle::Active {
                    return Err(SessionError::NotActive);
                }
                Ok(vec![SessionEvent::Touched])
            }
            SessionCommand::Terminate => {
                if state.lifecycle != SessionLifecycle::Active {
                    return Err(SessionError::NotActive);
                }
                Ok(vec![SessionEvent::Terminated])
            }
        }
    }

    fn apply_event(mut state: Self::State, event: Self::Event) -> Self::State {
        match event {
            SessionEvent::Started { user_id } => {
                state.user_id = Some(user_id);
                state.lifecycle = SessionLifecycle::Active;
            }
            SessionEvent::Touched => {}
            SessionEvent::Terminated => state.lifecycle = SessionLifecycle::Terminated,
        }
        state
    }

    fn event_type(event: &Self::Event) -> &'static str {
        match event {
            SessionEvent::Started { .. } => "session.started",
            SessionEvent::Touched => "session.touched",
            SessionEvent::Terminated => "session.terminated",
        }
    }

    fn unique_constraints(_event: &Self::Event) -> Vec<UniqueConstraintOp> {
        Vec::new()
    }
}
