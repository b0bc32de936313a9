//! The `user` aggregate: the richest worked example of the write model
//! (spec §4.3, §GLOSSARY "User"). FSM: `Initial -> Active -> Inactive ->
//! Removed`, with `Active <-> Inactive` reachable back and forth but
//! `Removed` terminal.

use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, Lifecycle};
use crate::store::UniqueConstraintOp;
use crate::types::AggregateType;

/// Marker type implementing [`Aggregate`]; carries no data of its own.
pub struct User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserLifecycle {
    #[default]
    Initial,
    Active,
    Inactive,
    Removed,
}

impl Lifecycle for UserLifecycle {
    fn allows_commands(&self) -> bool {
        !matches!(self, Self::Removed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserState {
    pub username: Option<String>,
    pub email: Option<String>,
    pub email_verified: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: Option<Vec<u8>>,
    pub lifecycle: UserLifecycle,
}

#[derive(Debug, Clone)]
pub enum UserCommand {
    /// Provisions a human user. Only legal from `Initial`.
    AddHuman {
        username: String,
        email: String,
        first_name: String,
        last_name: String,
        password_hash: Option<Vec<u8>>,
    },
    ChangeEmail { email: String },
    VerifyEmail,
    Deactivate,
    Reactivate,
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum UserEvent {
    HumanAdded {
        username: String,
        email: String,
        first_name: String,
        last_name: String,
        password_hash: Option<Vec<u8>>,
    },
    EmailChanged {
        email: String,
    },
    EmailVerified,
    Deactivated,
    Reactivated,
    /// Carries `username` so the Command Engine can release the unique
    /// constraint reserved by `HumanAdded` without re-reading state.
    Removed {
        username: String,
    },
}

impl crate::event::Event for UserEvent {}

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("user already exists")]
    AlreadyExists,

    #[error("username must not be empty")]
    EmptyUsername,

    #[error("email must not be empty")]
    EmptyEmail,

    #[error("command not allowed in the user's current lifecycle state")]
    NotActive,
}

impl Aggregate for User {
    const NAME: AggregateType = AggregateType::User;
    const VERSION: i32 = 1;

    type State = UserState;
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = UserError;

    fn handle_command(state: &Self::State, command: Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::AddHuman {
                username,
                email,
                first_name,
                last_name,
                password_hash,
            } => {
                if state.lifecycle != UserLifecycle::Initial {
                    return Err(UserError::AlreadyExists);
                }
                if username.trim().is_empty() {
                    return Err(UserError::EmptyUsername);
                }
                if email.trim().is_empty() {
                    return Err(UserError::EmptyEmail);
                }
                Ok(vec![UserEvent::HumanAdded {
                    username,
                    email,
                    first_name,
                    last_name,
                    password_hash,
                }])
            }
            UserCommand::ChangeEmail { email } => {
                if state.lifecycle != UserLifecycle::Active {
                    return Err(UserError::NotActive);
                }
                if email.trim().is_empty() {
                    return Err(UserError::EmptyEmail);
                }
                Ok(vec![UserEvent::EmailChanged { email }])
            }
            UserCommand::VerifyEmail => {
                if state.lifecycle != UserLifecycle::Active {
                    return Err(UserError::NotActive);
                }
                Ok(vec![UserEvent::EmailVerified])
            }
            UserCommand::Deactivate => {
                if state.lifecycle != UserLifecycle::Active {
                    return Err(UserError::NotActive);
                }
                Ok(vec![UserEvent::Deactivated])
            }
            UserCommand::Reactivate => {
                if state.lifecycle != UserLifecycle::Inactive {
                    return Err(UserError::NotActive);
                }
                Ok(vec![UserEvent::Reactivated])
            }
            UserCommand::Remove => {
                if !matches!(state.lifecycle, UserLifecycle::Active | UserLifecycle::Inactive) {
                    return Err(UserError::NotActive);
                }
                let username = state
                    .username
                    .clone()
                    .expect("a user past Initial always has a username");
                Ok(vec![UserEvent::Removed { username }])
            }
        }
    }

    fn apply_event(mut state: Self::State, event: Self::Event) -> Self::State {
        match event {
            UserEvent::HumanAdded {
                username,
                email,
                first_name,
                last_name,
                password_hash,
            } => {
                state.username = Some(username);
                state.email = Some(email);
                state.email_verified = false;
                state.first_name = Some(first_name);
                state.last_name = Some(last_name);
                state.password_hash = password_hash;
                state.lifecycle = UserLifecycle::Active;
            }
            UserEvent::EmailChanged { email } => {
                state.email = Some(email);
                state.email_verified = false;
            }
            UserEvent::EmailVerified => state.email_verified = true,
            UserEvent::Deactivated => state.lifecycle = UserLifecycle::Inactive,
            UserEvent::Reactivated => state.lifecycle = UserLifecycle::Active,
            UserEvent::Removed { .. } => {
                state.lifecycle = UserLifecycle::Removed;
                state.password_hash = None;
            }
        }
        state
    }

    fn event_type(event: &Self::Event) -> &'static str {
        match event {
            UserEvent::HumanAdded { .. } => "user.human_added",
            UserEvent::EmailChanged { .. } => "user.email_changed",
            UserEvent::EmailVerified => "user.email_verified",
            UserEvent::Deactivated => "user.deactivated",
            UserEvent::Reactivated => "user.reactivated",
            UserEvent::Removed { .. } => "user.removed",
        }
    }

    fn unique_constraints(event: &Self::Event) -> Vec<UniqueConstraintOp> {
        match event {
            UserEvent::HumanAdded { username, .. } => vec![UniqueConstraintOp::Add {
                unique_type: "user.username".to_string(),
                unique_field: username.clone(),
                case_insensitive: true,
                error_message: format!("username {username} is already taken"),
            }],
            UserEvent::Removed { username } => vec![UniqueConstraintOp::Remove {
                unique_type: "user.username".to_string(),
                unique_field: username.clone(),
                case_insensitive: true,
            }],
            _ => Vec::new(),
        }
    }
}
