use crate::core::{MarineId, MeleeWeapon, OwnedMarine, SpaceMarine};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single collection operation. Each variant carries only the payload it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Add(SpaceMarine),
    Update { id: MarineId, marine: SpaceMarine },
    RemoveById(MarineId),
    RemoveHead,
    RemoveGreater(SpaceMarine),
    /// `0` stands for "no height supplied".
    RemoveAnyByHeight(i64),
    AddIfMin(SpaceMarine),
    Clear,
    Show,
    Info,
    AverageOfHeight,
    CountGreaterThan(MeleeWeapon),
}

impl Command {
    /// Console name of the command, used in logs and usage messages.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Add(_) => "add",
            Command::Update { .. } => "update",
            Command::RemoveById(_) => "remove_by_id",
            Command::RemoveHead => "remove_head",
            Command::RemoveGreater(_) => "remove_greater",
            Command::RemoveAnyByHeight(_) => "remove_any_by_height",
            Command::AddIfMin(_) => "add_if_min",
            Command::Clear => "clear",
            Command::Show => "show",
            Command::Info => "info",
            Command::AverageOfHeight => "average_of_height",
            Command::CountGreaterThan(_) => "count_greater_than_melee_weapon",
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Command::Show | Command::Info | Command::AverageOfHeight | Command::CountGreaterThan(_)
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Client to server message: an optional command plus the caller's credentials.
/// A missing command means the envelope is a handshake step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub command: Option<Command>,
    pub login: String,
    pub password: Option<String>,
}

impl Envelope {
    /// "Is this login free?"
    pub fn login_check(login: impl Into<String>) -> Self {
        Self {
            command: None,
            login: login.into(),
            password: None,
        }
    }

    /// Register (login free) or authenticate (login taken).
    pub fn credentials(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            command: None,
            login: login.into(),
            password: Some(password.into()),
        }
    }

    pub fn command(command: Command, login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            command: Some(command),
            login: login.into(),
            password: Some(password.into()),
        }
    }

    pub fn is_handshake(&self) -> bool {
        self.command.is_none()
    }
}

/// Server to client message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    Nothing,
    Bool(bool),
    Text(String),
    Owned(OwnedMarine),
    /// The request reached the server but could not be carried out.
    Fault(String),
}

impl Reply {
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Nothing => "nothing",
            Reply::Bool(_) => "boolean",
            Reply::Text(_) => "string",
            Reply::Owned(_) => "owned marine",
            Reply::Fault(_) => "fault",
        }
    }
}

impl From<Option<OwnedMarine>> for Reply {
    fn from(value: Option<OwnedMarine>) -> Self {
        value.map(Reply::Owned).unwrap_or(Reply::Nothing)
    }
}
