//! # Manager Commands
//!
//! This module defines the request/response vocabulary spoken between a
//! client and the manager, plus the opaque frame that carries it over a
//! channel.
//!
//! Commands and replies are plain serde types. The transport never looks
//! inside them: [`ChannelMessenger`](crate::messenger::ChannelMessenger)
//! encodes a command into a [`Frame`] and the manager decodes it on the other
//! side, so the in-process transport exercises the same codec a socket
//! transport would.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;

/// Local transaction outcome of one unit, and the final outcome of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Rollback,
    Commit,
}

impl TransactionState {
    /// Maps a business outcome onto the state reported to the manager.
    pub fn from_outcome<T, E>(outcome: &Result<T, E>) -> Self {
        match outcome {
            Ok(_) => TransactionState::Commit,
            Err(_) => TransactionState::Rollback,
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Rollback => write!(f, "rollback"),
            TransactionState::Commit => write!(f, "commit"),
        }
    }
}

/// A command sent by a client to the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ManagerCommand {
    CreateGroup {
        group_id: String,
    },
    JoinGroup {
        group_id: String,
        unit_id: String,
        unit_type: String,
        requester_identity: String,
        local_state: TransactionState,
    },
    NotifyGroup {
        group_id: String,
        state: TransactionState,
    },
    CheckJoin {
        group_id: String,
        unit_id: String,
    },
}

impl ManagerCommand {
    pub fn group_id(&self) -> &str {
        match self {
            ManagerCommand::CreateGroup { group_id }
            | ManagerCommand::JoinGroup { group_id, .. }
            | ManagerCommand::NotifyGroup { group_id, .. }
            | ManagerCommand::CheckJoin { group_id, .. } => group_id,
        }
    }

    /// Short command name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ManagerCommand::CreateGroup { .. } => "create-group",
            ManagerCommand::JoinGroup { .. } => "join-group",
            ManagerCommand::NotifyGroup { .. } => "notify-group",
            ManagerCommand::CheckJoin { .. } => "check-join",
        }
    }
}

/// Classification of a manager-side rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DuplicateGroup,
    UnknownGroup,
    GroupNotOpen,
    GroupNotNotified,
    MalformedCommand,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::DuplicateGroup => "duplicate group",
            ErrorKind::UnknownGroup => "unknown group",
            ErrorKind::GroupNotOpen => "group not open",
            ErrorKind::GroupNotNotified => "group not notified",
            ErrorKind::MalformedCommand => "malformed command",
        };
        f.write_str(name)
    }
}

/// The manager's answer to a [`ManagerCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ManagerReply {
    Ok,
    Present,
    Absent,
    Error { kind: ErrorKind, message: String },
}

impl ManagerReply {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        ManagerReply::Error {
            kind,
            message: message.into(),
        }
    }
}

/// Type alias for the one-shot channel a reply frame travels back on.
pub type Responder = oneshot::Sender<Vec<u8>>;

/// An encoded command in flight, paired with the channel for its encoded reply.
#[derive(Debug)]
pub struct Frame {
    pub payload: Vec<u8>,
    pub respond_to: Responder,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_outcome() {
        let ok: Result<u8, ()> = Ok(1);
        let err: Result<u8, ()> = Err(());
        assert_eq!(TransactionState::from_outcome(&ok), TransactionState::Commit);
        assert_eq!(TransactionState::from_outcome(&err), TransactionState::Rollback);
    }

    #[test]
    fn test_command_group_id_and_kind() {
        let cmd = ManagerCommand::JoinGroup {
            group_id: "G1".into(),
            unit_id: "U2".into(),
            unit_type: "lcn".into(),
            requester_identity: "inventory".into(),
            local_state: TransactionState::Commit,
        };
        assert_eq!(cmd.group_id(), "G1");
        assert_eq!(cmd.kind(), "join-group");
    }

    #[test]
    fn test_command_wire_shape_is_tagged() {
        let cmd = ManagerCommand::NotifyGroup {
            group_id: "G1".into(),
            state: TransactionState::Rollback,
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["cmd"], "notify_group");
        assert_eq!(json["state"], "rollback");
    }
}
