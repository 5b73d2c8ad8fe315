use serde::Serialize;
use thiserror::Error;

use crate::registry::PermissionLevel;

/// Why a directive was not applied. The registry is untouched in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PatchRejection {
    #[error("there is no object named '{object}'")]
    UnknownObject { object: String },
    #[error("'{object}' has no function named '{function}'")]
    UnknownFunction { object: String, function: String },
    #[error("'{object}.{function}' is {level}; only editable functions can be patched")]
    PermissionDenied {
        object: String,
        function: String,
        level: PermissionLevel,
    },
    #[error("the code to replace was not found in '{object}.{function}'")]
    FragmentNotFound { object: String, function: String },
    #[error("the patched '{object}.{function}' does not parse: {message}")]
    InvalidSyntax {
        object: String,
        function: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnlockError {
    #[error("there is no object named '{object}'")]
    UnknownObject { object: String },
    #[error("'{object}' shows no function as '{shown}'")]
    UnknownFunction { object: String, shown: String },
    #[error("'{object}.{function}' is already editable")]
    AlreadyEditable { object: String, function: String },
    #[error("a {offered} key does not fit '{object}'")]
    WrongKey {
        object: String,
        required: Option<String>,
        offered: String,
    },
    #[error("no {kind} key left")]
    KeyExhausted { kind: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectError {
    #[error("there is no object named '{object}'")]
    UnknownObject { object: String },
    #[error("'{object}' shows no function as '{shown}'")]
    UnknownFunction { object: String, shown: String },
    #[error("the description of '{object}.{shown}' is not readable yet")]
    Hidden { object: String, shown: String },
}

/// Failures of a single chat-completion call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("server answered with status {0}")]
    Status(u16),
    #[error("could not decode the reply: {0}")]
    Decode(String),
}

impl TransportError {
    /// Timeouts and connection failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Timeout(_) | TransportError::Connection(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    #[error("analysis of '{object}' is still waiting for the agent")]
    AnalysisInFlight { object: String },
    #[error("the agent is still answering the previous message")]
    TurnInFlight,
    #[error("there is no unanswered message to retry")]
    NoPendingTurn,
    #[error("there is no object named '{0}'")]
    UnknownObject(String),
    #[error("the agent is offline")]
    Offline,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("there is no object named '{0}'")]
    UnknownObject(String),
    #[error("an object named '{0}' already exists")]
    NameTaken(String),
    #[error("'{0}' cannot be dragged")]
    NotDraggable(String),
}

/// A behavior call that raised an error or ran out of budget. Non-fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{object}.{function} failed: {message}")]
pub struct ExecutionFailure {
    pub object: String,
    pub function: String,
    pub message: String,
}
