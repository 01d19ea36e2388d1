//! # Core Errors
//!
//! Error types shared by the client and the manager. Context misuse, transport
//! failures and manager rejections each get their own type so callers can tell
//! an "unknown outcome" (the message may or may not have landed) from a
//! "known bad outcome" (the manager said no).

use crate::message::ErrorKind;
use std::time::Duration;

/// Boxed cause carried through the failure taxonomy.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Misuse of the propagation context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// A group-scoped operation was attempted while no group is active.
    #[error("non group id")]
    NoActiveGroup,
    /// The wire projection could not be decoded.
    #[error("malformed tracing projection: {0}")]
    Projection(String),
}

/// The messenger could not deliver a command or receive its reply.
///
/// Every variant means the outcome on the manager side is unknown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessengerError {
    #[error("manager channel closed")]
    Closed,
    #[error("manager dropped response channel")]
    Dropped,
    #[error("manager call timed out after {0:?}")]
    Timeout(Duration),
    #[error("codec error: {0}")]
    Codec(String),
}

/// The manager explicitly rejected a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ManagerError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ManagerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Outcome of a failed manager round trip, split along the two failure axes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageFailure {
    #[error(transparent)]
    Transport(#[from] MessengerError),
    #[error(transparent)]
    Business(#[from] ManagerError),
}

/// Local cleanup failed after the remote outcome was already decided.
///
/// Never escalated: it is logged and dropped by the lifecycle controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("clean transaction fail: {0}")]
pub struct ClearError(pub String);

/// Configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config source error: {0}")]
    Source(#[from] config::ConfigError),
    /// A loaded value is outside its allowed range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
