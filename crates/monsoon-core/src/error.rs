//! Error taxonomy for the streaming core.
//!
//! None of these are fatal. Provider failures surface as an empty view,
//! malformed and stale deliveries are dropped, and command failures are
//! reported back to whoever issued the command.

use std::fmt;

use crate::session::SessionState;

/// Errors produced by the core and its provider boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The start request could not be issued or was not acknowledged.
    ProviderUnavailable(String),
    /// A delivered snapshot failed shape validation.
    MalformedSnapshot(String),
    /// A delivery arrived after its session was stopped.
    StaleDelivery,
    /// A side-effecting command (e.g. kill) was rejected.
    CommandFailure(String),
    /// A session lifecycle transition that the state machine forbids.
    InvalidTransition { from: SessionState, to: SessionState },
    /// Topic name that does not match any known stream or static record.
    UnknownTopic(String),
    /// Column name that the topic does not expose.
    UnknownColumn(String),
    /// A view or configuration value that could not be parsed or is out of
    /// range.
    InvalidParameter(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProviderUnavailable(reason) => write!(f, "provider unavailable: {reason}"),
            Self::MalformedSnapshot(reason) => write!(f, "malformed snapshot: {reason}"),
            Self::StaleDelivery => write!(f, "delivery arrived after session stop"),
            Self::CommandFailure(reason) => write!(f, "command failed: {reason}"),
            Self::InvalidTransition { from, to } => {
                write!(f, "invalid session transition {from} -> {to}")
            }
            Self::UnknownTopic(name) => write!(f, "unknown topic '{name}'"),
            Self::UnknownColumn(name) => write!(f, "unknown column '{name}'"),
            Self::InvalidParameter(what) => write!(f, "invalid {what}"),
        }
    }
}

impl std::error::Error for Error {}

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, Error>;
