// Domain-level errors for session and replication workflows.

use super::peer::ObjectId;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session names must have at least the minimum length after trimming.
    InvalidSessionName,
    /// The session already holds the maximum number of peers.
    RoomFull,
    /// The runtime could not establish the session.
    StartFailed(String),
    /// No lobby record is available yet.
    LobbyMissing,
    /// Write attempted on an object owned by another peer.
    NotAuthority(ObjectId),
    UnknownObject(ObjectId),
    /// The outbound queue to the relay is saturated.
    SendQueueFull,
    /// The link to the relay is gone.
    Disconnected,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::InvalidSessionName => write!(f, "invalid session name"),
            SessionError::RoomFull => write!(f, "join rejected: room full"),
            SessionError::StartFailed(reason) => write!(f, "session start failed: {reason}"),
            SessionError::LobbyMissing => write!(f, "lobby state not available"),
            SessionError::NotAuthority(object) => {
                write!(f, "local peer has no authority over {object}")
            }
            SessionError::UnknownObject(object) => write!(f, "unknown object {object}"),
            SessionError::SendQueueFull => write!(f, "outbound queue full"),
            SessionError::Disconnected => write!(f, "disconnected from session"),
        }
    }
}

impl std::error::Error for SessionError {}
