// Wire protocol frames for the relay WebSocket.
// Payloads reuse the use-case message types; only the envelope lives here.

use crate::domain::SessionError;
use crate::use_cases::{Delivery, JoinAccepted, PeerMessage};
use serde::{Deserialize, Serialize};

/// Frames the relay sends to a connected peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerFrame {
    // First frame after a successful join: identity plus session snapshot.
    Welcome(JoinAccepted),
    // Live session traffic, in relay order.
    Delivery(Delivery),
    // Join refused; the socket is closed right after.
    Rejected { reason: RejectReason },
}

/// Frames a peer sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientFrame {
    Message(PeerMessage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    RoomFull,
    InvalidSessionName,
    Unavailable,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::RoomFull => "room full",
            RejectReason::InvalidSessionName => "invalid session name",
            RejectReason::Unavailable => "session unavailable",
        }
    }
}

impl From<&SessionError> for RejectReason {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::RoomFull => RejectReason::RoomFull,
            SessionError::InvalidSessionName => RejectReason::InvalidSessionName,
            _ => RejectReason::Unavailable,
        }
    }
}

impl From<RejectReason> for SessionError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::RoomFull => SessionError::RoomFull,
            RejectReason::InvalidSessionName => SessionError::InvalidSessionName,
            RejectReason::Unavailable => SessionError::StartFailed(reason.as_str().to_string()),
        }
    }
}
