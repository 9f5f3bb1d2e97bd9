// Use-case level messages exchanged between peers and the relay.

use crate::domain::{LobbyState, ObjectId, PeerRef, Vec3};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Replicated fields of a player avatar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AvatarState {
    pub position: Vec3,
    /// Pointer position of the God peer, piggy-backed on that peer's avatar.
    pub god_cursor: Vec3,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NpcState {
    pub position: Vec3,
}

/// State carried by a networked object. The variant doubles as the object kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "state")]
pub enum ObjectState {
    Lobby(LobbyState),
    Avatar(AvatarState),
    Npc(NpcState),
}

impl ObjectState {
    pub fn position(&self) -> Option<Vec3> {
        match self {
            ObjectState::Avatar(avatar) => Some(avatar.position),
            ObjectState::Npc(npc) => Some(npc.position),
            ObjectState::Lobby(_) => None,
        }
    }

    /// Copy of the state with its position replaced; lobbies are returned unchanged.
    pub fn with_position(mut self, position: Vec3) -> Self {
        match &mut self {
            ObjectState::Avatar(avatar) => avatar.position = position,
            ObjectState::Npc(npc) => npc.position = position,
            ObjectState::Lobby(_) => {}
        }
        self
    }

    pub fn as_lobby(&self) -> Option<&LobbyState> {
        match self {
            ObjectState::Lobby(lobby) => Some(lobby),
            _ => None,
        }
    }

    pub fn as_avatar(&self) -> Option<&AvatarState> {
        match self {
            ObjectState::Avatar(avatar) => Some(avatar),
            _ => None,
        }
    }
}

/// Remote calls executed by the authority holder of the lobby record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum LobbyCall {
    SelectRole { peer: PeerRef, want_god: bool },
    StartGame,
}

/// Messages a peer sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    Spawn { object: ObjectId, state: ObjectState },
    Despawn { object: ObjectId },
    Update { object: ObjectId, state: ObjectState },
    SetPlayerObject { object: ObjectId },
    Rpc { object: ObjectId, call: LobbyCall },
}

/// Messages the relay delivers to a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delivery {
    PeerJoined { peer: PeerRef },
    PeerLeft { peer: PeerRef },
    Spawned { object: ObjectId, authority: PeerRef, state: ObjectState },
    Despawned { object: ObjectId },
    Updated { object: ObjectId, state: ObjectState },
    PlayerObject { peer: PeerRef, object: ObjectId },
    Rpc { object: ObjectId, from: PeerRef, call: LobbyCall },
}

impl Delivery {
    /// Position updates are superseded by the next tick and may be dropped under load.
    pub fn is_droppable(&self) -> bool {
        matches!(self, Delivery::Updated { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub object: ObjectId,
    pub authority: PeerRef,
    pub state: ObjectState,
}

/// Join reply: the assigned identity plus everything already live in the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinAccepted {
    pub peer: PeerRef,
    pub max_peers: usize,
    pub peers: Vec<PeerRef>,
    pub objects: Vec<ObjectRecord>,
    pub player_objects: Vec<(PeerRef, ObjectId)>,
}

/// A joined peer's connection to its session, independent of the transport.
///
/// Dropping the link leaves the session.
#[derive(Debug)]
pub struct PeerLink {
    pub welcome: JoinAccepted,
    pub outbound: mpsc::Sender<PeerMessage>,
    pub inbound: mpsc::Receiver<Delivery>,
}

/// Local notifications produced while applying deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    PeerJoined(PeerRef),
    PeerLeft(PeerRef),
    Spawned(ObjectId),
    Despawned(ObjectId),
    PlayerObject { peer: PeerRef, object: ObjectId },
    LobbyUpdated(ObjectId),
    Disconnected,
}

/// Occupancy published by each relay task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub name: String,
    pub peers: usize,
    pub max_peers: usize,
}
