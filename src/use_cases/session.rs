// Per-peer replica of a shared session.
//
// A `PeerSession` mirrors every networked object the relay knows about, tracks
// who holds authority over each one and turns inbound deliveries into local
// events. Writes are checked against authority here; the relay forwards
// whatever it receives.

use crate::domain::{ObjectId, PeerRef, SessionError};
use crate::use_cases::lobby;
use crate::use_cases::types::{
    Delivery, LobbyCall, ObjectRecord, ObjectState, PeerLink, PeerMessage, SessionEvent,
};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct PeerSession {
    name: String,
    local: PeerRef,
    max_peers: usize,
    peers: BTreeSet<PeerRef>,
    objects: BTreeMap<ObjectId, ObjectRecord>,
    player_objects: BTreeMap<PeerRef, ObjectId>,
    next_seq: u32,
    outbound: mpsc::Sender<PeerMessage>,
    inbound: mpsc::Receiver<Delivery>,
    connected: bool,
}

impl PeerSession {
    /// Seeds the replica from the join snapshot.
    pub fn from_link(name: impl Into<String>, link: PeerLink) -> Self {
        let PeerLink {
            welcome,
            outbound,
            inbound,
        } = link;

        Self {
            name: name.into(),
            local: welcome.peer,
            max_peers: welcome.max_peers,
            peers: welcome.peers.into_iter().collect(),
            objects: welcome
                .objects
                .into_iter()
                .map(|record| (record.object, record))
                .collect(),
            player_objects: welcome.player_objects.into_iter().collect(),
            next_seq: 0,
            outbound,
            inbound,
            connected: true,
        }
    }

    pub fn local_peer(&self) -> PeerRef {
        self.local
    }

    pub fn session_name(&self) -> &str {
        &self.name
    }

    pub fn max_peers(&self) -> usize {
        self.max_peers
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn peers(&self) -> impl Iterator<Item = PeerRef> + '_ {
        self.peers.iter().copied()
    }

    pub fn object(&self, object: ObjectId) -> Option<&ObjectState> {
        self.objects.get(&object).map(|record| &record.state)
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectRecord> + '_ {
        self.objects.values()
    }

    pub fn authority_of(&self, object: ObjectId) -> Option<PeerRef> {
        self.objects.get(&object).map(|record| record.authority)
    }

    pub fn has_state_authority(&self, object: ObjectId) -> bool {
        self.authority_of(object) == Some(self.local)
    }

    pub fn player_object(&self, peer: PeerRef) -> Option<ObjectId> {
        self.player_objects.get(&peer).copied()
    }

    /// Creates a new object with the local peer as its authority holder.
    pub fn spawn(&mut self, state: ObjectState) -> Result<ObjectId, SessionError> {
        self.next_seq += 1;
        let object = ObjectId::new(self.local, self.next_seq);
        self.send(PeerMessage::Spawn { object, state })?;
        self.objects.insert(
            object,
            ObjectRecord {
                object,
                authority: self.local,
                state,
            },
        );
        debug!(peer = %self.local, %object, "spawned object");
        Ok(object)
    }

    pub fn despawn(&mut self, object: ObjectId) -> Result<(), SessionError> {
        self.ensure_authority(object)?;
        self.send(PeerMessage::Despawn { object })?;
        self.forget(object);
        debug!(peer = %self.local, %object, "despawned object");
        Ok(())
    }

    /// Writes new state for an object the local peer holds authority over.
    ///
    /// Positional updates are superseded next tick, so a saturated queue drops
    /// them; anything else surfaces `SendQueueFull`.
    pub fn publish(&mut self, object: ObjectId, state: ObjectState) -> Result<(), SessionError> {
        self.ensure_authority(object)?;
        if let Some(record) = self.objects.get_mut(&object) {
            record.state = state;
        }

        match self.send(PeerMessage::Update { object, state }) {
            Err(SessionError::SendQueueFull) if state.position().is_some() => Ok(()),
            other => other,
        }
    }

    /// Registers `object` as the local peer's player entity.
    pub fn set_player_object(&mut self, object: ObjectId) -> Result<(), SessionError> {
        self.send(PeerMessage::SetPlayerObject { object })?;
        self.player_objects.insert(self.local, object);
        Ok(())
    }

    /// Fire-and-forget remote call; it runs on the object's authority holder.
    pub fn rpc(&mut self, object: ObjectId, call: LobbyCall) -> Result<(), SessionError> {
        if !self.objects.contains_key(&object) {
            return Err(SessionError::UnknownObject(object));
        }
        self.send(PeerMessage::Rpc { object, call })
    }

    /// Drains pending deliveries without blocking and applies them to the replica.
    pub fn poll(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if !self.connected {
            return events;
        }

        loop {
            match self.inbound.try_recv() {
                Ok(delivery) => self.apply(delivery, &mut events),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    warn!(peer = %self.local, session = %self.name, "relay link closed");
                    self.connected = false;
                    events.push(SessionEvent::Disconnected);
                    break;
                }
            }
        }
        events
    }

    fn apply(&mut self, delivery: Delivery, events: &mut Vec<SessionEvent>) {
        match delivery {
            Delivery::PeerJoined { peer } => {
                self.peers.insert(peer);
                events.push(SessionEvent::PeerJoined(peer));
            }
            Delivery::PeerLeft { peer } => {
                self.peers.remove(&peer);
                self.player_objects.remove(&peer);
                events.push(SessionEvent::PeerLeft(peer));
            }
            Delivery::Spawned {
                object,
                authority,
                state,
            } => {
                self.objects.insert(
                    object,
                    ObjectRecord {
                        object,
                        authority,
                        state,
                    },
                );
                events.push(SessionEvent::Spawned(object));
                if state.as_lobby().is_some() {
                    events.push(SessionEvent::LobbyUpdated(object));
                }
            }
            Delivery::Despawned { object } => {
                if self.forget(object) {
                    events.push(SessionEvent::Despawned(object));
                }
            }
            Delivery::Updated { object, state } => {
                if self.has_state_authority(object) {
                    // We are the writer for this object.
                    return;
                }
                let Some(record) = self.objects.get_mut(&object) else {
                    return;
                };
                record.state = state;
                if state.as_lobby().is_some() {
                    events.push(SessionEvent::LobbyUpdated(object));
                }
            }
            Delivery::PlayerObject { peer, object } => {
                self.player_objects.insert(peer, object);
                events.push(SessionEvent::PlayerObject { peer, object });
            }
            Delivery::Rpc { object, from, call } => self.execute(object, from, call, events),
        }
    }

    // Runs a remote call on a record the local peer is authority for.
    fn execute(
        &mut self,
        object: ObjectId,
        from: PeerRef,
        call: LobbyCall,
        events: &mut Vec<SessionEvent>,
    ) {
        if !self.has_state_authority(object) {
            warn!(peer = %self.local, %object, caller = %from, "rpc for object we do not own; ignoring");
            return;
        }
        let Some(mut state) = self.objects.get(&object).and_then(|r| r.state.as_lobby().copied())
        else {
            warn!(peer = %self.local, %object, "rpc target is not a lobby; ignoring");
            return;
        };

        if !lobby::apply_lobby_call(&mut state, object, from, call) {
            return;
        }

        match self.publish(object, ObjectState::Lobby(state)) {
            Ok(()) => events.push(SessionEvent::LobbyUpdated(object)),
            Err(err) => warn!(peer = %self.local, %object, error = %err, "failed to publish lobby"),
        }
    }

    fn ensure_authority(&self, object: ObjectId) -> Result<(), SessionError> {
        match self.authority_of(object) {
            None => Err(SessionError::UnknownObject(object)),
            Some(holder) if holder != self.local => Err(SessionError::NotAuthority(object)),
            Some(_) => Ok(()),
        }
    }

    fn forget(&mut self, object: ObjectId) -> bool {
        self.player_objects.retain(|_, registered| *registered != object);
        self.objects.remove(&object).is_some()
    }

    fn send(&mut self, msg: PeerMessage) -> Result<(), SessionError> {
        match self.outbound.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(SessionError::SendQueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                if self.connected {
                    info!(peer = %self.local, session = %self.name, "outbound link closed");
                }
                self.connected = false;
                Err(SessionError::Disconnected)
            }
        }
    }
}
