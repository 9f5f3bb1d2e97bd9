// Shared-mode session runtime: one relay task per named session.
//
// The relay owns no game state of its own. It hands out peer identities, keeps
// the latest copy of every networked object for late joiners, fans state out
// to the other peers and routes remote calls to the authority holder.

use crate::domain::{ObjectId, PeerRef, SessionError};
use crate::use_cases::ports::SessionConnector;
use crate::use_cases::types::{
    Delivery, JoinAccepted, ObjectRecord, PeerLink, PeerMessage, SessionInfo,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

const DROP_LOG_THROTTLE: Duration = Duration::from_secs(2);
const JOIN_ATTEMPTS: usize = 2;

/// Shared configuration for spawning relay tasks.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Peers allowed in one session at the same time.
    pub max_peers: usize,
    /// Capacity for commands flowing into a relay task.
    pub command_channel_capacity: usize,
    /// Per-peer capacity for deliveries (and for the peer's outbound queue).
    pub delivery_channel_capacity: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            max_peers: 2,
            command_channel_capacity: 1024,
            delivery_channel_capacity: 1024,
        }
    }
}

#[derive(Debug)]
pub enum RelayCommand {
    Join {
        deliveries: mpsc::Sender<Delivery>,
        reply: oneshot::Sender<Result<JoinAccepted, SessionError>>,
    },
    Message {
        from: PeerRef,
        msg: PeerMessage,
    },
    Leave {
        peer: PeerRef,
    },
}

/// Per-session channels.
#[derive(Clone)]
pub struct SessionHandle {
    /// Name peers use to find this session.
    pub name: Arc<str>,
    /// Sender for commands into the relay task.
    command_tx: mpsc::Sender<RelayCommand>,
    /// Latest occupancy published by the relay task.
    info_rx: watch::Receiver<SessionInfo>,
}

impl SessionHandle {
    pub fn info(&self) -> SessionInfo {
        self.info_rx.borrow().clone()
    }

    fn is_live(&self) -> bool {
        !self.command_tx.is_closed()
    }
}

/// Thread-safe registry of live sessions.
#[derive(Debug)]
pub struct SessionHub {
    /// Settings applied to newly created sessions.
    settings: RelaySettings,
    /// Map of session name to relay handle.
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("name", &self.name)
            .finish()
    }
}

impl SessionHub {
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            settings,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Returns occupancy for a live session.
    pub async fn session_info(&self, name: &str) -> Option<SessionInfo> {
        let sessions = self.sessions.read().await;
        sessions
            .get(name)
            .filter(|handle| handle.is_live())
            .map(SessionHandle::info)
    }

    /// Joins the named session, creating its relay task on first use.
    pub async fn join_session(&self, name: &str) -> Result<PeerLink, SessionError> {
        // A relay that emptied out between lookup and join closes its queue;
        // the next attempt then starts a fresh session under the same name.
        for _ in 0..JOIN_ATTEMPTS {
            let handle = self.get_or_create(name).await;
            let (delivery_tx, delivery_rx) =
                mpsc::channel::<Delivery>(self.settings.delivery_channel_capacity);
            let (reply_tx, reply_rx) = oneshot::channel();

            let sent = handle
                .command_tx
                .send(RelayCommand::Join {
                    deliveries: delivery_tx,
                    reply: reply_tx,
                })
                .await;
            if sent.is_err() {
                continue;
            }

            let welcome = match reply_rx.await {
                Ok(result) => result?,
                Err(_) => continue,
            };

            let (outbound_tx, outbound_rx) =
                mpsc::channel::<PeerMessage>(self.settings.delivery_channel_capacity);
            tokio::spawn(forward_peer_messages(
                welcome.peer,
                outbound_rx,
                handle.command_tx.clone(),
            ));

            return Ok(PeerLink {
                welcome,
                outbound: outbound_tx,
                inbound: delivery_rx,
            });
        }

        Err(SessionError::StartFailed(format!(
            "relay for session {name} unavailable"
        )))
    }

    async fn get_or_create(&self, name: &str) -> SessionHandle {
        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(name).filter(|handle| handle.is_live()) {
            return handle.clone();
        }

        // Drop every relay that has shut down since the last creation.
        sessions.retain(|_, handle| handle.is_live());

        let (command_tx, command_rx) =
            mpsc::channel::<RelayCommand>(self.settings.command_channel_capacity);
        let (info_tx, info_rx) = watch::channel(SessionInfo {
            name: name.to_string(),
            peers: 0,
            max_peers: self.settings.max_peers,
        });

        tokio::spawn(relay_task(
            Arc::from(name),
            self.settings.max_peers,
            command_rx,
            info_tx,
        ));
        info!(session = name, "session created");

        let handle = SessionHandle {
            name: Arc::from(name),
            command_tx,
            info_rx,
        };
        sessions.insert(name.to_string(), handle.clone());
        handle
    }
}

#[async_trait]
impl SessionConnector for SessionHub {
    async fn join(&self, session_name: &str) -> Result<PeerLink, SessionError> {
        self.join_session(session_name).await
    }
}

// Tags each outbound message with its sender; a closed queue means the peer left.
async fn forward_peer_messages(
    peer: PeerRef,
    mut outbound_rx: mpsc::Receiver<PeerMessage>,
    command_tx: mpsc::Sender<RelayCommand>,
) {
    while let Some(msg) = outbound_rx.recv().await {
        if command_tx
            .send(RelayCommand::Message { from: peer, msg })
            .await
            .is_err()
        {
            return;
        }
    }
    let _ = command_tx.send(RelayCommand::Leave { peer }).await;
}

struct RelayPeer {
    deliveries: mpsc::Sender<Delivery>,
    dropped: u64,
    last_drop_log: Option<Instant>,
}

struct Relay {
    name: Arc<str>,
    max_peers: usize,
    next_peer: u32,
    peers: BTreeMap<PeerRef, RelayPeer>,
    objects: BTreeMap<ObjectId, ObjectRecord>,
    player_objects: BTreeMap<PeerRef, ObjectId>,
    // Peers whose delivery queue closed or overflowed during the current command.
    gone: Vec<PeerRef>,
}

pub async fn relay_task(
    name: Arc<str>,
    max_peers: usize,
    mut command_rx: mpsc::Receiver<RelayCommand>,
    info_tx: watch::Sender<SessionInfo>,
) {
    let mut relay = Relay {
        name,
        max_peers,
        next_peer: 0,
        peers: BTreeMap::new(),
        objects: BTreeMap::new(),
        player_objects: BTreeMap::new(),
        gone: Vec::new(),
    };

    while let Some(command) = command_rx.recv().await {
        match command {
            RelayCommand::Join { deliveries, reply } => relay.join(deliveries, reply),
            RelayCommand::Message { from, msg } => relay.handle_message(from, msg),
            RelayCommand::Leave { peer } => relay.remove_peer(peer),
        }
        relay.reap();

        let _ = info_tx.send(SessionInfo {
            name: relay.name.to_string(),
            peers: relay.peers.len(),
            max_peers: relay.max_peers,
        });

        if relay.peers.is_empty() {
            break;
        }
    }

    info!(session = %relay.name, "session closed");
}

impl Relay {
    fn join(
        &mut self,
        deliveries: mpsc::Sender<Delivery>,
        reply: oneshot::Sender<Result<JoinAccepted, SessionError>>,
    ) {
        if self.peers.len() >= self.max_peers {
            warn!(
                session = %self.name,
                present = self.peers.len(),
                max_peers = self.max_peers,
                "join rejected: room full"
            );
            let _ = reply.send(Err(SessionError::RoomFull));
            return;
        }

        self.next_peer += 1;
        let peer = PeerRef::new(self.next_peer);
        let mut peers: Vec<PeerRef> = self.peers.keys().copied().collect();
        peers.push(peer);
        let welcome = JoinAccepted {
            peer,
            max_peers: self.max_peers,
            peers,
            objects: self.objects.values().copied().collect(),
            player_objects: self
                .player_objects
                .iter()
                .map(|(peer, object)| (*peer, *object))
                .collect(),
        };

        if reply.send(Ok(welcome)).is_err() {
            debug!(session = %self.name, %peer, "joiner went away before welcome");
            return;
        }

        self.peers.insert(
            peer,
            RelayPeer {
                deliveries,
                dropped: 0,
                last_drop_log: None,
            },
        );
        info!(session = %self.name, %peer, present = self.peers.len(), "peer joined");
        self.broadcast(None, Delivery::PeerJoined { peer });
    }

    fn handle_message(&mut self, from: PeerRef, msg: PeerMessage) {
        if !self.peers.contains_key(&from) {
            debug!(session = %self.name, peer = %from, "message from departed peer ignored");
            return;
        }

        match msg {
            PeerMessage::Spawn { object, state } => {
                if object.owner != from {
                    warn!(session = %self.name, peer = %from, %object, "spawn with foreign id ignored");
                    return;
                }
                self.objects.insert(
                    object,
                    ObjectRecord {
                        object,
                        authority: from,
                        state,
                    },
                );
                debug!(session = %self.name, peer = %from, %object, "object spawned");
                self.broadcast(
                    Some(from),
                    Delivery::Spawned {
                        object,
                        authority: from,
                        state,
                    },
                );
            }
            PeerMessage::Despawn { object } => {
                let owned = self
                    .objects
                    .get(&object)
                    .is_some_and(|record| record.authority == from);
                if !owned {
                    warn!(session = %self.name, peer = %from, %object, "despawn without authority ignored");
                    return;
                }
                self.despawn(object, Some(from));
            }
            PeerMessage::Update { object, state } => {
                let Some(record) = self.objects.get_mut(&object) else {
                    debug!(session = %self.name, %object, "update for unknown object dropped");
                    return;
                };
                record.state = state;
                self.broadcast(Some(from), Delivery::Updated { object, state });
            }
            PeerMessage::SetPlayerObject { object } => {
                self.player_objects.insert(from, object);
                self.broadcast(Some(from), Delivery::PlayerObject { peer: from, object });
            }
            PeerMessage::Rpc { object, call } => {
                let Some(authority) = self.objects.get(&object).map(|record| record.authority)
                else {
                    warn!(session = %self.name, peer = %from, %object, "rpc target missing; dropping");
                    return;
                };
                self.send_to(authority, Delivery::Rpc { object, from, call });
            }
        }
    }

    fn despawn(&mut self, object: ObjectId, skip: Option<PeerRef>) {
        self.objects.remove(&object);
        self.player_objects.retain(|_, registered| *registered != object);
        self.broadcast(skip, Delivery::Despawned { object });
    }

    fn remove_peer(&mut self, peer: PeerRef) {
        if self.peers.remove(&peer).is_none() {
            return;
        }

        // No authority migration: whatever the peer owned goes with it.
        let owned: Vec<ObjectId> = self
            .objects
            .values()
            .filter(|record| record.authority == peer)
            .map(|record| record.object)
            .collect();
        for object in owned {
            self.despawn(object, None);
        }
        self.player_objects.remove(&peer);

        info!(session = %self.name, %peer, present = self.peers.len(), "peer left");
        self.broadcast(None, Delivery::PeerLeft { peer });
    }

    fn reap(&mut self) {
        while let Some(peer) = self.gone.pop() {
            self.remove_peer(peer);
        }
    }

    fn broadcast(&mut self, skip: Option<PeerRef>, delivery: Delivery) {
        let targets: Vec<PeerRef> = self
            .peers
            .keys()
            .copied()
            .filter(|peer| Some(*peer) != skip)
            .collect();
        for peer in targets {
            self.send_to(peer, delivery.clone());
        }
    }

    fn send_to(&mut self, peer: PeerRef, delivery: Delivery) {
        let Some(target) = self.peers.get_mut(&peer) else {
            return;
        };

        match target.deliveries.try_send(delivery) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(delivery)) => {
                if delivery.is_droppable() {
                    target.dropped += 1;
                    let should_log = target
                        .last_drop_log
                        .is_none_or(|last| last.elapsed() >= DROP_LOG_THROTTLE);
                    if should_log {
                        target.last_drop_log = Some(Instant::now());
                        warn!(session = %self.name, %peer, dropped = target.dropped, "delivery queue full; dropping update");
                    }
                } else {
                    // Losing a spawn, despawn or rpc would desync the peer for good.
                    warn!(session = %self.name, %peer, "delivery queue full; disconnecting peer");
                    self.gone.push(peer);
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => self.gone.push(peer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LobbyState, Vec3};
    use crate::use_cases::types::{LobbyCall, NpcState, ObjectState};

    async fn next(link: &mut PeerLink) -> Delivery {
        tokio::time::timeout(Duration::from_secs(1), link.inbound.recv())
            .await
            .expect("delivery should arrive")
            .expect("relay should stay open")
    }

    #[tokio::test]
    async fn when_session_is_full_then_join_is_rejected() {
        let hub = SessionHub::new(RelaySettings::default());
        let _first = hub.join_session("room").await.expect("first join");
        let _second = hub.join_session("room").await.expect("second join");

        let third = hub.join_session("room").await;
        assert!(matches!(third, Err(SessionError::RoomFull)));
    }

    #[tokio::test]
    async fn peers_receive_distinct_identities_and_join_events() {
        let hub = SessionHub::new(RelaySettings::default());
        let mut first = hub.join_session("room").await.expect("first join");
        assert_eq!(next(&mut first).await, Delivery::PeerJoined { peer: first.welcome.peer });

        let second = hub.join_session("room").await.expect("second join");
        assert_ne!(first.welcome.peer, second.welcome.peer);
        assert_eq!(second.welcome.peers.len(), 2);
        assert_eq!(next(&mut first).await, Delivery::PeerJoined { peer: second.welcome.peer });
    }

    #[tokio::test]
    async fn late_joiner_receives_existing_objects_in_welcome() {
        let hub = SessionHub::new(RelaySettings::default());
        let mut first = hub.join_session("room").await.expect("first join");
        let object = ObjectId::new(first.welcome.peer, 1);
        let state = ObjectState::Lobby(LobbyState::default());
        first
            .outbound
            .send(PeerMessage::Spawn { object, state })
            .await
            .expect("spawn");
        // A call to our own object comes back once the spawn is recorded.
        first
            .outbound
            .send(PeerMessage::Rpc {
                object,
                call: LobbyCall::StartGame,
            })
            .await
            .expect("rpc");
        loop {
            if let Delivery::Rpc { from, .. } = next(&mut first).await {
                assert_eq!(from, first.welcome.peer);
                break;
            }
        }

        let second = hub.join_session("room").await.expect("second join");
        assert_eq!(second.welcome.objects.len(), 1);
        assert_eq!(second.welcome.objects[0].authority, first.welcome.peer);
        assert_eq!(second.welcome.objects[0].state, state);
    }

    #[tokio::test]
    async fn rpc_is_routed_to_the_authority_holder_only() {
        let hub = SessionHub::new(RelaySettings::default());
        let mut owner = hub.join_session("room").await.expect("owner join");
        let mut caller = hub.join_session("room").await.expect("caller join");
        let object = ObjectId::new(owner.welcome.peer, 1);
        owner
            .outbound
            .send(PeerMessage::Spawn {
                object,
                state: ObjectState::Lobby(LobbyState::default()),
            })
            .await
            .expect("spawn");

        // Drain joins and the spawn on the caller side first.
        loop {
            if let Delivery::Spawned { .. } = next(&mut caller).await {
                break;
            }
        }

        caller
            .outbound
            .send(PeerMessage::Rpc {
                object,
                call: LobbyCall::StartGame,
            })
            .await
            .expect("rpc");

        loop {
            match next(&mut owner).await {
                Delivery::Rpc { from, call, .. } => {
                    assert_eq!(from, caller.welcome.peer);
                    assert_eq!(call, LobbyCall::StartGame);
                    break;
                }
                Delivery::PeerJoined { .. } => continue,
                other => panic!("unexpected delivery {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn leaving_peer_takes_its_objects_with_it() {
        let hub = SessionHub::new(RelaySettings::default());
        let leaver = hub.join_session("room").await.expect("leaver join");
        let mut stayer = hub.join_session("room").await.expect("stayer join");
        let object = ObjectId::new(leaver.welcome.peer, 1);
        leaver
            .outbound
            .send(PeerMessage::Spawn {
                object,
                state: ObjectState::Npc(NpcState {
                    position: Vec3::ZERO,
                }),
            })
            .await
            .expect("spawn");
        let leaver_peer = leaver.welcome.peer;
        drop(leaver);

        let mut saw_despawn = false;
        loop {
            match next(&mut stayer).await {
                Delivery::Despawned { object: gone } => {
                    assert_eq!(gone, object);
                    saw_despawn = true;
                }
                Delivery::PeerLeft { peer } => {
                    assert_eq!(peer, leaver_peer);
                    break;
                }
                _ => {}
            }
        }
        assert!(saw_despawn);
    }

    #[tokio::test]
    async fn session_is_recreated_after_last_peer_leaves() {
        let hub = SessionHub::new(RelaySettings::default());
        let first = hub.join_session("room").await.expect("first join");
        assert_eq!(first.welcome.peer, PeerRef::new(1));
        drop(first);

        let mut rejoined = None;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if hub.session_info("room").await.is_none() {
                rejoined = Some(hub.join_session("room").await.expect("rejoin"));
                break;
            }
        }
        let rejoined = rejoined.expect("empty session should shut down");
        assert_eq!(rejoined.welcome.peer, PeerRef::new(1));
    }
}
