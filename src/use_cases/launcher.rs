// Joins a named session, spawns the local player entity and signals the menus.

use crate::domain::{ObjectId, PeerRef, SessionError, Vec3, validate_session_name};
use crate::use_cases::lobby;
use crate::use_cases::ports::SessionConnector;
use crate::use_cases::session::PeerSession;
use crate::use_cases::types::{AvatarState, NpcState, ObjectState, SessionEvent};
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Fire-and-forget notifications for menu flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherSignal {
    /// The join was rejected; the menu should go back to the opening screen.
    RoomFull,
    /// Joined before the match began; show the role selection screen.
    SelectRoles,
}

/// What to instantiate for a joining peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntityTemplate {
    #[default]
    Avatar,
    Npc,
}

impl EntityTemplate {
    pub fn instantiate(self, at: Vec3) -> ObjectState {
        match self {
            EntityTemplate::Avatar => ObjectState::Avatar(AvatarState {
                position: at,
                god_cursor: at,
            }),
            EntityTemplate::Npc => ObjectState::Npc(NpcState { position: at }),
        }
    }
}

/// Reacts to join/leave events by spawning or removing player entities.
#[derive(Debug, Clone)]
pub struct EntitySpawner {
    template: EntityTemplate,
    spawn_point: Vec3,
    spawned: BTreeMap<PeerRef, ObjectId>,
}

impl EntitySpawner {
    pub fn new(template: EntityTemplate, spawn_point: Vec3) -> Self {
        Self {
            template,
            spawn_point,
            spawned: BTreeMap::new(),
        }
    }

    pub fn entity_of(&self, peer: PeerRef) -> Option<ObjectId> {
        self.spawned.get(&peer).copied()
    }

    pub fn on_event(
        &mut self,
        session: &mut PeerSession,
        event: SessionEvent,
    ) -> Result<(), SessionError> {
        match event {
            SessionEvent::PeerJoined(peer) if peer == session.local_peer() => {
                if self.spawned.contains_key(&peer) {
                    return Ok(());
                }
                let object = session.spawn(self.template.instantiate(self.spawn_point))?;
                session.set_player_object(object)?;
                self.spawned.insert(peer, object);
                info!(%peer, %object, "player entity spawned");
            }
            SessionEvent::PlayerObject { peer, object } if peer != session.local_peer() => {
                self.spawned.insert(peer, object);
            }
            SessionEvent::PeerLeft(peer) => {
                let Some(object) = self.spawned.remove(&peer) else {
                    return Ok(());
                };
                // The relay already drops a leaver's own objects; only entities
                // authored here on its behalf are left to clean up.
                if session.has_state_authority(object) {
                    session.despawn(object)?;
                    info!(%peer, %object, "player entity removed");
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// A joined session together with the spawner bound to it.
#[derive(Debug)]
pub struct LaunchedSession {
    pub session: PeerSession,
    pub spawner: EntitySpawner,
}

pub struct SessionLauncher<C> {
    connector: C,
    template: EntityTemplate,
    spawn_point: Vec3,
    signals: broadcast::Sender<LauncherSignal>,
}

impl<C: SessionConnector> SessionLauncher<C> {
    pub fn new(connector: C) -> Self {
        let (signals, _) = broadcast::channel(16);
        Self {
            connector,
            template: EntityTemplate::default(),
            spawn_point: Vec3::ZERO,
            signals,
        }
    }

    pub fn set_template(&mut self, template: EntityTemplate) {
        self.template = template;
    }

    pub fn set_spawn_point(&mut self, spawn_point: Vec3) {
        self.spawn_point = spawn_point;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LauncherSignal> {
        self.signals.subscribe()
    }

    /// Opens or joins `session_name` in shared mode.
    ///
    /// Nothing is spawned when the join is rejected. The player entity itself is
    /// spawned once the session reports the local peer as joined.
    pub async fn start(&self, session_name: &str) -> Result<LaunchedSession, SessionError> {
        self.start_with(session_name, self.template).await
    }

    /// `start` with an explicit template for the local player entity.
    pub async fn start_with(
        &self,
        session_name: &str,
        template: EntityTemplate,
    ) -> Result<LaunchedSession, SessionError> {
        let name = validate_session_name(session_name).inspect_err(|_| {
            warn!(session = session_name, "session name too short");
        })?;

        let link = match self.connector.join(&name).await {
            Ok(link) => link,
            Err(SessionError::RoomFull) => {
                warn!(session = %name, "join rejected: room full");
                let _ = self.signals.send(LauncherSignal::RoomFull);
                return Err(SessionError::RoomFull);
            }
            Err(err) => {
                error!(session = %name, error = %err, "failed to start session");
                return Err(match err {
                    SessionError::StartFailed(_) => err,
                    other => SessionError::StartFailed(other.to_string()),
                });
            }
        };

        let mut session = PeerSession::from_link(name.clone(), link);
        info!(session = %name, peer = %session.local_peer(), "session joined");

        let lobby_id = lobby::ensure_lobby(&mut session).inspect_err(|err| {
            error!(session = %name, error = %err, "failed to create lobby");
        })?;
        let started = session
            .object(lobby_id)
            .and_then(ObjectState::as_lobby)
            .is_some_and(|state| state.started);
        if !started {
            let _ = self.signals.send(LauncherSignal::SelectRoles);
        }

        Ok(LaunchedSession {
            session,
            spawner: EntitySpawner::new(template, self.spawn_point),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::relay::{RelaySettings, SessionHub};
    use std::sync::Arc;

    #[tokio::test]
    async fn when_name_too_short_then_start_is_rejected_without_joining() {
        let hub = Arc::new(SessionHub::new(RelaySettings::default()));
        let launcher = SessionLauncher::new(hub.clone());

        let result = launcher.start("abc").await;
        assert!(matches!(result, Err(SessionError::InvalidSessionName)));
        assert!(hub.session_info("abc").await.is_none());
    }

    #[tokio::test]
    async fn when_joining_fresh_session_then_lobby_is_created_and_roles_signalled() {
        let hub = Arc::new(SessionHub::new(RelaySettings::default()));
        let launcher = SessionLauncher::new(hub);
        let mut signals = launcher.subscribe();

        let launched = launcher.start("abcd").await.expect("start");
        assert!(lobby::find_lobby(&launched.session).is_some());
        assert_eq!(signals.try_recv(), Ok(LauncherSignal::SelectRoles));
    }

    #[tokio::test]
    async fn when_room_is_full_then_signal_fires_and_error_returns() {
        let hub = Arc::new(SessionHub::new(RelaySettings {
            max_peers: 1,
            ..RelaySettings::default()
        }));
        let launcher = SessionLauncher::new(hub);
        let _first = launcher.start("abcd").await.expect("first");

        let mut signals = launcher.subscribe();
        let second = launcher.start("abcd").await;
        assert!(matches!(second, Err(SessionError::RoomFull)));
        assert_eq!(signals.try_recv(), Ok(LauncherSignal::RoomFull));
    }

    #[tokio::test]
    async fn when_local_peer_joins_then_player_entity_is_spawned_at_spawn_point() {
        let hub = Arc::new(SessionHub::new(RelaySettings::default()));
        let mut launcher = SessionLauncher::new(hub);
        launcher.set_spawn_point(Vec3::new(2.0, 3.0, 0.0));
        let LaunchedSession {
            mut session,
            mut spawner,
        } = launcher.start("abcd").await.expect("start");

        let local = session.local_peer();
        spawner
            .on_event(&mut session, SessionEvent::PeerJoined(local))
            .expect("spawn");

        let object = spawner.entity_of(local).expect("tracked");
        assert_eq!(session.player_object(local), Some(object));
        assert_eq!(
            session.object(object).and_then(ObjectState::position),
            Some(Vec3::new(2.0, 3.0, 0.0))
        );
    }

    #[tokio::test]
    async fn when_started_with_template_then_local_entity_uses_it() {
        let hub = Arc::new(SessionHub::new(RelaySettings::default()));
        let launcher = SessionLauncher::new(hub);
        let LaunchedSession {
            mut session,
            mut spawner,
        } = launcher
            .start_with("abcd", EntityTemplate::Npc)
            .await
            .expect("start");

        let local = session.local_peer();
        spawner
            .on_event(&mut session, SessionEvent::PeerJoined(local))
            .expect("spawn");

        let object = spawner.entity_of(local).expect("tracked");
        assert!(matches!(session.object(object), Some(ObjectState::Npc(_))));
    }

    #[tokio::test]
    async fn when_remote_peer_leaves_then_its_entity_is_untracked_but_not_despawned_here() {
        let hub = Arc::new(SessionHub::new(RelaySettings::default()));
        let launcher = SessionLauncher::new(hub);
        let LaunchedSession {
            mut session,
            mut spawner,
        } = launcher.start("abcd").await.expect("start");

        let remote = PeerRef::new(9);
        let foreign = ObjectId::new(remote, 1);
        spawner
            .on_event(
                &mut session,
                SessionEvent::PlayerObject {
                    peer: remote,
                    object: foreign,
                },
            )
            .expect("track");
        assert_eq!(spawner.entity_of(remote), Some(foreign));

        spawner
            .on_event(&mut session, SessionEvent::PeerLeft(remote))
            .expect("leave");
        assert_eq!(spawner.entity_of(remote), None);
    }

    #[tokio::test]
    async fn when_leaver_entity_was_authored_locally_then_it_is_despawned() {
        let hub = Arc::new(SessionHub::new(RelaySettings::default()));
        let launcher = SessionLauncher::new(hub);
        let LaunchedSession {
            mut session,
            mut spawner,
        } = launcher.start("abcd").await.expect("start");

        let remote = PeerRef::new(9);
        let object = session
            .spawn(EntityTemplate::Avatar.instantiate(Vec3::ZERO))
            .expect("spawn");
        spawner
            .on_event(&mut session, SessionEvent::PlayerObject { peer: remote, object })
            .expect("track");

        spawner
            .on_event(&mut session, SessionEvent::PeerLeft(remote))
            .expect("leave");
        assert!(session.object(object).is_none());
        assert_eq!(spawner.entity_of(remote), None);
    }
}
