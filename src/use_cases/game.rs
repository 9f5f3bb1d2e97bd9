use super::cursor::{CursorFrame, GodCursorRelay};
use super::launcher::{EntitySpawner, EntityTemplate, LaunchedSession};
use super::lobby;
use super::role_select::{RoleButtons, RoleSelectMenu};
use super::session::PeerSession;
use super::sync::{AuthorityResolver, EntitySync, NpcAgent};
use super::types::{ObjectState, SessionEvent};
use crate::domain::camera::CameraProjection;
use crate::domain::npc::NpcBrain;
use crate::domain::tuning::{CursorTuning, MovementTuning, NpcTuning};
use crate::domain::{LobbyState, ObjectId, Role, SessionError, SyncMode, Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc, watch};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct GameSettings {
    pub movement: MovementTuning,
    pub cursor: CursorTuning,
    pub npc: NpcTuning,
    /// NPCs the Human peer spawns when the match starts.
    pub npc_count: usize,
    /// NPCs are scattered uniformly inside this radius around the origin.
    pub npc_spawn_radius: f32,
    pub camera: CameraProjection,
    pub seed: u64,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            movement: MovementTuning::default(),
            cursor: CursorTuning::default(),
            npc: NpcTuning::default(),
            npc_count: 12,
            npc_spawn_radius: 8.0,
            camera: CameraProjection {
                position: Vec3::ZERO,
                ortho_size: 5.0,
                viewport_width: 1920.0,
                viewport_height: 1080.0,
            },
            seed: 0,
        }
    }
}

/// Latest local input sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LocalInput {
    pub movement: Vec2,
    /// Pointer in screen pixels, origin bottom-left.
    pub pointer: Vec2,
}

/// Discrete actions coming from menus and the physics layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerCommand {
    SelectGod,
    SelectHuman,
    Ready,
    Collision(ObjectId),
}

/// Everything the presentation layer needs for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderFrame {
    pub tick: u64,
    pub role: Role,
    pub lobby: Option<LobbyState>,
    pub buttons: RoleButtons,
    pub avatars: Vec<(ObjectId, Vec3)>,
    pub npcs: Vec<(ObjectId, Vec3)>,
    pub cursor: Option<CursorFrame>,
}

/// One peer's view of the match: replica, menus and per-entity sync.
#[derive(Debug)]
pub struct PeerGame {
    session: PeerSession,
    spawner: EntitySpawner,
    menu: RoleSelectMenu,
    avatars: BTreeMap<ObjectId, EntitySync>,
    npcs: BTreeMap<ObjectId, NpcAgent>,
    cursor: GodCursorRelay,
    rng: StdRng,
    settings: GameSettings,
    npcs_populated: bool,
    tick: u64,
}

impl PeerGame {
    pub fn new(launched: LaunchedSession, settings: GameSettings) -> Self {
        let LaunchedSession { session, spawner } = launched;
        let mut game = Self {
            session,
            spawner,
            menu: RoleSelectMenu::new(),
            avatars: BTreeMap::new(),
            npcs: BTreeMap::new(),
            cursor: GodCursorRelay::new(settings.cursor),
            rng: StdRng::seed_from_u64(settings.seed),
            settings,
            npcs_populated: false,
            tick: 0,
        };
        game.reconcile_entities();
        game
    }

    pub fn session(&self) -> &PeerSession {
        &self.session
    }

    pub fn menu(&self) -> &RoleSelectMenu {
        &self.menu
    }

    pub fn lobby(&self) -> Option<LobbyState> {
        lobby::find_lobby(&self.session).map(|(_, state)| state)
    }

    pub fn role(&self) -> Role {
        self.lobby()
            .map(|state| state.role_of(self.session.local_peer()))
            .unwrap_or_default()
    }

    pub fn local_avatar(&self) -> Option<ObjectId> {
        self.session.player_object(self.session.local_peer())
    }

    pub fn avatar(&self, object: ObjectId) -> Option<&EntitySync> {
        self.avatars.get(&object)
    }

    pub fn npcs(&self) -> impl Iterator<Item = (ObjectId, &NpcAgent)> + '_ {
        self.npcs.iter().map(|(id, npc)| (*id, npc))
    }

    /// Applies pending deliveries and keeps local entities in step with the replica.
    pub fn pump_network(&mut self) -> Vec<SessionEvent> {
        let events = self.session.poll();
        for event in &events {
            if let Err(err) = self.spawner.on_event(&mut self.session, *event) {
                warn!(peer = %self.session.local_peer(), ?event, error = %err, "spawner failed");
            }
        }

        let lobby_touched = events.iter().any(|event| {
            matches!(
                event,
                SessionEvent::Spawned(_) | SessionEvent::LobbyUpdated(_)
            )
        });
        if lobby_touched {
            lobby::prune_duplicate_lobbies(&mut self.session);
        }
        self.menu
            .observe(self.session.local_peer(), lobby::find_lobby(&self.session));

        self.reconcile_entities();
        events
    }

    pub fn handle_command(&mut self, command: PeerCommand) -> bool {
        match command {
            PeerCommand::SelectGod => self.menu.click_god(&mut self.session),
            PeerCommand::SelectHuman => self.menu.click_human(&mut self.session),
            PeerCommand::Ready => self.menu.click_ready(&mut self.session),
            PeerCommand::Collision(object) => {
                if let Some(sync) = self.avatars.get_mut(&object) {
                    sync.on_collision();
                    true
                } else if let Some(npc) = self.npcs.get_mut(&object) {
                    npc.on_collision(&mut self.rng);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// One simulation tick: network in, entity sync, network out.
    pub fn fixed_tick(&mut self, input: &LocalInput, dt: f32) -> Result<(), SessionError> {
        self.pump_network();
        self.populate_npcs()?;
        self.tick += 1;

        let (avatar_modes, npc_modes) = self.sync_modes();
        let local_avatar = self.local_avatar();

        for (object, mode) in avatar_modes {
            let movement = if Some(object) == local_avatar {
                input.movement
            } else {
                Vec2::ZERO
            };
            if let Some(sync) = self.avatars.get_mut(&object) {
                sync.fixed_tick(Some(&mut self.session), mode, movement, dt)?;
            }
        }

        for (object, mode) in npc_modes {
            if let Some(npc) = self.npcs.get_mut(&object) {
                npc.fixed_tick(Some(&mut self.session), mode, dt, &mut self.rng)?;
            }
        }
        Ok(())
    }

    pub fn render(&mut self, input: &LocalInput, dt: f32) -> Result<RenderFrame, SessionError> {
        let (avatar_modes, npc_modes) = self.sync_modes();

        let mut avatars = Vec::with_capacity(avatar_modes.len());
        for (object, mode) in avatar_modes {
            if let Some(sync) = self.avatars.get_mut(&object) {
                avatars.push((object, sync.render(Some(&self.session), mode, dt)));
            }
        }
        let mut npcs = Vec::with_capacity(npc_modes.len());
        for (object, mode) in npc_modes {
            if let Some(npc) = self.npcs.get_mut(&object) {
                npcs.push((object, npc.sync.render(Some(&self.session), mode, dt)));
            }
        }

        let cursor =
            self.cursor
                .update(&mut self.session, input.pointer, &self.settings.camera, dt)?;
        let lobby = self.lobby();

        Ok(RenderFrame {
            tick: self.tick,
            role: self.role(),
            lobby,
            buttons: self.menu.buttons(lobby.as_ref()),
            avatars,
            npcs,
            cursor,
        })
    }

    fn sync_modes(&self) -> (Vec<(ObjectId, SyncMode)>, Vec<(ObjectId, SyncMode)>) {
        let resolver = AuthorityResolver::new(Some(&self.session));
        let avatars = self
            .avatars
            .keys()
            .map(|object| (*object, resolver.mode(Some(*object))))
            .collect();
        let npcs = self
            .npcs
            .keys()
            .map(|object| (*object, resolver.mode(Some(*object))))
            .collect();
        (avatars, npcs)
    }

    // Human populates the crowd once per match; God only ever observes NPCs.
    fn populate_npcs(&mut self) -> Result<(), SessionError> {
        if self.npcs_populated {
            return Ok(());
        }
        let Some(state) = self.lobby() else {
            return Ok(());
        };
        if !state.started || state.role_of(self.session.local_peer()) != Role::Human {
            return Ok(());
        }
        self.npcs_populated = true;

        let local = self.session.local_peer();
        let already_authored = self
            .session
            .objects()
            .any(|record| record.authority == local && matches!(record.state, ObjectState::Npc(_)));
        if already_authored {
            return Ok(());
        }

        for _ in 0..self.settings.npc_count {
            let angle = self.rng.random_range(0.0..std::f32::consts::TAU);
            let radius = self.settings.npc_spawn_radius * self.rng.random::<f32>().sqrt();
            let at = Vec3::new(radius * angle.cos(), radius * angle.sin(), 0.0);
            self.session.spawn(EntityTemplate::Npc.instantiate(at))?;
        }
        info!(peer = %local, count = self.settings.npc_count, "npcs spawned");

        self.reconcile_entities();
        Ok(())
    }

    fn reconcile_entities(&mut self) {
        let live: Vec<(ObjectId, ObjectState)> = self
            .session
            .objects()
            .map(|record| (record.object, record.state))
            .collect();

        self.avatars.retain(|object, _| {
            live.iter()
                .any(|(id, state)| id == object && matches!(state, ObjectState::Avatar(_)))
        });
        self.npcs.retain(|object, _| {
            live.iter()
                .any(|(id, state)| id == object && matches!(state, ObjectState::Npc(_)))
        });

        let movement = self.settings.movement;
        for (object, state) in live {
            match state {
                ObjectState::Avatar(avatar) if !self.avatars.contains_key(&object) => {
                    let sync =
                        EntitySync::new(Some(object), avatar.position, movement.move_speed, movement);
                    self.avatars.insert(object, sync);
                    debug!(%object, "tracking avatar");
                }
                ObjectState::Npc(npc) if !self.npcs.contains_key(&object) => {
                    let brain = NpcBrain::new(self.settings.npc, &mut self.rng);
                    let sync = EntitySync::new(Some(object), npc.position, brain.speed(), movement);
                    self.npcs.insert(object, NpcAgent::new(sync, brain));
                }
                _ => {}
            }
        }
    }
}

/// Fixed-tick driver for one peer, stopped by `shutdown` or by losing the relay.
pub async fn peer_task(
    mut game: PeerGame,
    mut command_rx: mpsc::Receiver<PeerCommand>,
    input_rx: watch::Receiver<LocalInput>,
    frame_tx: watch::Sender<RenderFrame>,
    tick_interval: Duration,
    shutdown: Arc<Notify>,
) -> PeerGame {
    let mut interval = tokio::time::interval(tick_interval);
    let dt = tick_interval.as_secs_f32();

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                break;
            }
            _ = interval.tick() => {}
        }

        while let Ok(command) = command_rx.try_recv() {
            if !game.handle_command(command) {
                debug!(?command, "command had no effect");
            }
        }

        let input = *input_rx.borrow();
        if let Err(err) = game.fixed_tick(&input, dt) {
            warn!(peer = %game.session.local_peer(), error = %err, "tick failed");
        }
        match game.render(&input, dt) {
            Ok(frame) => {
                let _ = frame_tx.send(frame);
            }
            Err(err) => warn!(peer = %game.session.local_peer(), error = %err, "render failed"),
        }

        if !game.session.is_connected() {
            info!(peer = %game.session.local_peer(), "peer loop stopping: disconnected");
            break;
        }
    }

    game
}
