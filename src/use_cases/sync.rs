// Authority-gated movement for avatars and NPCs.
//
// Every tick each entity is either driven locally and published, or mirrors the
// replicated position. Both paths share `EntitySync`; the write/read decision
// comes from a single `AuthorityResolver`.

use crate::domain::motion::{DirectionGuard, follow_step, integrate};
use crate::domain::npc::NpcBrain;
use crate::domain::tuning::MovementTuning;
use crate::domain::{ObjectId, SessionError, SyncMode, Vec2, Vec3, resolve_sync_mode};
use crate::use_cases::lobby;
use crate::use_cases::session::PeerSession;
use rand::Rng;

/// Answers "do I write this entity?" for one tick.
#[derive(Debug, Clone, Copy)]
pub struct AuthorityResolver<'a> {
    session: Option<&'a PeerSession>,
    started: bool,
}

impl<'a> AuthorityResolver<'a> {
    pub fn new(session: Option<&'a PeerSession>) -> Self {
        let started = session
            .and_then(lobby::find_lobby)
            .is_some_and(|(_, state)| state.started);
        Self { session, started }
    }

    pub fn match_started(&self) -> bool {
        self.started
    }

    pub fn mode(&self, object: Option<ObjectId>) -> SyncMode {
        let (Some(session), Some(object)) = (self.session, object) else {
            return SyncMode::Authority;
        };
        let holder = session.authority_of(object).unwrap_or_default();
        resolve_sync_mode(session.local_peer(), holder, self.started)
    }
}

#[derive(Debug, Clone)]
pub struct EntitySync {
    object: Option<ObjectId>,
    sim: Vec3,
    visual: Vec3,
    heading: Vec2,
    speed: f32,
    guard: DirectionGuard,
    tuning: MovementTuning,
}

impl EntitySync {
    pub fn new(object: Option<ObjectId>, position: Vec3, speed: f32, tuning: MovementTuning) -> Self {
        Self {
            object,
            sim: position,
            visual: position,
            heading: Vec2::ZERO,
            speed,
            guard: DirectionGuard::default(),
            tuning,
        }
    }

    pub fn object(&self) -> Option<ObjectId> {
        self.object
    }

    /// Position from the latest simulation tick (or replicated sample on proxies).
    pub fn position(&self) -> Vec3 {
        self.sim
    }

    pub fn visual(&self) -> Vec3 {
        self.visual
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    /// Blocks further input along the current heading.
    pub fn on_collision(&mut self) {
        self.guard.on_collision(self.heading);
    }

    /// One simulation step. Publishing only happens with state authority, so a
    /// pre-match local simulation of someone else's entity never leaks out.
    pub fn fixed_tick(
        &mut self,
        session: Option<&mut PeerSession>,
        mode: SyncMode,
        input: Vec2,
        dt: f32,
    ) -> Result<(), SessionError> {
        match mode {
            SyncMode::Authority => {
                let input = if input.is_finite() { input } else { Vec2::ZERO };
                let dir = self.guard.filter(
                    input,
                    self.tuning.blocked_tolerance_deg,
                    self.tuning.input_dead_zone,
                );
                if dir != Vec2::ZERO {
                    self.heading = dir.normalized();
                }
                self.sim = integrate(self.sim, dir, self.speed, dt);

                let (Some(session), Some(object)) = (session, self.object) else {
                    return Ok(());
                };
                if !session.has_state_authority(object) {
                    return Ok(());
                }
                let Some(state) = session.object(object).copied() else {
                    return Err(SessionError::UnknownObject(object));
                };
                session.publish(object, state.with_position(self.sim))
            }
            SyncMode::Proxy => {
                if let Some(position) = self.replicated(session.as_deref()) {
                    self.sim = position;
                }
                Ok(())
            }
        }
    }

    /// Render step: authority shows the simulated position, proxies chase the
    /// replicated one.
    pub fn render(&mut self, session: Option<&PeerSession>, mode: SyncMode, dt: f32) -> Vec3 {
        match mode {
            SyncMode::Authority => self.visual = self.sim,
            SyncMode::Proxy => {
                let target = self.replicated(session).unwrap_or(self.sim);
                self.visual = follow_step(self.visual, target, self.tuning.render_follow_rate, dt);
            }
        }
        self.visual
    }

    fn replicated(&self, session: Option<&PeerSession>) -> Option<Vec3> {
        let object = self.object?;
        session?.object(object)?.position()
    }
}

/// Crowd NPC: the wander brain only runs where the NPC is authored.
#[derive(Debug, Clone)]
pub struct NpcAgent {
    pub sync: EntitySync,
    brain: NpcBrain,
}

impl NpcAgent {
    pub fn new(sync: EntitySync, brain: NpcBrain) -> Self {
        let mut sync = sync;
        sync.set_speed(brain.speed());
        Self { sync, brain }
    }

    pub fn fixed_tick<R: Rng>(
        &mut self,
        session: Option<&mut PeerSession>,
        mode: SyncMode,
        dt: f32,
        rng: &mut R,
    ) -> Result<(), SessionError> {
        let dir = match mode {
            SyncMode::Authority => self.brain.step(dt, rng),
            SyncMode::Proxy => Vec2::ZERO,
        };
        self.sync.fixed_tick(session, mode, dir, dt)
    }

    pub fn on_collision<R: Rng>(&mut self, rng: &mut R) {
        self.brain.on_collision(rng);
    }
}
