// God pointer relay: the God peer writes its pointer into its own avatar,
// every peer reads it back and trails a smoothed "iris" behind it.

use crate::domain::camera::CameraProjection;
use crate::domain::motion::SmoothDamp;
use crate::domain::tuning::CursorTuning;
use crate::domain::{PeerRef, Role, SessionError, Vec2, Vec3};
use crate::use_cases::lobby;
use crate::use_cases::session::PeerSession;
use crate::use_cases::types::ObjectState;

/// What the cursor visuals show this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorFrame {
    /// Snaps to the latest sample.
    pub cursor: Vec3,
    /// Trails the cursor with bounded speed.
    pub iris: Vec3,
}

#[derive(Debug, Clone)]
pub struct GodCursorRelay {
    damp: SmoothDamp,
    iris: Option<Vec3>,
}

impl GodCursorRelay {
    pub fn new(tuning: CursorTuning) -> Self {
        Self {
            damp: SmoothDamp::new(tuning.smooth_time, tuning.max_speed),
            iris: None,
        }
    }

    /// Returns `None` before the match starts or while nobody is God.
    pub fn update(
        &mut self,
        session: &mut PeerSession,
        pointer: Vec2,
        camera: &CameraProjection,
        dt: f32,
    ) -> Result<Option<CursorFrame>, SessionError> {
        let Some((_, state)) = lobby::find_lobby(session).filter(|(_, state)| state.started) else {
            self.iris = None;
            return Ok(None);
        };

        let local = session.local_peer();
        let cursor = if state.role_of(local) == Role::God {
            let world = camera.screen_to_world(pointer);
            self.write_own(session, world)?;
            world
        } else {
            match read_god_cursor(session, state.holder_of(Role::God)) {
                Some(cursor) => cursor,
                None => {
                    self.iris = None;
                    return Ok(None);
                }
            }
        };

        let previous = self.iris.unwrap_or(cursor);
        let iris = self.damp.step(previous, cursor, dt);
        self.iris = Some(iris);
        Ok(Some(CursorFrame { cursor, iris }))
    }

    // The cursor rides on the God peer's player avatar, which it already owns.
    fn write_own(&self, session: &mut PeerSession, world: Vec3) -> Result<(), SessionError> {
        let Some(object) = session.player_object(session.local_peer()) else {
            return Ok(());
        };
        let Some(ObjectState::Avatar(mut avatar)) = session.object(object).copied() else {
            return Ok(());
        };
        if avatar.god_cursor == world {
            return Ok(());
        }
        avatar.god_cursor = world;
        session.publish(object, ObjectState::Avatar(avatar))
    }
}

fn read_god_cursor(session: &PeerSession, god: PeerRef) -> Option<Vec3> {
    if god.is_none() {
        return None;
    }
    let object = session.player_object(god)?;
    session
        .object(object)?
        .as_avatar()
        .map(|avatar| avatar.god_cursor)
}
