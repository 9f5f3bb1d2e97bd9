// Wandering behaviour for crowd NPCs, evaluated only on the peer that owns them.

use super::math::Vec2;
use super::tuning::NpcTuning;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Waiting { remaining: f32 },
    Walking { dir: Vec2, remaining: f32, turned: bool },
    Pausing { remaining: f32 },
}

#[derive(Debug, Clone)]
pub struct NpcBrain {
    tuning: NpcTuning,
    speed: f32,
    phase: Phase,
}

impl NpcBrain {
    pub fn new<R: Rng>(tuning: NpcTuning, rng: &mut R) -> Self {
        let speed = (tuning.speed + symmetric(rng, tuning.speed_variance)).max(0.1);
        let wait = range(rng, tuning.min_initial_wait, tuning.max_initial_wait);
        Self {
            tuning,
            speed,
            phase: Phase::Waiting { remaining: wait },
        }
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn is_walking(&self) -> bool {
        matches!(self.phase, Phase::Walking { .. })
    }

    /// Advances timers and returns the unit direction to walk this tick (zero when idle).
    pub fn step<R: Rng>(&mut self, dt: f32, rng: &mut R) -> Vec2 {
        let t = self.tuning;
        self.phase = match self.phase {
            Phase::Waiting { remaining } | Phase::Pausing { remaining } => {
                let remaining = remaining - dt;
                if remaining > 0.0 {
                    match self.phase {
                        Phase::Waiting { .. } => Phase::Waiting { remaining },
                        _ => Phase::Pausing { remaining },
                    }
                } else {
                    Phase::Walking {
                        dir: random_direction(rng),
                        remaining: range(rng, t.min_move_duration, t.max_move_duration),
                        turned: false,
                    }
                }
            }
            Phase::Walking {
                dir,
                remaining,
                turned,
            } => {
                let remaining = remaining - dt;
                if remaining > 0.0 {
                    Phase::Walking {
                        dir,
                        remaining,
                        turned,
                    }
                } else if !turned && rng.random::<f32>() < t.chance_to_change_direction {
                    Phase::Walking {
                        dir: random_direction(rng),
                        remaining: range(rng, t.min_move_duration, t.max_move_duration),
                        turned: true,
                    }
                } else {
                    Phase::Pausing {
                        remaining: range(rng, t.min_pause_duration, t.max_pause_duration),
                    }
                }
            }
        };

        match self.phase {
            Phase::Walking { dir, .. } => dir,
            _ => Vec2::ZERO,
        }
    }

    /// Bumping into something stops the NPC and starts a pause.
    pub fn on_collision<R: Rng>(&mut self, rng: &mut R) {
        self.phase = Phase::Pausing {
            remaining: range(rng, self.tuning.min_pause_duration, self.tuning.max_pause_duration),
        };
    }
}

fn range<R: Rng>(rng: &mut R, min: f32, max: f32) -> f32 {
    let value = if max > min {
        rng.random_range(min..max)
    } else {
        min
    };
    value.max(0.01)
}

fn symmetric<R: Rng>(rng: &mut R, spread: f32) -> f32 {
    if spread > 0.0 {
        rng.random_range(-spread..spread)
    } else {
        0.0
    }
}

fn random_direction<R: Rng>(rng: &mut R) -> Vec2 {
    let angle = rng.random_range(0.0..std::f32::consts::TAU);
    Vec2::new(angle.cos(), angle.sin())
}
