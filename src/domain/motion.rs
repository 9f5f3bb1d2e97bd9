// Movement integration, proxy smoothing and blocked-direction suppression.

use super::math::{Vec2, Vec3};

/// Advances `position` along `dir` (normalized here) for one step.
pub fn integrate(position: Vec3, dir: Vec2, speed: f32, dt: f32) -> Vec3 {
    let dir = dir.normalized();
    position + dir.extend(0.0) * (speed * dt)
}

/// One frame of exponential-style follow: moves `rate * dt` of the way toward `target`.
///
/// The factor is clamped to 1 so long frames snap instead of overshooting.
pub fn follow_step(current: Vec3, target: Vec3, rate: f32, dt: f32) -> Vec3 {
    current.lerp(target, rate * dt)
}

/// Critically damped spring with a speed cap, carrying its own velocity between frames.
#[derive(Debug, Clone, Copy)]
pub struct SmoothDamp {
    pub smooth_time: f32,
    pub max_speed: f32,
    velocity: Vec3,
}

impl SmoothDamp {
    pub fn new(smooth_time: f32, max_speed: f32) -> Self {
        Self {
            smooth_time: smooth_time.max(0.0001),
            max_speed,
            velocity: Vec3::ZERO,
        }
    }

    pub fn step(&mut self, current: Vec3, target: Vec3, dt: f32) -> Vec3 {
        if dt <= 0.0 {
            return current;
        }

        let omega = 2.0 / self.smooth_time;
        let x = omega * dt;
        let exp = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);

        let mut change = current - target;
        let max_change = self.max_speed * self.smooth_time;
        let change_len = change.length();
        if change_len > max_change && change_len > 0.0 {
            change = change * (max_change / change_len);
        }
        let clamped_target = current - change;

        let temp = (self.velocity + change * omega) * dt;
        self.velocity = (self.velocity - temp * omega) * exp;
        let mut output = clamped_target + (change + temp) * exp;

        // Do not overshoot the original target.
        let to_target = target - current;
        let past = output - target;
        if to_target.x * past.x + to_target.y * past.y + to_target.z * past.z > 0.0 {
            output = target;
            self.velocity = (output - target) * (1.0 / dt);
        }
        output
    }
}

/// Remembers the direction a controlled entity was moving when it hit an obstacle
/// and swallows input that keeps pushing that way.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectionGuard {
    blocked: Option<Vec2>,
}

impl DirectionGuard {
    pub fn blocked(&self) -> Option<Vec2> {
        self.blocked
    }

    /// Records the current heading as blocked. Zero headings are ignored.
    pub fn on_collision(&mut self, heading: Vec2) {
        let heading = heading.normalized();
        if heading != Vec2::ZERO {
            self.blocked = Some(heading);
        }
    }

    /// Returns the input that should actually drive movement this tick.
    ///
    /// Releasing the input (below `dead_zone`) or steering more than `tolerance_deg`
    /// away from the blocked heading clears the suppression.
    pub fn filter(&mut self, input: Vec2, tolerance_deg: f32, dead_zone: f32) -> Vec2 {
        if input.length() < dead_zone {
            self.blocked = None;
            return Vec2::ZERO;
        }
        match self.blocked {
            Some(blocked) if blocked.angle_to(input) <= tolerance_deg => Vec2::ZERO,
            Some(_) => {
                self.blocked = None;
                input
            }
            None => input,
        }
    }
}
