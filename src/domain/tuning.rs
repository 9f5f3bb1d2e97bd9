/// Gameplay tuning for avatars, NPCs and the God cursor.
///
/// Keep this separate from runtime/relay configuration (ports, capacities, etc.).

#[derive(Debug, Clone, Copy)]
pub struct MovementTuning {
    /// Avatar speed in world units per second.
    pub move_speed: f32,

    /// Exponential follow rate proxies use to chase the replicated position (1/s).
    pub render_follow_rate: f32,

    /// Input within this many degrees of a blocked direction stays suppressed.
    pub blocked_tolerance_deg: f32,

    /// Inputs shorter than this are treated as released.
    pub input_dead_zone: f32,
}

impl Default for MovementTuning {
    fn default() -> Self {
        Self {
            move_speed: 5.0,
            render_follow_rate: 15.0,
            blocked_tolerance_deg: 30.0,
            input_dead_zone: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CursorTuning {
    /// Approximate seconds for the trailing iris to reach the cursor.
    pub smooth_time: f32,

    /// Upper bound on iris speed in world units per second.
    pub max_speed: f32,
}

impl Default for CursorTuning {
    fn default() -> Self {
        Self {
            smooth_time: 0.3,
            max_speed: 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NpcTuning {
    /// Base walking speed; each NPC varies it by up to `speed_variance`.
    pub speed: f32,
    pub speed_variance: f32,

    /// Seconds before the first move, to desynchronize the crowd.
    pub min_initial_wait: f32,
    pub max_initial_wait: f32,

    pub min_move_duration: f32,
    pub max_move_duration: f32,

    pub min_pause_duration: f32,
    pub max_pause_duration: f32,

    /// Probability of picking a second direction before stopping.
    pub chance_to_change_direction: f32,
}

impl Default for NpcTuning {
    fn default() -> Self {
        Self {
            speed: 1.0,
            speed_variance: 0.25,
            min_initial_wait: 0.5,
            max_initial_wait: 2.0,
            min_move_duration: 1.0,
            max_move_duration: 4.0,
            min_pause_duration: 0.5,
            max_pause_duration: 2.0,
            chance_to_change_direction: 0.5,
        }
    }
}
