use log::warn;

/// Simulation clock advanced by the engine loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimTime {
    /// Scaled seconds simulated so far.
    pub elapsed: f32,
    /// Scaled seconds of the last frame.
    pub delta: f32,
    pub time_scale: f32,
    /// Frames (variable updates) run so far.
    pub frame_count: u64,
    /// Fixed updates run so far.
    pub fixed_steps: u64,
    /// Seconds per fixed update.
    pub fixed_delta: f32,
    /// Fraction of a fixed step left in the accumulator after the last frame.
    pub alpha: f32,
}

impl Default for SimTime {
    fn default() -> Self {
        SimTime {
            elapsed: 0.0,
            delta: 0.0,
            time_scale: 1.0,
            frame_count: 0,
            fixed_steps: 0,
            fixed_delta: 1.0 / 60.0,
            alpha: 0.0,
        }
    }
}

impl SimTime {
    pub fn new(fixed_delta: f32, time_scale: f32) -> Self {
        SimTime {
            fixed_delta,
            time_scale,
            ..SimTime::default()
        }
    }

    /// Scale a wall-clock frame time. Negative frames count as zero, and a
    /// non-finite result is discarded so it cannot poison the accumulator.
    pub fn scaled(&self, wall_delta: f32) -> f32 {
        let dt = wall_delta.max(0.0) * self.time_scale;
        if dt.is_finite() {
            dt
        } else {
            warn!("ignoring non-finite frame time {} (scale {})", wall_delta, self.time_scale);
            0.0
        }
    }
}
