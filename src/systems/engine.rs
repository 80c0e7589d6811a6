//! Fixed-rate tick loop.
//!
//! Each call to [`Engine::tick`] handles one rendered frame:
//!
//! 1. deliver every event deferred during the previous frame
//! 2. add the scaled frame time to the lag accumulator
//! 3. run `fixed_update` on every system while a whole fixed step fits in the
//!    lag, at most `max_fixed_steps` times; surplus whole steps are dropped
//! 4. run `update` on every system exactly once
//!
//! Systems run in registration order in both phases.

use log::{debug, info};

use crate::entity::tree::EntityTree;
use crate::resources::simconfig::SimConfig;
use crate::resources::simtime::SimTime;

/// A unit of per-tick work driven by the [`Engine`].
pub trait System {
    fn name(&self) -> &str;

    /// Called zero or more times per frame with a constant step of
    /// `time.fixed_delta` seconds.
    fn fixed_update(&mut self, _tree: &mut EntityTree, _time: &SimTime) {}

    /// Called once per frame after the fixed updates.
    fn update(&mut self, _tree: &mut EntityTree, _time: &SimTime) {}
}

/// What one frame did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickSummary {
    pub events_delivered: usize,
    pub fixed_steps: u32,
    /// Scaled seconds discarded by the step cap.
    pub dropped_lag: f32,
}

pub struct Engine {
    tree: EntityTree,
    systems: Vec<Box<dyn System>>,
    time: SimTime,
    config: SimConfig,
    lag: f32,
}

impl Engine {
    pub fn new(tree: EntityTree, config: SimConfig) -> Self {
        let time = SimTime::new(config.fixed_delta(), config.time_scale);
        info!(
            "engine ready: fixed step {:.4}s, at most {} steps per frame",
            time.fixed_delta, config.max_fixed_steps
        );
        Self {
            tree,
            systems: Vec::new(),
            time,
            config,
            lag: 0.0,
        }
    }

    pub fn add_system(&mut self, system: impl System + 'static) -> &mut Self {
        debug!("adding system '{}'", system.name());
        self.systems.push(Box::new(system));
        self
    }

    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name()).collect()
    }

    pub fn tree(&self) -> &EntityTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut EntityTree {
        &mut self.tree
    }

    pub fn into_tree(self) -> EntityTree {
        self.tree
    }

    pub fn time(&self) -> &SimTime {
        &self.time
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Scaled seconds waiting for the next fixed step.
    pub fn lag(&self) -> f32 {
        self.lag
    }

    pub fn set_time_scale(&mut self, time_scale: f32) {
        self.time.time_scale = time_scale.max(0.0);
    }

    /// Advance one frame of `wall_delta` unscaled seconds.
    pub fn tick(&mut self, wall_delta: f32) -> TickSummary {
        let mut summary = TickSummary {
            events_delivered: self.tree.drain_events(),
            ..TickSummary::default()
        };

        let dt = self.time.scaled(wall_delta);
        self.time.delta = dt;
        self.time.elapsed += dt;
        self.lag += dt;

        let step = self.time.fixed_delta;
        let max_steps = self.config.max_fixed_steps.max(1);
        while self.lag >= step && summary.fixed_steps < max_steps {
            for system in &mut self.systems {
                system.fixed_update(&mut self.tree, &self.time);
            }
            self.lag -= step;
            self.time.fixed_steps += 1;
            summary.fixed_steps += 1;
        }
        if self.lag >= step {
            let surplus = (self.lag / step).floor() * step;
            self.lag -= surplus;
            summary.dropped_lag = surplus;
            debug!("frame over budget, dropping {:.4}s of lag", surplus);
        }
        self.time.alpha = self.lag / step;

        for system in &mut self.systems {
            system.update(&mut self.tree, &self.time);
        }
        self.time.frame_count += 1;
        summary
    }
}
