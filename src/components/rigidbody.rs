//! Rigid body component.
//!
//! A [`RigidBody`] carries two unrelated pieces of state:
//!
//! - its role in penetration resolution: [`BodyKind`] plus the `ghost` and
//!   `permeable` flags, read by the constraint solver;
//! - kinematic state for the movement integrator: velocity, named forces,
//!   friction, an optional speed cap and a `frozen` switch.

use glam::Vec2;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::component;

/// How a body reacts to overlaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyKind {
    /// Never moved by the solver; pushes dynamic bodies out.
    Static,
    #[default]
    Dynamic,
}

/// Constant acceleration, in world units per second squared.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Force {
    pub value: Vec2,
    #[serde(default = "Force::enabled_default")]
    pub enabled: bool,
}

impl Force {
    pub fn new(value: Vec2) -> Self {
        Self {
            value,
            enabled: true,
        }
    }

    fn enabled_default() -> bool {
        true
    }
}

/// Resolution role and kinematic state of an actor.
///
/// Any field may be left out of the persisted form; missing fields take the
/// values of [`RigidBody::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidBody {
    pub kind: BodyKind,
    /// Overlaps are detected and published but never resolved.
    pub ghost: bool,
    /// Dynamic-vs-dynamic overlaps are not resolved.
    pub permeable: bool,
    /// World units per second.
    pub velocity: Vec2,
    pub forces: FxHashMap<String, Force>,
    /// Damping applied as `velocity *= max(0, 1 - friction * dt)`.
    pub friction: f32,
    pub max_speed: Option<f32>,
    /// Skipped by the integrator. The solver may still move the actor.
    pub frozen: bool,
}

component!(RigidBody, "rigidbody");

impl Default for RigidBody {
    fn default() -> Self {
        Self::new()
    }
}

impl RigidBody {
    /// Dynamic body at rest, without forces or damping.
    pub fn new() -> Self {
        Self {
            kind: BodyKind::Dynamic,
            ghost: false,
            permeable: false,
            velocity: Vec2::ZERO,
            forces: FxHashMap::default(),
            friction: 0.0,
            max_speed: None,
            frozen: false,
        }
    }

    /// Static body. The integrator and the solver never move it.
    pub fn fixed() -> Self {
        Self {
            kind: BodyKind::Static,
            ..Self::new()
        }
    }

    pub fn damped(friction: f32, max_speed: Option<f32>) -> Self {
        Self {
            friction,
            max_speed,
            ..Self::new()
        }
    }

    pub fn ghost(mut self) -> Self {
        self.ghost = true;
        self
    }

    pub fn permeable(mut self) -> Self {
        self.permeable = true;
        self
    }

    pub fn is_static(&self) -> bool {
        self.kind == BodyKind::Static
    }

    pub fn is_dynamic(&self) -> bool {
        self.kind == BodyKind::Dynamic
    }

    /// Whether an overlap between `self` and `other` is resolved.
    ///
    /// Two static bodies never resolve. A static/dynamic pair resolves unless
    /// either side is a ghost. Two dynamic bodies resolve unless either side
    /// is a ghost or permeable.
    pub fn resolves_with(&self, other: &RigidBody) -> bool {
        match (self.kind, other.kind) {
            (BodyKind::Static, BodyKind::Static) => false,
            (BodyKind::Static, BodyKind::Dynamic) | (BodyKind::Dynamic, BodyKind::Static) => {
                !self.ghost && !other.ghost
            }
            (BodyKind::Dynamic, BodyKind::Dynamic) => {
                !self.ghost && !other.ghost && !self.permeable && !other.permeable
            }
        }
    }

    /// Insert or replace an enabled force.
    pub fn add_force(&mut self, name: &str, value: Vec2) {
        self.forces.insert(name.to_string(), Force::new(value));
    }

    /// Returns false if no force is registered under `name`.
    pub fn set_force_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.forces.get_mut(name) {
            Some(force) => {
                force.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn is_force_enabled(&self, name: &str) -> bool {
        self.forces.get(name).is_some_and(|f| f.enabled)
    }

    /// Sum of all enabled forces.
    pub fn total_acceleration(&self) -> Vec2 {
        self.forces
            .values()
            .filter(|f| f.enabled)
            .map(|f| f.value)
            .sum()
    }

    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    pub fn set_velocity(&mut self, velocity: Vec2) {
        self.velocity = velocity;
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }
}
