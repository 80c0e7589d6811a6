//! Collision notification payloads.
//!
//! The collision detector classifies every overlapping pair each fixed tick and
//! publishes [`EventKind::CollisionEnter`](crate::events::bus::EventKind::CollisionEnter),
//! [`CollisionStay`](crate::events::bus::EventKind::CollisionStay) or
//! [`CollisionLeave`](crate::events::bus::EventKind::CollisionLeave) on both
//! participants, carrying a [`CollisionEvent`]. The event bubbles from each
//! actor up to its scene, so scene-level observers (such as the constraint
//! solver) see every pair twice and must deduplicate by [`PairKey`].

use glam::Vec2;

use crate::entity::EntityId;
use crate::events::bus::EventKind;

/// Minimum translation vectors for an overlapping pair.
///
/// `a` is the smallest displacement that moves body `a` out of body `b`;
/// `b` is the same displacement for body `b` (always `-a`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mtv {
    pub a: Vec2,
    pub b: Vec2,
}

impl Mtv {
    /// Build the pair from the separating direction (pointing from `a` towards
    /// `b`) and the penetration depth along it.
    pub fn from_axis(axis_a_to_b: Vec2, depth: f32) -> Self {
        let push = axis_a_to_b * depth;
        Self { a: -push, b: push }
    }

    pub fn depth(&self) -> f32 {
        self.a.length()
    }

    /// The same vectors with the roles of the two bodies exchanged.
    pub fn swapped(self) -> Self {
        Self {
            a: self.b,
            b: self.a,
        }
    }
}

/// Unordered pair of actors; `(a, b)` and `(b, a)` produce the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey(EntityId, EntityId);

impl PairKey {
    pub fn new(a: EntityId, b: EntityId) -> Self {
        if a <= b { PairKey(a, b) } else { PairKey(b, a) }
    }

    pub fn first(&self) -> EntityId {
        self.0
    }

    pub fn second(&self) -> EntityId {
        self.1
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.0 == id || self.1 == id
    }
}

/// Which classification a published collision carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionPhase {
    Enter,
    Stay,
    Leave,
}

impl CollisionPhase {
    pub fn kind(self) -> EventKind {
        match self {
            CollisionPhase::Enter => EventKind::CollisionEnter,
            CollisionPhase::Stay => EventKind::CollisionStay,
            CollisionPhase::Leave => EventKind::CollisionLeave,
        }
    }
}

/// Payload of the collision events: both participants and both MTVs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEvent {
    pub a: EntityId,
    pub b: EntityId,
    pub mtv: Mtv,
}

impl CollisionEvent {
    pub fn new(a: EntityId, b: EntityId, mtv: Mtv) -> Self {
        Self { a, b, mtv }
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(self.a, self.b)
    }

    /// The participant that is not `id`, if `id` takes part in this collision.
    pub fn other(&self, id: EntityId) -> Option<EntityId> {
        if id == self.a {
            Some(self.b)
        } else if id == self.b {
            Some(self.a)
        } else {
            None
        }
    }

    /// The translation that separates `id` from the other participant.
    pub fn mtv_for(&self, id: EntityId) -> Option<Vec2> {
        if id == self.a {
            Some(self.mtv.a)
        } else if id == self.b {
            Some(self.mtv.b)
        } else {
            None
        }
    }
}
