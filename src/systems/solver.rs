//! Single-pass penetration solver.
//!
//! The solver listens for `CollisionEnter` and `CollisionStay` on a scene and
//! accumulates one correction per actor and contribution kind:
//!
//! - **static**: a dynamic body touching a static one takes the full MTV.
//!   Static contributions combine per axis by keeping the larger magnitude,
//!   so two walls pushing the same way do not double the push.
//! - **dynamic**: two dynamic bodies take half the MTV each. Dynamic
//!   contributions on one actor are summed.
//!
//! [`ConstraintSolver::resolve`] adds both corrections to each actor's local
//! position once, at the end of the tick, and clears the per-tick state. Dense
//! stacks may keep some residual overlap after one tick; later ticks work it
//! off.

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use glam::Vec2;
use log::{debug, trace};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::components::rigidbody::RigidBody;
use crate::entity::EntityId;
use crate::entity::tree::EntityTree;
use crate::error::SetupError;
use crate::events::bus::{Event, EventKind, ListenerId};
use crate::events::collision::{CollisionEvent, PairKey};

/// Accumulated corrections for one actor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Correction {
    pub from_static: Vec2,
    pub from_dynamic: Vec2,
}

impl Correction {
    pub fn total(&self) -> Vec2 {
        self.from_static + self.from_dynamic
    }
}

fn larger_magnitude(current: f32, candidate: f32) -> f32 {
    if candidate.abs() > current.abs() {
        candidate
    } else {
        current
    }
}

#[derive(Debug, Default)]
struct SolverState {
    processed: FxHashSet<PairKey>,
    corrections: FxHashMap<EntityId, Correction>,
}

impl SolverState {
    fn add_static(&mut self, actor: EntityId, mtv: Vec2) {
        let c = self.corrections.entry(actor).or_default();
        c.from_static.x = larger_magnitude(c.from_static.x, mtv.x);
        c.from_static.y = larger_magnitude(c.from_static.y, mtv.y);
    }

    fn add_dynamic(&mut self, actor: EntityId, mtv: Vec2) {
        self.corrections.entry(actor).or_default().from_dynamic += mtv;
    }

    fn accumulate(&mut self, tree: &EntityTree, event: &CollisionEvent) -> bool {
        if !self.processed.insert(event.key()) {
            return false;
        }
        let (Some(body_a), Some(body_b)) = (
            tree.get_component::<RigidBody>(event.a),
            tree.get_component::<RigidBody>(event.b),
        ) else {
            return false;
        };
        if !body_a.resolves_with(body_b) {
            trace!("{} / {}: not resolved", event.a, event.b);
            return false;
        }
        match (body_a.is_static(), body_b.is_static()) {
            (true, false) => self.add_static(event.b, event.mtv.b),
            (false, true) => self.add_static(event.a, event.mtv.a),
            (false, false) => {
                self.add_dynamic(event.a, event.mtv.a * 0.5);
                self.add_dynamic(event.b, event.mtv.b * 0.5);
            }
            (true, true) => return false,
        }
        true
    }
}

#[derive(Debug, Default)]
pub struct ConstraintSolver {
    state: Rc<RefCell<SolverState>>,
    scene: Option<EntityId>,
    subscriptions: Vec<(EventKind, ListenerId)>,
}

impl ConstraintSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen for collisions published under `scene`.
    pub fn attach(&mut self, tree: &EntityTree, scene: EntityId) -> Result<(), SetupError> {
        self.detach(tree);
        for kind in [EventKind::CollisionEnter, EventKind::CollisionStay] {
            let listener = |state: &RefCell<SolverState>, event: &Event, tree: &EntityTree| {
                if let Some(collision) = event.payload().collision() {
                    state.borrow_mut().accumulate(tree, collision);
                }
            };
            let id = tree.on_owned(scene, kind.clone(), &self.state, listener)?;
            self.subscriptions.push((kind, id));
        }
        self.scene = Some(scene);
        Ok(())
    }

    pub fn detach(&mut self, tree: &EntityTree) {
        if let Some(scene) = self.scene.take() {
            for (kind, id) in self.subscriptions.drain(..) {
                tree.off(scene, &kind, id);
            }
        }
    }

    pub fn scene(&self) -> Option<EntityId> {
        self.scene
    }

    /// Feed one collision directly. Returns false when the pair was already
    /// processed this tick or does not resolve.
    pub fn accumulate(&self, tree: &EntityTree, event: &CollisionEvent) -> bool {
        self.state.borrow_mut().accumulate(tree, event)
    }

    /// Pending correction for `actor` in this tick.
    pub fn correction(&self, actor: EntityId) -> Option<Correction> {
        self.state.borrow().corrections.get(&actor).copied()
    }

    pub fn static_correction(&self, actor: EntityId) -> Vec2 {
        self.correction(actor).map_or(Vec2::ZERO, |c| c.from_static)
    }

    pub fn dynamic_correction(&self, actor: EntityId) -> Vec2 {
        self.correction(actor).map_or(Vec2::ZERO, |c| c.from_dynamic)
    }

    /// Apply every pending correction and reset for the next tick.
    /// Returns the number of actors moved.
    pub fn resolve(&self, tree: &mut EntityTree) -> usize {
        let corrections = {
            let mut state = self.state.borrow_mut();
            state.processed.clear();
            mem::take(&mut state.corrections)
        };
        let mut ordered: Vec<(EntityId, Correction)> = corrections.into_iter().collect();
        ordered.sort_unstable_by_key(|(id, _)| *id);

        let mut moved = 0;
        for (actor, correction) in ordered {
            let offset = correction.total();
            if offset == Vec2::ZERO {
                continue;
            }
            if let Some(mut transform) = tree.transform_mut(actor) {
                transform.translate(offset);
                moved += 1;
            }
        }
        if moved > 0 {
            debug!("solver moved {} actors", moved);
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::transform::Transform;
    use crate::events::collision::Mtv;

    const EPSILON: f32 = 1e-6;

    fn vec_approx_eq(a: Vec2, b: Vec2) -> bool {
        (a - b).abs().max_element() < EPSILON
    }

    fn actor(tree: &mut EntityTree, scene: EntityId, body: RigidBody) -> EntityId {
        let id = tree.spawn_actor(scene, "body").unwrap();
        tree.set_component(id, Transform::default()).unwrap();
        tree.set_component(id, body).unwrap();
        id
    }

    fn hit(a: EntityId, b: EntityId, mtv_a: Vec2) -> CollisionEvent {
        CollisionEvent::new(a, b, Mtv { a: mtv_a, b: -mtv_a })
    }

    #[test]
    fn test_static_contributions_keep_largest_magnitude() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let ball = actor(&mut tree, scene, RigidBody::new());
        let floor = actor(&mut tree, scene, RigidBody::fixed());
        let ledge = actor(&mut tree, scene, RigidBody::fixed());
        let solver = ConstraintSolver::new();

        assert!(solver.accumulate(&tree, &hit(ball, floor, Vec2::new(0.0, -3.0))));
        assert!(solver.accumulate(&tree, &hit(ball, ledge, Vec2::new(0.0, -5.0))));
        assert!(vec_approx_eq(solver.static_correction(ball), Vec2::new(0.0, -5.0)));
        assert_eq!(solver.correction(floor), None);
    }

    #[test]
    fn test_dynamic_contributions_are_halved_and_summed() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let a = actor(&mut tree, scene, RigidBody::new());
        let b = actor(&mut tree, scene, RigidBody::new());
        let c = actor(&mut tree, scene, RigidBody::new());
        let solver = ConstraintSolver::new();

        solver.accumulate(&tree, &hit(a, b, Vec2::new(2.0, 0.0)));
        solver.accumulate(&tree, &hit(a, c, Vec2::new(4.0, 0.0)));
        assert!(vec_approx_eq(solver.dynamic_correction(a), Vec2::new(3.0, 0.0)));
        assert!(vec_approx_eq(solver.dynamic_correction(b), Vec2::new(-1.0, 0.0)));
        assert!(vec_approx_eq(solver.dynamic_correction(c), Vec2::new(-2.0, 0.0)));
    }

    #[test]
    fn test_static_side_as_second_body() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let wall = actor(&mut tree, scene, RigidBody::fixed());
        let ball = actor(&mut tree, scene, RigidBody::new());
        let solver = ConstraintSolver::new();
        solver.accumulate(&tree, &hit(wall, ball, Vec2::new(-1.0, 0.0)));
        assert!(vec_approx_eq(solver.static_correction(ball), Vec2::new(1.0, 0.0)));
    }

    #[test]
    fn test_pairs_processed_once_per_tick() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let a = actor(&mut tree, scene, RigidBody::new());
        let b = actor(&mut tree, scene, RigidBody::new());
        let solver = ConstraintSolver::new();

        assert!(solver.accumulate(&tree, &hit(a, b, Vec2::new(2.0, 0.0))));
        assert!(!solver.accumulate(&tree, &hit(b, a, Vec2::new(-2.0, 0.0))));
        assert!(vec_approx_eq(solver.dynamic_correction(a), Vec2::new(1.0, 0.0)));

        solver.resolve(&mut tree);
        assert!(solver.accumulate(&tree, &hit(a, b, Vec2::new(2.0, 0.0))));
    }

    #[test]
    fn test_flags_suppress_resolution() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let ghost = actor(&mut tree, scene, RigidBody::new().ghost());
        let wall = actor(&mut tree, scene, RigidBody::fixed());
        let permeable = actor(&mut tree, scene, RigidBody::new().permeable());
        let plain = actor(&mut tree, scene, RigidBody::new());
        let other_wall = actor(&mut tree, scene, RigidBody::fixed());
        let solver = ConstraintSolver::new();

        assert!(!solver.accumulate(&tree, &hit(ghost, wall, Vec2::X)));
        assert!(!solver.accumulate(&tree, &hit(permeable, plain, Vec2::X)));
        assert!(!solver.accumulate(&tree, &hit(wall, other_wall, Vec2::X)));
        assert!(solver.accumulate(&tree, &hit(permeable, wall, Vec2::X)));
    }

    #[test]
    fn test_missing_rigidbody_is_skipped() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let a = actor(&mut tree, scene, RigidBody::new());
        let bare = tree.spawn_actor(scene, "bare").unwrap();
        let solver = ConstraintSolver::new();
        assert!(!solver.accumulate(&tree, &hit(a, bare, Vec2::X)));
    }

    #[test]
    fn test_resolve_moves_and_clears() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let ball = actor(&mut tree, scene, RigidBody::new());
        let floor = actor(&mut tree, scene, RigidBody::fixed());
        let other = actor(&mut tree, scene, RigidBody::new());
        let solver = ConstraintSolver::new();

        solver.accumulate(&tree, &hit(ball, floor, Vec2::new(0.0, -3.0)));
        solver.accumulate(&tree, &hit(ball, other, Vec2::new(2.0, 0.0)));
        assert_eq!(solver.resolve(&mut tree), 2);

        let p = tree.transform(ball).unwrap().world_position();
        assert!(vec_approx_eq(p, Vec2::new(1.0, -3.0)));
        assert_eq!(solver.correction(ball), None);
        assert_eq!(solver.resolve(&mut tree), 0);
    }

    #[test]
    fn test_attached_solver_hears_scene_collisions() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let a = actor(&mut tree, scene, RigidBody::new());
        let b = actor(&mut tree, scene, RigidBody::new());
        let mut solver = ConstraintSolver::new();
        solver.attach(&tree, scene).unwrap();

        let event = hit(a, b, Vec2::new(2.0, 0.0));
        for target in [a, b] {
            tree.dispatch_immediately(
                target,
                EventKind::CollisionStay,
                crate::events::bus::EventPayload::Collision(event),
            )
            .unwrap();
        }
        assert!(vec_approx_eq(solver.dynamic_correction(a), Vec2::new(1.0, 0.0)));

        solver.detach(&tree);
        assert_eq!(tree.events(scene).unwrap().registered_kinds(), 0);
    }

    #[test]
    fn test_dropped_solver_releases_its_listeners() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let a = actor(&mut tree, scene, RigidBody::new());
        let b = actor(&mut tree, scene, RigidBody::new());
        for _ in 0..10 {
            let mut solver = ConstraintSolver::new();
            solver.attach(&tree, scene).unwrap();
        }
        let events = tree.events(scene).unwrap();
        assert_eq!(events.listener_count(&EventKind::CollisionEnter), 0);
        assert_eq!(events.registered_kinds(), 0);

        let event = hit(a, b, Vec2::new(2.0, 0.0));
        tree.dispatch_immediately(
            a,
            EventKind::CollisionEnter,
            crate::events::bus::EventPayload::Collision(event),
        )
        .unwrap();
    }
}
