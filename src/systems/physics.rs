//! Physics pipeline for one scene.
//!
//! Every fixed step runs, in order: velocity integration, collision
//! detection, publication of the enter / stay / leave events, and constraint
//! resolution. The solver hears enter and stay through its scene listeners
//! while the events are published, so its corrections land in the same step.
//!
//! Actor sets come from two [`ActorQuery`] collections kept up to date by the
//! tree's structural events; nothing is rescanned per step.

use log::{debug, info};

use crate::components::collider::Collider;
use crate::components::rigidbody::RigidBody;
use crate::components::transform::Transform;
use crate::entity::EntityId;
use crate::entity::component::ComponentKind;
use crate::entity::query::{ActorFilter, ActorQuery};
use crate::entity::tree::EntityTree;
use crate::error::SetupError;
use crate::resources::simconfig::SimConfig;
use crate::resources::simtime::SimTime;
use crate::systems::collision::{CollisionDetector, CollisionReport};
use crate::systems::engine::System;
use crate::systems::movement;
use crate::systems::solver::ConstraintSolver;

#[derive(Debug)]
pub struct PhysicsSystem {
    scene: EntityId,
    /// Actors with a collider and a transform.
    bodies: ActorQuery,
    /// Actors with a rigid body and a transform.
    movers: ActorQuery,
    detector: CollisionDetector,
    solver: ConstraintSolver,
    enabled: bool,
    integrate_velocity: bool,
    last_report: CollisionReport,
}

impl PhysicsSystem {
    /// Attach to `scene`.
    ///
    /// Fails if `scene` is not a scene or if an actor already in it has a
    /// rigid body but no transform.
    pub fn new(tree: &EntityTree, scene: EntityId, config: &SimConfig) -> Result<Self, SetupError> {
        if !tree.is_scene(scene) {
            return Err(SetupError::WrongKind {
                id: scene,
                expected: "scene",
            });
        }
        for actor in tree.actors_under(scene) {
            if tree.has_component(actor, RigidBody::NAME) {
                tree.require_component::<Transform>(actor)?;
            }
        }

        let bodies = ActorQuery::new(
            tree,
            scene,
            ActorFilter::components(&[Collider::NAME, Transform::NAME]),
        )?;
        let movers = ActorQuery::new(
            tree,
            scene,
            ActorFilter::components(&[RigidBody::NAME, Transform::NAME]),
        )?;
        let mut solver = ConstraintSolver::new();
        solver.attach(tree, scene)?;

        info!(
            "physics attached to scene {}: {} bodies, {} movers",
            scene,
            bodies.len(),
            movers.len()
        );
        Ok(Self {
            scene,
            bodies,
            movers,
            detector: CollisionDetector::new(),
            solver,
            enabled: config.physics_enabled,
            integrate_velocity: config.integrate_velocity,
            last_report: CollisionReport::default(),
        })
    }

    pub fn scene(&self) -> EntityId {
        self.scene
    }

    pub fn bodies(&self) -> &ActorQuery {
        &self.bodies
    }

    pub fn movers(&self) -> &ActorQuery {
        &self.movers
    }

    pub fn detector(&self) -> &CollisionDetector {
        &self.detector
    }

    pub fn solver(&self) -> &ConstraintSolver {
        &self.solver
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_integrate_velocity(&mut self, integrate: bool) {
        self.integrate_velocity = integrate;
    }

    /// Events produced by the most recent step.
    pub fn last_report(&self) -> &CollisionReport {
        &self.last_report
    }

    /// Run one fixed step of `dt` seconds.
    pub fn step(&mut self, tree: &mut EntityTree, dt: f32) -> &CollisionReport {
        if !self.enabled {
            self.last_report = CollisionReport::default();
            return &self.last_report;
        }
        if self.integrate_velocity {
            movement::integrate(tree, &self.movers.actors(), dt);
        }
        let report = self.detector.detect(tree, &self.bodies.actors());
        report.publish(tree);
        let moved = self.solver.resolve(tree);
        if !report.is_empty() {
            debug!(
                "physics step: {} collision events, {} actors corrected",
                report.len(),
                moved
            );
        }
        self.last_report = report;
        &self.last_report
    }

    /// Release every listener this system registered on the tree.
    pub fn shutdown(&mut self, tree: &EntityTree) {
        self.bodies.unsubscribe(tree);
        self.movers.unsubscribe(tree);
        self.solver.detach(tree);
        self.detector.clear();
        self.last_report = CollisionReport::default();
    }
}

impl System for PhysicsSystem {
    fn name(&self) -> &str {
        "physics"
    }

    fn fixed_update(&mut self, tree: &mut EntityTree, time: &SimTime) {
        self.step(tree, time.fixed_delta);
    }
}
