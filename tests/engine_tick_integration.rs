//! Engine tick integration tests: fixed loop, deferred events, movement,
//! collision classification and resolution.
//!
//! All scenarios run at 4 fixed updates per second so positions stay exactly
//! representable.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec2;

use aberredsim::components::collider::Collider;
use aberredsim::components::rigidbody::RigidBody;
use aberredsim::components::transform::Transform;
use aberredsim::entity::EntityId;
use aberredsim::entity::tree::EntityTree;
use aberredsim::events::bus::{Event, EventKind, EventPayload};
use aberredsim::resources::simconfig::SimConfig;
use aberredsim::resources::simtime::SimTime;
use aberredsim::systems::engine::{Engine, System};
use aberredsim::systems::physics::PhysicsSystem;

const STEP: f32 = 0.25;
const EPSILON: f32 = 1e-4;

fn vec_approx_eq(a: Vec2, b: Vec2) -> bool {
    (a - b).abs().max_element() < EPSILON
}

fn config() -> SimConfig {
    SimConfig {
        fixed_rate: 4,
        max_fixed_steps: 5,
        ..SimConfig::new()
    }
}

fn body(
    tree: &mut EntityTree,
    scene: EntityId,
    name: &str,
    position: Vec2,
    collider: Collider,
    rb: RigidBody,
) -> EntityId {
    let id = tree.spawn_actor(scene, name).unwrap();
    tree.set_component(id, Transform::new(position)).unwrap();
    tree.set_component(id, collider).unwrap();
    tree.set_component(id, rb).unwrap();
    id
}

fn position(engine: &Engine, actor: EntityId) -> Vec2 {
    engine.tree().transform(actor).unwrap().world_position()
}

/// Records every collision phase seen on `scene`, once per pair.
fn record_phases(tree: &EntityTree, scene: EntityId) -> Rc<RefCell<Vec<&'static str>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    for (kind, label) in [
        (EventKind::CollisionEnter, "enter"),
        (EventKind::CollisionStay, "stay"),
        (EventKind::CollisionLeave, "leave"),
    ] {
        let log = Rc::clone(&log);
        tree.on(scene, kind, move |event: &Event, _: &EntityTree| {
            if event.payload().collision().is_some_and(|c| c.a == event.target()) {
                log.borrow_mut().push(label);
            }
        })
        .unwrap();
    }
    log
}

fn physics_engine(tree: EntityTree, scene: EntityId) -> Engine {
    let physics = PhysicsSystem::new(&tree, scene, &config()).unwrap();
    let mut engine = Engine::new(tree, config());
    engine.add_system(physics);
    engine
}

// =============================================================================
// Collision classification
// =============================================================================

#[test]
fn ghost_passing_through_wall_enters_stays_leaves() {
    let mut tree = EntityTree::new();
    let scene = tree.add_scene("s").unwrap();
    let mut ghost = RigidBody::new().ghost();
    ghost.set_velocity(Vec2::new(40.0, 0.0));
    body(&mut tree, scene, "ghost", Vec2::ZERO, Collider::boxed(10.0, 10.0), ghost);
    body(
        &mut tree,
        scene,
        "wall",
        Vec2::new(15.0, 0.0),
        Collider::boxed(10.0, 10.0),
        RigidBody::fixed(),
    );
    let phases = record_phases(&tree, scene);
    let mut engine = physics_engine(tree, scene);

    for _ in 0..3 {
        assert_eq!(engine.tick(STEP).fixed_steps, 1);
    }
    assert_eq!(*phases.borrow(), vec!["enter", "stay", "leave"]);

    engine.tick(STEP);
    assert_eq!(phases.borrow().len(), 3);
}

#[test]
fn phases_never_out_of_order_for_a_moving_pair() {
    let mut tree = EntityTree::new();
    let scene = tree.add_scene("s").unwrap();
    let mut ghost = RigidBody::new().ghost();
    ghost.set_velocity(Vec2::new(8.0, 0.0));
    body(&mut tree, scene, "ghost", Vec2::ZERO, Collider::circle(3.0), ghost);
    body(
        &mut tree,
        scene,
        "post",
        Vec2::new(10.0, 0.0),
        Collider::circle(3.0),
        RigidBody::fixed(),
    );
    let phases = record_phases(&tree, scene);
    let mut engine = physics_engine(tree, scene);
    for _ in 0..12 {
        engine.tick(STEP);
    }

    let phases = phases.borrow();
    assert_eq!(phases.iter().filter(|p| **p == "enter").count(), 1);
    assert_eq!(phases.iter().filter(|p| **p == "leave").count(), 1);
    assert_eq!(phases.first(), Some(&"enter"));
    assert_eq!(phases.last(), Some(&"leave"));
    assert!(phases[1..phases.len() - 1].iter().all(|p| *p == "stay"));
}

#[test]
fn destroyed_actor_produces_leave_for_survivor() {
    let mut tree = EntityTree::new();
    let scene = tree.add_scene("s").unwrap();
    let a = body(
        &mut tree,
        scene,
        "a",
        Vec2::ZERO,
        Collider::boxed(10.0, 10.0),
        RigidBody::new().ghost(),
    );
    let b = body(
        &mut tree,
        scene,
        "b",
        Vec2::new(5.0, 0.0),
        Collider::boxed(10.0, 10.0),
        RigidBody::new().ghost(),
    );
    let left = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&left);
    tree.on(a, EventKind::CollisionLeave, move |_: &Event, _: &EntityTree| {
        *counter.borrow_mut() += 1;
    })
    .unwrap();
    let mut engine = physics_engine(tree, scene);

    engine.tick(STEP);
    engine.tree_mut().destroy(b).unwrap();
    engine.tick(STEP);
    assert_eq!(*left.borrow(), 1);
}

// =============================================================================
// Resolution
// =============================================================================

#[test]
fn falling_box_rests_on_static_floor() {
    let mut tree = EntityTree::new();
    let scene = tree.add_scene("s").unwrap();
    let mut falling = RigidBody::new();
    falling.set_velocity(Vec2::new(0.0, 20.0));
    let ball = body(&mut tree, scene, "ball", Vec2::ZERO, Collider::boxed(10.0, 10.0), falling);
    let floor = body(
        &mut tree,
        scene,
        "floor",
        Vec2::new(0.0, 20.0),
        Collider::boxed(100.0, 10.0),
        RigidBody::fixed(),
    );
    let phases = record_phases(&tree, scene);
    let mut engine = physics_engine(tree, scene);

    for _ in 0..8 {
        engine.tick(STEP);
    }
    assert!(vec_approx_eq(position(&engine, ball), Vec2::new(0.0, 10.0)));
    assert_eq!(position(&engine, floor), Vec2::new(0.0, 20.0));
    // Touching at step 2, first overlap at step 3, then pushed back every step.
    assert_eq!(phases.borrow().first(), Some(&"enter"));
    assert_eq!(phases.borrow().len(), 6);
    assert!(phases.borrow()[1..].iter().all(|p| *p == "stay"));
}

#[test]
fn overlapping_dynamic_bodies_split_the_push() {
    let mut tree = EntityTree::new();
    let scene = tree.add_scene("s").unwrap();
    let a = body(&mut tree, scene, "a", Vec2::ZERO, Collider::boxed(10.0, 10.0), RigidBody::new());
    let b = body(
        &mut tree,
        scene,
        "b",
        Vec2::new(6.0, 0.0),
        Collider::boxed(10.0, 10.0),
        RigidBody::new(),
    );
    let mut engine = physics_engine(tree, scene);
    engine.tick(STEP);
    assert!(vec_approx_eq(position(&engine, a), Vec2::new(-2.0, 0.0)));
    assert!(vec_approx_eq(position(&engine, b), Vec2::new(8.0, 0.0)));
}

#[test]
fn child_collider_is_corrected_through_its_own_offset() {
    let mut tree = EntityTree::new();
    let scene = tree.add_scene("s").unwrap();
    let holder = tree.spawn_actor(scene, "holder").unwrap();
    tree.set_component(holder, Transform::from_xy(100.0, 0.0)).unwrap();
    let child = tree.spawn_actor(holder, "child").unwrap();
    tree.set_component(child, Transform::from_xy(-100.0, 0.0)).unwrap();
    tree.set_component(child, Collider::boxed(10.0, 10.0)).unwrap();
    tree.set_component(child, RigidBody::new()).unwrap();
    body(
        &mut tree,
        scene,
        "wall",
        Vec2::new(8.0, 0.0),
        Collider::boxed(10.0, 10.0),
        RigidBody::fixed(),
    );
    let mut engine = physics_engine(tree, scene);
    engine.tick(STEP);
    assert!(vec_approx_eq(position(&engine, child), Vec2::new(-2.0, 0.0)));
    assert!(vec_approx_eq(position(&engine, holder), Vec2::new(100.0, 0.0)));
}

// =============================================================================
// Movement
// =============================================================================

#[test]
fn forces_integrate_over_fixed_steps() {
    let mut tree = EntityTree::new();
    let scene = tree.add_scene("s").unwrap();
    let mut rb = RigidBody::new();
    rb.add_force("gravity", Vec2::new(0.0, 8.0));
    let actor = tree.spawn_actor(scene, "drop").unwrap();
    tree.set_component(actor, Transform::default()).unwrap();
    tree.set_component(actor, rb).unwrap();
    let mut engine = physics_engine(tree, scene);

    engine.tick(STEP);
    assert!(vec_approx_eq(position(&engine, actor), Vec2::new(0.0, 0.5)));
    engine.tick(STEP);
    assert!(vec_approx_eq(position(&engine, actor), Vec2::new(0.0, 1.5)));

    let body = engine.tree().get_component::<RigidBody>(actor).unwrap();
    assert!(vec_approx_eq(body.velocity, Vec2::new(0.0, 4.0)));
}

#[test]
fn frozen_and_static_bodies_do_not_move() {
    let mut tree = EntityTree::new();
    let scene = tree.add_scene("s").unwrap();
    let mut frozen = RigidBody::new();
    frozen.set_velocity(Vec2::new(10.0, 0.0));
    frozen.freeze();
    let mut wall = RigidBody::fixed();
    wall.set_velocity(Vec2::new(10.0, 0.0));
    let a = body(&mut tree, scene, "frozen", Vec2::ZERO, Collider::circle(1.0), frozen);
    let b = body(&mut tree, scene, "wall", Vec2::new(50.0, 0.0), Collider::circle(1.0), wall);
    let mut engine = physics_engine(tree, scene);
    engine.tick(1.0);
    assert_eq!(position(&engine, a), Vec2::ZERO);
    assert_eq!(position(&engine, b), Vec2::new(50.0, 0.0));
}

// =============================================================================
// Deferred events
// =============================================================================

struct Pinger {
    scene: EntityId,
    log: Rc<RefCell<Vec<String>>>,
}

impl System for Pinger {
    fn name(&self) -> &str {
        "pinger"
    }

    fn fixed_update(&mut self, tree: &mut EntityTree, time: &SimTime) {
        self.log
            .borrow_mut()
            .push(format!("fixed {}", time.fixed_steps));
        tree.dispatch(
            self.scene,
            EventKind::custom("ping"),
            EventPayload::Custom(serde_json::json!(time.fixed_steps)),
        )
        .unwrap();
    }
}

#[test]
fn events_dispatched_in_a_tick_arrive_before_next_tick_systems() {
    let mut tree = EntityTree::new();
    let scene = tree.add_scene("s").unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));
    let heard = Rc::clone(&log);
    tree.on(scene, EventKind::custom("ping"), move |event: &Event, _: &EntityTree| {
        if let EventPayload::Custom(value) = event.payload() {
            heard.borrow_mut().push(format!("ping {value}"));
        }
    })
    .unwrap();

    let mut engine = Engine::new(tree, config());
    engine.add_system(Pinger {
        scene,
        log: Rc::clone(&log),
    });

    let first = engine.tick(2.0 * STEP);
    assert_eq!(first.events_delivered, 0);
    assert_eq!(*log.borrow(), vec!["fixed 0", "fixed 1"]);

    let second = engine.tick(STEP);
    assert_eq!(second.events_delivered, 2);
    assert_eq!(
        *log.borrow(),
        vec!["fixed 0", "fixed 1", "ping 0", "ping 1", "fixed 2"]
    );
}

#[test]
fn zero_frame_time_still_drains_events() {
    let mut tree = EntityTree::new();
    let scene = tree.add_scene("s").unwrap();
    tree.dispatch(scene, EventKind::custom("late"), EventPayload::None)
        .unwrap();
    let mut engine = Engine::new(tree, config());
    let summary = engine.tick(0.0);
    assert_eq!(summary.events_delivered, 1);
    assert_eq!(summary.fixed_steps, 0);
}
