//! Velocity integration for rigid bodies.
//!
//! Runs on the fixed tick before collision detection. For every dynamic,
//! non-frozen [`RigidBody`] with a [`Transform`](crate::components::transform::Transform):
//!
//! 1. velocity += sum of enabled forces * dt
//! 2. velocity *= max(0, 1 - friction * dt)
//! 3. velocity is clamped to `max_speed` if set
//! 4. local position += velocity * dt

use glam::Vec2;

use crate::components::rigidbody::RigidBody;
use crate::entity::EntityId;
use crate::entity::tree::EntityTree;

/// Advance one body's velocity by `dt` and return the displacement to apply.
pub fn step_body(body: &mut RigidBody, dt: f32) -> Vec2 {
    body.velocity += body.total_acceleration() * dt;
    if body.friction > 0.0 {
        body.velocity *= (1.0 - body.friction * dt).max(0.0);
    }
    if let Some(max_speed) = body.max_speed {
        body.velocity = body.velocity.clamp_length_max(max_speed.max(0.0));
    }
    body.velocity * dt
}

/// Integrate every movable body among `actors`. Returns how many moved.
pub fn integrate(tree: &mut EntityTree, actors: &[EntityId], dt: f32) -> usize {
    let mut moved = 0;
    for &actor in actors {
        let Some(body) = tree.get_component_mut::<RigidBody>(actor) else {
            continue;
        };
        if body.frozen || body.is_static() {
            continue;
        }
        let displacement = step_body(body, dt);
        if displacement == Vec2::ZERO {
            continue;
        }
        if let Some(mut transform) = tree.transform_mut(actor) {
            transform.translate(displacement);
            moved += 1;
        }
    }
    moved
}
