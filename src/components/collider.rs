//! Collision shape attached to an actor.
//!
//! Shapes are defined in the actor's local space around the actor origin plus
//! `offset`, and follow the actor's world transform (boxes rotate and scale;
//! circles scale by the largest axis).

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::component;

/// Closed set of collision shapes.
///
/// Persisted externally tagged: `{ "box": { "width": 8, "height": 4 } }` or
/// `{ "circle": { "radius": 5 } }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColliderShape {
    Box { width: f32, height: f32 },
    Circle { radius: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Collider {
    pub shape: ColliderShape,
    /// Shape center relative to the actor origin, in local units.
    #[serde(default)]
    pub offset: Vec2,
}

component!(Collider, "collider");

impl Collider {
    /// Box collider of the given size centered on the actor.
    pub fn boxed(width: f32, height: f32) -> Self {
        Self {
            shape: ColliderShape::Box { width, height },
            offset: Vec2::ZERO,
        }
    }

    pub fn circle(radius: f32) -> Self {
        Self {
            shape: ColliderShape::Circle { radius },
            offset: Vec2::ZERO,
        }
    }

    pub fn with_offset(mut self, offset: Vec2) -> Self {
        self.offset = offset;
        self
    }

    pub fn is_box(&self) -> bool {
        matches!(self.shape, ColliderShape::Box { .. })
    }

    pub fn is_circle(&self) -> bool {
        matches!(self.shape, ColliderShape::Circle { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constructors() {
        let b = Collider::boxed(10.0, 4.0).with_offset(Vec2::new(1.0, 2.0));
        assert!(b.is_box());
        assert_eq!(b.offset, Vec2::new(1.0, 2.0));
        assert!(Collider::circle(3.0).is_circle());
    }

    #[test]
    fn test_config_format() {
        let c: Collider = serde_json::from_value(json!({
            "shape": { "circle": { "radius": 5.0 } }
        }))
        .unwrap();
        assert_eq!(c, Collider::circle(5.0));

        let value = serde_json::to_value(Collider::boxed(8.0, 4.0)).unwrap();
        assert_eq!(value["shape"], json!({ "box": { "width": 8.0, "height": 4.0 } }));
    }

    #[test]
    fn test_unknown_shape_is_rejected() {
        let result = serde_json::from_value::<Collider>(json!({
            "shape": { "polygon": { "points": [] } }
        }));
        assert!(result.is_err());
    }
}
