//! World-space collision geometry built from a collider and a world matrix.

use glam::{Affine2, Vec2};
use log::debug;

use crate::components::collider::{Collider, ColliderShape};

/// Lengths and separations below this are treated as zero.
pub const EPSILON: f32 = 1e-6;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_points(points: &[Vec2]) -> Self {
        let mut min = Vec2::splat(f32::INFINITY);
        let mut max = Vec2::splat(f32::NEG_INFINITY);
        for p in points {
            min = min.min(*p);
            max = max.max(*p);
        }
        Self { min, max }
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    /// Closed-interval overlap test; touching boxes overlap.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }
}

/// Oriented box: 4 corners and the outward normal of each edge.
///
/// Edge `i` runs from `points[i]` to `points[(i + 1) % 4]`; opposite edges
/// are parallel, so `normals[0]` and `normals[1]` span every separating axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxGeometry {
    pub points: [Vec2; 4],
    pub normals: [Vec2; 4],
    pub center: Vec2,
}

impl BoxGeometry {
    pub fn new(points: [Vec2; 4]) -> Self {
        let center = (points[0] + points[1] + points[2] + points[3]) * 0.25;
        let mut normals = [Vec2::ZERO; 4];
        for (i, normal) in normals.iter_mut().enumerate() {
            let start = points[i];
            let end = points[(i + 1) % 4];
            let edge = end - start;
            let mut n = Vec2::new(edge.y, -edge.x).normalize_or_zero();
            if n == Vec2::ZERO {
                debug!("degenerate box edge {}, using canonical normal", i);
                n = [Vec2::NEG_Y, Vec2::X, Vec2::Y, Vec2::NEG_X][i];
            }
            // Mirrored transforms reverse the winding; keep normals outward.
            if n.dot((start + end) * 0.5 - center) < 0.0 {
                n = -n;
            }
            *normal = n;
        }
        Self {
            points,
            normals,
            center,
        }
    }

    /// Projection interval of the box onto `axis`.
    pub fn project(&self, axis: Vec2) -> (f32, f32) {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for p in &self.points {
            let d = p.dot(axis);
            min = min.min(d);
            max = max.max(d);
        }
        (min, max)
    }

    /// Whether `point` lies inside or on the box.
    pub fn contains(&self, point: Vec2) -> bool {
        self.points
            .iter()
            .zip(&self.normals)
            .all(|(p, n)| (point - *p).dot(*n) <= 0.0)
    }

    /// Nearest point on the box outline to `point`, and the index of its edge.
    pub fn closest_on_perimeter(&self, point: Vec2) -> (Vec2, usize) {
        let mut best = (self.points[0], 0);
        let mut best_distance = f32::INFINITY;
        for i in 0..4 {
            let start = self.points[i];
            let edge = self.points[(i + 1) % 4] - start;
            let length_sq = edge.length_squared();
            let t = if length_sq < EPSILON {
                0.0
            } else {
                ((point - start).dot(edge) / length_sq).clamp(0.0, 1.0)
            };
            let candidate = start + edge * t;
            let distance = candidate.distance_squared(point);
            if distance < best_distance {
                best_distance = distance;
                best = (candidate, i);
            }
        }
        best
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Geometry {
    Box(BoxGeometry),
    Circle { center: Vec2, radius: f32 },
}

impl Geometry {
    /// Place `collider` in world space through `world`.
    ///
    /// Boxes follow rotation, scale and skew exactly. Circles stay round and
    /// scale by the longer world basis vector.
    pub fn build(collider: &Collider, world: Affine2) -> Self {
        match collider.shape {
            ColliderShape::Box { width, height } => {
                let half = Vec2::new(width.abs(), height.abs()) * 0.5;
                let o = collider.offset;
                let corners = [
                    o + Vec2::new(-half.x, -half.y),
                    o + Vec2::new(half.x, -half.y),
                    o + Vec2::new(half.x, half.y),
                    o + Vec2::new(-half.x, half.y),
                ];
                Geometry::Box(BoxGeometry::new(corners.map(|c| world.transform_point2(c))))
            }
            ColliderShape::Circle { radius } => {
                let m = world.matrix2;
                let scale = m.x_axis.length().max(m.y_axis.length());
                Geometry::Circle {
                    center: world.transform_point2(collider.offset),
                    radius: radius.abs() * scale,
                }
            }
        }
    }

    pub fn center(&self) -> Vec2 {
        match self {
            Geometry::Box(b) => b.center,
            Geometry::Circle { center, .. } => *center,
        }
    }

    pub fn aabb(&self) -> Aabb {
        match self {
            Geometry::Box(b) => Aabb::from_points(&b.points),
            Geometry::Circle { center, radius } => {
                Aabb::new(*center - Vec2::splat(*radius), *center + Vec2::splat(*radius))
            }
        }
    }
}
