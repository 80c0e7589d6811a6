//! Exact overlap tests producing minimum translation vectors.
//!
//! Every test returns `None` when the shapes do not overlap (touching counts
//! as not overlapping) and otherwise an [`Mtv`] whose `a` side moves the first
//! shape out of the second.

use arrayvec::ArrayVec;
use glam::Vec2;
use log::trace;

use crate::events::collision::Mtv;
use crate::systems::collision::geometry::{BoxGeometry, EPSILON, Geometry};

/// Dispatch on the shape combination.
pub fn intersect(a: &Geometry, b: &Geometry) -> Option<Mtv> {
    match (a, b) {
        (
            Geometry::Circle {
                center: ca,
                radius: ra,
            },
            Geometry::Circle {
                center: cb,
                radius: rb,
            },
        ) => circle_circle(*ca, *ra, *cb, *rb),
        (Geometry::Box(ba), Geometry::Box(bb)) => box_box(ba, bb),
        (Geometry::Box(ba), Geometry::Circle { center, radius }) => {
            box_circle(ba, *center, *radius)
        }
        (Geometry::Circle { center, radius }, Geometry::Box(bb)) => {
            box_circle(bb, *center, *radius).map(Mtv::swapped)
        }
    }
}

/// Overlap iff the center distance is below the radius sum.
pub fn circle_circle(ca: Vec2, ra: f32, cb: Vec2, rb: f32) -> Option<Mtv> {
    let delta = cb - ca;
    let distance = delta.length();
    let depth = ra + rb - distance;
    if depth <= 0.0 {
        return None;
    }
    let axis = if distance < EPSILON {
        trace!("coincident circle centers, separating along +x");
        Vec2::X
    } else {
        delta / distance
    };
    Some(Mtv::from_axis(axis, depth))
}

fn interval_overlap((min_a, max_a): (f32, f32), (min_b, max_b): (f32, f32)) -> f32 {
    let mut overlap = max_a.min(max_b) - min_a.max(min_b);
    // A contained interval must also travel past the nearer end to get out.
    let contained = (min_a <= min_b && max_b <= max_a) || (min_b <= min_a && max_a <= max_b);
    if overlap > 0.0 && contained {
        overlap += (min_a - min_b).abs().min((max_a - max_b).abs());
    }
    overlap
}

/// Edge normals of both boxes with parallel duplicates removed.
fn separating_axes(a: &BoxGeometry, b: &BoxGeometry) -> ArrayVec<Vec2, 4> {
    let mut axes = ArrayVec::new();
    for axis in [a.normals[0], a.normals[1], b.normals[0], b.normals[1]] {
        let parallel = axes
            .iter()
            .any(|known: &Vec2| known.perp_dot(axis).abs() < EPSILON);
        if !parallel {
            axes.push(axis);
        }
    }
    axes
}

/// Separating-axis test over the edge normals of both boxes.
pub fn box_box(a: &BoxGeometry, b: &BoxGeometry) -> Option<Mtv> {
    let axes = separating_axes(a, b);
    let mut best_axis = Vec2::ZERO;
    let mut best_depth = f32::INFINITY;
    for axis in axes {
        let overlap = interval_overlap(a.project(axis), b.project(axis));
        if overlap <= 0.0 {
            return None;
        }
        if overlap < best_depth {
            best_depth = overlap;
            best_axis = axis;
        }
    }
    if (b.center - a.center).dot(best_axis) < 0.0 {
        best_axis = -best_axis;
    }
    Some(Mtv::from_axis(best_axis, best_depth))
}

/// Box against circle through the nearest point on the box outline.
///
/// The returned `a` side belongs to the box.
pub fn box_circle(b: &BoxGeometry, center: Vec2, radius: f32) -> Option<Mtv> {
    let (nearest, edge) = b.closest_on_perimeter(center);
    let inside = b.contains(center);
    let offset = center - nearest;
    let distance = offset.length();

    if !inside && distance >= radius {
        return None;
    }
    // Direction in which the circle leaves the box.
    let axis = if distance < EPSILON {
        b.normals[edge]
    } else if inside {
        -offset / distance
    } else {
        offset / distance
    };
    let depth = if inside {
        radius + distance
    } else {
        radius - distance
    };
    Some(Mtv::from_axis(axis, depth))
}
