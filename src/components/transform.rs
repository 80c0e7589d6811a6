//! Hierarchical 2D transform with cached matrices.
//!
//! A [`Transform`] stores local position, rotation (radians) and scale. Its
//! local, world and inverse-world matrices are cached and guarded by a dirty
//! flag:
//!
//! - writes go through [`TransformMut`], which marks the node dirty and pushes
//!   the flag down to every descendant transform that is not dirty yet;
//! - reads go through [`TransformRef`], which recomputes bottom-up on demand:
//!   the nearest ancestor transform is brought up to date first, then
//!   `world = parent.world * local`.
//!
//! Actors without a transform are transparent: a child transform composes with
//! the nearest ancestor actor that has one, and stops at the scene.
//!
//! Invariant: a dirty node never has a clean descendant. Recomputation cleans
//! ancestors before descendants, and invalidation relies on this to stop at
//! the first node that is already dirty.

use std::cell::Cell;
use std::f32::consts::PI;

use glam::{Affine2, Vec2};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::component;
use crate::entity::EntityId;
use crate::entity::tree::EntityTree;

/// Determinants below this are treated as singular.
pub const SINGULAR_EPSILON: f32 = 1e-6;

/// Local state of a transform, and its persisted form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalTransform {
    pub position: Vec2,
    /// Radians, counter-clockwise.
    pub rotation: f32,
    pub scale: Vec2,
}

impl Default for LocalTransform {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            rotation: 0.0,
            scale: Vec2::ONE,
        }
    }
}

impl LocalTransform {
    pub fn matrix(&self) -> Affine2 {
        Affine2::from_scale_angle_translation(self.scale, self.rotation, self.position)
    }
}

#[derive(Debug)]
struct MatrixCache {
    dirty: Cell<bool>,
    local: Cell<Affine2>,
    world: Cell<Affine2>,
    inverse: Cell<Affine2>,
}

impl Default for MatrixCache {
    fn default() -> Self {
        Self {
            dirty: Cell::new(true),
            local: Cell::new(Affine2::IDENTITY),
            world: Cell::new(Affine2::IDENTITY),
            inverse: Cell::new(Affine2::IDENTITY),
        }
    }
}

/// Position, rotation and scale relative to the nearest ancestor transform.
///
/// Serialized as its [`LocalTransform`]; cached matrices are never persisted
/// and a clone always starts dirty.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(from = "LocalTransform", into = "LocalTransform")]
pub struct Transform {
    local: LocalTransform,
    cache: MatrixCache,
}

component!(Transform, "transform");

impl Clone for Transform {
    fn clone(&self) -> Self {
        Self::from(self.local)
    }
}

impl From<LocalTransform> for Transform {
    fn from(local: LocalTransform) -> Self {
        Self {
            local,
            cache: MatrixCache::default(),
        }
    }
}

impl From<Transform> for LocalTransform {
    fn from(transform: Transform) -> Self {
        transform.local
    }
}

impl Transform {
    pub fn new(position: Vec2) -> Self {
        Self::from(LocalTransform {
            position,
            ..LocalTransform::default()
        })
    }

    pub fn from_xy(x: f32, y: f32) -> Self {
        Self::new(Vec2::new(x, y))
    }

    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.local.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec2) -> Self {
        self.local.scale = scale;
        self
    }

    pub fn local(&self) -> &LocalTransform {
        &self.local
    }

    pub fn is_dirty(&self) -> bool {
        self.cache.dirty.get()
    }
}

fn safe_inverse(matrix: Affine2) -> Affine2 {
    let det = matrix.matrix2.determinant();
    if det.abs() < SINGULAR_EPSILON {
        debug!("singular world matrix (det = {}), using identity inverse", det);
        Affine2::IDENTITY
    } else {
        matrix.inverse()
    }
}

/// Mark `actor`'s transform dirty and push the flag down its subtree.
///
/// Descendants that are already dirty are skipped together with their
/// subtrees unless `force` is set. Structural changes (attach, detach,
/// setting or removing a transform) force the walk, since they can change
/// which ancestor a transform composes with.
pub(crate) fn invalidate(tree: &EntityTree, actor: EntityId, force: bool) {
    let mut pending = vec![actor];
    while let Some(id) = pending.pop() {
        if let Some(transform) = tree.get_component::<Transform>(id) {
            if transform.cache.dirty.get() && !force {
                continue;
            }
            transform.cache.dirty.set(true);
        }
        pending.extend_from_slice(tree.children(id));
    }
}

/// Read access to an actor's transform with lazy world recomputation.
#[derive(Clone, Copy)]
pub struct TransformRef<'a> {
    tree: &'a EntityTree,
    actor: EntityId,
    transform: &'a Transform,
}

impl<'a> TransformRef<'a> {
    pub(crate) fn new(tree: &'a EntityTree, actor: EntityId, transform: &'a Transform) -> Self {
        Self {
            tree,
            actor,
            transform,
        }
    }

    pub fn actor(&self) -> EntityId {
        self.actor
    }

    pub fn local(&self) -> &'a LocalTransform {
        &self.transform.local
    }

    pub fn is_dirty(&self) -> bool {
        self.transform.is_dirty()
    }

    /// Transform of the nearest ancestor actor that has one.
    pub fn parent_component(&self) -> Option<TransformRef<'a>> {
        self.tree
            .parent_component::<Transform>(self.actor)
            .map(|(id, t)| TransformRef::new(self.tree, id, t))
    }

    /// Recompute cached matrices if dirty. No-op on a clean node.
    pub fn update_world_matrix(&self) {
        let cache = &self.transform.cache;
        if !cache.dirty.get() {
            return;
        }
        let local = self.transform.local.matrix();
        let world = match self.parent_component() {
            Some(parent) => {
                parent.update_world_matrix();
                parent.transform.cache.world.get() * local
            }
            None => local,
        };
        cache.local.set(local);
        cache.world.set(world);
        cache.inverse.set(safe_inverse(world));
        cache.dirty.set(false);
    }

    pub fn local_matrix(&self) -> Affine2 {
        self.update_world_matrix();
        self.transform.cache.local.get()
    }

    pub fn world_matrix(&self) -> Affine2 {
        self.update_world_matrix();
        self.transform.cache.world.get()
    }

    pub fn inverse_world_matrix(&self) -> Affine2 {
        self.update_world_matrix();
        self.transform.cache.inverse.get()
    }

    pub fn world_position(&self) -> Vec2 {
        self.world_matrix().translation
    }

    /// Recovered from the composed matrix, so it stays consistent under
    /// non-uniform ancestor scale.
    pub fn world_rotation(&self) -> f32 {
        let x_axis = self.world_matrix().matrix2.x_axis;
        x_axis.y.atan2(x_axis.x)
    }

    /// Lengths of the world basis vectors. A mirrored basis reports a negative `y`.
    pub fn world_scale(&self) -> Vec2 {
        let m = self.world_matrix().matrix2;
        let sign = if m.determinant() < 0.0 { -1.0 } else { 1.0 };
        Vec2::new(m.x_axis.length(), sign * m.y_axis.length())
    }

    pub fn to_world(&self, point: Vec2) -> Vec2 {
        self.world_matrix().transform_point2(point)
    }

    pub fn to_local(&self, point: Vec2) -> Vec2 {
        self.inverse_world_matrix().transform_point2(point)
    }
}

/// Write access to an actor's transform.
///
/// Every setter marks the node and its subtree dirty; the next read through a
/// [`TransformRef`] recomputes.
pub struct TransformMut<'a> {
    tree: &'a mut EntityTree,
    actor: EntityId,
}

impl<'a> TransformMut<'a> {
    pub(crate) fn new(tree: &'a mut EntityTree, actor: EntityId) -> Self {
        Self { tree, actor }
    }

    pub fn actor(&self) -> EntityId {
        self.actor
    }

    /// Read view of the same transform.
    pub fn read(&self) -> Option<TransformRef<'_>> {
        self.tree.transform(self.actor)
    }

    fn edit(&mut self, f: impl FnOnce(&mut LocalTransform)) -> &mut Self {
        if let Some(transform) = self.tree.get_component_mut::<Transform>(self.actor) {
            f(&mut transform.local);
        }
        invalidate(self.tree, self.actor, false);
        self
    }

    fn parent_inverse(&self) -> Option<Affine2> {
        let parent = self.tree.transform(self.actor)?.parent_component()?;
        Some(parent.inverse_world_matrix())
    }

    pub fn set_local_position(&mut self, position: Vec2) -> &mut Self {
        self.edit(|local| local.position = position)
    }

    pub fn set_local_rotation(&mut self, rotation: f32) -> &mut Self {
        self.edit(|local| local.rotation = rotation)
    }

    pub fn set_local_scale(&mut self, scale: Vec2) -> &mut Self {
        self.edit(|local| local.scale = scale)
    }

    pub fn set_local(&mut self, value: LocalTransform) -> &mut Self {
        self.edit(|local| *local = value)
    }

    pub fn translate(&mut self, delta: Vec2) -> &mut Self {
        self.edit(|local| local.position += delta)
    }

    pub fn rotate(&mut self, radians: f32) -> &mut Self {
        self.edit(|local| local.rotation += radians)
    }

    /// Solve for the local position that puts the actor at `position` in world space.
    pub fn set_world_position(&mut self, position: Vec2) -> &mut Self {
        let local_position = match self.parent_inverse() {
            Some(inverse) => inverse.transform_point2(position),
            None => position,
        };
        self.set_local_position(local_position)
    }

    /// Solve for the local rotation whose world x axis points along `rotation`.
    ///
    /// The target direction is pulled back through the parent's inverse world
    /// matrix, so the result agrees with [`TransformRef::world_rotation`] under
    /// non-uniform or mirrored ancestor scale. A negative local x scale flips
    /// the local axis, which is compensated by a half turn.
    pub fn set_world_rotation(&mut self, rotation: f32) -> &mut Self {
        let Some(inverse) = self.parent_inverse() else {
            return self.set_local_rotation(rotation);
        };
        let direction = inverse.matrix2 * Vec2::from_angle(rotation);
        let mut local_rotation = direction.y.atan2(direction.x);
        let flipped = self
            .tree
            .get_component::<Transform>(self.actor)
            .is_some_and(|t| t.local.scale.x < 0.0);
        if flipped {
            local_rotation += PI;
        }
        self.set_local_rotation(local_rotation)
    }

    /// Divide out the parent's world scale per axis. An axis where the parent
    /// scale is (nearly) zero keeps its current local value.
    pub fn set_world_scale(&mut self, scale: Vec2) -> &mut Self {
        let parent_scale = self
            .tree
            .transform(self.actor)
            .and_then(|t| t.parent_component())
            .map_or(Vec2::ONE, |p| p.world_scale());
        self.edit(|local| {
            if parent_scale.x.abs() >= SINGULAR_EPSILON {
                local.scale.x = scale.x / parent_scale.x;
            }
            if parent_scale.y.abs() >= SINGULAR_EPSILON {
                local.scale.y = scale.y / parent_scale.y;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

    const EPSILON: f32 = 1e-4;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    fn vec_approx_eq(a: Vec2, b: Vec2) -> bool {
        approx_eq(a.x, b.x) && approx_eq(a.y, b.y)
    }

    fn chain() -> (EntityTree, EntityId, EntityId) {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let parent = tree.spawn_actor(scene, "parent").unwrap();
        let child = tree.spawn_actor(parent, "child").unwrap();
        tree.set_component(
            parent,
            Transform::from_xy(10.0, 0.0)
                .with_rotation(FRAC_PI_2)
                .with_scale(Vec2::splat(2.0)),
        )
        .unwrap();
        tree.set_component(child, Transform::from_xy(1.0, 0.0)).unwrap();
        (tree, parent, child)
    }

    #[test]
    fn test_root_world_equals_local() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let a = tree.spawn_actor(scene, "a").unwrap();
        tree.set_component(a, Transform::from_xy(3.0, 4.0).with_rotation(0.5))
            .unwrap();
        let t = tree.transform(a).unwrap();
        assert!(t.parent_component().is_none());
        assert_eq!(t.world_matrix(), t.local_matrix());
    }

    #[test]
    fn test_child_composes_with_parent() {
        let (tree, _, child) = chain();
        let t = tree.transform(child).unwrap();
        // Offset (1, 0) scaled by 2 and rotated 90 degrees lands at (0, 2).
        assert!(vec_approx_eq(t.world_position(), Vec2::new(10.0, 2.0)));
        assert!(approx_eq(t.world_rotation(), FRAC_PI_2));
        assert!(vec_approx_eq(t.world_scale(), Vec2::splat(2.0)));
        let parent = t.parent_component().unwrap();
        let expected = parent.world_matrix() * t.local_matrix();
        assert!(t.world_matrix().abs_diff_eq(expected, EPSILON));
    }

    #[test]
    fn test_rotation_is_additive() {
        let (mut tree, _, child) = chain();
        tree.transform_mut(child).unwrap().set_local_rotation(FRAC_PI_4);
        let t = tree.transform(child).unwrap();
        assert!(approx_eq(t.world_rotation(), FRAC_PI_2 + FRAC_PI_4));
    }

    #[test]
    fn test_parent_change_dirties_child() {
        let (mut tree, parent, child) = chain();
        tree.transform(child).unwrap().update_world_matrix();
        assert!(!tree.transform(child).unwrap().is_dirty());
        assert!(!tree.transform(parent).unwrap().is_dirty());

        tree.transform_mut(parent)
            .unwrap()
            .set_local_position(Vec2::new(20.0, 0.0));
        assert!(tree.transform(parent).unwrap().is_dirty());
        assert!(tree.transform(child).unwrap().is_dirty());

        let t = tree.transform(child).unwrap();
        assert!(vec_approx_eq(t.world_position(), Vec2::new(20.0, 2.0)));
        assert!(!t.is_dirty());
        assert!(!tree.transform(parent).unwrap().is_dirty());
    }

    #[test]
    fn test_reading_parent_leaves_child_dirty() {
        let (tree, parent, child) = chain();
        tree.transform(parent).unwrap().update_world_matrix();
        assert!(!tree.transform(parent).unwrap().is_dirty());
        assert!(tree.transform(child).unwrap().is_dirty());
    }

    #[test]
    fn test_actor_without_transform_is_transparent() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let top = tree.spawn_actor(scene, "top").unwrap();
        let middle = tree.spawn_actor(top, "middle").unwrap();
        let leaf = tree.spawn_actor(middle, "leaf").unwrap();
        tree.set_component(top, Transform::from_xy(5.0, 5.0)).unwrap();
        tree.set_component(leaf, Transform::from_xy(1.0, 1.0)).unwrap();

        let t = tree.transform(leaf).unwrap();
        assert_eq!(t.parent_component().map(|p| p.actor()), Some(top));
        assert!(vec_approx_eq(t.world_position(), Vec2::new(6.0, 6.0)));

        tree.transform_mut(top).unwrap().translate(Vec2::new(1.0, 0.0));
        assert!(tree.transform(leaf).unwrap().is_dirty());
        let t = tree.transform(leaf).unwrap();
        assert!(vec_approx_eq(t.world_position(), Vec2::new(7.0, 6.0)));
    }

    #[test]
    fn test_set_world_position_round_trip() {
        let (mut tree, _, child) = chain();
        tree.transform_mut(child)
            .unwrap()
            .set_world_position(Vec2::new(-3.0, 7.5));
        let t = tree.transform(child).unwrap();
        assert!(vec_approx_eq(t.world_position(), Vec2::new(-3.0, 7.5)));
    }

    #[test]
    fn test_set_world_rotation_and_scale() {
        let (mut tree, _, child) = chain();
        tree.transform_mut(child)
            .unwrap()
            .set_world_rotation(0.25)
            .set_world_scale(Vec2::new(4.0, 1.0));
        let t = tree.transform(child).unwrap();
        assert!(approx_eq(t.world_rotation(), 0.25));
        assert!(vec_approx_eq(t.world_scale(), Vec2::new(4.0, 1.0)));
        assert!(vec_approx_eq(t.local().scale, Vec2::new(2.0, 0.5)));
    }

    fn world_rotation_under_parent_scale(parent_scale: Vec2, target: f32) -> f32 {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let parent = tree.spawn_actor(scene, "parent").unwrap();
        let child = tree.spawn_actor(parent, "child").unwrap();
        tree.set_component(parent, Transform::default().with_scale(parent_scale))
            .unwrap();
        tree.set_component(child, Transform::default()).unwrap();
        tree.transform_mut(child).unwrap().set_world_rotation(target);
        tree.transform(child).unwrap().world_rotation()
    }

    #[test]
    fn test_set_world_rotation_under_non_uniform_parent() {
        let got = world_rotation_under_parent_scale(Vec2::new(2.0, 1.0), FRAC_PI_4);
        assert!(approx_eq(got, FRAC_PI_4));
    }

    #[test]
    fn test_set_world_rotation_under_mirrored_parent() {
        let got = world_rotation_under_parent_scale(Vec2::new(1.0, -1.0), FRAC_PI_4);
        assert!(approx_eq(got, FRAC_PI_4));
    }

    #[test]
    fn test_set_world_rotation_with_flipped_local_scale() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let parent = tree.spawn_actor(scene, "parent").unwrap();
        let child = tree.spawn_actor(parent, "child").unwrap();
        tree.set_component(parent, Transform::default().with_rotation(0.3))
            .unwrap();
        tree.set_component(child, Transform::default().with_scale(Vec2::new(-1.0, 1.0)))
            .unwrap();
        tree.transform_mut(child).unwrap().set_world_rotation(1.0);
        assert!(approx_eq(tree.transform(child).unwrap().world_rotation(), 1.0));
    }

    #[test]
    fn test_reparenting_recomputes_world() {
        let (mut tree, parent, child) = chain();
        let scene = tree.parent(parent).unwrap();
        assert!(vec_approx_eq(
            tree.transform(child).unwrap().world_position(),
            Vec2::new(10.0, 2.0)
        ));
        tree.append_child(scene, child).unwrap();
        assert!(vec_approx_eq(
            tree.transform(child).unwrap().world_position(),
            Vec2::new(1.0, 0.0)
        ));
    }

    #[test]
    fn test_singular_matrix_falls_back_to_identity_inverse() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let a = tree.spawn_actor(scene, "a").unwrap();
        tree.set_component(a, Transform::from_xy(1.0, 1.0).with_scale(Vec2::new(0.0, 1.0)))
            .unwrap();
        let t = tree.transform(a).unwrap();
        assert_eq!(t.inverse_world_matrix(), Affine2::IDENTITY);
    }

    #[test]
    fn test_to_local_inverts_to_world() {
        let (tree, _, child) = chain();
        let t = tree.transform(child).unwrap();
        let p = Vec2::new(3.0, -2.0);
        assert!(vec_approx_eq(t.to_local(t.to_world(p)), p));
    }

    #[test]
    fn test_clone_starts_dirty_and_config_is_local_only() {
        let (tree, parent, _) = chain();
        let original = tree.get_component::<Transform>(parent).unwrap();
        tree.transform(parent).unwrap().update_world_matrix();
        assert!(!original.is_dirty());
        let copy = original.clone();
        assert!(copy.is_dirty());
        assert_eq!(copy.local(), original.local());

        let value = serde_json::to_value(original).unwrap();
        assert_eq!(value["position"], serde_json::json!([10.0, 0.0]));
        let back: Transform = serde_json::from_value(value).unwrap();
        assert_eq!(back.local(), original.local());
    }
}
