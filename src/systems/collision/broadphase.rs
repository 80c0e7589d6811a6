//! Sweep-and-prune broad phase with adaptive axis choice.
//!
//! Two lists hold every tracked body ordered by the minimum of its bounding
//! box on X and on Y. Each list also keeps a running sum and sum of squares
//! of body centers on its axis, updated incrementally as bodies move. The
//! sweep runs on the axis where centers are more spread out, which separates
//! clustered bodies best and yields fewer candidate pairs.
//!
//! Bodies move little between ticks, so the lists are re-sorted with an
//! insertion sort that is close to linear on nearly sorted input.

use glam::Vec2;
use rustc_hash::FxHashMap;

use crate::entity::EntityId;
use crate::events::collision::PairKey;
use crate::systems::collision::geometry::Aabb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub fn of(self, v: Vec2) -> f32 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
        }
    }
}

/// Bodies ordered by bound minimum on one axis, with center statistics.
#[derive(Debug, Clone)]
pub struct AxisList {
    axis: Axis,
    order: Vec<EntityId>,
    sum: f64,
    sum_sq: f64,
}

impl AxisList {
    pub fn new(axis: Axis) -> Self {
        Self {
            axis,
            order: Vec::new(),
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn order(&self) -> &[EntityId] {
        &self.order
    }

    fn add_center(&mut self, aabb: &Aabb) {
        let c = self.axis.of(aabb.center()) as f64;
        self.sum += c;
        self.sum_sq += c * c;
    }

    fn remove_center(&mut self, aabb: &Aabb) {
        let c = self.axis.of(aabb.center()) as f64;
        self.sum -= c;
        self.sum_sq -= c * c;
    }

    /// Spread of body centers on this axis (population variance).
    pub fn dispersion(&self) -> f64 {
        let n = self.order.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.sum / n as f64;
        (self.sum_sq / n as f64 - mean * mean).max(0.0)
    }

    fn sort(&mut self, bounds: &FxHashMap<EntityId, Aabb>) {
        let axis = self.axis;
        let key = |id: &EntityId| bounds.get(id).map_or(f32::INFINITY, |b| axis.of(b.min));
        for i in 1..self.order.len() {
            let mut j = i;
            while j > 0 && key(&self.order[j - 1]) > key(&self.order[j]) {
                self.order.swap(j - 1, j);
                j -= 1;
            }
        }
    }
}

/// Both axis lists plus the current bounds of every tracked body.
#[derive(Debug, Clone)]
pub struct SweepAndPrune {
    bounds: FxHashMap<EntityId, Aabb>,
    x: AxisList,
    y: AxisList,
}

impl Default for SweepAndPrune {
    fn default() -> Self {
        Self::new()
    }
}

impl SweepAndPrune {
    pub fn new() -> Self {
        Self {
            bounds: FxHashMap::default(),
            x: AxisList::new(Axis::X),
            y: AxisList::new(Axis::Y),
        }
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.bounds.contains_key(&id)
    }

    pub fn bounds(&self, id: EntityId) -> Option<&Aabb> {
        self.bounds.get(&id)
    }

    /// Start tracking `id` or move it to new bounds.
    pub fn upsert(&mut self, id: EntityId, aabb: Aabb) {
        match self.bounds.insert(id, aabb) {
            Some(old) => {
                self.x.remove_center(&old);
                self.y.remove_center(&old);
            }
            None => {
                self.x.order.push(id);
                self.y.order.push(id);
            }
        }
        self.x.add_center(&aabb);
        self.y.add_center(&aabb);
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Aabb> {
        let old = self.bounds.remove(&id)?;
        self.x.remove_center(&old);
        self.y.remove_center(&old);
        self.x.order.retain(|e| *e != id);
        self.y.order.retain(|e| *e != id);
        Some(old)
    }

    /// The axis the next sweep runs on. Ties go to X.
    pub fn sweep_axis(&self) -> Axis {
        if self.y.dispersion() > self.x.dispersion() {
            Axis::Y
        } else {
            Axis::X
        }
    }

    pub fn axis_list(&self, axis: Axis) -> &AxisList {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
        }
    }

    /// Pairs whose bounding boxes overlap, each reported once, in key order.
    pub fn candidates(&mut self) -> Vec<PairKey> {
        self.x.sort(&self.bounds);
        self.y.sort(&self.bounds);

        let axis = self.sweep_axis();
        let list = match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
        };

        let mut active: Vec<(EntityId, Aabb)> = Vec::new();
        let mut pairs = Vec::new();
        for id in &list.order {
            let Some(aabb) = self.bounds.get(id) else {
                continue;
            };
            let start = axis.of(aabb.min);
            active.retain(|(_, other)| axis.of(other.max) >= start);
            for (other_id, other) in &active {
                if other.overlaps(aabb) {
                    pairs.push(PairKey::new(*other_id, *id));
                }
            }
            active.push((*id, *aabb));
        }
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }
}
