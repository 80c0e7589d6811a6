//! Collision detection over actors with a collider and a transform.
//!
//! One [`CollisionDetector::detect`] pass per fixed tick:
//!
//! 1. **Reorientation check** – each tracked entry compares its snapshot of
//!    the actor's world matrix and collider against the current values; only
//!    changed entries rebuild their geometry and bounds.
//! 2. **Broad phase** – [`SweepAndPrune`] yields candidate pairs.
//! 3. **Narrow phase** – [`narrow::intersect`] runs the exact shape test and
//!    computes the minimum translation vectors.
//! 4. **Classification** – pairs are split into enter / stay / leave against
//!    the previous tick's contacts.
//!
//! [`CollisionReport::publish`] then fires the matching events on both actors
//! of every pair.

pub mod broadphase;
pub mod geometry;
pub mod narrow;

use glam::Affine2;
use log::{debug, trace, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::components::collider::Collider;
use crate::entity::EntityId;
use crate::entity::tree::EntityTree;
use crate::events::bus::EventPayload;
use crate::events::collision::{CollisionEvent, CollisionPhase, PairKey};
use crate::systems::collision::broadphase::SweepAndPrune;
use crate::systems::collision::geometry::{Aabb, Geometry};

/// Inputs the cached geometry was built from.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Snapshot {
    world: Affine2,
    collider: Collider,
}

/// Cached world-space shape of one actor.
#[derive(Debug, Clone)]
pub struct CollisionEntry {
    pub actor: EntityId,
    pub aabb: Aabb,
    pub geometry: Geometry,
    snapshot: Snapshot,
}

impl CollisionEntry {
    fn build(actor: EntityId, snapshot: Snapshot) -> Self {
        let geometry = Geometry::build(&snapshot.collider, snapshot.world);
        Self {
            actor,
            aabb: geometry.aabb(),
            geometry,
            snapshot,
        }
    }
}

/// Counters from the last detection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionStats {
    pub tracked: usize,
    pub rebuilt: usize,
    pub candidates: usize,
    pub contacts: usize,
}

/// Classified pairs of one detection pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollisionReport {
    pub enter: Vec<CollisionEvent>,
    pub stay: Vec<CollisionEvent>,
    pub leave: Vec<CollisionEvent>,
}

impl CollisionReport {
    pub fn is_empty(&self) -> bool {
        self.enter.is_empty() && self.stay.is_empty() && self.leave.is_empty()
    }

    pub fn len(&self) -> usize {
        self.enter.len() + self.stay.len() + self.leave.len()
    }

    /// Every event tagged with its phase: enters, then stays, then leaves.
    pub fn iter(&self) -> impl Iterator<Item = (CollisionPhase, &CollisionEvent)> {
        self.enter
            .iter()
            .map(|e| (CollisionPhase::Enter, e))
            .chain(self.stay.iter().map(|e| (CollisionPhase::Stay, e)))
            .chain(self.leave.iter().map(|e| (CollisionPhase::Leave, e)))
    }

    /// Fire each event immediately on both actors; it bubbles to their scene.
    /// Actors destroyed since detection are skipped.
    pub fn publish(&self, tree: &EntityTree) {
        for (phase, event) in self.iter() {
            for actor in [event.a, event.b] {
                if !tree.contains(actor) {
                    continue;
                }
                let result = tree.dispatch_immediately(
                    actor,
                    phase.kind(),
                    EventPayload::Collision(*event),
                );
                if let Err(e) = result {
                    warn!("collision event lost: {}", e);
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct CollisionDetector {
    entries: FxHashMap<EntityId, CollisionEntry>,
    broadphase: SweepAndPrune,
    contacts: FxHashMap<PairKey, CollisionEvent>,
    stats: DetectionStats,
}

impl CollisionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, actor: EntityId) -> Option<&CollisionEntry> {
        self.entries.get(&actor)
    }

    pub fn stats(&self) -> DetectionStats {
        self.stats
    }

    pub fn broadphase(&self) -> &SweepAndPrune {
        &self.broadphase
    }

    /// Pairs overlapping after the last pass.
    pub fn contacts(&self) -> impl Iterator<Item = &CollisionEvent> {
        self.contacts.values()
    }

    pub fn is_touching(&self, a: EntityId, b: EntityId) -> bool {
        self.contacts.contains_key(&PairKey::new(a, b))
    }

    fn forget(&mut self, actor: EntityId) {
        self.entries.remove(&actor);
        self.broadphase.remove(actor);
    }

    /// Refresh entries for `actors` and drop everything else.
    fn refresh(&mut self, tree: &EntityTree, actors: &[EntityId]) {
        let mut live: FxHashSet<EntityId> = FxHashSet::default();
        let mut rebuilt = 0;
        for &actor in actors {
            let (Some(collider), Some(transform)) =
                (tree.get_component::<Collider>(actor), tree.transform(actor))
            else {
                continue;
            };
            live.insert(actor);
            let snapshot = Snapshot {
                world: transform.world_matrix(),
                collider: *collider,
            };
            if self
                .entries
                .get(&actor)
                .is_some_and(|entry| entry.snapshot == snapshot)
            {
                continue;
            }
            let entry = CollisionEntry::build(actor, snapshot);
            self.broadphase.upsert(actor, entry.aabb);
            self.entries.insert(actor, entry);
            rebuilt += 1;
        }

        let stale: Vec<EntityId> = self
            .entries
            .keys()
            .filter(|id| !live.contains(id))
            .copied()
            .collect();
        for actor in stale {
            self.forget(actor);
        }
        self.stats.tracked = self.entries.len();
        self.stats.rebuilt = rebuilt;
    }

    /// Run one detection pass over `actors` and classify the overlaps.
    pub fn detect(&mut self, tree: &EntityTree, actors: &[EntityId]) -> CollisionReport {
        self.refresh(tree, actors);

        let candidates = self.broadphase.candidates();
        self.stats.candidates = candidates.len();

        let mut current: FxHashMap<PairKey, CollisionEvent> = FxHashMap::default();
        for key in candidates {
            let (Some(a), Some(b)) = (self.entries.get(&key.first()), self.entries.get(&key.second()))
            else {
                continue;
            };
            if let Some(mtv) = narrow::intersect(&a.geometry, &b.geometry) {
                current.insert(key, CollisionEvent::new(key.first(), key.second(), mtv));
            }
        }
        self.stats.contacts = current.len();

        let mut report = CollisionReport::default();
        for (key, event) in &current {
            if self.contacts.contains_key(key) {
                report.stay.push(*event);
            } else {
                report.enter.push(*event);
            }
        }
        for (key, event) in &self.contacts {
            if !current.contains_key(key) {
                report.leave.push(*event);
            }
        }
        for list in [&mut report.enter, &mut report.stay, &mut report.leave] {
            list.sort_unstable_by_key(CollisionEvent::key);
        }
        self.contacts = current;

        if !report.enter.is_empty() || !report.leave.is_empty() {
            debug!(
                "collisions: {} enter, {} stay, {} leave",
                report.enter.len(),
                report.stay.len(),
                report.leave.len()
            );
        }
        trace!("detection stats: {:?}", self.stats);
        report
    }

    /// Drop all cached entries and contacts.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.broadphase = SweepAndPrune::new();
        self.contacts.clear();
        self.stats = DetectionStats::default();
    }
}
