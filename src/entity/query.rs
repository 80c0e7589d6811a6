//! Derived actor collections kept in sync with a scene.
//!
//! An [`ActorQuery`] tracks the set of actors under a scene that pass a
//! filter. It seeds the set with one breadth-first pass and afterwards only
//! reacts to the structural and component events that bubble up to the scene,
//! so the set never needs a full rescan.
//!
//! ```ignore
//! let bodies = ActorQuery::new(&tree, scene, ActorFilter::components(&["collider", "transform"]))?;
//! bodies.on(EventKind::ActorAdded, |event, _tree| {
//!     log::info!("tracking {}", event.target());
//! });
//! ```

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use log::trace;

use crate::entity::EntityId;
use crate::entity::tree::EntityTree;
use crate::error::SetupError;
use crate::events::bus::{Event, EventKind, EventPayload, EventTarget, ListenerId};

/// Predicate deciding whether an actor belongs to a query.
pub type ActorPredicate = Rc<dyn Fn(&EntityTree, EntityId) -> bool>;

#[derive(Clone)]
pub enum ActorFilter {
    /// Every actor in the scene.
    All,
    /// Actors carrying every listed component.
    Components(Vec<&'static str>),
    Predicate(ActorPredicate),
}

impl fmt::Debug for ActorFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorFilter::All => f.write_str("All"),
            ActorFilter::Components(names) => f.debug_tuple("Components").field(names).finish(),
            ActorFilter::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl ActorFilter {
    pub fn components(names: &[&'static str]) -> Self {
        ActorFilter::Components(names.to_vec())
    }

    pub fn predicate(f: impl Fn(&EntityTree, EntityId) -> bool + 'static) -> Self {
        ActorFilter::Predicate(Rc::new(f))
    }

    pub fn matches(&self, tree: &EntityTree, actor: EntityId) -> bool {
        if !tree.is_actor(actor) {
            return false;
        }
        match self {
            ActorFilter::All => true,
            ActorFilter::Components(names) => {
                names.iter().all(|name| tree.has_component(actor, name))
            }
            ActorFilter::Predicate(predicate) => predicate(tree, actor),
        }
    }
}

struct QueryState {
    filter: ActorFilter,
    matched: RefCell<BTreeSet<EntityId>>,
    events: EventTarget<EntityTree>,
}

impl QueryState {
    /// Bring `actor`'s membership in line with the filter.
    fn reevaluate(&self, tree: &EntityTree, scene: EntityId, actor: EntityId) {
        let wanted = tree.is_descendant_of(actor, scene) && self.filter.matches(tree, actor);
        if wanted {
            self.insert(tree, actor);
        } else {
            self.evict(tree, actor);
        }
    }

    fn insert(&self, tree: &EntityTree, actor: EntityId) {
        // The borrow ends before listeners run; they may read the query.
        let added = self.matched.borrow_mut().insert(actor);
        if added {
            trace!("query: {} added", actor);
            let event = Event::new(EventKind::ActorAdded, EventPayload::Entity(actor), actor);
            self.events.emit(&event, tree);
        }
    }

    fn evict(&self, tree: &EntityTree, actor: EntityId) {
        let removed = self.matched.borrow_mut().remove(&actor);
        if removed {
            trace!("query: {} removed", actor);
            let event = Event::new(EventKind::ActorRemoved, EventPayload::Entity(actor), actor);
            self.events.emit(&event, tree);
        }
    }
}

/// Live set of `{ actor in scene subtree : filter(actor) }`.
///
/// Fires `ActorAdded` / `ActorRemoved` on its own listeners (see
/// [`ActorQuery::on`]) with the actor as both target and payload.
pub struct ActorQuery {
    scene: EntityId,
    state: Rc<QueryState>,
    subscriptions: Vec<(EventKind, ListenerId)>,
}

impl fmt::Debug for ActorQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorQuery")
            .field("scene", &self.scene)
            .field("filter", &self.state.filter)
            .field("matched", &self.state.matched.borrow().len())
            .finish()
    }
}

impl ActorQuery {
    /// Build a query over `scene` and subscribe it to the scene's events.
    pub fn new(tree: &EntityTree, scene: EntityId, filter: ActorFilter) -> Result<Self, SetupError> {
        if !tree.is_scene(scene) {
            return Err(SetupError::WrongKind {
                id: scene,
                expected: "scene",
            });
        }
        let seeded: BTreeSet<EntityId> = tree
            .actors_under(scene)
            .filter(|actor| filter.matches(tree, *actor))
            .collect();
        let state = Rc::new(QueryState {
            filter,
            matched: RefCell::new(seeded),
            events: EventTarget::new(),
        });

        // The listeners hold the state weakly, so dropping the query releases them.
        let mut subscriptions = Vec::with_capacity(4);

        let id = tree.on_owned(scene, EventKind::ChildAdded, &state, move |s, event, tree| {
            if let Some(child) = event.payload().entity() {
                for actor in tree.walk(child) {
                    s.reevaluate(tree, scene, actor);
                }
            }
        })?;
        subscriptions.push((EventKind::ChildAdded, id));

        let id = tree.on_owned(scene, EventKind::ChildRemoved, &state, |s, event, tree| {
            if let Some(child) = event.payload().entity() {
                for actor in tree.walk(child) {
                    s.evict(tree, actor);
                }
            }
        })?;
        subscriptions.push((EventKind::ChildRemoved, id));

        for kind in [EventKind::ComponentAdded, EventKind::ComponentRemoved] {
            let id = tree.on_owned(scene, kind.clone(), &state, move |s, event, tree| {
                s.reevaluate(tree, scene, event.target());
            })?;
            subscriptions.push((kind, id));
        }

        Ok(Self {
            scene,
            state,
            subscriptions,
        })
    }

    /// Matched actors in id order.
    pub fn actors(&self) -> Vec<EntityId> {
        self.state.matched.borrow().iter().copied().collect()
    }

    pub fn contains(&self, actor: EntityId) -> bool {
        self.state.matched.borrow().contains(&actor)
    }

    pub fn len(&self) -> usize {
        self.state.matched.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.matched.borrow().is_empty()
    }

    pub fn scene(&self) -> EntityId {
        self.scene
    }

    pub fn filter(&self) -> &ActorFilter {
        &self.state.filter
    }

    /// Listen for `ActorAdded` / `ActorRemoved` on this query.
    pub fn on(
        &self,
        kind: EventKind,
        listener: impl Fn(&Event, &EntityTree) + 'static,
    ) -> ListenerId {
        self.state.events.on(kind, listener)
    }

    pub fn off(&self, kind: &EventKind, listener: ListenerId) -> bool {
        self.state.events.off(kind, listener)
    }

    /// Stop tracking the scene. The set is frozen at its current content.
    pub fn unsubscribe(&mut self, tree: &EntityTree) {
        for (kind, id) in self.subscriptions.drain(..) {
            tree.off(self.scene, &kind, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component;
    use serde::{Deserialize, Serialize};
    use std::cell::Cell;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Alpha;
    component!(Alpha, "alpha");

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Beta;
    component!(Beta, "beta");

    fn both() -> ActorFilter {
        ActorFilter::components(&["alpha", "beta"])
    }

    #[test]
    fn test_seeds_from_existing_actors() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let a = tree.spawn_actor(scene, "a").unwrap();
        let b = tree.spawn_actor(a, "b").unwrap();
        tree.set_component(a, Alpha).unwrap();
        tree.set_component(b, Alpha).unwrap();
        tree.set_component(b, Beta).unwrap();

        let query = ActorQuery::new(&tree, scene, both()).unwrap();
        assert_eq!(query.actors(), vec![b]);
    }

    #[test]
    fn test_tracks_component_changes_and_fires_events() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let a = tree.spawn_actor(scene, "a").unwrap();
        let query = ActorQuery::new(&tree, scene, both()).unwrap();

        let added = Rc::new(Cell::new(0));
        let removed = Rc::new(Cell::new(0));
        let counter = Rc::clone(&added);
        query.on(EventKind::ActorAdded, move |_: &Event, _: &EntityTree| {
            counter.set(counter.get() + 1)
        });
        let counter = Rc::clone(&removed);
        query.on(EventKind::ActorRemoved, move |_: &Event, _: &EntityTree| {
            counter.set(counter.get() + 1)
        });

        tree.set_component(a, Alpha).unwrap();
        assert!(query.is_empty());
        tree.set_component(a, Beta).unwrap();
        assert!(query.contains(a));
        // Replacing a component keeps the actor without a second event.
        tree.set_component(a, Beta).unwrap();
        assert_eq!(added.get(), 1);

        tree.remove_component::<Alpha>(a).unwrap();
        assert!(query.is_empty());
        assert_eq!(removed.get(), 1);
    }

    #[test]
    fn test_tracks_subtrees_attached_and_detached() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let query = ActorQuery::new(&tree, scene, ActorFilter::All).unwrap();

        let parent = tree.create_actor("parent");
        let child = tree.create_actor("child");
        tree.append_child(parent, child).unwrap();
        assert!(query.is_empty());

        tree.append_child(scene, parent).unwrap();
        assert_eq!(query.actors(), vec![parent, child]);

        tree.remove(parent).unwrap();
        assert!(query.is_empty());

        tree.append_child(scene, parent).unwrap();
        tree.destroy(child).unwrap();
        assert_eq!(query.actors(), vec![parent]);
    }

    #[test]
    fn test_ignores_other_scenes() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let other = tree.add_scene("other").unwrap();
        let query = ActorQuery::new(&tree, scene, ActorFilter::All).unwrap();

        let stranger = tree.spawn_actor(other, "x").unwrap();
        tree.set_component(stranger, Alpha).unwrap();
        assert!(query.is_empty());

        tree.append_child(scene, stranger).unwrap();
        assert!(query.contains(stranger));
        tree.append_child(other, stranger).unwrap();
        assert!(!query.contains(stranger));
    }

    #[test]
    fn test_predicate_filter() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let query = ActorQuery::new(
            &tree,
            scene,
            ActorFilter::predicate(|tree, id| tree.name(id).is_some_and(|n| n.starts_with("enemy"))),
        )
        .unwrap();
        let e = tree.spawn_actor(scene, "enemy-1").unwrap();
        tree.spawn_actor(scene, "friend").unwrap();
        assert_eq!(query.actors(), vec![e]);
    }

    #[test]
    fn test_requires_a_scene() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let actor = tree.spawn_actor(scene, "a").unwrap();
        assert!(matches!(
            ActorQuery::new(&tree, actor, ActorFilter::All),
            Err(SetupError::WrongKind { .. })
        ));
    }

    #[test]
    fn test_unsubscribe_freezes_the_set() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        let mut query = ActorQuery::new(&tree, scene, ActorFilter::All).unwrap();
        query.unsubscribe(&tree);
        tree.spawn_actor(scene, "late").unwrap();
        assert!(query.is_empty());
        assert_eq!(tree.events(scene).unwrap().registered_kinds(), 0);
    }

    #[test]
    fn test_dropped_query_releases_scene_listeners() {
        let mut tree = EntityTree::new();
        let scene = tree.add_scene("s").unwrap();
        for _ in 0..100 {
            let query = ActorQuery::new(&tree, scene, ActorFilter::All).unwrap();
            drop(query);
        }
        let events = tree.events(scene).unwrap();
        assert_eq!(events.listener_count(&EventKind::ChildAdded), 0);
        assert_eq!(events.registered_kinds(), 0);

        let kept = ActorQuery::new(&tree, scene, ActorFilter::All).unwrap();
        let a = tree.spawn_actor(scene, "a").unwrap();
        assert_eq!(kept.actors(), vec![a]);
        assert_eq!(
            tree.events(scene).unwrap().listener_count(&EventKind::ChildAdded),
            1
        );
    }
}
