//! Arena of World, Scene and Actor nodes.
//!
//! The [`EntityTree`] owns every node. Parent links are plain [`EntityId`]s
//! (non-owning back references) and children are ordered id lists, so
//! structural edits never fight the borrow checker and events can bubble by
//! walking ids.
//!
//! Shape rules, enforced by [`EntityTree::append_child`]:
//! - the World is the root and holds Scenes;
//! - a Scene holds Actors and owns keyed data and spawn templates;
//! - an Actor holds Actors and owns a [`ComponentStore`].
//!
//! Structural changes fire immediate events on the parent (`ChildAdded` /
//! `ChildRemoved`) and component changes fire on the actor
//! (`ComponentAdded` / `ComponentRemoved`). All of them bubble up to the scene
//! and the world, which is how derived collections stay in sync.

use std::collections::VecDeque;
use std::rc::Rc;

use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::components::transform::{self, Transform, TransformMut, TransformRef};
use crate::entity::EntityId;
use crate::entity::component::{Component, ComponentKind, ComponentStore};
use crate::entity::config::ActorConfig;
use crate::error::SetupError;
use crate::events::bus::{
    self, EventKind, EventParents, EventPayload, EventTarget, ListenerId,
};
use crate::events::queue::EventQueue;
use crate::resources::scenedata::SceneData;

/// State owned by a scene node.
#[derive(Debug, Default)]
pub struct SceneNode {
    /// Arbitrary keyed data.
    pub data: SceneData,
    /// Actor descriptions that [`EntityTree::spawn`] instantiates.
    pub templates: FxHashMap<String, ActorConfig>,
}

#[derive(Debug)]
pub enum NodeKind {
    World,
    Scene(Box<SceneNode>),
    Actor(ComponentStore),
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::World => "world",
            NodeKind::Scene(_) => "scene",
            NodeKind::Actor(_) => "actor",
        }
    }
}

#[derive(Debug)]
pub struct Node {
    id: EntityId,
    name: String,
    parent: Option<EntityId>,
    children: Vec<EntityId>,
    kind: NodeKind,
    events: EventTarget<EntityTree>,
}

impl Node {
    fn new(id: EntityId, name: String, kind: NodeKind) -> Self {
        Self {
            id,
            name,
            parent: None,
            children: Vec::new(),
            kind,
            events: EventTarget::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_actor(&self) -> bool {
        matches!(self.kind, NodeKind::Actor(_))
    }

    pub fn is_scene(&self) -> bool {
        matches!(self.kind, NodeKind::Scene(_))
    }

    pub fn components(&self) -> Option<&ComponentStore> {
        match &self.kind {
            NodeKind::Actor(store) => Some(store),
            _ => None,
        }
    }

    pub fn events(&self) -> &EventTarget<EntityTree> {
        &self.events
    }
}

/// How far [`EntityTree::find_child`] searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildSearch {
    /// Immediate children only.
    Immediate,
    /// All descendants, breadth first.
    Recursive,
}

/// Breadth-first iterator over a node and all its descendants.
pub struct BreadthFirst<'a> {
    tree: &'a EntityTree,
    queue: VecDeque<EntityId>,
}

impl Iterator for BreadthFirst<'_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        let id = self.queue.pop_front()?;
        self.queue.extend(self.tree.children(id).iter().copied());
        Some(id)
    }
}

/// Owner of every node, the listener registries and the deferred event queue.
#[derive(Debug)]
pub struct EntityTree {
    nodes: FxHashMap<EntityId, Node>,
    root: EntityId,
    next_id: u64,
    queue: EventQueue,
}

impl Default for EntityTree {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityTree {
    /// Create a tree whose root is a World node, with its own event queue.
    pub fn new() -> Self {
        Self::with_queue(EventQueue::new())
    }

    /// Create a tree that schedules deferred events on `queue`.
    pub fn with_queue(queue: EventQueue) -> Self {
        let root = EntityId(0);
        let mut nodes = FxHashMap::default();
        nodes.insert(root, Node::new(root, "world".to_string(), NodeKind::World));
        Self {
            nodes,
            root,
            next_id: 1,
            queue,
        }
    }

    pub fn root(&self) -> EntityId {
        self.root
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ---------------------------------------------------------------------
    // Node creation
    // ---------------------------------------------------------------------

    fn allocate_id(&mut self) -> EntityId {
        while self.nodes.contains_key(&EntityId(self.next_id)) {
            self.next_id += 1;
        }
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    fn insert_node(
        &mut self,
        id: Option<EntityId>,
        name: impl Into<String>,
        kind: NodeKind,
    ) -> Result<EntityId, SetupError> {
        let id = match id {
            Some(id) if self.nodes.contains_key(&id) => return Err(SetupError::DuplicateId(id)),
            Some(id) => id,
            None => self.allocate_id(),
        };
        self.nodes.insert(id, Node::new(id, name.into(), kind));
        Ok(id)
    }

    /// Create a detached actor with a fresh id.
    pub fn create_actor(&mut self, name: impl Into<String>) -> EntityId {
        let id = self.allocate_id();
        self.nodes.insert(
            id,
            Node::new(id, name.into(), NodeKind::Actor(ComponentStore::new())),
        );
        id
    }

    /// Create a detached actor with a caller-chosen id.
    pub fn create_actor_with_id(
        &mut self,
        id: EntityId,
        name: impl Into<String>,
    ) -> Result<EntityId, SetupError> {
        self.insert_node(Some(id), name, NodeKind::Actor(ComponentStore::new()))
    }

    /// Create a detached scene.
    pub fn create_scene(
        &mut self,
        id: Option<EntityId>,
        name: impl Into<String>,
    ) -> Result<EntityId, SetupError> {
        self.insert_node(id, name, NodeKind::Scene(Box::default()))
    }

    /// Create a scene and attach it to the world.
    pub fn add_scene(&mut self, name: impl Into<String>) -> Result<EntityId, SetupError> {
        let scene = self.create_scene(None, name)?;
        self.append_child(self.root, scene)?;
        Ok(scene)
    }

    /// Create an actor and attach it under `parent` (a scene or an actor).
    pub fn spawn_actor(
        &mut self,
        parent: EntityId,
        name: impl Into<String>,
    ) -> Result<EntityId, SetupError> {
        let actor = self.create_actor(name);
        self.append_child(parent, actor)?;
        Ok(actor)
    }

    // ---------------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------------

    pub fn contains(&self, id: EntityId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: EntityId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn name(&self, id: EntityId) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.name.as_str())
    }

    pub fn set_name(&mut self, id: EntityId, name: impl Into<String>) -> Result<(), SetupError> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(SetupError::UnknownEntity(id))?;
        node.name = name.into();
        Ok(())
    }

    pub fn parent(&self, id: EntityId) -> Option<EntityId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// Children of `id` in insertion order; empty for unknown ids.
    pub fn children(&self, id: EntityId) -> &[EntityId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
    }

    pub fn is_actor(&self, id: EntityId) -> bool {
        self.nodes.get(&id).is_some_and(Node::is_actor)
    }

    pub fn is_scene(&self, id: EntityId) -> bool {
        self.nodes.get(&id).is_some_and(Node::is_scene)
    }

    /// True when `ancestor` is `id` itself or appears on its parent chain.
    pub fn is_descendant_of(&self, id: EntityId, ancestor: EntityId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Nearest scene at or above `id`.
    pub fn scene_of(&self, id: EntityId) -> Option<EntityId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if self.is_scene(node) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    /// Breadth-first walk over `id` and all its descendants.
    pub fn walk(&self, id: EntityId) -> BreadthFirst<'_> {
        let mut queue = VecDeque::new();
        if self.contains(id) {
            queue.push_back(id);
        }
        BreadthFirst { tree: self, queue }
    }

    /// Actors below `id` (excluding `id`), breadth first.
    pub fn actors_under(&self, id: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.walk(id).skip(1).filter(|a| self.is_actor(*a))
    }

    /// First child of `id` matching `predicate`.
    pub fn find_child(
        &self,
        id: EntityId,
        search: ChildSearch,
        predicate: impl Fn(&Node) -> bool,
    ) -> Option<EntityId> {
        match search {
            ChildSearch::Immediate => self
                .children(id)
                .iter()
                .copied()
                .find(|c| self.nodes.get(c).is_some_and(&predicate)),
            ChildSearch::Recursive => self
                .walk(id)
                .skip(1)
                .find(|c| self.nodes.get(c).is_some_and(&predicate)),
        }
    }

    pub fn find_child_by_id(
        &self,
        id: EntityId,
        search: ChildSearch,
        child: EntityId,
    ) -> Option<EntityId> {
        self.find_child(id, search, |n| n.id == child)
    }

    pub fn find_child_by_name(
        &self,
        id: EntityId,
        search: ChildSearch,
        name: &str,
    ) -> Option<EntityId> {
        self.find_child(id, search, |n| n.name == name)
    }

    pub fn scene_node(&self, scene: EntityId) -> Option<&SceneNode> {
        match &self.nodes.get(&scene)?.kind {
            NodeKind::Scene(node) => Some(node),
            _ => None,
        }
    }

    pub fn scene_node_mut(&mut self, scene: EntityId) -> Option<&mut SceneNode> {
        match &mut self.nodes.get_mut(&scene)?.kind {
            NodeKind::Scene(node) => Some(node),
            _ => None,
        }
    }

    pub fn scene_data(&self, scene: EntityId) -> Option<&SceneData> {
        self.scene_node(scene).map(|s| &s.data)
    }

    pub fn scene_data_mut(&mut self, scene: EntityId) -> Option<&mut SceneData> {
        self.scene_node_mut(scene).map(|s| &mut s.data)
    }

    // ---------------------------------------------------------------------
    // Structure
    // ---------------------------------------------------------------------

    fn check_attach(&self, parent: EntityId, child: EntityId) -> Result<(), SetupError> {
        let parent_node = self
            .nodes
            .get(&parent)
            .ok_or(SetupError::UnknownEntity(parent))?;
        let child_node = self
            .nodes
            .get(&child)
            .ok_or(SetupError::UnknownEntity(child))?;
        let allowed = matches!(
            (&parent_node.kind, &child_node.kind),
            (NodeKind::World, NodeKind::Scene(_))
                | (NodeKind::Scene(_), NodeKind::Actor(_))
                | (NodeKind::Actor(_), NodeKind::Actor(_))
        );
        if !allowed {
            return Err(SetupError::InvalidHierarchy {
                parent,
                child,
                reason: "node kinds cannot be nested this way",
            });
        }
        if self.is_descendant_of(parent, child) {
            return Err(SetupError::InvalidHierarchy {
                parent,
                child,
                reason: "child is an ancestor of the parent",
            });
        }
        Ok(())
    }

    /// Attach `child` as the last child of `parent`.
    ///
    /// A child that already has a parent is detached from it first (firing
    /// `ChildRemoved` there). Fires `ChildAdded` on `parent` with the child as
    /// payload.
    pub fn append_child(&mut self, parent: EntityId, child: EntityId) -> Result<(), SetupError> {
        self.check_attach(parent, child)?;
        if let Some(old_parent) = self.parent(child) {
            self.remove_child(old_parent, child)?;
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
        transform::invalidate(self, child, true);
        self.dispatch_immediately(parent, EventKind::ChildAdded, EventPayload::Entity(child))
    }

    /// Detach `child` from `parent`, firing `ChildRemoved` on `parent`.
    pub fn remove_child(&mut self, parent: EntityId, child: EntityId) -> Result<(), SetupError> {
        if !self.contains(child) {
            return Err(SetupError::UnknownEntity(child));
        }
        let parent_node = self
            .nodes
            .get_mut(&parent)
            .ok_or(SetupError::UnknownEntity(parent))?;
        let Some(index) = parent_node.children.iter().position(|c| *c == child) else {
            return Err(SetupError::InvalidHierarchy {
                parent,
                child,
                reason: "not a child of this parent",
            });
        };
        parent_node.children.remove(index);
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = None;
        }
        transform::invalidate(self, child, true);
        self.dispatch_immediately(parent, EventKind::ChildRemoved, EventPayload::Entity(child))
    }

    /// Detach `id` from its parent. No-op for the root or detached nodes.
    pub fn remove(&mut self, id: EntityId) -> Result<(), SetupError> {
        match self.parent(id) {
            Some(parent) => self.remove_child(parent, id),
            None if self.contains(id) => Ok(()),
            None => Err(SetupError::UnknownEntity(id)),
        }
    }

    /// Detach `id` and drop it together with its whole subtree.
    ///
    /// Returns the number of nodes dropped.
    pub fn destroy(&mut self, id: EntityId) -> Result<usize, SetupError> {
        if id == self.root {
            return Err(SetupError::InvalidHierarchy {
                parent: id,
                child: id,
                reason: "the world root cannot be destroyed",
            });
        }
        self.remove(id)?;
        let doomed: Vec<EntityId> = self.walk(id).collect();
        for node in &doomed {
            self.nodes.remove(node);
        }
        debug!("destroyed {} ({} nodes)", id, doomed.len());
        Ok(doomed.len())
    }

    // ---------------------------------------------------------------------
    // Components
    // ---------------------------------------------------------------------

    fn store_mut(&mut self, actor: EntityId) -> Result<&mut ComponentStore, SetupError> {
        match &mut self
            .nodes
            .get_mut(&actor)
            .ok_or(SetupError::UnknownEntity(actor))?
            .kind
        {
            NodeKind::Actor(store) => Ok(store),
            _ => Err(SetupError::WrongKind {
                id: actor,
                expected: "actor",
            }),
        }
    }

    pub fn components(&self, actor: EntityId) -> Option<&ComponentStore> {
        self.nodes.get(&actor).and_then(Node::components)
    }

    /// Store `component` on `actor`, replacing any instance with the same name.
    /// Fires `ComponentAdded` with the component name.
    pub fn set_component<T: Component>(
        &mut self,
        actor: EntityId,
        component: T,
    ) -> Result<Option<Box<dyn Component>>, SetupError> {
        self.set_boxed_component(actor, Box::new(component))
    }

    pub fn set_boxed_component(
        &mut self,
        actor: EntityId,
        component: Box<dyn Component>,
    ) -> Result<Option<Box<dyn Component>>, SetupError> {
        let name = component.name();
        let replaced = self.store_mut(actor)?.insert(component);
        if name == Transform::NAME {
            transform::invalidate(self, actor, true);
        }
        self.dispatch_immediately(actor, EventKind::ComponentAdded, EventPayload::Component(name))?;
        Ok(replaced)
    }

    /// Remove the component named `name`. Fires `ComponentRemoved` when
    /// something was removed.
    pub fn remove_component_by_name(
        &mut self,
        actor: EntityId,
        name: &str,
    ) -> Result<Option<Box<dyn Component>>, SetupError> {
        let Some(removed) = self.store_mut(actor)?.remove(name) else {
            return Ok(None);
        };
        let name = removed.name();
        if name == Transform::NAME {
            transform::invalidate(self, actor, true);
        }
        self.dispatch_immediately(
            actor,
            EventKind::ComponentRemoved,
            EventPayload::Component(name),
        )?;
        Ok(Some(removed))
    }

    pub fn remove_component<T: ComponentKind>(
        &mut self,
        actor: EntityId,
    ) -> Result<Option<Box<dyn Component>>, SetupError> {
        self.remove_component_by_name(actor, T::NAME)
    }

    pub fn get_component<T: ComponentKind>(&self, actor: EntityId) -> Option<&T> {
        self.components(actor)?.get::<T>()
    }

    /// Mutable access to a component's data.
    ///
    /// [`Transform`] exposes no public mutators through this path; use
    /// [`EntityTree::transform_mut`] so descendants are invalidated.
    pub fn get_component_mut<T: ComponentKind>(&mut self, actor: EntityId) -> Option<&mut T> {
        match &mut self.nodes.get_mut(&actor)?.kind {
            NodeKind::Actor(store) => store.get_mut::<T>(),
            _ => None,
        }
    }

    pub fn has_component(&self, actor: EntityId, name: &str) -> bool {
        self.components(actor).is_some_and(|s| s.contains(name))
    }

    /// Component that setup code cannot do without.
    pub fn require_component<T: ComponentKind>(&self, actor: EntityId) -> Result<&T, SetupError> {
        if !self.contains(actor) {
            return Err(SetupError::UnknownEntity(actor));
        }
        self.get_component::<T>(actor)
            .ok_or(SetupError::MissingComponent {
                actor,
                component: T::NAME,
            })
    }

    /// The same-typed component on the nearest ancestor actor that has one.
    pub fn parent_component<T: ComponentKind>(&self, actor: EntityId) -> Option<(EntityId, &T)> {
        let mut current = self.parent(actor);
        while let Some(id) = current {
            let node = self.nodes.get(&id)?;
            let store = node.components()?;
            if let Some(component) = store.get::<T>() {
                return Some((id, component));
            }
            current = node.parent;
        }
        None
    }

    pub fn transform(&self, actor: EntityId) -> Option<TransformRef<'_>> {
        self.get_component::<Transform>(actor)
            .map(|t| TransformRef::new(self, actor, t))
    }

    pub fn transform_mut(&mut self, actor: EntityId) -> Option<TransformMut<'_>> {
        if self.get_component::<Transform>(actor).is_some() {
            Some(TransformMut::new(self, actor))
        } else {
            None
        }
    }

    // ---------------------------------------------------------------------
    // Cloning
    // ---------------------------------------------------------------------

    /// Deep copy of an actor subtree with fresh ids. The copy is detached.
    pub fn clone_actor(&mut self, actor: EntityId) -> Result<EntityId, SetupError> {
        let node = self
            .nodes
            .get(&actor)
            .ok_or(SetupError::UnknownEntity(actor))?;
        let NodeKind::Actor(store) = &node.kind else {
            return Err(SetupError::WrongKind {
                id: actor,
                expected: "actor",
            });
        };
        let name = node.name.clone();
        let components = store.duplicate();
        let children = node.children.clone();

        let copy = self.allocate_id();
        self.nodes
            .insert(copy, Node::new(copy, name, NodeKind::Actor(components)));
        for child in children {
            let child_copy = self.clone_actor(child)?;
            self.append_child(copy, child_copy)?;
        }
        Ok(copy)
    }

    // ---------------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------------

    pub fn events(&self, id: EntityId) -> Option<&EventTarget<EntityTree>> {
        self.nodes.get(&id).map(|n| &n.events)
    }

    /// Register a listener on `id`.
    pub fn on(
        &self,
        id: EntityId,
        kind: EventKind,
        listener: impl Fn(&bus::Event, &EntityTree) + 'static,
    ) -> Result<ListenerId, SetupError> {
        let events = self.events(id).ok_or(SetupError::UnknownEntity(id))?;
        Ok(events.on(kind, listener))
    }

    /// Like [`EntityTree::on`], but the listener is released once `owner` is dropped.
    pub fn on_owned<T: 'static>(
        &self,
        id: EntityId,
        kind: EventKind,
        owner: &Rc<T>,
        listener: impl Fn(&T, &bus::Event, &EntityTree) + 'static,
    ) -> Result<ListenerId, SetupError> {
        let events = self.events(id).ok_or(SetupError::UnknownEntity(id))?;
        Ok(events.on_owned(kind, owner, listener))
    }

    pub fn off(&self, id: EntityId, kind: &EventKind, listener: ListenerId) -> bool {
        self.events(id).is_some_and(|e| e.off(kind, listener))
    }

    /// Queue an event for delivery at the next drain.
    pub fn dispatch(
        &self,
        target: EntityId,
        kind: EventKind,
        payload: EventPayload,
    ) -> Result<(), SetupError> {
        if !self.contains(target) {
            return Err(SetupError::UnknownEntity(target));
        }
        self.queue.enqueue(target, kind, payload);
        Ok(())
    }

    /// Deliver an event now, bubbling from `target` to the root.
    pub fn dispatch_immediately(
        &self,
        target: EntityId,
        kind: EventKind,
        payload: EventPayload,
    ) -> Result<(), SetupError> {
        bus::dispatch_immediately(self, target, kind, payload)
    }

    /// Deliver every deferred event queued so far, in order.
    ///
    /// Events whose target was destroyed in the meantime are dropped. Events
    /// queued by the listeners themselves wait for the next drain. Returns the
    /// number of events delivered.
    pub fn drain_events(&self) -> usize {
        let mut delivered = 0;
        for deferred in self.queue.drain_all() {
            match self.dispatch_immediately(deferred.target, deferred.kind, deferred.payload) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("dropping deferred event: {}", e),
            }
        }
        delivered
    }
}

impl EventParents for EntityTree {
    fn event_parent(&self, id: EntityId) -> Option<EntityId> {
        self.parent(id)
    }

    fn event_target(&self, id: EntityId) -> Option<&EventTarget<Self>> {
        self.events(id)
    }
}
