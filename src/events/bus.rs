//! Per-object listener registry with type-keyed, bubbling dispatch.
//!
//! An [`EventTarget`] maps an [`EventKind`] to the ordered list of listeners
//! registered for it. Registration order is delivery order. Listener lists use
//! interior mutability so a listener may register or remove listeners while an
//! event is being delivered; the listeners captured for the level currently
//! being dispatched are a snapshot and are not affected.
//!
//! [`dispatch_immediately`] walks from the firing object up through
//! [`EventParents::event_parent`] links, invoking every listener registered for
//! the kind at each level, until the chain ends or a listener calls
//! [`Event::stop_propagation`]. Stopping propagation lets the remaining
//! listeners of the current level run but skips all ancestors.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::entity::EntityId;
use crate::error::SetupError;
use crate::events::collision::CollisionEvent;

/// Type key used to register and dispatch events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Fired on a parent after a child was appended. Payload: the child.
    ChildAdded,
    /// Fired on the former parent after a child was detached. Payload: the child.
    ChildRemoved,
    /// Fired on an actor after a component was set. Payload: component name.
    ComponentAdded,
    /// Fired on an actor after a component was removed. Payload: component name.
    ComponentRemoved,
    /// Fired by an [`ActorQuery`](crate::entity::query::ActorQuery) when an actor starts matching.
    ActorAdded,
    /// Fired by an [`ActorQuery`](crate::entity::query::ActorQuery) when an actor stops matching.
    ActorRemoved,
    /// Two bodies started overlapping this tick.
    CollisionEnter,
    /// Two bodies that overlapped last tick still overlap.
    CollisionStay,
    /// Two bodies that overlapped last tick no longer overlap.
    CollisionLeave,
    /// Game-defined event.
    Custom(String),
}

impl EventKind {
    pub fn custom(name: impl Into<String>) -> Self {
        EventKind::Custom(name.into())
    }
}

/// Data carried by an event.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EventPayload {
    #[default]
    None,
    Entity(EntityId),
    Component(&'static str),
    Collision(CollisionEvent),
    Custom(serde_json::Value),
}

impl EventPayload {
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            EventPayload::Entity(id) => Some(*id),
            _ => None,
        }
    }

    pub fn component(&self) -> Option<&'static str> {
        match self {
            EventPayload::Component(name) => Some(*name),
            _ => None,
        }
    }

    pub fn collision(&self) -> Option<&CollisionEvent> {
        match self {
            EventPayload::Collision(c) => Some(c),
            _ => None,
        }
    }
}

/// Event record handed to listeners.
///
/// `target` is the object the event was fired on; `current_target` is the
/// object whose listeners are running right now (an ancestor of `target` while
/// bubbling).
#[derive(Debug)]
pub struct Event {
    kind: EventKind,
    payload: EventPayload,
    target: EntityId,
    current_target: EntityId,
    stopped: Cell<bool>,
}

impl Event {
    pub fn new(kind: EventKind, payload: EventPayload, target: EntityId) -> Self {
        Self {
            kind,
            payload,
            target,
            current_target: target,
            stopped: Cell::new(false),
        }
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn target(&self) -> EntityId {
        self.target
    }

    pub fn current_target(&self) -> EntityId {
        self.current_target
    }

    /// Prevent the event from reaching any further ancestor.
    pub fn stop_propagation(&self) {
        self.stopped.set(true);
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.stopped.get()
    }
}

/// A listener invoked with the event and the dispatch context.
pub type Listener<C> = Rc<dyn Fn(&Event, &C)>;

/// Handle returned by [`EventTarget::on`], used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Slot<C> {
    id: ListenerId,
    listener: Listener<C>,
    /// Set for listeners registered with [`EventTarget::on_owned`]. The slot
    /// is dead once the owner is dropped.
    owner: Option<Weak<dyn Any>>,
}

impl<C> Slot<C> {
    fn is_live(&self) -> bool {
        self.owner.as_ref().is_none_or(|owner| owner.strong_count() > 0)
    }
}

type ListenerList<C> = SmallVec<[Slot<C>; 2]>;

/// Listener registry owned by one event-emitting object.
pub struct EventTarget<C> {
    listeners: RefCell<FxHashMap<EventKind, ListenerList<C>>>,
    next_id: Cell<u64>,
}

impl<C> Default for EventTarget<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for EventTarget<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.borrow();
        let mut map = f.debug_map();
        for (kind, list) in listeners.iter() {
            map.entry(kind, &list.len());
        }
        map.finish()
    }
}

impl<C> EventTarget<C> {
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(FxHashMap::default()),
            next_id: Cell::new(0),
        }
    }

    fn register(
        &self,
        kind: EventKind,
        listener: Listener<C>,
        owner: Option<Weak<dyn Any>>,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let mut listeners = self.listeners.borrow_mut();
        let list = listeners.entry(kind).or_default();
        list.retain(|slot| slot.is_live());
        list.push(Slot {
            id,
            listener,
            owner,
        });
        id
    }

    /// Register a listener for `kind`. Listeners run in registration order.
    pub fn on(&self, kind: EventKind, listener: impl Fn(&Event, &C) + 'static) -> ListenerId {
        self.register(kind, Rc::new(listener), None)
    }

    /// Register a listener that lives as long as `owner`.
    ///
    /// The registry only keeps a weak handle on `owner`. Once the last strong
    /// reference is dropped the listener stops firing, is no longer counted,
    /// and its slot is reclaimed on the next registration or emit.
    pub fn on_owned<T: 'static>(
        &self,
        kind: EventKind,
        owner: &Rc<T>,
        listener: impl Fn(&T, &Event, &C) + 'static,
    ) -> ListenerId {
        let weak = Rc::downgrade(owner);
        let guard: Weak<dyn Any> = weak.clone();
        let listener = move |event: &Event, ctx: &C| {
            if let Some(owner) = weak.upgrade() {
                listener(&owner, event, ctx);
            }
        };
        self.register(kind, Rc::new(listener), Some(guard))
    }

    /// Remove one listener. Returns false if it was not registered for `kind`.
    /// The slot for `kind` is freed once its last listener is gone.
    pub fn off(&self, kind: &EventKind, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let Some(list) = listeners.get_mut(kind) else {
            return false;
        };
        let removed = list.iter().any(|slot| slot.id == id && slot.is_live());
        list.retain(|slot| slot.id != id && slot.is_live());
        if list.is_empty() {
            listeners.remove(kind);
        }
        removed
    }

    /// Remove every listener registered for `kind`.
    pub fn off_all(&self, kind: &EventKind) {
        self.listeners.borrow_mut().remove(kind);
    }

    pub fn has_listeners(&self, kind: &EventKind) -> bool {
        self.listener_count(kind) > 0
    }

    pub fn listener_count(&self, kind: &EventKind) -> usize {
        self.listeners
            .borrow()
            .get(kind)
            .map_or(0, |list| list.iter().filter(|slot| slot.is_live()).count())
    }

    /// Number of kinds that currently hold at least one listener.
    pub fn registered_kinds(&self) -> usize {
        self.listeners
            .borrow()
            .values()
            .filter(|list| list.iter().any(|slot| slot.is_live()))
            .count()
    }

    fn snapshot(&self, kind: &EventKind) -> SmallVec<[Listener<C>; 4]> {
        let mut listeners = self.listeners.borrow_mut();
        let Some(list) = listeners.get_mut(kind) else {
            return SmallVec::new();
        };
        list.retain(|slot| slot.is_live());
        let snapshot = list.iter().map(|slot| Rc::clone(&slot.listener)).collect();
        if list.is_empty() {
            listeners.remove(kind);
        }
        snapshot
    }

    /// Invoke the listeners registered for the event's kind on this object only.
    pub fn emit(&self, event: &Event, ctx: &C) {
        for listener in self.snapshot(event.kind()) {
            listener(event, ctx);
        }
    }
}

/// Parent chain and listener lookup used for bubbling.
pub trait EventParents: Sized {
    fn event_parent(&self, id: EntityId) -> Option<EntityId>;
    fn event_target(&self, id: EntityId) -> Option<&EventTarget<Self>>;
}

/// Deliver an event synchronously, bubbling from `target` up the parent chain.
///
/// Fails only when `target` does not exist.
pub fn dispatch_immediately<C: EventParents>(
    ctx: &C,
    target: EntityId,
    kind: EventKind,
    payload: EventPayload,
) -> Result<(), SetupError> {
    if ctx.event_target(target).is_none() {
        return Err(SetupError::UnknownEntity(target));
    }
    let mut event = Event::new(kind, payload, target);
    let mut current = Some(target);
    while let Some(id) = current {
        let Some(events) = ctx.event_target(id) else {
            break;
        };
        event.current_target = id;
        events.emit(&event, ctx);
        if event.is_propagation_stopped() {
            log::trace!("{:?} stopped at {}", event.kind, id);
            break;
        }
        current = ctx.event_parent(id);
    }
    Ok(())
}
