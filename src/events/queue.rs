//! Deferred event scheduler.
//!
//! [`EventQueue`] is a FIFO of pending dispatches. Handles are cheap clones
//! sharing one queue, so the queue can be injected into every place that
//! fires deferred events and still be drained from a single point. The engine
//! drains it once at the start of each tick, before any system runs; events
//! enqueued while draining are kept for the following drain.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::entity::EntityId;
use crate::events::bus::{EventKind, EventPayload};

/// A dispatch bound to its target, waiting for the next drain.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredEvent {
    pub target: EntityId,
    pub kind: EventKind,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    pending: Rc<RefCell<VecDeque<DeferredEvent>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, target: EntityId, kind: EventKind, payload: EventPayload) {
        self.pending.borrow_mut().push_back(DeferredEvent {
            target,
            kind,
            payload,
        });
    }

    /// Take every pending event, oldest first.
    pub fn drain_all(&self) -> Vec<DeferredEvent> {
        std::mem::take(&mut *self.pending.borrow_mut()).into()
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Drop every pending event.
    pub fn clear(&self) {
        self.pending.borrow_mut().clear();
    }

    /// True when both handles refer to the same underlying queue.
    pub fn same_queue(&self, other: &EventQueue) -> bool {
        Rc::ptr_eq(&self.pending, &other.pending)
    }
}
