//! Event types and dispatch used by the simulation core.
//!
//! Every node in the [`EntityTree`](crate::entity::tree::EntityTree) owns an
//! [`EventTarget`](bus::EventTarget) holding listeners keyed by
//! [`EventKind`](bus::EventKind). Events are delivered in two ways:
//!
//! - immediately, walking from the target up through its parents until the
//!   chain ends or a listener stops propagation (structural notifications,
//!   collision notifications within a tick);
//! - deferred, through the [`EventQueue`](queue::EventQueue), which the engine
//!   drains at the start of the next tick before any system runs.
//!
//! Submodules:
//! - [`bus`] – listener registry, event record and bubbling dispatch
//! - [`collision`] – collision notification payloads and minimum translation vectors
//! - [`queue`] – deferred FIFO event scheduler

pub mod bus;
pub mod collision;
pub mod queue;
