//! Aberred simulation core.
//!
//! Headless 2D simulation library: an entity tree with a bubbling event bus,
//! hierarchical transforms with lazily recomputed matrices, and a fixed-rate
//! physics pipeline (sweep-and-prune broad phase, exact narrow phase,
//! single-pass penetration solver).
//!
//! # Project Structure
//!
//! - [`components`] – built-in components (transform, collider, rigid body)
//! - [`entity`] – entity tree, component store, factory and derived queries
//! - [`error`] – setup-time error type
//! - [`events`] – event bus, deferred event queue and collision events
//! - [`resources`] – configuration, simulation time and scene data
//! - [`systems`] – movement, collision detection, constraint solving, engine loop

pub mod components;
pub mod entity;
pub mod error;
pub mod events;
pub mod resources;
pub mod systems;
