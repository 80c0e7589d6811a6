//! Built-in components.
//!
//! Components are plain data attached to actors in the
//! [`EntityTree`](crate::entity::tree::EntityTree). Each one declares the name
//! it is stored and serialized under.
//!
//! Submodules overview:
//! - [`collider`] – box or circle collision shape with a local offset
//! - [`rigidbody`] – body kind, resolution flags, velocity and named forces
//! - [`transform`] – hierarchical position, rotation and scale with cached matrices

pub mod collider;
pub mod rigidbody;
pub mod transform;
