//! Simulation systems.
//!
//! Submodules overview
//! - [`collision`] – cached world geometry, sweep-and-prune, exact overlap tests, enter/stay/leave
//! - [`engine`] – the fixed-rate tick loop and the [`System`](engine::System) trait
//! - [`movement`] – integrate rigid body forces and velocity into transforms
//! - [`physics`] – per-scene pipeline: movement, detection, publication, resolution
//! - [`solver`] – single-pass penetration correction driven by collision events

pub mod collision;
pub mod engine;
pub mod movement;
pub mod physics;
pub mod solver;
