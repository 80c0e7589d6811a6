//! Entity tree, component store, factory and derived actor collections.
//!
//! Submodules:
//! - [`component`] – the [`Component`](component::Component) trait and per-actor store
//! - [`config`] – persisted actor/scene descriptions and the component builder table
//! - [`query`] – incrementally maintained actor collections filtered by components
//! - [`tree`] – the [`EntityTree`](tree::EntityTree) arena of World/Scene/Actor nodes

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod component;
pub mod config;
pub mod query;
pub mod tree;

/// Stable identifier of a node in the [`EntityTree`](tree::EntityTree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        EntityId(value)
    }
}
