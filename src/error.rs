//! Setup-time errors.
//!
//! Misconfiguration (bad hierarchy, unknown ids, unregistered component names)
//! is reported through [`SetupError`] so it surfaces before the tick loop
//! starts. Lookup misses are `Option`s and geometric degeneracies are clamped,
//! so neither ever shows up here.

use thiserror::Error;

use crate::entity::EntityId;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
    #[error("entity id {0} is already in use")]
    DuplicateId(EntityId),
    #[error("cannot attach {child} to {parent}: {reason}")]
    InvalidHierarchy {
        parent: EntityId,
        child: EntityId,
        reason: &'static str,
    },
    #[error("entity {id} is not a {expected}")]
    WrongKind { id: EntityId, expected: &'static str },
    #[error("no component registered under the name '{0}'")]
    UnknownComponent(String),
    #[error("invalid config for component '{name}': {source}")]
    InvalidComponentConfig {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("actor {actor} is missing required component '{component}'")]
    MissingComponent {
        actor: EntityId,
        component: &'static str,
    },
    #[error("scene {scene} has no template named '{name}'")]
    UnknownTemplate { scene: EntityId, name: String },
    #[error("config error: {0}")]
    Config(String),
}
