//! Persisted actor and scene descriptions, and the factory that builds them.
//!
//! An actor description is a nested record:
//!
//! ```json
//! {
//!   "id": 4,
//!   "name": "crate",
//!   "components": [
//!     { "name": "transform", "config": { "position": [10.0, 0.0] } },
//!     { "name": "collider", "config": { "shape": { "box": { "width": 8.0, "height": 8.0 } } } }
//!   ],
//!   "children": []
//! }
//! ```
//!
//! Component entries are turned into live components through a
//! [`ComponentRegistry`], a closed table from declared component name to a
//! builder function. Names missing from the table are configuration errors.
//! [`EntityTree::actor_config`] writes a live actor back into the same shape,
//! so descriptions round-trip through clone and spawn without loss.

use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::components::collider::Collider;
use crate::components::rigidbody::RigidBody;
use crate::components::transform::Transform;
use crate::entity::EntityId;
use crate::entity::component::{Component, ComponentKind};
use crate::entity::tree::EntityTree;
use crate::error::SetupError;
use crate::resources::scenedata::SceneData;

/// One `{ name, config }` entry of an actor description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub name: String,
    #[serde(default)]
    pub config: Value,
}

impl ComponentConfig {
    pub fn new(name: impl Into<String>, config: Value) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
    #[serde(default)]
    pub children: Vec<ActorConfig>,
}

impl ActorConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = Some(id);
        self
    }

    /// Append a component entry serialized from a live component value.
    pub fn with_component<T: ComponentKind>(mut self, component: &T) -> Result<Self, SetupError> {
        let config = component
            .to_config()
            .map_err(|source| SetupError::InvalidComponentConfig {
                name: T::NAME.to_string(),
                source,
            })?;
        self.components.push(ComponentConfig::new(T::NAME, config));
        Ok(self)
    }

    pub fn with_child(mut self, child: ActorConfig) -> Self {
        self.children.push(child);
        self
    }

    /// The same description with every id cleared, recursively.
    pub fn without_ids(&self) -> ActorConfig {
        ActorConfig {
            id: None,
            name: self.name.clone(),
            components: self.components.clone(),
            children: self.children.iter().map(ActorConfig::without_ids).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub actors: Vec<ActorConfig>,
    #[serde(default)]
    pub templates: FxHashMap<String, ActorConfig>,
    #[serde(default)]
    pub data: serde_json::Map<String, Value>,
}

impl SceneConfig {
    pub fn from_json(text: &str) -> Result<Self, SetupError> {
        serde_json::from_str(text).map_err(|e| SetupError::Config(format!("invalid scene: {e}")))
    }
}

/// Builds a component from its `config` value.
pub type ComponentBuilder = fn(Value) -> Result<Box<dyn Component>, serde_json::Error>;

fn build<T: ComponentKind + DeserializeOwned>(
    config: Value,
) -> Result<Box<dyn Component>, serde_json::Error> {
    let config = match config {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };
    Ok(Box::new(serde_json::from_value::<T>(config)?))
}

/// Table from component name to builder.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    builders: FxHashMap<&'static str, ComponentBuilder>,
}

impl ComponentRegistry {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with the built-in transform, collider and rigid body.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register::<Transform>();
        registry.register::<Collider>();
        registry.register::<RigidBody>();
        registry
    }

    pub fn register<T: ComponentKind + DeserializeOwned>(&mut self) -> &mut Self {
        self.builders.insert(T::NAME, build::<T>);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    pub fn build(&self, entry: &ComponentConfig) -> Result<Box<dyn Component>, SetupError> {
        let builder = self
            .builders
            .get(entry.name.as_str())
            .ok_or_else(|| SetupError::UnknownComponent(entry.name.clone()))?;
        builder(entry.config.clone()).map_err(|source| SetupError::InvalidComponentConfig {
            name: entry.name.clone(),
            source,
        })
    }
}

impl EntityTree {
    /// Drop a detached subtree left behind by a failed build.
    fn discard(&mut self, id: EntityId) {
        if let Err(e) = self.destroy(id) {
            warn!("could not discard partial build {}: {}", id, e);
        }
    }

    /// Build a detached actor subtree. On failure nothing built so far stays
    /// in the arena.
    fn build_detached(
        &mut self,
        registry: &ComponentRegistry,
        config: &ActorConfig,
    ) -> Result<EntityId, SetupError> {
        let actor = match config.id {
            Some(id) => self.create_actor_with_id(id, config.name.clone())?,
            None => self.create_actor(config.name.clone()),
        };
        if let Err(e) = self.fill_detached(registry, config, actor) {
            self.discard(actor);
            return Err(e);
        }
        Ok(actor)
    }

    fn fill_detached(
        &mut self,
        registry: &ComponentRegistry,
        config: &ActorConfig,
        actor: EntityId,
    ) -> Result<(), SetupError> {
        for entry in &config.components {
            let component = registry.build(entry)?;
            self.set_boxed_component(actor, component)?;
        }
        for child in &config.children {
            let child_id = self.build_detached(registry, child)?;
            if let Err(e) = self.append_child(actor, child_id) {
                self.discard(child_id);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Build an actor subtree from its description and attach it under `parent`.
    ///
    /// The subtree is assembled detached and attached last, so observers of
    /// `parent` see a single `ChildAdded` for the whole subtree.
    pub fn build_actor(
        &mut self,
        registry: &ComponentRegistry,
        config: &ActorConfig,
        parent: EntityId,
    ) -> Result<EntityId, SetupError> {
        if !self.contains(parent) {
            return Err(SetupError::UnknownEntity(parent));
        }
        let actor = self.build_detached(registry, config)?;
        if let Err(e) = self.append_child(parent, actor) {
            self.discard(actor);
            return Err(e);
        }
        Ok(actor)
    }

    /// Build a scene with its actors, data and templates and attach it to the world.
    pub fn build_scene(
        &mut self,
        registry: &ComponentRegistry,
        config: &SceneConfig,
    ) -> Result<EntityId, SetupError> {
        // Unknown component names in templates surface now, not at first spawn.
        for (name, template) in &config.templates {
            check_components(registry, template)
                .map_err(|e| SetupError::Config(format!("template '{name}': {e}")))?;
        }

        let scene = self.create_scene(config.id, config.name.clone())?;
        if let Some(node) = self.scene_node_mut(scene) {
            node.data = SceneData::from_map(config.data.clone());
            node.templates = config.templates.clone();
        }
        let built = config
            .actors
            .iter()
            .try_for_each(|actor| self.build_actor(registry, actor, scene).map(|_| ()))
            .and_then(|()| self.append_child(self.root(), scene));
        if let Err(e) = built {
            self.discard(scene);
            return Err(e);
        }
        info!(
            "built scene '{}' ({}): {} actors, {} templates",
            config.name,
            scene,
            self.actors_under(scene).count(),
            config.templates.len()
        );
        Ok(scene)
    }

    /// Describe a live actor subtree in the persisted format.
    pub fn actor_config(&self, actor: EntityId) -> Result<ActorConfig, SetupError> {
        let node = self.node(actor).ok_or(SetupError::UnknownEntity(actor))?;
        let store = node.components().ok_or(SetupError::WrongKind {
            id: actor,
            expected: "actor",
        })?;
        let mut components = Vec::with_capacity(store.len());
        for name in store.names() {
            let Some(component) = store.get_by_name(name) else {
                continue;
            };
            let config =
                component
                    .to_config()
                    .map_err(|source| SetupError::InvalidComponentConfig {
                        name: name.to_string(),
                        source,
                    })?;
            components.push(ComponentConfig::new(name, config));
        }
        let children = node
            .children()
            .iter()
            .map(|child| self.actor_config(*child))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ActorConfig {
            id: Some(actor),
            name: node.name().to_string(),
            components,
            children,
        })
    }

    /// Store an actor description as a spawn template on `scene`.
    pub fn add_template(
        &mut self,
        scene: EntityId,
        name: impl Into<String>,
        template: ActorConfig,
    ) -> Result<(), SetupError> {
        let node = self.scene_node_mut(scene).ok_or(SetupError::WrongKind {
            id: scene,
            expected: "scene",
        })?;
        node.templates.insert(name.into(), template);
        Ok(())
    }

    /// Instantiate the scene template `name` with fresh ids, attached to the scene.
    pub fn spawn(
        &mut self,
        registry: &ComponentRegistry,
        scene: EntityId,
        name: &str,
    ) -> Result<EntityId, SetupError> {
        let node = self.scene_node(scene).ok_or(SetupError::WrongKind {
            id: scene,
            expected: "scene",
        })?;
        let template = node
            .templates
            .get(name)
            .ok_or_else(|| SetupError::UnknownTemplate {
                scene,
                name: name.to_string(),
            })?
            .without_ids();
        let actor = self.build_actor(registry, &template, scene)?;
        debug!("spawned '{}' as {} in {}", name, actor, scene);
        Ok(actor)
    }
}

fn check_components(registry: &ComponentRegistry, config: &ActorConfig) -> Result<(), SetupError> {
    for entry in &config.components {
        registry.build(entry)?;
    }
    config
        .children
        .iter()
        .try_for_each(|child| check_components(registry, child))
}
