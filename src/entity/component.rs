//! Components and the per-actor component store.
//!
//! A component is a typed bundle of state owned by exactly one actor. Each
//! component type declares a name ([`ComponentKind::NAME`]); an actor holds at
//! most one component per name, and setting a second one replaces the first.
//!
//! Implement the traits with the [`component!`](crate::component) macro:
//!
//! ```ignore
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Health { hp: i32 }
//! aberredsim::component!(Health, "health");
//! ```

use std::any::Any;
use std::fmt;

use rustc_hash::FxHashMap;
use serde::Serialize;

/// Object-safe view of a component stored on an actor.
pub trait Component: Any + fmt::Debug {
    /// Declared name; the key the component is stored under.
    fn name(&self) -> &'static str;
    /// Independent deep copy, used for templating and actor cloning.
    fn clone_component(&self) -> Box<dyn Component>;
    /// Serializable form written into `{ name, config }` entries.
    fn to_config(&self) -> Result<serde_json::Value, serde_json::Error>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Static side of a component type: its declared name.
pub trait ComponentKind: Component + Sized {
    const NAME: &'static str;
}

#[doc(hidden)]
pub fn config_value<T: Serialize>(value: &T) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(value)
}

/// Implement [`Component`] and [`ComponentKind`] for a `Clone + Serialize` type.
#[macro_export]
macro_rules! component {
    ($ty:ty, $name:literal) => {
        impl $crate::entity::component::ComponentKind for $ty {
            const NAME: &'static str = $name;
        }

        impl $crate::entity::component::Component for $ty {
            fn name(&self) -> &'static str {
                $name
            }

            fn clone_component(&self) -> Box<dyn $crate::entity::component::Component> {
                Box::new(::std::clone::Clone::clone(self))
            }

            fn to_config(&self) -> Result<$crate::entity::component::ConfigValue, $crate::entity::component::ConfigError> {
                $crate::entity::component::config_value(self)
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }
    };
}

#[doc(hidden)]
pub type ConfigValue = serde_json::Value;
#[doc(hidden)]
pub type ConfigError = serde_json::Error;

/// Mapping from component name to the single instance an actor owns.
#[derive(Debug, Default)]
pub struct ComponentStore {
    slots: FxHashMap<&'static str, Box<dyn Component>>,
}

impl ComponentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a component under its declared name, returning the one it replaced.
    pub fn insert(&mut self, component: Box<dyn Component>) -> Option<Box<dyn Component>> {
        self.slots.insert(component.name(), component)
    }

    pub fn remove(&mut self, name: &str) -> Option<Box<dyn Component>> {
        self.slots.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&dyn Component> {
        self.slots.get(name).map(|c| c.as_ref())
    }

    pub fn get<T: ComponentKind>(&self) -> Option<&T> {
        self.slots
            .get(T::NAME)
            .and_then(|c| c.as_any().downcast_ref::<T>())
    }

    pub fn get_mut<T: ComponentKind>(&mut self) -> Option<&mut T> {
        self.slots
            .get_mut(T::NAME)
            .and_then(|c| c.as_any_mut().downcast_mut::<T>())
    }

    /// Component names in sorted order.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.slots.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Component> {
        self.slots.values().map(|c| c.as_ref())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Deep copy of every component.
    pub fn duplicate(&self) -> ComponentStore {
        ComponentStore {
            slots: self
                .slots
                .iter()
                .map(|(name, c)| (*name, c.clone_component()))
                .collect(),
        }
    }
}
