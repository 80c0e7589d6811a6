//! Per-scene keyed data.
//!
//! Every scene owns a [`SceneData`]: a map of JSON values addressed by string
//! keys plus presence-only flags. Use cases include:
//! - Level parameters loaded with the scene (gravity, spawn rates)
//! - Counters updated by game logic ("lives", "score")
//! - Global flags like "paused" or "boss_defeated"

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneData {
    /// Values addressed by string keys.
    pub values: FxHashMap<String, Value>,
    /// Presence-only boolean flags; a key being present means "true".
    pub flags: FxHashSet<String>,
}

impl SceneData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `data` object of a scene description.
    pub fn from_map(map: serde_json::Map<String, Value>) -> Self {
        Self {
            values: map.into_iter().collect(),
            flags: FxHashSet::default(),
        }
    }

    /// Store any serializable value. On a serialization error the previous
    /// value under `key` is left in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Serialize) -> serde_json::Result<()> {
        let value = serde_json::to_value(value)?;
        self.values.insert(key.into(), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Set a flag (mark as present).
    pub fn set_flag(&mut self, key: impl Into<String>) {
        self.flags.insert(key.into());
    }

    /// Clear a flag (remove if present).
    pub fn clear_flag(&mut self, key: &str) {
        self.flags.remove(key);
    }

    /// Check whether a flag is set.
    pub fn has_flag(&self, key: &str) -> bool {
        self.flags.contains(key)
    }

    /// All values as a JSON object, as written back into a scene description.
    pub fn to_map(&self) -> serde_json::Map<String, Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
