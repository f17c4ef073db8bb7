//! Hierarchical config tree addressed by dot paths.
//!
//! # Invariants
//! - Values are stored with substitutions resolved; the tree never holds an
//!   unresolved `$NAME` expression written through `set`.
//! - A failed write leaves the tree unchanged.
//! - Intermediate segments are only ever created as maps, never overwritten.

use crate::config::env::{resolve_substitutions, EnvSource};
use crate::config::error::ConfigError;
use crate::events::{ConfigEvent, ConfigEventKind};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Config tree for one application instance.
pub struct ConfigStore {
    root: Map<String, Value>,
    env: Arc<dyn EnvSource>,
}

impl ConfigStore {
    pub fn new(env: Arc<dyn EnvSource>) -> Self {
        Self {
            root: Map::new(),
            env,
        }
    }

    /// Returns the value at `path`.
    ///
    /// # Errors
    /// - `NotDefined` when any segment is missing or descends into a scalar.
    /// - `InvalidPath` for empty paths or segments.
    pub fn get(&self, path: &str) -> Result<Value, ConfigError> {
        let segments = split_path(path)?;
        let not_defined = || ConfigError::NotDefined(path.to_string());

        let mut node = &self.root;
        let last = segments.len() - 1;
        for (index, segment) in segments.iter().enumerate() {
            let value = node.get(*segment).ok_or_else(not_defined)?;
            if index == last {
                return Ok(value.clone());
            }
            node = value.as_object().ok_or_else(not_defined)?;
        }
        Err(not_defined())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_ok()
    }

    /// Writes `value` at `path` after resolving substitution expressions.
    ///
    /// Returns the change event the caller must publish.
    ///
    /// # Errors
    /// - `MissingEnvar` when a referenced variable is unset; nothing is written.
    /// - `PathConflict` when an intermediate segment is not a map.
    /// - `InvalidPath` for empty paths or segments.
    pub fn set(&mut self, path: &str, value: Value) -> Result<ConfigEvent, ConfigError> {
        let segments = split_path(path)?;
        let resolved = resolve_substitutions(value, self.env.as_ref())?;
        self.write(path, &segments, resolved)
    }

    /// Writes `value` at `path` verbatim, without substitution.
    pub fn set_literal(&mut self, path: &str, value: Value) -> Result<ConfigEvent, ConfigError> {
        let segments = split_path(path)?;
        self.write(path, &segments, value)
    }

    /// Returns the whole tree as one map value.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.root.clone())
    }

    pub fn env(&self) -> &dyn EnvSource {
        self.env.as_ref()
    }

    fn write(
        &mut self,
        path: &str,
        segments: &[&str],
        value: Value,
    ) -> Result<ConfigEvent, ConfigError> {
        let Some((leaf, parents)) = segments.split_last() else {
            return Err(ConfigError::InvalidPath(path.to_string()));
        };

        let mut node = &mut self.root;
        for (index, segment) in parents.iter().enumerate() {
            let entry = node
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            node = match entry {
                Value::Object(map) => map,
                _ => {
                    return Err(ConfigError::PathConflict {
                        path: path.to_string(),
                        segment: segments[..=index].join("."),
                    })
                }
            };
        }

        let kind = if node.contains_key(*leaf) {
            ConfigEventKind::Modified
        } else {
            ConfigEventKind::Set
        };
        node.insert(leaf.to_string(), value.clone());

        Ok(ConfigEvent {
            kind,
            key: path.to_string(),
            value,
        })
    }
}

fn split_path(path: &str) -> Result<Vec<&str>, ConfigError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(ConfigError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}
