//! Environment lookup and `$NAME` substitution.

use crate::config::error::ConfigError;
use serde_json::Value;
use std::collections::BTreeMap;

/// Prefix marking a string value as "read from environment".
pub const ENV_SIGIL: char = '$';

/// Source of environment variables for one application instance.
pub trait EnvSource: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed set of variables, independent from the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapEnv {
    vars: BTreeMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

impl EnvSource for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// Returns the variable name referenced by `value`, if it is a substitution
/// expression. Everything after the sigil is the name; a bare `$` is not an
/// expression.
pub fn substitution_name(value: &str) -> Option<&str> {
    value
        .strip_prefix(ENV_SIGIL)
        .filter(|name| !name.is_empty())
}

/// Replaces every substitution expression in `value`, recursing into maps
/// and arrays.
///
/// # Errors
/// - `MissingEnvar` for the first referenced variable that is not set.
pub fn resolve_substitutions(value: Value, env: &dyn EnvSource) -> Result<Value, ConfigError> {
    match value {
        Value::String(raw) => match substitution_name(raw.as_str()) {
            Some(name) => env
                .var(name)
                .map(Value::String)
                .ok_or_else(|| ConfigError::MissingEnvar(name.to_string())),
            None => Ok(Value::String(raw)),
        },
        Value::Array(items) => items
            .into_iter()
            .map(|item| resolve_substitutions(item, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => map
            .into_iter()
            .map(|(key, item)| resolve_substitutions(item, env).map(|item| (key, item)))
            .collect::<Result<serde_json::Map<_, _>, _>>()
            .map(Value::Object),
        other => Ok(other),
    }
}
