use std::error::Error;
use std::fmt::{Display, Formatter};

/// Config store errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `get` reached a missing segment. Carries the requested path.
    NotDefined(String),
    /// A substitution expression names an unset variable.
    MissingEnvar(String),
    /// An intermediate segment of a write path holds a non-map value.
    PathConflict { path: String, segment: String },
    /// The path is empty or contains an empty segment.
    InvalidPath(String),
    /// The config extension is not attached to the instance.
    NotMounted,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotDefined(path) => write!(f, "Config option '{path}' is not defined."),
            Self::MissingEnvar(name) => write!(f, "Missing envar: {name}"),
            Self::PathConflict { path, segment } => write!(
                f,
                "cannot write config option '{path}': '{segment}' is not a mapping"
            ),
            Self::InvalidPath(path) => write!(f, "config path is invalid: '{path}'"),
            Self::NotMounted => write!(f, "config extension is not attached to this application"),
        }
    }
}

impl Error for ConfigError {}
