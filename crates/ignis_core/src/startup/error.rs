use crate::config::ConfigError;
use crate::extension::registry::ExtensionError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::sync::Arc;

/// Result type of every startup step and of the aggregate startup future.
pub type StartupResult = Result<(), StartupError>;

/// Startup chain failures.
///
/// Cloneable so every observer of the shared startup future receives it.
#[derive(Debug, Clone)]
pub enum StartupError {
    /// The listener reported a bind failure.
    Bind { port: u16, source: Arc<io::Error> },
    /// `PORT` was needed but is not set.
    MissingPort,
    /// `PORT` is set but is not a valid port number.
    InvalidPort(String),
    /// A queued action returned an error.
    Action(Arc<dyn Error + Send + Sync>),
    /// A queued action panicked.
    Panicked(String),
}

impl StartupError {
    /// Wraps any error returned from a startup action.
    pub fn action(err: impl Error + Send + Sync + 'static) -> Self {
        Self::Action(Arc::new(err))
    }

    /// Builds an action failure from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Action(Arc::new(MessageError(message.into())))
    }
}

impl Display for StartupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bind { port, source } => write!(f, "failed to listen on port {port}: {source}"),
            Self::MissingPort => write!(f, "no port given and PORT is not set"),
            Self::InvalidPort(raw) => write!(f, "PORT is not a valid port number: `{raw}`"),
            Self::Action(err) => write!(f, "{err}"),
            Self::Panicked(payload) => write!(f, "startup action panicked: {payload}"),
        }
    }
}

impl Error for StartupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Bind { source, .. } => Some(source.as_ref()),
            Self::Action(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<ConfigError> for StartupError {
    fn from(value: ConfigError) -> Self {
        Self::action(value)
    }
}

impl From<ExtensionError> for StartupError {
    fn from(value: ExtensionError) -> Self {
        Self::action(value)
    }
}

#[derive(Debug)]
struct MessageError(String);

impl Display for MessageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for MessageError {}
