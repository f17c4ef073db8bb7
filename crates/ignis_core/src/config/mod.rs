//! Config extension: a per-instance config tree with environment
//! substitution and change events.
//!
//! # Responsibility
//! - Mount one [`ConfigStore`] on every instance once the extension is
//!   attached.
//! - Publish `config.set` / `config.modified` for every successful write and
//!   `config.missing` for absent imported variables.
//!
//! # Invariants
//! - Strict writes fail on missing variables before any event is emitted.
//! - `import_environment` never fails on a missing variable.

pub mod env;
mod error;
pub mod store;

pub use env::{EnvSource, MapEnv, ProcessEnv, ENV_SIGIL};
pub use error::ConfigError;
pub use store::ConfigStore;

use crate::app::App;
use crate::events::{AppEvent, ConfigEvent, MissingEnvEvent};
use crate::extension::loader::MODULE_CONFIG;
use crate::extension::source::{ExtensionFn, Initializer};
use log::{info, warn};
use once_cell::sync::Lazy;
use serde_json::Value;

/// Path prefix under which `import_environment` stores variables.
pub const ENV_CONFIG_PREFIX: &str = "env";

static CONFIG_EXTENSION: Lazy<ExtensionFn> = Lazy::new(|| {
    ExtensionFn::named(MODULE_CONFIG, |registry, _| {
        registry.register_initializer(Initializer::named("config.mount", mount));
    })
});

/// Returns the config extension. Every call returns the same identity.
pub fn extension() -> ExtensionFn {
    CONFIG_EXTENSION.clone()
}

fn mount(app: &mut App) {
    if app.extension_state::<ConfigStore>().is_some() {
        return;
    }
    let store = ConfigStore::new(app.env());
    app.insert_extension_state(store);
    info!(
        "event=config_mount module=config status=ok app_id={}",
        app.id()
    );
}

/// Config operations on an application instance.
pub trait ConfigExt {
    /// Reads the value at a dot path.
    fn config(&self, path: &str) -> Result<Value, ConfigError>;

    /// Writes a value at a dot path, resolving `$NAME` expressions and
    /// emitting `config.set` or `config.modified`.
    fn set_config(&mut self, path: &str, value: impl Into<Value>) -> Result<(), ConfigError>;

    /// Imports declared variables into `env.<NAME>`.
    ///
    /// `fields` maps variable names to human-readable descriptions. Absent
    /// variables emit `config.missing` instead of failing.
    fn import_environment<I, K, D>(&mut self, fields: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, D)>,
        K: Into<String>,
        D: Into<String>;

    fn has_config(&self, path: &str) -> bool {
        self.config(path).is_ok()
    }
}

impl ConfigExt for App {
    fn config(&self, path: &str) -> Result<Value, ConfigError> {
        self.extension_state::<ConfigStore>()
            .ok_or(ConfigError::NotMounted)?
            .get(path)
    }

    fn set_config(&mut self, path: &str, value: impl Into<Value>) -> Result<(), ConfigError> {
        let change = self
            .extension_state_mut::<ConfigStore>()
            .ok_or(ConfigError::NotMounted)?
            .set(path, value.into())?;
        publish(self, change);
        Ok(())
    }

    fn import_environment<I, K, D>(&mut self, fields: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, D)>,
        K: Into<String>,
        D: Into<String>,
    {
        for (name, description) in fields {
            let name = name.into();
            let store = self
                .extension_state_mut::<ConfigStore>()
                .ok_or(ConfigError::NotMounted)?;

            let current = store.env().var(name.as_str());
            match current {
                Some(value) => {
                    let path = format!("{ENV_CONFIG_PREFIX}.{name}");
                    let change = store.set_literal(path.as_str(), Value::String(value))?;
                    publish(self, change);
                }
                None => {
                    warn!(
                        "event=config_import module=config status=missing name={}",
                        name
                    );
                    self.emit(&AppEvent::from(MissingEnvEvent {
                        name,
                        description: description.into(),
                    }));
                }
            }
        }
        Ok(())
    }
}

fn publish(app: &mut App, change: ConfigEvent) {
    log::debug!(
        "event=config_write module=config status=ok kind={:?} key={}",
        change.kind,
        change.key
    );
    app.emit(&AppEvent::from(change));
}
