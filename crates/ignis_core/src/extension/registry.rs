//! Process-wide extension and initializer registry.
//!
//! # Responsibility
//! - Attach each extension function at most once.
//! - Keep the ordered initializer list every instance runs through.
//!
//! # Invariants
//! - An attached extension identity is never invoked again.
//! - Initializer order equals registration order.
//! - The internal lock is released before any extension body runs, so
//!   extensions can register initializers re-entrantly.

use crate::extension::loader::{ModuleLoader, StaticModuleLoader};
use crate::extension::source::{
    ExtensionFn, ExtensionId, ExtensionSource, Initializer, InitializerId,
};
use log::{debug, error, info};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

static GLOBAL_REGISTRY: Lazy<Arc<ExtensionRegistry>> =
    Lazy::new(|| Arc::new(ExtensionRegistry::new()));

/// Outcome of one [`ExtensionRegistry::register_extension`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The extension was new and has been invoked.
    Attached,
    /// The extension was attached earlier; nothing ran.
    AlreadyAttached,
}

/// Extension registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionError {
    /// The source does not resolve to a callable extension.
    InvalidArgument(String),
    /// The module loader does not know the requested name.
    ModuleNotFound(String),
}

impl Display for ExtensionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(details) => write!(f, "invalid extension: {details}"),
            Self::ModuleNotFound(name) => write!(f, "extension module not found: {name}"),
        }
    }
}

impl Error for ExtensionError {}

struct RegistryState {
    attached: BTreeSet<ExtensionId>,
    initializers: Vec<Initializer>,
    loader: Arc<dyn ModuleLoader>,
}

/// Registry of attached extensions and installed initializers.
///
/// Use [`ExtensionRegistry::global`] for the process-wide instance, or
/// [`ExtensionRegistry::new`] for an isolated one.
pub struct ExtensionRegistry {
    state: Mutex<RegistryState>,
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtensionRegistry {
    /// Creates an empty registry whose loader knows the built-in modules.
    pub fn new() -> Self {
        Self::with_loader(Arc::new(StaticModuleLoader::with_builtins()))
    }

    pub fn with_loader(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                attached: BTreeSet::new(),
                initializers: Vec::new(),
                loader,
            }),
        }
    }

    /// Returns the process-wide registry, creating it on first access.
    pub fn global() -> Arc<ExtensionRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Replaces the loader used for [`ExtensionSource::Named`] sources.
    pub fn set_module_loader(&self, loader: Arc<dyn ModuleLoader>) {
        self.state.lock().loader = loader;
    }

    /// Attaches an extension and invokes it with `args`.
    ///
    /// # Errors
    /// - `ModuleNotFound` when a named source cannot be loaded.
    /// - `InvalidArgument` when a module has no callable `default` export.
    pub fn register_extension(
        &self,
        source: impl Into<ExtensionSource>,
        args: &[Value],
    ) -> Result<Registration, ExtensionError> {
        let extension = match self.resolve(source.into()) {
            Ok(extension) => extension,
            Err(err) => {
                error!(
                    "event=extension_attach module=extension status=error error={}",
                    err
                );
                return Err(err);
            }
        };
        let label = extension.name().unwrap_or("anonymous");

        {
            let mut state = self.state.lock();
            if !state.attached.insert(extension.id()) {
                debug!(
                    "event=extension_attach module=extension status=skip name={} reason=duplicate",
                    label
                );
                return Ok(Registration::AlreadyAttached);
            }
        }

        extension.invoke(self, args);
        info!(
            "event=extension_attach module=extension status=ok name={} args={}",
            label,
            args.len()
        );
        Ok(Registration::Attached)
    }

    /// Appends an initializer to the ordered list run by every instance.
    pub fn register_initializer(&self, initializer: Initializer) -> InitializerId {
        let id = initializer.id();
        debug!(
            "event=initializer_register module=extension status=ok name={}",
            initializer.name().unwrap_or("anonymous")
        );
        self.state.lock().initializers.push(initializer);
        id
    }

    /// Returns a snapshot of the initializer list in registration order.
    pub fn initializers(&self) -> Vec<Initializer> {
        self.state.lock().initializers.clone()
    }

    pub fn is_attached(&self, extension: &ExtensionFn) -> bool {
        self.state.lock().attached.contains(&extension.id())
    }

    pub fn attached_count(&self) -> usize {
        self.state.lock().attached.len()
    }

    pub fn initializer_count(&self) -> usize {
        self.state.lock().initializers.len()
    }

    /// Forgets every attached extension and installed initializer.
    ///
    /// Instances created before the reset keep their applied-initializer
    /// records.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.attached.clear();
        state.initializers.clear();
        info!("event=registry_reset module=extension status=ok");
    }

    fn resolve(&self, source: ExtensionSource) -> Result<ExtensionFn, ExtensionError> {
        match source {
            ExtensionSource::Function(extension) => Ok(extension),
            ExtensionSource::Module(module) => module.default.ok_or_else(|| {
                ExtensionError::InvalidArgument(
                    "module does not export a callable `default`".to_string(),
                )
            }),
            ExtensionSource::Named(name) => {
                let loader = Arc::clone(&self.state.lock().loader);
                let module = loader
                    .load(name.as_str())
                    .ok_or_else(|| ExtensionError::ModuleNotFound(name.clone()))?;
                module.default.ok_or_else(|| {
                    ExtensionError::InvalidArgument(format!(
                        "module `{name}` does not export a callable `default`"
                    ))
                })
            }
        }
    }
}
