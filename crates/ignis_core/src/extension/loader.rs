//! Resolution of peer extension modules by name.

use crate::extension::source::{ExtensionFn, ExtensionModule};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// Name of the built-in config extension module.
pub const MODULE_CONFIG: &str = "config";
/// Name of the built-in extension that installs nothing.
pub const MODULE_NO_OP: &str = "no-op";

static NO_OP_EXTENSION: Lazy<ExtensionFn> =
    Lazy::new(|| ExtensionFn::named(MODULE_NO_OP, |_, _| {}));

/// Returns the shared no-op extension.
pub fn no_op_extension() -> ExtensionFn {
    NO_OP_EXTENSION.clone()
}

/// Collaborator that turns a module name into a loaded module.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, name: &str) -> Option<ExtensionModule>;
}

/// In-process module table.
#[derive(Debug, Clone, Default)]
pub struct StaticModuleLoader {
    modules: BTreeMap<String, ExtensionModule>,
}

impl StaticModuleLoader {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table holding the built-in peer modules.
    pub fn with_builtins() -> Self {
        let mut loader = Self::new();
        loader.insert(
            MODULE_CONFIG,
            ExtensionModule::with_default(crate::config::extension()),
        );
        loader.insert(MODULE_NO_OP, ExtensionModule::with_default(no_op_extension()));
        loader
    }

    /// Adds or replaces one module.
    pub fn insert(&mut self, name: impl Into<String>, module: ExtensionModule) {
        self.modules.insert(name.into(), module);
    }

    pub fn module_names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn load(&self, name: &str) -> Option<ExtensionModule> {
        self.modules.get(name.trim()).cloned()
    }
}
