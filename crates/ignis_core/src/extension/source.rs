//! Extension callables and the source shapes they can be registered from.

use crate::app::App;
use crate::extension::registry::ExtensionRegistry;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_EXTENSION_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_INITIALIZER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one [`ExtensionFn`]. Clones of the same function share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExtensionId(u64);

/// Identity of one [`Initializer`]. Clones of the same function share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InitializerId(u64);

type ExtensionBody = dyn Fn(&ExtensionRegistry, &[Value]) + Send + Sync;
type InitializerBody = dyn Fn(&mut App) + Send + Sync;

/// Extension entry point.
///
/// Invoked once with the registry it is attached to and any forwarded
/// arguments; it usually installs initializers.
#[derive(Clone)]
pub struct ExtensionFn {
    id: ExtensionId,
    name: Option<Arc<str>>,
    body: Arc<ExtensionBody>,
}

impl ExtensionFn {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&ExtensionRegistry, &[Value]) + Send + Sync + 'static,
    {
        Self {
            id: ExtensionId(NEXT_EXTENSION_ID.fetch_add(1, Ordering::Relaxed)),
            name: None,
            body: Arc::new(body),
        }
    }

    /// Same as [`ExtensionFn::new`] with a name used in diagnostics.
    pub fn named<F>(name: &str, body: F) -> Self
    where
        F: Fn(&ExtensionRegistry, &[Value]) + Send + Sync + 'static,
    {
        let mut extension = Self::new(body);
        extension.name = Some(Arc::from(name));
        extension
    }

    pub fn id(&self) -> ExtensionId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn invoke(&self, registry: &ExtensionRegistry, args: &[Value]) {
        (self.body)(registry, args)
    }
}

impl Debug for ExtensionFn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionFn")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Per-instance setup callable, run at most once per [`App`].
#[derive(Clone)]
pub struct Initializer {
    id: InitializerId,
    name: Option<Arc<str>>,
    body: Arc<InitializerBody>,
}

impl Initializer {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&mut App) + Send + Sync + 'static,
    {
        Self {
            id: InitializerId(NEXT_INITIALIZER_ID.fetch_add(1, Ordering::Relaxed)),
            name: None,
            body: Arc::new(body),
        }
    }

    pub fn named<F>(name: &str, body: F) -> Self
    where
        F: Fn(&mut App) + Send + Sync + 'static,
    {
        let mut initializer = Self::new(body);
        initializer.name = Some(Arc::from(name));
        initializer
    }

    pub fn id(&self) -> InitializerId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn invoke(&self, app: &mut App) {
        (self.body)(app)
    }
}

impl Debug for Initializer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Initializer")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Namespace object wrapping an extension, the way a loaded module exposes
/// its entry point as `default` next to other exports.
#[derive(Debug, Clone, Default)]
pub struct ExtensionModule {
    pub default: Option<ExtensionFn>,
    pub exports: BTreeMap<String, Value>,
}

impl ExtensionModule {
    pub fn with_default(default: ExtensionFn) -> Self {
        Self {
            default: Some(default),
            exports: BTreeMap::new(),
        }
    }
}

/// Everything `register_extension` accepts.
#[derive(Debug, Clone)]
pub enum ExtensionSource {
    Function(ExtensionFn),
    Module(ExtensionModule),
    /// Peer module name resolved through the registry's module loader.
    Named(String),
}

impl From<ExtensionFn> for ExtensionSource {
    fn from(value: ExtensionFn) -> Self {
        Self::Function(value)
    }
}

impl From<ExtensionModule> for ExtensionSource {
    fn from(value: ExtensionModule) -> Self {
        Self::Module(value)
    }
}

impl From<&str> for ExtensionSource {
    fn from(value: &str) -> Self {
        Self::Named(value.to_string())
    }
}

impl From<String> for ExtensionSource {
    fn from(value: String) -> Self {
        Self::Named(value)
    }
}
