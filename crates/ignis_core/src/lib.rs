//! Ignis: application bootstrapping core.
//!
//! Extensions attach behavior once per process, initializers run once per
//! application instance, startup actions run in order behind one completion
//! future, and a config tree with environment substitution publishes change
//! events.

pub mod app;
pub mod config;
pub mod events;
pub mod extension;
pub mod logging;
pub mod startup;

pub use app::{
    create_instance, get_or_create_global_instance, reset_global_instance, App, AppBuilder,
    AppId, SharedApp,
};
pub use config::{ConfigError, ConfigExt, ConfigStore, EnvSource, MapEnv, ProcessEnv};
pub use events::{
    AppEvent, ConfigEvent, ConfigEventKind, EventBus, MissingEnvEvent, SubscriptionId,
};
pub use extension::loader::{ModuleLoader, StaticModuleLoader};
pub use extension::registry::{ExtensionError, ExtensionRegistry, Registration};
pub use extension::source::{
    ExtensionFn, ExtensionId, ExtensionModule, ExtensionSource, Initializer, InitializerId,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use startup::{
    Listener, RootHandle, StartupError, StartupFuture, StartupResult, StartupState, TcpRoot,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
