//! Application instance.
//!
//! # Responsibility
//! - Own per-instance state: applied initializers, startup chain, event
//!   bus, extension state slots, environment source and root listener.
//! - Run pending initializers on construction and after `use_extension`.
//! - Provide the shared global instance next to fresh instances.
//!
//! # Invariants
//! - An initializer is marked applied before it runs, so it runs at most
//!   once per instance even when it re-enters the initializer pass.
//! - The applied set only grows for the lifetime of the instance.

use crate::config::{EnvSource, ProcessEnv};
use crate::events::{AppEvent, EventBus, SubscriptionId};
use crate::extension::registry::{ExtensionError, ExtensionRegistry, Registration};
use crate::extension::source::{ExtensionSource, InitializerId};
use crate::startup::{
    bind, port_from_env, RootHandle, StartupFuture, StartupResult, StartupSequencer,
    StartupState, TcpRoot,
};
use log::{debug, info};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::future::{self, Future};
use std::sync::Arc;
use uuid::Uuid;

/// Stable identifier of one application instance, used in diagnostics.
pub type AppId = Uuid;

/// Application instance shared behind a lock.
pub type SharedApp = Arc<Mutex<App>>;

static GLOBAL_APP: Lazy<Mutex<Option<SharedApp>>> = Lazy::new(|| Mutex::new(None));

/// One application instance.
pub struct App {
    id: AppId,
    registry: Arc<ExtensionRegistry>,
    applied: BTreeSet<InitializerId>,
    startup: StartupSequencer,
    events: EventBus,
    state: HashMap<TypeId, Box<dyn Any + Send>>,
    env: Arc<dyn EnvSource>,
    root: RootHandle,
}

impl App {
    /// Creates an instance on the global registry, reading the process
    /// environment and binding TCP on every interface.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    pub fn id(&self) -> AppId {
        self.id
    }

    /// Registry this instance draws initializers from.
    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    /// Runs every registered initializer not yet applied to this instance,
    /// in registration order. Returns how many ran.
    pub fn run_initializers(&mut self) -> usize {
        let mut ran = 0;
        for initializer in self.registry.initializers() {
            if !self.applied.insert(initializer.id()) {
                continue;
            }
            debug!(
                "event=initializer_run module=app status=start app_id={} name={}",
                self.id,
                initializer.name().unwrap_or("anonymous")
            );
            initializer.invoke(self);
            ran += 1;
        }
        ran
    }

    pub fn is_applied(&self, initializer: InitializerId) -> bool {
        self.applied.contains(&initializer)
    }

    /// Attaches an extension to this instance's registry, then runs the
    /// initializer pass so its effects apply to this instance immediately.
    pub fn use_extension(
        &mut self,
        source: impl Into<ExtensionSource>,
        args: &[Value],
    ) -> Result<Registration, ExtensionError> {
        let registration = self.registry.register_extension(source, args)?;
        self.run_initializers();
        Ok(registration)
    }

    /// Appends an asynchronous startup action.
    ///
    /// The action receives the root handle once every earlier action has
    /// completed successfully. Queued actions only run while the future
    /// returned by [`App::startup`] or [`App::listen`] is polled; nothing
    /// runs in the background.
    pub fn wait<F, Fut>(&mut self, action: F) -> &mut Self
    where
        F: FnOnce(RootHandle) -> Fut + Send + 'static,
        Fut: Future<Output = StartupResult> + Send + 'static,
    {
        let step = self.startup.enqueue(Arc::clone(&self.root), action);
        debug!(
            "event=startup_wait module=app status=ok app_id={} step={}",
            self.id, step
        );
        self
    }

    /// Appends a synchronous startup action.
    pub fn wait_sync<F>(&mut self, action: F) -> &mut Self
    where
        F: FnOnce(RootHandle) -> StartupResult + Send + 'static,
    {
        self.wait(move |root| future::ready(action(root)))
    }

    /// Appends the bind step and returns the aggregate startup future.
    ///
    /// Without an explicit port, `PORT` is read from the instance's
    /// environment; a missing or malformed value fails the chain at the bind
    /// step.
    pub fn listen(&mut self, port: Option<u16>) -> StartupFuture {
        let port = match port {
            Some(port) => Ok(port),
            None => port_from_env(self.env.as_ref()),
        };
        info!(
            "event=listen module=app status=start app_id={} port={:?}",
            self.id, port
        );
        self.wait(move |root| async move {
            match port {
                Ok(port) => bind(root, port).await,
                Err(err) => Err(err),
            }
        });
        self.startup()
    }

    /// Aggregate future of every startup step queued so far.
    pub fn startup(&self) -> StartupFuture {
        self.startup.completion()
    }

    pub fn startup_state(&self) -> StartupState {
        self.startup.state()
    }

    pub fn root(&self) -> RootHandle {
        Arc::clone(&self.root)
    }

    /// Replaces the root handle used by actions queued from now on.
    pub fn set_root(&mut self, root: RootHandle) {
        self.root = root;
    }

    pub fn env(&self) -> Arc<dyn EnvSource> {
        Arc::clone(&self.env)
    }

    pub fn events(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn subscribe<F>(&mut self, pattern: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: FnMut(&AppEvent) + Send + 'static,
    {
        self.events.subscribe(pattern, handler)
    }

    pub fn emit(&mut self, event: &AppEvent) -> usize {
        self.events.emit(event)
    }

    /// State slot owned by an extension, keyed by type.
    pub fn extension_state<T: Any + Send>(&self) -> Option<&T> {
        self.state
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn extension_state_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.state
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Stores extension state, returning the previous value of that type.
    pub fn insert_extension_state<T: Any + Send>(&mut self, value: T) -> Option<T> {
        self.state
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|previous| previous.downcast::<T>().ok())
            .map(|previous| *previous)
    }
}

impl App {
    fn initialize(&mut self) {
        let ran = self.run_initializers();
        info!(
            "event=app_create module=app status=ok app_id={} initializers={}",
            self.id, ran
        );
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

/// Explicit construction of an [`App`].
#[derive(Default)]
pub struct AppBuilder {
    registry: Option<Arc<ExtensionRegistry>>,
    env: Option<Arc<dyn EnvSource>>,
    root: Option<RootHandle>,
}

impl AppBuilder {
    /// Uses `registry` instead of the global one.
    pub fn registry(mut self, registry: Arc<ExtensionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn env(mut self, env: impl EnvSource + 'static) -> Self {
        self.env = Some(Arc::new(env));
        self
    }

    pub fn root(mut self, root: RootHandle) -> Self {
        self.root = Some(root);
        self
    }

    /// Creates the instance and runs its initializer pass.
    pub fn build(self) -> App {
        let mut app = self.assemble();
        app.initialize();
        app
    }

    fn assemble(self) -> App {
        App {
            id: Uuid::new_v4(),
            registry: self.registry.unwrap_or_else(ExtensionRegistry::global),
            applied: BTreeSet::new(),
            startup: StartupSequencer::new(),
            events: EventBus::new(),
            state: HashMap::new(),
            env: self.env.unwrap_or_else(|| Arc::new(ProcessEnv)),
            root: self.root.unwrap_or_else(|| Arc::new(TcpRoot::new())),
        }
    }
}

/// Creates a distinct instance on the global registry.
pub fn create_instance() -> App {
    App::new()
}

/// Returns the shared global instance, creating it on first call.
///
/// The new instance is published before its initializer pass runs, so
/// initializers may look it up; they must not lock it.
pub fn get_or_create_global_instance() -> SharedApp {
    if let Some(app) = GLOBAL_APP.lock().clone() {
        return app;
    }

    let app: SharedApp = Arc::new(Mutex::new(App::builder().assemble()));
    let mut instance = app.lock();
    {
        let mut slot = GLOBAL_APP.lock();
        if let Some(existing) = slot.as_ref() {
            return Arc::clone(existing);
        }
        *slot = Some(Arc::clone(&app));
    }
    instance.initialize();
    drop(instance);
    app
}

/// Drops the shared global instance; the next
/// [`get_or_create_global_instance`] call creates a new one.
pub fn reset_global_instance() {
    GLOBAL_APP.lock().take();
}
