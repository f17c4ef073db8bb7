//! Per-instance event bus.
//!
//! # Responsibility
//! - Deliver application events to subscribers registered on one instance.
//! - Define the payload types emitted by the config store.
//!
//! # Invariants
//! - Delivery is synchronous and happens inside the `emit` call.
//! - Subscribers registered after an event was emitted never see it.
//! - Subscribers are invoked in registration order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Topic emitted when a config write creates a new key.
pub const TOPIC_CONFIG_SET: &str = "config.set";
/// Topic emitted when a config write replaces an existing key.
pub const TOPIC_CONFIG_MODIFIED: &str = "config.modified";
/// Topic emitted when an imported environment variable is absent.
pub const TOPIC_CONFIG_MISSING: &str = "config.missing";

/// Kind of a successful config write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEventKind {
    /// The key did not exist before the write.
    Set,
    /// The key existed and its value was replaced.
    Modified,
}

impl ConfigEventKind {
    pub fn topic(self) -> &'static str {
        match self {
            Self::Set => TOPIC_CONFIG_SET,
            Self::Modified => TOPIC_CONFIG_MODIFIED,
        }
    }
}

/// Payload of `config.set` / `config.modified`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEvent {
    pub kind: ConfigEventKind,
    /// Full dot path that was written.
    pub key: String,
    /// Stored value, with substitutions already resolved.
    pub value: Value,
}

/// Payload of `config.missing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingEnvEvent {
    pub name: String,
    pub description: String,
}

/// Event delivered through an instance's [`EventBus`].
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    Config(ConfigEvent),
    MissingEnv(MissingEnvEvent),
    /// Free-form event raised by extensions.
    Custom { topic: String, payload: Value },
}

impl AppEvent {
    /// Topic string subscribers match against.
    pub fn topic(&self) -> &str {
        match self {
            Self::Config(event) => event.kind.topic(),
            Self::MissingEnv(_) => TOPIC_CONFIG_MISSING,
            Self::Custom { topic, .. } => topic.as_str(),
        }
    }

    pub fn custom(topic: impl Into<String>, payload: Value) -> Self {
        Self::Custom {
            topic: topic.into(),
            payload,
        }
    }
}

impl From<ConfigEvent> for AppEvent {
    fn from(value: ConfigEvent) -> Self {
        Self::Config(value)
    }
}

impl From<MissingEnvEvent> for AppEvent {
    fn from(value: MissingEnvEvent) -> Self {
        Self::MissingEnv(value)
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&AppEvent) + Send>;

struct Subscriber {
    id: SubscriptionId,
    pattern: String,
    handler: Handler,
}

/// Synchronous observer list owned by one application instance.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events whose topic matches `pattern`.
    ///
    /// Patterns are an exact topic, `*` for every topic, or `prefix.*` for
    /// every topic under `prefix.`.
    pub fn subscribe<F>(&mut self, pattern: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: FnMut(&AppEvent) + Send + 'static,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers.push(Subscriber {
            id,
            pattern: pattern.into(),
            handler: Box::new(handler),
        });
        id
    }

    /// Removes one subscription. Returns `false` when the id is unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|subscriber| subscriber.id != id);
        self.subscribers.len() != before
    }

    /// Delivers `event` to every matching subscriber and returns how many
    /// handlers ran.
    pub fn emit(&mut self, event: &AppEvent) -> usize {
        let topic = event.topic();
        let mut delivered = 0;
        for subscriber in &mut self.subscribers {
            if topic_matches(&subscriber.pattern, topic) {
                (subscriber.handler)(event);
                delivered += 1;
            }
        }
        log::trace!(
            "event=emit module=events status=ok topic={} delivered={}",
            topic,
            delivered
        );
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

fn topic_matches(pattern: &str, topic: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix(".*") {
        Some(prefix) => topic
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.')),
        None => pattern == topic,
    }
}
