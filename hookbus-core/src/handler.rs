// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Handler shapes and the traits plugins implement.
//!
//! An attached handler is one of:
//!
//! - **Callable**: a closure bound to exactly one event name.
//! - **Plugin**: an object servicing every event its type declares.
//! - **Observer**: anything implementing the bare [`Observer`] contract. These
//!   take part in [`notify`](crate::registry::ObserverRegistry::notify) but
//!   can't be routed by event name.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Key injected into a plugin's argument bag naming the triggered event.
pub const EVENT_KEY: &str = "event";

/// Lookup key for an event name. Routing is case-insensitive.
pub fn normalize_event(event: &str) -> String {
    event.to_lowercase()
}

/// Named arguments passed to handlers when an event fires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventArgs(Map<String, Value>);

impl EventArgs {
    /// Create an empty argument bag.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Convert a JSON value. `null` becomes an empty bag; anything other than
    /// an object is rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::new()),
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Unwrap into a JSON object value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for EventArgs {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Generic observer contract: a single update hook.
pub trait Observer: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Receive an update and return a result.
    fn update(&self, args: EventArgs) -> Value;
}

/// Object-shaped handler servicing one or more events.
///
/// Which events an instance services comes from its factory's declared
/// event list, not from the instance itself.
pub trait Plugin: Send + Sync {
    /// Run the routine for `event`.
    ///
    /// `event` is the name exactly as declared by the plugin type; `args` no
    /// longer carries the injected [`EVENT_KEY`].
    fn handle(&self, event: &str, args: EventArgs) -> Value;
}

/// Information handed to a plugin constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginContext {
    /// Class name the instance is created under.
    pub class: String,
    /// Plugin file the class was discovered in, if it came from a scan.
    pub location: Option<PathBuf>,
}

impl PluginContext {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// A plugin type that can be registered in a
/// [`PluginCatalog`](crate::catalog::PluginCatalog) by type.
///
/// # Example
///
/// ```
/// use hookbus_core::handler::{EventArgs, Plugin, PluginContext, PluginType};
/// use serde_json::{json, Value};
///
/// struct Audit;
///
/// impl Plugin for Audit {
///     fn handle(&self, event: &str, _args: EventArgs) -> Value {
///         json!({ "audited": event })
///     }
/// }
///
/// impl PluginType for Audit {
///     const CLASS: &'static str = "PluginAudit";
///     const EVENTS: &'static [&'static str] = &["user_login", "user_logout"];
///
///     fn create(_ctx: &PluginContext) -> Self {
///         Audit
///     }
/// }
/// ```
pub trait PluginType: Plugin + Sized + 'static {
    /// Class name; must be the configured prefix followed by the file stem.
    const CLASS: &'static str;

    /// Event names this type services.
    const EVENTS: &'static [&'static str];

    /// Construct an instance.
    fn create(ctx: &PluginContext) -> Self;
}

/// Boxed callable action.
pub type Action = Arc<dyn Fn(&EventArgs) -> Value + Send + Sync>;

/// A closure bound to a single event.
#[derive(Clone)]
pub struct CallableHandler {
    event: String,
    action: Action,
}

impl CallableHandler {
    pub fn new<F>(event: &str, action: F) -> Self
    where
        F: Fn(&EventArgs) -> Value + Send + Sync + 'static,
    {
        Self::from_action(event, Arc::new(action))
    }

    pub fn from_action(event: &str, action: Action) -> Self {
        Self {
            event: normalize_event(event),
            action,
        }
    }

    /// Normalized event name this handler is bound to.
    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn matches(&self, event: &str) -> bool {
        self.event == normalize_event(event)
    }

    pub fn invoke(&self, args: &EventArgs) -> Value {
        (self.action)(args)
    }
}

impl fmt::Debug for CallableHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableHandler")
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

/// An attached plugin instance with the events its type services.
#[derive(Clone)]
pub struct PluginHandler {
    class: Arc<str>,
    events: Arc<[String]>,
    instance: Arc<dyn Plugin>,
}

impl PluginHandler {
    pub fn new(class: &str, events: Vec<String>, instance: Arc<dyn Plugin>) -> Self {
        Self {
            class: Arc::from(class),
            events: Arc::from(events),
            instance,
        }
    }

    /// Concrete type identity.
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn events(&self) -> &[String] {
        &self.events
    }

    /// Declared spelling of `event`, if this plugin services it.
    pub fn resolve(&self, event: &str) -> Option<&str> {
        let key = normalize_event(event);
        self.events
            .iter()
            .find(|declared| normalize_event(declared) == key)
            .map(String::as_str)
    }

    pub fn handles(&self, event: &str) -> bool {
        self.resolve(event).is_some()
    }

    /// Entry point used by the dispatcher.
    ///
    /// Pulls [`EVENT_KEY`] out of `args` and runs the matching routine with
    /// what remains. Returns `null` when the key is missing or names an event
    /// this plugin doesn't service.
    pub fn update(&self, mut args: EventArgs) -> Value {
        let event = match args.remove(EVENT_KEY) {
            Some(Value::String(event)) => event,
            _ => return Value::Null,
        };

        match self.resolve(&event) {
            Some(declared) => self.instance.handle(declared, args),
            None => Value::Null,
        }
    }
}

impl fmt::Debug for PluginHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandler")
            .field("class", &self.class)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

/// Any entry in the observer list.
#[derive(Clone)]
pub enum Handler {
    Callable(CallableHandler),
    Plugin(PluginHandler),
    Observer(Arc<dyn Observer>),
}

impl Handler {
    /// Wrap a closure bound to `event`.
    pub fn callable<F>(event: &str, action: F) -> Self
    where
        F: Fn(&EventArgs) -> Value + Send + Sync + 'static,
    {
        Handler::Callable(CallableHandler::new(event, action))
    }

    /// Wrap a bare observer.
    pub fn observer(observer: impl Observer + 'static) -> Self {
        Handler::Observer(Arc::new(observer))
    }

    /// Class identity for plugin handlers.
    pub fn plugin_class(&self) -> Option<&str> {
        match self {
            Handler::Plugin(plugin) => Some(plugin.class()),
            _ => None,
        }
    }

    /// Generic update hook.
    pub fn update(&self, args: EventArgs) -> Value {
        match self {
            Handler::Callable(callable) => callable.invoke(&args),
            Handler::Plugin(plugin) => plugin.update(args),
            Handler::Observer(observer) => observer.update(args),
        }
    }

    /// Short description for logs.
    pub fn label(&self) -> String {
        match self {
            Handler::Callable(callable) => format!("callable:{}", callable.event()),
            Handler::Plugin(plugin) => format!("plugin:{}", plugin.class()),
            Handler::Observer(observer) => format!("observer:{}", observer.name()),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Callable(callable) => callable.fmt(f),
            Handler::Plugin(plugin) => plugin.fmt(f),
            Handler::Observer(observer) => f
                .debug_tuple("Observer")
                .field(&observer.name())
                .finish(),
        }
    }
}

/// What a caller hands to [`Dispatcher::register`](crate::Dispatcher::register).
#[derive(Clone)]
pub enum HandlerSpec {
    /// A plugin class name, looked up in the catalog.
    Class(String),
    /// A closure bound to the registered event.
    Callable(Action),
}

impl HandlerSpec {
    pub fn callable<F>(action: F) -> Self
    where
        F: Fn(&EventArgs) -> Value + Send + Sync + 'static,
    {
        HandlerSpec::Callable(Arc::new(action))
    }
}

impl From<&str> for HandlerSpec {
    fn from(class: &str) -> Self {
        HandlerSpec::Class(class.to_string())
    }
}

impl From<String> for HandlerSpec {
    fn from(class: String) -> Self {
        HandlerSpec::Class(class)
    }
}

impl fmt::Debug for HandlerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerSpec::Class(class) => f.debug_tuple("Class").field(class).finish(),
            HandlerSpec::Callable(_) => f.write_str("Callable(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Greeter;

    impl Plugin for Greeter {
        fn handle(&self, event: &str, args: EventArgs) -> Value {
            json!({ "event": event, "args": args.len() })
        }
    }

    fn greeter() -> PluginHandler {
        PluginHandler::new(
            "PluginGreeter",
            vec!["sayHello".to_string(), "wave".to_string()],
            Arc::new(Greeter),
        )
    }

    #[test]
    fn test_event_args_from_value() {
        assert!(EventArgs::from_value(Value::Null).unwrap().is_empty());
        let args = EventArgs::from_value(json!({"a": 1})).unwrap();
        assert_eq!(args.get("a"), Some(&json!(1)));
        assert!(EventArgs::from_value(json!([1, 2])).is_none());
    }

    #[test]
    fn test_callable_matches_case_insensitively() {
        let handler = CallableHandler::new("MyEvent", |_| Value::Null);
        assert_eq!(handler.event(), "myevent");
        assert!(handler.matches("myevent"));
        assert!(handler.matches("MYEVENT"));
        assert!(!handler.matches("other"));
    }

    #[test]
    fn test_plugin_update_strips_event_key() {
        let plugin = greeter();
        let args = EventArgs::new()
            .with(EVENT_KEY, "SAYHELLO")
            .with("name", "ada");

        let result = plugin.update(args);
        assert_eq!(result, json!({ "event": "sayHello", "args": 1 }));
    }

    #[test]
    fn test_plugin_update_unknown_event_is_null() {
        let plugin = greeter();
        assert_eq!(plugin.update(EventArgs::new().with(EVENT_KEY, "baz")), Value::Null);
        assert_eq!(plugin.update(EventArgs::new()), Value::Null);
    }

    #[test]
    fn test_handler_labels() {
        assert_eq!(Handler::callable("X", |_| Value::Null).label(), "callable:x");
        assert_eq!(Handler::Plugin(greeter()).label(), "plugin:PluginGreeter");
        assert_eq!(
            Handler::Plugin(greeter()).plugin_class(),
            Some("PluginGreeter")
        );
    }
}
