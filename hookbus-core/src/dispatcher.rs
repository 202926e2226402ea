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

//! Event dispatcher: registration and triggering.

use crate::cache::{load_or_rebuild, MapSource};
use crate::catalog::PluginCatalog;
use crate::config::{DispatcherConfig, MalformedPolicy};
use crate::error::{EventError, EventResult};
use crate::handler::{
    CallableHandler, EventArgs, Handler, HandlerSpec, PluginContext, EVENT_KEY,
};
use crate::loader::{PluginLoader, SourceFileLoader};
use crate::map::{EventMap, MapEntry};
use crate::registry::{ObserverId, ObserverRegistry};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Errors that fail a single trigger.
///
/// Side effects of handlers that ran before the failure are not undone.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Malformed observer at position {index}: {label}")]
    MalformedObserver { index: usize, label: String },

    #[error("Failed to load handler '{class}' for event '{event}': {source}")]
    HandlerLoad {
        event: String,
        class: String,
        #[source]
        source: EventError,
    },
}

#[derive(Debug, Default)]
struct DispatcherState {
    observers: ObserverRegistry,
    loaded: HashSet<String>,
}

/// Routes triggered events to attached handlers.
///
/// # Concurrency Model
///
/// The observer list and the set of loaded classes share one mutex. The event
/// map never changes after construction. Handlers run on the calling thread
/// with the lock released, so a handler may register or trigger in turn.
///
/// Share one instance per process as `Arc<Dispatcher>`.
pub struct Dispatcher {
    config: DispatcherConfig,
    catalog: Arc<PluginCatalog>,
    loader: Arc<dyn PluginLoader>,
    map: EventMap,
    map_source: MapSource,
    state: Mutex<DispatcherState>,
}

impl Dispatcher {
    /// Build a dispatcher, loading or rebuilding the event map.
    ///
    /// Errors here are configuration errors (unreadable plugin directory,
    /// plugin file without its class, unusable cache) and should stop startup.
    pub fn new(config: DispatcherConfig, catalog: Arc<PluginCatalog>) -> EventResult<Self> {
        Self::with_loader(config, catalog, Arc::new(SourceFileLoader::new()))
    }

    /// Build a dispatcher with a custom plugin file loader.
    pub fn with_loader(
        config: DispatcherConfig,
        catalog: Arc<PluginCatalog>,
        loader: Arc<dyn PluginLoader>,
    ) -> EventResult<Self> {
        let (map, map_source) = load_or_rebuild(&config, &catalog, loader.as_ref())?;

        tracing::debug!(
            events = map.len(),
            source = ?map_source,
            "Dispatcher initialized"
        );

        Ok(Self {
            config,
            catalog,
            loader,
            map,
            map_source,
            state: Mutex::new(DispatcherState::default()),
        })
    }

    /// Register a handler for `event`.
    ///
    /// A class name known to the catalog is instantiated and attached; a
    /// callable is bound to `event`. Returns `false` for an unknown class.
    pub fn register(&self, event: &str, spec: impl Into<HandlerSpec>) -> bool {
        match spec.into() {
            HandlerSpec::Class(class) => {
                let Some(factory) = self.catalog.get(&class) else {
                    tracing::debug!(event = %event, class = %class, "Unknown plugin class");
                    return false;
                };

                let mut state = self.state.lock();
                if !state.loaded.contains(&class) {
                    let handler = factory.instantiate(&PluginContext::new(class.clone()));
                    state.observers.attach(Handler::Plugin(handler));
                    state.loaded.insert(class);
                }
                true
            }
            HandlerSpec::Callable(action) => {
                let handler = CallableHandler::from_action(event, action);
                self.state.lock().observers.attach(Handler::Callable(handler));
                true
            }
        }
    }

    /// Trigger `event` with no arguments.
    pub fn trigger(&self, event: &str) -> Result<Vec<Value>, DispatchError> {
        self.trigger_with(event, EventArgs::new())
    }

    /// Trigger `event`, returning each interested handler's result in
    /// registration order.
    ///
    /// Mapped plugin classes for `event` that haven't been loaded yet are
    /// constructed and attached first.
    pub fn trigger_with(&self, event: &str, args: EventArgs) -> Result<Vec<Value>, DispatchError> {
        let start = Instant::now();

        let handlers = {
            let mut state = self.state.lock();
            for entry in self.map.get(event) {
                if !state.loaded.contains(&entry.class) {
                    self.materialize(&mut state, event, entry)?;
                }
            }
            state.observers.snapshot()
        };

        let mut results = Vec::with_capacity(handlers.len());

        for (index, handler) in handlers.iter().enumerate() {
            match handler {
                Handler::Callable(callable) => {
                    if callable.matches(event) {
                        results.push(callable.invoke(&args));
                    }
                }
                Handler::Plugin(plugin) => {
                    if plugin.handles(event) {
                        let mut plugin_args = args.clone();
                        plugin_args.insert(EVENT_KEY, event);
                        results.push(plugin.update(plugin_args));
                    }
                }
                Handler::Observer(_) => match self.config.on_malformed {
                    MalformedPolicy::Abort => {
                        tracing::warn!(
                            event = %event,
                            index = index,
                            observer = %handler.label(),
                            "Malformed observer, aborting trigger"
                        );
                        return Err(DispatchError::MalformedObserver {
                            index,
                            label: handler.label(),
                        });
                    }
                    MalformedPolicy::Skip => {
                        tracing::warn!(
                            event = %event,
                            index = index,
                            observer = %handler.label(),
                            "Skipping malformed observer"
                        );
                    }
                },
            }
        }

        tracing::debug!(
            event = %event,
            observers = handlers.len(),
            results = results.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Event triggered"
        );

        Ok(results)
    }

    fn materialize(
        &self,
        state: &mut DispatcherState,
        event: &str,
        entry: &MapEntry,
    ) -> Result<(), DispatchError> {
        let load_error = |source: EventError| DispatchError::HandlerLoad {
            event: event.to_string(),
            class: entry.class.clone(),
            source,
        };

        self.loader.load(&entry.location).map_err(load_error)?;

        let factory = self.catalog.get(&entry.class).ok_or_else(|| {
            load_error(EventError::MissingClass {
                class: entry.class.clone(),
                location: entry.location.clone(),
            })
        })?;

        let ctx = PluginContext::new(entry.class.clone()).with_location(entry.location.clone());
        state.observers.attach(Handler::Plugin(factory.instantiate(&ctx)));
        state.loaded.insert(entry.class.clone());

        tracing::debug!(
            event = %event,
            class = %entry.class,
            location = ?entry.location,
            "Plugin class loaded on demand"
        );
        Ok(())
    }

    /// Attach a handler directly. `None` if a plugin of the same class is
    /// already attached.
    pub fn attach(&self, handler: Handler) -> Option<ObserverId> {
        self.state.lock().observers.attach(handler)
    }

    /// Detach a handler. Returns whether it was attached.
    pub fn detach(&self, id: ObserverId) -> bool {
        self.state.lock().observers.detach(id)
    }

    /// Call every handler's update hook with no arguments.
    pub fn notify(&self) -> Vec<Value> {
        let handlers = self.state.lock().observers.snapshot();
        handlers
            .iter()
            .map(|h| h.update(EventArgs::new()))
            .collect()
    }

    pub fn state(&self) -> Option<Value> {
        self.state.lock().observers.state().cloned()
    }

    pub fn set_state(&self, value: Value) {
        self.state.lock().observers.set_state(value);
    }

    /// Whether `class` has been constructed and attached.
    pub fn is_loaded(&self, class: &str) -> bool {
        self.state.lock().loaded.contains(class)
    }

    /// Constructed classes, sorted.
    pub fn loaded_classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.state.lock().loaded.iter().cloned().collect();
        classes.sort();
        classes
    }

    pub fn observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }

    /// Whether any plugin file maps a class under `event`.
    pub fn is_mapped(&self, event: &str) -> bool {
        self.map.contains_event(event)
    }

    pub fn event_map(&self) -> &EventMap {
        &self.map
    }

    pub fn map_source(&self) -> MapSource {
        self.map_source
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<PluginCatalog> {
        &self.catalog
    }
}

/// Builder for creating a Dispatcher with custom settings.
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    catalog: Option<Arc<PluginCatalog>>,
    loader: Option<Arc<dyn PluginLoader>>,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            config: DispatcherConfig::default(),
            catalog: None,
            loader: None,
        }
    }

    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<PluginCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn PluginLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_malformed_policy(mut self, policy: MalformedPolicy) -> Self {
        self.config.on_malformed = policy;
        self
    }

    /// Build the dispatcher; see [`Dispatcher::new`] for failure modes.
    pub fn build(self) -> EventResult<Dispatcher> {
        let catalog = self.catalog.unwrap_or_default();
        let loader = self
            .loader
            .unwrap_or_else(|| Arc::new(SourceFileLoader::new()));
        Dispatcher::with_loader(self.config, catalog, loader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PluginFactory;
    use crate::handler::{Observer, Plugin, PluginType};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Greeter;

    impl Plugin for Greeter {
        fn handle(&self, event: &str, args: EventArgs) -> Value {
            json!({ "greeted": event, "name": args.get("name").cloned() })
        }
    }

    impl PluginType for Greeter {
        const CLASS: &'static str = "PluginGreeter";
        const EVENTS: &'static [&'static str] = &["foo", "bar"];

        fn create(_ctx: &PluginContext) -> Self {
            Greeter
        }
    }

    struct Bystander;

    impl Observer for Bystander {
        fn name(&self) -> &str {
            "bystander"
        }

        fn update(&self, _args: EventArgs) -> Value {
            json!("bystander")
        }
    }

    /// Dispatcher over an empty plugin directory.
    fn empty_dispatcher(dir: &TempDir, policy: MalformedPolicy) -> Dispatcher {
        let plugins = dir.path().join("observers");
        std::fs::create_dir_all(&plugins).unwrap();

        let catalog = Arc::new(PluginCatalog::new().with::<Greeter>());
        DispatcherBuilder::new()
            .with_config(
                DispatcherConfig::default()
                    .with_directory(plugins)
                    .with_cache_file(dir.path().join("cache.bin")),
            )
            .with_catalog(catalog)
            .with_malformed_policy(policy)
            .build()
            .unwrap()
    }

    #[test]
    fn test_fan_out_in_registration_order() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = empty_dispatcher(&dir, MalformedPolicy::Abort);

        for i in 1..=3 {
            assert!(dispatcher.register("x", HandlerSpec::callable(move |_| json!(i))));
        }
        dispatcher.register("y", HandlerSpec::callable(|_| json!("other")));

        assert_eq!(
            dispatcher.trigger("x").unwrap(),
            vec![json!(1), json!(2), json!(3)]
        );
    }

    #[test]
    fn test_case_insensitive_callable() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = empty_dispatcher(&dir, MalformedPolicy::Abort);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        dispatcher.register(
            "MyEvent",
            HandlerSpec::callable(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Value::Null
            }),
        );

        dispatcher.trigger("myevent").unwrap();
        dispatcher.trigger("MYEVENT").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callable_receives_args() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = empty_dispatcher(&dir, MalformedPolicy::Abort);
        dispatcher.register(
            "greet",
            HandlerSpec::callable(|args| args.get("name").cloned().unwrap_or(Value::Null)),
        );

        let results = dispatcher
            .trigger_with("greet", EventArgs::new().with("name", "ada"))
            .unwrap();
        assert_eq!(results, vec![json!("ada")]);
    }

    #[test]
    fn test_register_class() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = empty_dispatcher(&dir, MalformedPolicy::Abort);

        assert!(dispatcher.register("foo", "PluginGreeter"));
        assert!(dispatcher.register("foo", "PluginGreeter"));
        assert!(!dispatcher.register("foo", "PluginMissing"));

        assert_eq!(dispatcher.observer_count(), 1);
        assert!(dispatcher.is_loaded("PluginGreeter"));
    }

    #[test]
    fn test_plugin_scope_filter() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = empty_dispatcher(&dir, MalformedPolicy::Abort);
        dispatcher.register("foo", "PluginGreeter");

        let args = EventArgs::new().with("name", "ada");
        assert_eq!(
            dispatcher.trigger_with("foo", args.clone()).unwrap(),
            vec![json!({ "greeted": "foo", "name": "ada" })]
        );
        assert_eq!(
            dispatcher.trigger_with("BAR", args).unwrap(),
            vec![json!({ "greeted": "bar", "name": "ada" })]
        );
        assert!(dispatcher.trigger("baz").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_observer_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = empty_dispatcher(&dir, MalformedPolicy::Abort);

        let ran = Arc::new(AtomicUsize::new(0));
        let first = ran.clone();
        dispatcher.register(
            "x",
            HandlerSpec::callable(move |_| {
                first.fetch_add(1, Ordering::SeqCst);
                json!("first")
            }),
        );
        dispatcher.attach(Handler::observer(Bystander));
        dispatcher.register("x", HandlerSpec::callable(|_| json!("last")));

        let err = dispatcher.trigger("x").unwrap_err();
        assert!(matches!(err, DispatchError::MalformedObserver { index: 1, .. }));
        // The first handler's side effect stands.
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_malformed_observer_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = empty_dispatcher(&dir, MalformedPolicy::Skip);

        dispatcher.register("x", HandlerSpec::callable(|_| json!("first")));
        dispatcher.attach(Handler::observer(Bystander));
        dispatcher.register("x", HandlerSpec::callable(|_| json!("last")));

        assert_eq!(
            dispatcher.trigger("x").unwrap(),
            vec![json!("first"), json!("last")]
        );
    }

    #[test]
    fn test_detach_and_notify() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = empty_dispatcher(&dir, MalformedPolicy::Abort);

        let id = dispatcher.attach(Handler::observer(Bystander)).unwrap();
        dispatcher.register("x", HandlerSpec::callable(|_| json!("x")));
        assert_eq!(dispatcher.notify(), vec![json!("bystander"), json!("x")]);

        assert!(dispatcher.detach(id));
        assert!(!dispatcher.detach(id));
        assert_eq!(dispatcher.trigger("x").unwrap(), vec![json!("x")]);
    }

    #[test]
    fn test_handler_can_trigger_reentrantly() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Arc::new(empty_dispatcher(&dir, MalformedPolicy::Abort));

        dispatcher.register("inner", HandlerSpec::callable(|_| json!("inner")));
        let weak = Arc::downgrade(&dispatcher);
        dispatcher.register(
            "outer",
            HandlerSpec::callable(move |_| match weak.upgrade() {
                Some(d) => json!(d.trigger("inner").unwrap()),
                None => Value::Null,
            }),
        );

        assert_eq!(
            dispatcher.trigger("outer").unwrap(),
            vec![json!(["inner"])]
        );
    }

    #[test]
    fn test_closure_factory_register() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = empty_dispatcher(&dir, MalformedPolicy::Abort);
        dispatcher
            .catalog()
            .register_factory(PluginFactory::new("PluginLate", &["late"], |_| {
                Arc::new(Greeter) as Arc<dyn Plugin>
            }))
            .unwrap();

        assert!(dispatcher.register("late", "PluginLate"));
        assert_eq!(dispatcher.trigger("late").unwrap().len(), 1);
    }

    #[test]
    fn test_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = empty_dispatcher(&dir, MalformedPolicy::Abort);
        assert!(dispatcher.state().is_none());
        dispatcher.set_state(json!("ready"));
        assert_eq!(dispatcher.state(), Some(json!("ready")));
    }
}
