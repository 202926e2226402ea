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

//! Plugin class catalog: class name -> factory.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::handler::{normalize_event, Plugin, PluginContext, PluginHandler, PluginType};

type BuildFn = Arc<dyn Fn(&PluginContext) -> Arc<dyn Plugin> + Send + Sync>;

/// Drop names that can't be routed: the class's own name and `_`-prefixed
/// names. Order is kept; names differing only in case count as duplicates
/// and the first spelling wins.
pub fn public_events<S: AsRef<str>>(class: &str, declared: &[S]) -> Vec<String> {
    let mut events: Vec<String> = Vec::with_capacity(declared.len());
    for name in declared.iter().map(AsRef::as_ref) {
        if name.is_empty() || name.starts_with('_') || name.eq_ignore_ascii_case(class) {
            continue;
        }
        let key = normalize_event(name);
        if !events.iter().any(|e| normalize_event(e) == key) {
            events.push(name.to_string());
        }
    }
    events
}

/// Constructor for one plugin class.
#[derive(Clone)]
pub struct PluginFactory {
    class: String,
    events: Vec<String>,
    build: BuildFn,
}

impl PluginFactory {
    pub fn new<S, F>(class: impl Into<String>, events: &[S], build: F) -> Self
    where
        S: AsRef<str>,
        F: Fn(&PluginContext) -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        let class = class.into();
        let events = public_events(&class, events);
        Self {
            class,
            events,
            build: Arc::new(build),
        }
    }

    /// Factory for a [`PluginType`].
    pub fn of<P: PluginType>() -> Self {
        Self::new(P::CLASS, P::EVENTS, |ctx| {
            Arc::new(P::create(ctx)) as Arc<dyn Plugin>
        })
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// Routable event names, as declared.
    pub fn events(&self) -> &[String] {
        &self.events
    }

    /// Construct an instance ready to attach.
    pub fn instantiate(&self, ctx: &PluginContext) -> PluginHandler {
        PluginHandler::new(&self.class, self.events.clone(), (self.build)(ctx))
    }
}

impl fmt::Debug for PluginFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginFactory")
            .field("class", &self.class)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Plugin class already registered: {0}")]
    AlreadyRegistered(String),
}

/// Every plugin class the process knows how to construct.
#[derive(Default)]
pub struct PluginCatalog {
    factories: RwLock<HashMap<String, Arc<PluginFactory>>>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: PluginType>(&self) -> Result<(), CatalogError> {
        self.register_factory(PluginFactory::of::<P>())
    }

    pub fn register_factory(&self, factory: PluginFactory) -> Result<(), CatalogError> {
        let mut factories = self.factories.write();
        if factories.contains_key(factory.class()) {
            return Err(CatalogError::AlreadyRegistered(factory.class().to_string()));
        }
        factories.insert(factory.class().to_string(), Arc::new(factory));
        Ok(())
    }

    /// Builder-style registration; a duplicate class replaces nothing.
    pub fn with<P: PluginType>(self) -> Self {
        if let Err(err) = self.register::<P>() {
            tracing::warn!(error = %err, "Ignoring duplicate plugin class");
        }
        self
    }

    pub fn get(&self, class: &str) -> Option<Arc<PluginFactory>> {
        self.factories.read().get(class).cloned()
    }

    pub fn contains(&self, class: &str) -> bool {
        self.factories.read().contains_key(class)
    }

    pub fn classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.factories.read().keys().cloned().collect();
        classes.sort();
        classes
    }

    pub fn len(&self) -> usize {
        self.factories.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.read().is_empty()
    }
}

impl fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("classes", &self.classes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{EventArgs, EVENT_KEY};
    use serde_json::{json, Value};

    struct Mailer;

    impl Plugin for Mailer {
        fn handle(&self, event: &str, _args: EventArgs) -> Value {
            json!(format!("mailed:{event}"))
        }
    }

    impl PluginType for Mailer {
        const CLASS: &'static str = "PluginMailer";
        const EVENTS: &'static [&'static str] =
            &["PluginMailer", "user_created", "_render", "password_reset"];

        fn create(_ctx: &PluginContext) -> Self {
            Mailer
        }
    }

    #[test]
    fn test_public_events_filter() {
        let events = public_events("PluginX", &["a", "_hidden", "pluginx", "b", "a", ""]);
        assert_eq!(events, vec!["a", "b"]);
    }

    #[test]
    fn test_public_events_dedup_ignores_case() {
        let events = public_events("PluginX", &["foo", "FOO", "Bar", "bar", "foo"]);
        assert_eq!(events, vec!["foo", "Bar"]);
    }

    #[test]
    fn test_factory_of_type() {
        let factory = PluginFactory::of::<Mailer>();
        assert_eq!(factory.class(), "PluginMailer");
        assert_eq!(factory.events(), &["user_created", "password_reset"]);

        let handler = factory.instantiate(&PluginContext::new("PluginMailer"));
        assert_eq!(
            handler.update(EventArgs::new().with(EVENT_KEY, "user_created")),
            json!("mailed:user_created")
        );
    }

    #[test]
    fn test_catalog_rejects_duplicates() {
        let catalog = PluginCatalog::new();
        catalog.register::<Mailer>().unwrap();
        assert!(matches!(
            catalog.register::<Mailer>(),
            Err(CatalogError::AlreadyRegistered(_))
        ));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_catalog_closure_factory() {
        let catalog = PluginCatalog::new().with::<Mailer>();
        catalog
            .register_factory(PluginFactory::new("PluginEcho", &["echo"], |_| {
                Arc::new(Mailer) as Arc<dyn Plugin>
            }))
            .unwrap();

        assert!(catalog.contains("PluginEcho"));
        assert!(catalog.get("PluginNope").is_none());
        assert_eq!(catalog.classes(), vec!["PluginEcho", "PluginMailer"]);
    }
}
