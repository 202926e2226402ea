// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Hookbus Event Dispatcher
//!
//! A synchronous, in-process event dispatcher with plugin auto-discovery.
//! Components register interest in named events; other code triggers an
//! event with arguments and collects one result per interested handler.
//!
//! # Architecture
//!
//! - **Observer registry**: ordered list of attached handlers, at most one
//!   plugin instance per class
//! - **Scanner**: recursive walk of the plugin directory
//! - **Map builder**: turns discovered plugin files into an event -> class
//!   routing table using the [`PluginCatalog`]
//! - **Cache**: persists the scan and routing table; rebuilt only when the
//!   plugin directory changes
//! - **Dispatcher**: `register`/`trigger`; plugin classes are constructed the
//!   first time one of their events fires
//!
//! Handlers come in two routable shapes: a callable bound to one event, or a
//! plugin servicing every event its type declares. Event names are
//! case-insensitive.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hookbus_core::{Dispatcher, DispatcherConfig, HandlerSpec, PluginCatalog};
//! use serde_json::json;
//!
//! let catalog = Arc::new(PluginCatalog::new());
//! let dispatcher = Dispatcher::new(DispatcherConfig::default(), catalog)?;
//!
//! dispatcher.register("UserLogin", HandlerSpec::callable(|args| {
//!     json!({ "seen": args.get("user") })
//! }));
//!
//! let results = dispatcher.trigger("userlogin")?;
//! assert_eq!(results.len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod loader;
pub mod map;
pub mod registry;
pub mod scanner;

// Re-exports
pub use cache::{load_or_rebuild, map_fingerprint, CacheSnapshot, EventMapCache, MapSource};
pub use catalog::{public_events, CatalogError, PluginCatalog, PluginFactory};
pub use config::{DispatcherConfig, MalformedPolicy};
pub use dispatcher::{DispatchError, Dispatcher, DispatcherBuilder};
pub use error::{EventError, EventResult};
pub use handler::{
    normalize_event, Action, CallableHandler, EventArgs, Handler, HandlerSpec, Observer, Plugin,
    PluginContext, PluginHandler, PluginType, EVENT_KEY,
};
pub use loader::{PluginLoader, SourceFileLoader};
pub use map::{class_name, EventMap, MapBuilder, MapEntry};
pub use registry::{AttachedObserver, ObserverId, ObserverRegistry};
pub use scanner::{scan, PluginDescriptor};

/// Default plugin directory name
pub const PLUGINS_DIR_NAME: &str = "observers";

/// Default plugin source-file extension
pub const PLUGIN_EXTENSION: &str = "plugin";
