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

//! Observer registry: the ordered list of attached handlers.

use crate::handler::{EventArgs, Handler};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Identity of one attached handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverId(Uuid);

impl ObserverId {
    fn new() -> Self {
        ObserverId(Uuid::new_v4())
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An attached handler with its registration id.
#[derive(Debug, Clone)]
pub struct AttachedObserver {
    pub id: ObserverId,
    pub handler: Handler,
}

/// Ordered list of attached handlers.
///
/// Insertion order is registration order. At most one plugin instance per
/// class is kept; callables are never deduplicated.
#[derive(Debug, Default)]
pub struct ObserverRegistry {
    observers: Vec<AttachedObserver>,
    state: Option<Value>,
}

impl ObserverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a handler.
    ///
    /// Attaching a plugin whose class is already present does nothing and
    /// returns `None`.
    pub fn attach(&mut self, handler: Handler) -> Option<ObserverId> {
        if let Some(class) = handler.plugin_class() {
            if self.contains_class(class) {
                tracing::debug!(class = %class, "Plugin class already attached");
                return None;
            }
        }

        let id = ObserverId::new();
        tracing::debug!(id = %id, handler = %handler.label(), "Observer attached");
        self.observers.push(AttachedObserver { id, handler });
        Some(id)
    }

    /// Remove the entry with `id`. Returns whether anything was removed.
    pub fn detach(&mut self, id: ObserverId) -> bool {
        match self.observers.iter().position(|o| o.id == id) {
            Some(index) => {
                self.observers.remove(index);
                true
            }
            None => false,
        }
    }

    /// Call every handler's update hook with no arguments, in list order.
    pub fn notify(&self) -> Vec<Value> {
        self.observers
            .iter()
            .map(|o| o.handler.update(EventArgs::new()))
            .collect()
    }

    /// Whether a plugin of `class` is attached.
    pub fn contains_class(&self, class: &str) -> bool {
        self.observers
            .iter()
            .any(|o| o.handler.plugin_class() == Some(class))
    }

    /// Handlers in registration order.
    pub fn handlers(&self) -> impl Iterator<Item = &Handler> {
        self.observers.iter().map(|o| &o.handler)
    }

    /// Attached entries in registration order.
    pub fn entries(&self) -> &[AttachedObserver] {
        &self.observers
    }

    /// Owned copy of the handler list, for dispatching without holding a lock.
    pub fn snapshot(&self) -> Vec<Handler> {
        self.handlers().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Observable state, if any has been set.
    pub fn state(&self) -> Option<&Value> {
        self.state.as_ref()
    }

    pub fn set_state(&mut self, state: Value) {
        self.state = Some(state);
    }
}
