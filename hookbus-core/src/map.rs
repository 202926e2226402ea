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

//! Event routing table and the builder that derives it from plugin files.

use crate::catalog::PluginCatalog;
use crate::error::{EventError, EventResult};
use crate::handler::normalize_event;
use crate::loader::PluginLoader;
use crate::scanner::PluginDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Where to find a class that services an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapEntry {
    pub location: PathBuf,
    pub class: String,
}

/// Normalized event name -> classes servicing it, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventMap {
    routes: BTreeMap<String, Vec<MapEntry>>,
}

impl EventMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry` to the bucket for `event`.
    pub fn insert(&mut self, event: &str, entry: MapEntry) {
        self.routes
            .entry(normalize_event(event))
            .or_default()
            .push(entry);
    }

    /// Classes mapped under `event`. Lookup is case-insensitive.
    pub fn get(&self, event: &str) -> &[MapEntry] {
        self.routes
            .get(&normalize_event(event))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains_event(&self, event: &str) -> bool {
        self.routes.contains_key(&normalize_event(event))
    }

    /// Mapped event names, sorted.
    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[MapEntry])> {
        self.routes.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Class name expected inside a plugin file with the given stem.
pub fn class_name(prefix: &str, stem: &str) -> String {
    format!("{prefix}{stem}")
}

/// Derives an [`EventMap`] from scanned plugin files.
pub struct MapBuilder<'a> {
    catalog: &'a PluginCatalog,
    loader: &'a dyn PluginLoader,
    class_prefix: &'a str,
}

impl<'a> MapBuilder<'a> {
    pub fn new(
        catalog: &'a PluginCatalog,
        loader: &'a dyn PluginLoader,
        class_prefix: &'a str,
    ) -> Self {
        Self {
            catalog,
            loader,
            class_prefix,
        }
    }

    /// Load every plugin file and map each event its class services.
    ///
    /// Fails on the first file that can't be loaded or whose expected class
    /// (`prefix + file stem`) isn't in the catalog.
    pub fn build(&self, descriptors: &[PluginDescriptor]) -> EventResult<EventMap> {
        let mut map = EventMap::new();

        for descriptor in descriptors {
            self.loader.load(&descriptor.location)?;

            let class = class_name(self.class_prefix, &descriptor.name);
            let factory = self
                .catalog
                .get(&class)
                .ok_or_else(|| EventError::MissingClass {
                    class: class.clone(),
                    location: descriptor.location.clone(),
                })?;

            for event in factory.events() {
                map.insert(
                    event,
                    MapEntry {
                        location: descriptor.location.clone(),
                        class: class.clone(),
                    },
                );
            }

            tracing::debug!(
                class = %class,
                location = ?descriptor.location,
                events = factory.events().len(),
                "Plugin mapped"
            );
        }

        Ok(map)
    }
}
