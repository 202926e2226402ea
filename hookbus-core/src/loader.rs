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

//! Plugin file loading
//!
//! Loading a plugin file makes its class available to the process without
//! constructing it. Class code itself lives in the
//! [`PluginCatalog`](crate::catalog::PluginCatalog); a loader decides whether
//! a discovered file is usable.

use crate::error::{EventError, EventResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Capability to load a plugin source file.
pub trait PluginLoader: Send + Sync {
    /// Load the file at `location`. Loading the same file twice must be
    /// harmless.
    fn load(&self, location: &Path) -> EventResult<()>;
}

/// Default loader: reads each plugin file once per process.
#[derive(Debug, Default)]
pub struct SourceFileLoader {
    loaded: Mutex<HashSet<PathBuf>>,
}

impl SourceFileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `location` has been loaded.
    pub fn is_loaded(&self, location: &Path) -> bool {
        self.loaded.lock().contains(location)
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.lock().len()
    }
}

impl PluginLoader for SourceFileLoader {
    fn load(&self, location: &Path) -> EventResult<()> {
        if self.is_loaded(location) {
            return Ok(());
        }

        std::fs::read(location).map_err(|e| EventError::LoadFailed {
            location: location.to_path_buf(),
            reason: e.to_string(),
        })?;

        tracing::debug!(location = ?location, "Plugin file loaded");
        self.loaded.lock().insert(location.to_path_buf());
        Ok(())
    }
}
