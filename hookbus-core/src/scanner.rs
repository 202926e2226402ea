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

//! Plugin discovery
//!
//! Walks the plugin directory recursively and describes every file carrying
//! the plugin extension.

use crate::error::{EventError, EventResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A plugin file found by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// File name without extension.
    pub name: String,
    /// Full path to the file.
    pub location: PathBuf,
    /// Last-modified time of the file.
    pub modified: DateTime<Utc>,
}

/// Scan `dir` for plugin files with the given extension.
///
/// Descriptors are sorted by location so that two scans of the same tree
/// compare equal. An unreadable root is an error; an empty root is
/// `Ok(vec![])`. Unreadable entries below the root are skipped with a warning.
///
/// Symlinked files and directories are followed; a descriptor's location is
/// the path inside `dir`, not the link target. Files whose stem contains a
/// dot are ignored.
pub fn scan(dir: &Path, extension: &str) -> EventResult<Vec<PluginDescriptor>> {
    std::fs::read_dir(dir).map_err(|source| EventError::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut descriptors = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(path = ?e.path(), error = %e, "Skipping unreadable plugin entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }

        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        // `Audit.old.plugin` can't name a class.
        if name.contains('.') {
            tracing::debug!(path = ?path, "Skipping plugin file with dotted name");
            continue;
        }

        let modified = entry
            .metadata()
            .map_err(std::io::Error::from)
            .and_then(|m| m.modified());
        let modified = match modified {
            Ok(time) => DateTime::<Utc>::from(time),
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "Skipping plugin without modification time");
                continue;
            }
        };

        descriptors.push(PluginDescriptor {
            name: name.to_string(),
            location: path.to_path_buf(),
            modified,
        });
    }

    descriptors.sort_by(|a, b| a.location.cmp(&b.location));

    tracing::debug!(
        directory = ?dir,
        found = descriptors.len(),
        "Plugin directory scanned"
    );

    Ok(descriptors)
}
