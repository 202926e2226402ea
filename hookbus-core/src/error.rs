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

//! Event system error types

use std::path::PathBuf;
use thiserror::Error;

/// Result type for event system operations
pub type EventResult<T> = Result<T, EventError>;

/// Errors raised while discovering, mapping and caching plugins.
///
/// Everything here except `Io` is a configuration error: a dispatcher that
/// fails to build with one of these should not be started.
#[derive(Debug, Error)]
pub enum EventError {
    // Scan errors
    #[error("Plugin directory unreadable: {path:?}: {source}")]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Map build errors
    #[error("Error locating class '{class}' in file '{}'", location.display())]
    MissingClass { class: String, location: PathBuf },

    #[error("Failed to load plugin file '{}': {reason}", location.display())]
    LoadFailed { location: PathBuf, reason: String },

    // Cache errors
    #[error("Event map cache not found: {0:?}")]
    CacheMissing(PathBuf),

    #[error("Event map cache corrupt: {path:?}: {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    #[error("Error opening cache file '{}' for writing: {source}", path.display())]
    CacheWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Config errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for EventError {
    fn from(e: toml::de::Error) -> Self {
        EventError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for EventError {
    fn from(e: serde_json::Error) -> Self {
        EventError::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for EventError {
    fn from(e: bincode::Error) -> Self {
        EventError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_class_message_names_file() {
        let err = EventError::MissingClass {
            class: "PluginAudit".to_string(),
            location: PathBuf::from("observers/Audit.plugin"),
        };
        let msg = err.to_string();
        assert!(msg.contains("PluginAudit"));
        assert!(msg.contains("observers/Audit.plugin"));
    }

    #[test]
    fn test_toml_error_maps_to_config() {
        let err: EventError = toml::from_str::<toml::Value>("not = [valid")
            .unwrap_err()
            .into();
        assert!(matches!(err, EventError::Config(_)));
    }
}
