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

//! Dispatcher configuration.

use crate::error::{EventError, EventResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the table holding dispatcher settings in an application config file.
pub const CONFIG_SECTION: &str = "event";

/// What `trigger` does when it meets an observer that can't be routed by
/// event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Fail the whole trigger and drop any results collected so far.
    #[default]
    Abort,
    /// Log a warning and move on to the next observer.
    Skip,
}

/// Configuration for the event dispatcher.
///
/// # Example TOML Configuration
///
/// ```toml
/// [event]
/// directory = "observers"
/// autoscan = true
/// cache_file = "cache/event_map.bin"
/// on_malformed = "skip"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Root directory scanned for plugin files.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Validate the cached event map against the plugin directory on startup.
    #[serde(default = "default_autoscan")]
    pub autoscan: bool,

    /// Where the event map snapshot is persisted.
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,

    /// Plugin source-file extension, without the leading dot.
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Class name prefix; a file `Audit.plugin` maps to `{prefix}Audit`.
    #[serde(default = "default_class_prefix")]
    pub class_prefix: String,

    /// Handling of observers that are neither callables nor plugins.
    #[serde(default)]
    pub on_malformed: MalformedPolicy,
}

fn default_directory() -> PathBuf {
    PathBuf::from(crate::PLUGINS_DIR_NAME)
}

fn default_autoscan() -> bool {
    true
}

fn default_cache_file() -> PathBuf {
    PathBuf::from("cache").join("event_map.bin")
}

fn default_extension() -> String {
    crate::PLUGIN_EXTENSION.to_string()
}

fn default_class_prefix() -> String {
    "Plugin".to_string()
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            autoscan: default_autoscan(),
            cache_file: default_cache_file(),
            extension: default_extension(),
            class_prefix: default_class_prefix(),
            on_malformed: MalformedPolicy::default(),
        }
    }
}

impl DispatcherConfig {
    /// Parse a bare dispatcher table from TOML.
    pub fn from_toml(toml_str: &str) -> EventResult<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Parse a bare dispatcher table from JSON.
    pub fn from_json(json: &str) -> EventResult<Self> {
        serde_json::from_str(json).map_err(|e| EventError::Config(e.to_string()))
    }

    /// Load settings from the `[event]` table of an application config file.
    ///
    /// A missing file, or one without an `[event]` table, leaves every
    /// setting at its default. Keys absent from the table keep their defaults.
    pub fn load(path: &Path) -> EventResult<Self> {
        if !path.exists() {
            tracing::debug!(path = ?path, "No config file, using dispatcher defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let mut document: toml::Table = toml::from_str(&contents)?;

        match document.remove(CONFIG_SECTION) {
            Some(section @ toml::Value::Table(_)) => Ok(section.try_into::<Self>()?),
            Some(other) => Err(EventError::Config(format!(
                "[{}] must be a table, found {}",
                CONFIG_SECTION,
                other.type_str()
            ))),
            None => Ok(Self::default()),
        }
    }

    /// Anchor relative `directory` and `cache_file` paths at `base`.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        if self.directory.is_relative() {
            self.directory = base.join(&self.directory);
        }
        if self.cache_file.is_relative() {
            self.cache_file = base.join(&self.cache_file);
        }
        self
    }

    /// Builder-style setter for the plugin directory.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Builder-style setter for the cache file.
    pub fn with_cache_file(mut self, cache_file: impl Into<PathBuf>) -> Self {
        self.cache_file = cache_file.into();
        self
    }

    /// Builder-style setter for autoscan.
    pub fn with_autoscan(mut self, autoscan: bool) -> Self {
        self.autoscan = autoscan;
        self
    }

    /// Builder-style setter for the malformed-observer policy.
    pub fn with_malformed_policy(mut self, policy: MalformedPolicy) -> Self {
        self.on_malformed = policy;
        self
    }

    /// Class name expected inside a plugin file with the given stem.
    pub fn class_name(&self, stem: &str) -> String {
        crate::map::class_name(&self.class_prefix, stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.directory, PathBuf::from("observers"));
        assert!(config.autoscan);
        assert_eq!(config.extension, "plugin");
        assert_eq!(config.on_malformed, MalformedPolicy::Abort);
        assert_eq!(config.class_name("Audit"), "PluginAudit");
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = DispatcherConfig::from_toml(
            r#"
            autoscan = false
            on_malformed = "skip"
            "#,
        )
        .unwrap();
        assert!(!config.autoscan);
        assert_eq!(config.on_malformed, MalformedPolicy::Skip);
        assert_eq!(config.directory, PathBuf::from("observers"));
    }

    #[test]
    fn test_parse_json() {
        let config = DispatcherConfig::from_json(r#"{"directory": "hooks"}"#).unwrap();
        assert_eq!(config.directory, PathBuf::from("hooks"));
        assert!(config.autoscan);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DispatcherConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, DispatcherConfig::default());
    }

    #[test]
    fn test_load_event_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[server]\nport = 8080\n\n[event]\ndirectory = \"listeners\"").unwrap();

        let config = DispatcherConfig::load(&path).unwrap();
        assert_eq!(config.directory, PathBuf::from("listeners"));
        assert!(config.autoscan);
    }

    #[test]
    fn test_load_without_event_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        std::fs::write(&path, "[server]\nport = 8080\n").unwrap();

        let config = DispatcherConfig::load(&path).unwrap();
        assert_eq!(config, DispatcherConfig::default());
    }

    #[test]
    fn test_load_rejects_non_table_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        std::fs::write(&path, "event = 3\n").unwrap();

        assert!(matches!(
            DispatcherConfig::load(&path),
            Err(EventError::Config(_))
        ));
    }

    #[test]
    fn test_resolve_paths() {
        let config = DispatcherConfig::default().resolve_paths(Path::new("/srv/app"));
        assert_eq!(config.directory, PathBuf::from("/srv/app/observers"));
        assert_eq!(
            config.cache_file,
            PathBuf::from("/srv/app/cache/event_map.bin")
        );

        let absolute = DispatcherConfig::default()
            .with_directory("/opt/plugins")
            .resolve_paths(Path::new("/srv/app"));
        assert_eq!(absolute.directory, PathBuf::from("/opt/plugins"));
    }
}
