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

//! Event map cache
//!
//! Persists the last scan together with the map built from it, so that a
//! process start with an unchanged plugin directory skips loading every
//! plugin file. The snapshot also carries a fingerprint of the catalog and
//! class prefix the map was built against; a mismatch forces a rebuild.
//!
//! **Format:**
//! - Magic number (8 bytes): "HBEVMAP2"
//! - bincode-encoded [`CacheSnapshot`]
//! - BLAKE3 checksum (32 bytes) over everything preceding it
//!
//! Writes go to a sibling `.tmp` file which is then renamed over the cache.

use crate::catalog::PluginCatalog;
use crate::config::DispatcherConfig;
use crate::error::{EventError, EventResult};
use crate::loader::PluginLoader;
use crate::map::{EventMap, MapBuilder};
use crate::scanner::{scan, PluginDescriptor};
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 8] = b"HBEVMAP2";
const CHECKSUM_LEN: usize = 32;

/// What gets persisted: the scan and the map derived from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub scanned: Vec<PluginDescriptor>,
    /// See [`map_fingerprint`].
    pub fingerprint: String,
    pub map: EventMap,
}

/// Hash of everything besides the plugin files that shapes the event map:
/// the class prefix and every catalog class with its public events.
pub fn map_fingerprint(catalog: &PluginCatalog, class_prefix: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(class_prefix.as_bytes());
    hasher.update(&[0]);

    for class in catalog.classes() {
        let Some(factory) = catalog.get(&class) else {
            continue;
        };
        hasher.update(class.as_bytes());
        hasher.update(&[0]);
        for event in factory.events() {
            hasher.update(event.as_bytes());
            hasher.update(&[0]);
        }
        hasher.update(&[1]);
    }

    hasher.finalize().to_hex().to_string()
}

/// Where the active event map came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapSource {
    /// Taken from the cache file unchanged.
    Cached,
    /// Built from the plugin directory and written to the cache.
    Rebuilt,
}

/// On-disk snapshot store.
#[derive(Debug, Clone)]
pub struct EventMapCache {
    path: PathBuf,
}

impl EventMapCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read and verify the snapshot.
    pub fn load(&self) -> EventResult<CacheSnapshot> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EventError::CacheMissing(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        if data.len() < MAGIC.len() + CHECKSUM_LEN || &data[..MAGIC.len()] != MAGIC {
            return Err(self.corrupt("bad header"));
        }

        let (body, checksum) = data.split_at(data.len() - CHECKSUM_LEN);
        if blake3::hash(body).as_bytes() != checksum {
            return Err(self.corrupt("checksum mismatch"));
        }

        bincode::deserialize(&body[MAGIC.len()..]).map_err(|e| self.corrupt(&e.to_string()))
    }

    /// Write the snapshot, replacing any previous one atomically.
    pub fn store(&self, snapshot: &CacheSnapshot) -> EventResult<()> {
        let mut data = Vec::with_capacity(1024);
        data.extend_from_slice(MAGIC);
        data.extend_from_slice(&bincode::serialize(snapshot)?);
        let checksum = blake3::hash(&data);
        data.extend_from_slice(checksum.as_bytes());

        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                create_dir_all(parent)?;
            }

            let temp_path = self.temp_path();
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&data)?;
            writer.flush()?;
            drop(writer);

            std::fs::rename(&temp_path, &self.path)
        };

        write().map_err(|source| EventError::CacheWrite {
            path: self.path.clone(),
            source,
        })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn corrupt(&self, reason: &str) -> EventError {
        EventError::CacheCorrupt {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Produce the event map for a dispatcher.
///
/// Without autoscan the cached map is trusted as-is and a missing or corrupt
/// cache is an error. With autoscan the plugin directory is scanned and the
/// map is rebuilt (and re-cached) only when the scan differs from the cached
/// one, when the catalog or class prefix changed since the cache was
/// written, or when there is no usable cache.
pub fn load_or_rebuild(
    config: &DispatcherConfig,
    catalog: &PluginCatalog,
    loader: &dyn PluginLoader,
) -> EventResult<(EventMap, MapSource)> {
    let cache = EventMapCache::new(&config.cache_file);

    if !config.autoscan {
        let snapshot = cache.load()?;
        tracing::debug!(cache = ?cache.path(), "Autoscan disabled, using cached event map");
        return Ok((snapshot.map, MapSource::Cached));
    }

    let cached = if cache.exists() {
        match cache.load() {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::warn!(cache = ?cache.path(), error = %err, "Discarding unusable event map cache");
                None
            }
        }
    } else {
        None
    };

    let scanned = scan(&config.directory, &config.extension)?;
    let fingerprint = map_fingerprint(catalog, &config.class_prefix);

    if let Some(snapshot) = cached {
        if snapshot.fingerprint != fingerprint {
            tracing::debug!(cache = ?cache.path(), "Plugin catalog changed, rebuilding event map");
        } else if snapshot.scanned == scanned {
            tracing::debug!(
                cache = ?cache.path(),
                plugins = scanned.len(),
                "Plugin directory unchanged, using cached event map"
            );
            return Ok((snapshot.map, MapSource::Cached));
        }
    }

    let map = MapBuilder::new(catalog, loader, &config.class_prefix).build(&scanned)?;
    let snapshot = CacheSnapshot {
        scanned,
        fingerprint,
        map,
    };
    cache.store(&snapshot)?;

    tracing::info!(
        cache = ?cache.path(),
        plugins = snapshot.scanned.len(),
        events = snapshot.map.len(),
        "Event map rebuilt"
    );

    Ok((snapshot.map, MapSource::Rebuilt))
}
