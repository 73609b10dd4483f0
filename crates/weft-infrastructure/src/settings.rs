//! Persistence settings and config-file loading.

use std::path::Path;

use serde::{Deserialize, Serialize};
use weft_core::config::SyncConfig;
use weft_core::error::Result;

/// Tuning knobs for the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistSettings {
    /// Minimum spacing between physical snapshot writes.
    pub debounce_ms: u64,
    /// Low-water mark for available disk space; below this, oldest
    /// snapshots are evicted before writing.
    pub min_available_bytes: u64,
    /// How many entries one eviction pass removes.
    pub evict_batch: usize,
}

impl Default for PersistSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            min_available_bytes: 5 * 1024 * 1024,
            evict_batch: 4,
        }
    }
}

/// Root of `config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsRoot {
    pub sync: SyncConfig,
    pub persist: PersistSettings,
}

/// Loads settings from a TOML file. A missing file yields the defaults;
/// a malformed one is an error (silently reverting a user's explicit
/// configuration would be worse than failing loudly at startup).
pub fn load_settings(path: &Path) -> Result<SettingsRoot> {
    if !path.exists() {
        return Ok(SettingsRoot::default());
    }
    let raw = std::fs::read_to_string(path)?;
    let settings = toml::from_str(&raw)?;
    Ok(settings)
}
