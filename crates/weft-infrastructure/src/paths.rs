//! Filesystem locations for weft data.
//!
//! Layout:
//! ```text
//! ~/.weft/
//! ├── config.toml       # Sync + persistence settings
//! └── snapshots/
//!     └── <key>.json    # Persisted state projections
//! ```

use anyhow::{Context, Result};
use std::path::PathBuf;

pub struct WeftPaths;

impl WeftPaths {
    /// Returns the weft data directory (`~/.weft`).
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home_dir.join(".weft"))
    }

    /// Returns the directory that holds persisted snapshots.
    pub fn snapshots_dir() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("snapshots"))
    }

    /// Returns the path to the settings file.
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("config.toml"))
    }
}
