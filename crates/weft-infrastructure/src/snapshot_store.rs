//! Snapshot persistence.
//!
//! One JSON file per key under the snapshots directory. Writes are
//! best-effort and quota-aware: available space is probed before every
//! physical write, and under pressure the oldest entries in the namespace
//! are evicted first — a user losing stale local cache beats a user losing
//! the write entirely. The backend remains the source of truth either way.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use weft_core::projection::StateSnapshot;

use crate::settings::PersistSettings;

/// An abstract repository for persisted state snapshots.
///
/// Decouples the sync layers from the storage mechanism (directory of JSON
/// files, browser storage bridge, test double).
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Persists a snapshot under `key`. Quota conditions are handled
    /// internally (evict + retry once, then give up with a log line);
    /// other storage failures are returned.
    async fn save(&self, key: &str, snapshot: &StateSnapshot) -> Result<()>;

    /// Loads the snapshot stored under `key`, or `None` if absent.
    async fn load(&self, key: &str) -> Result<Option<StateSnapshot>>;

    /// Removes the snapshot stored under `key` (no-op if absent).
    async fn delete(&self, key: &str) -> Result<()>;

    /// Lists all stored keys.
    async fn list_keys(&self) -> Result<Vec<String>>;
}

/// Directory-backed [`SnapshotRepository`].
pub struct DirSnapshotStore {
    snapshots_dir: PathBuf,
    min_available_bytes: u64,
    evict_batch: usize,
}

impl DirSnapshotStore {
    /// Creates a store rooted at `snapshots_dir`, creating the directory
    /// if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(snapshots_dir: impl AsRef<Path>) -> Result<Self> {
        let snapshots_dir = snapshots_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&snapshots_dir)
            .context("Failed to create snapshots directory")?;
        let defaults = PersistSettings::default();
        Ok(Self {
            snapshots_dir,
            min_available_bytes: defaults.min_available_bytes,
            evict_batch: defaults.evict_batch,
        })
    }

    /// Applies the eviction-related settings.
    pub fn with_settings(mut self, settings: &PersistSettings) -> Self {
        self.min_available_bytes = settings.min_available_bytes;
        self.evict_batch = settings.evict_batch;
        self
    }

    fn snapshot_path(&self, key: &str) -> PathBuf {
        self.snapshots_dir.join(format!("{key}.json"))
    }

    /// Best-effort free-space probe. `None` disables the pressure check
    /// rather than blocking writes on an unprobeable filesystem.
    fn available_space(&self) -> Option<u64> {
        fs2::available_space(&self.snapshots_dir).ok()
    }

    /// Removes up to `count` oldest-modified snapshots, never the one
    /// being written. Returns how many were removed.
    async fn evict_oldest(&self, count: usize, exclude_key: &str) -> Result<usize> {
        let mut candidates: Vec<(SystemTime, PathBuf)> = Vec::new();
        let mut dir = fs::read_dir(&self.snapshots_dir)
            .await
            .context("Failed to read snapshots directory")?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if path.file_stem().and_then(|s| s.to_str()) == Some(exclude_key) {
                continue;
            }
            let modified = entry
                .metadata()
                .await?
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH);
            candidates.push((modified, path));
        }
        candidates.sort_by_key(|(modified, _)| *modified);

        let mut evicted = 0;
        for (_, path) in candidates.into_iter().take(count) {
            if fs::remove_file(&path).await.is_ok() {
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    /// Temp-file + rename so readers never observe a torn snapshot.
    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn is_quota_error(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::StorageFull || err.raw_os_error() == Some(28)
}

#[async_trait]
impl SnapshotRepository for DirSnapshotStore {
    async fn save(&self, key: &str, snapshot: &StateSnapshot) -> Result<()> {
        let bytes = serde_json::to_vec(snapshot).context("Failed to serialize snapshot")?;
        let path = self.snapshot_path(key);

        if let Some(available) = self.available_space() {
            if available < self.min_available_bytes {
                let evicted = self.evict_oldest(self.evict_batch, key).await?;
                tracing::warn!(
                    available,
                    evicted,
                    "storage pressure: evicted oldest snapshots before write"
                );
            }
        }

        match self.write_atomic(&path, &bytes).await {
            Ok(()) => Ok(()),
            Err(err) if is_quota_error(&err) => {
                // One aggressive eviction pass, one retry, then give up:
                // persistence is best-effort.
                let evicted = self
                    .evict_oldest(self.evict_batch.saturating_mul(4), key)
                    .await
                    .unwrap_or(0);
                match self.write_atomic(&path, &bytes).await {
                    Ok(()) => {
                        tracing::warn!(key, evicted, "snapshot written after quota eviction");
                        Ok(())
                    }
                    Err(err) => {
                        tracing::warn!(key, error = %err, "snapshot write failed after eviction; giving up");
                        Ok(())
                    }
                }
            }
            Err(err) => Err(err).context(format!("Failed to write snapshot file: {path:?}")),
        }
    }

    async fn load(&self, key: &str) -> Result<Option<StateSnapshot>> {
        let path = self.snapshot_path(key);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).context(format!("Failed to read snapshot file: {path:?}"));
            }
        };
        let snapshot = serde_json::from_str(&raw)
            .context(format!("Failed to deserialize snapshot: {path:?}"))?;
        Ok(Some(snapshot))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.snapshot_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).context(format!("Failed to delete snapshot file: {path:?}")),
        }
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut dir = fs::read_dir(&self.snapshots_dir)
            .await
            .context("Failed to read snapshots directory")?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot(marker: &str) -> StateSnapshot {
        StateSnapshot {
            current_session_id: Some(marker.to_string()),
            ..StateSnapshot::default()
        }
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = DirSnapshotStore::new(dir.path()).unwrap();

        store.save("workspace", &snapshot("s1")).await.unwrap();
        let loaded = store.load("workspace").await.unwrap().unwrap();
        assert_eq!(loaded.current_session_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn test_load_missing_key_is_none() {
        let dir = TempDir::new().unwrap();
        let store = DirSnapshotStore::new(dir.path()).unwrap();
        assert!(store.load("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_value() {
        let dir = TempDir::new().unwrap();
        let store = DirSnapshotStore::new(dir.path()).unwrap();

        store.save("workspace", &snapshot("old")).await.unwrap();
        store.save("workspace", &snapshot("new")).await.unwrap();

        let loaded = store.load("workspace").await.unwrap().unwrap();
        assert_eq!(loaded.current_session_id.as_deref(), Some("new"));
        assert_eq!(store.list_keys().await.unwrap(), vec!["workspace"]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = DirSnapshotStore::new(dir.path()).unwrap();
        store.save("workspace", &snapshot("s1")).await.unwrap();

        store.delete("workspace").await.unwrap();
        store.delete("workspace").await.unwrap();
        assert!(store.load("workspace").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pressure_evicts_oldest_but_never_current_key() {
        let dir = TempDir::new().unwrap();
        let filler = DirSnapshotStore::new(dir.path()).unwrap();
        filler.save("a", &snapshot("a")).await.unwrap();
        filler.save("b", &snapshot("b")).await.unwrap();
        filler.save("c", &snapshot("c")).await.unwrap();

        // A low-water mark no disk can satisfy forces the eviction path.
        let settings = PersistSettings {
            min_available_bytes: u64::MAX,
            evict_batch: 2,
            ..PersistSettings::default()
        };
        let store = DirSnapshotStore::new(dir.path())
            .unwrap()
            .with_settings(&settings);
        store.save("d", &snapshot("d")).await.unwrap();

        let keys = store.list_keys().await.unwrap();
        assert_eq!(keys.len(), 2, "two of three old snapshots evicted: {keys:?}");
        assert!(keys.contains(&"d".to_string()));
    }

    #[tokio::test]
    async fn test_eviction_spares_the_key_being_written() {
        let dir = TempDir::new().unwrap();
        let filler = DirSnapshotStore::new(dir.path()).unwrap();
        filler.save("workspace", &snapshot("old")).await.unwrap();

        let settings = PersistSettings {
            min_available_bytes: u64::MAX,
            evict_batch: 8,
            ..PersistSettings::default()
        };
        let store = DirSnapshotStore::new(dir.path())
            .unwrap()
            .with_settings(&settings);
        store.save("workspace", &snapshot("new")).await.unwrap();

        let loaded = store.load("workspace").await.unwrap().unwrap();
        assert_eq!(loaded.current_session_id.as_deref(), Some("new"));
    }
}
