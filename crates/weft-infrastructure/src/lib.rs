//! Storage-facing side of the weft state layer.
//!
//! Everything here is best-effort by contract: the graph in `weft-core`
//! is the live truth, the backend is the durable truth, and this crate
//! maintains the local cache in between — debounced, quota-aware, and
//! never allowed to fail a store mutation.

pub mod debounce;
pub mod paths;
pub mod settings;
pub mod snapshot_store;

pub use debounce::DebouncedPersister;
pub use paths::WeftPaths;
pub use settings::{PersistSettings, SettingsRoot, load_settings};
pub use snapshot_store::{DirSnapshotStore, SnapshotRepository};
