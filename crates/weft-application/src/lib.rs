//! Application wiring for the weft state layer.
//!
//! Hosts construct a [`SessionSyncService`] at startup — restoring the
//! graph from the last snapshot via [`SessionSyncService::load_store`] —
//! and feed it UI actions and inbound backend events. The service keeps
//! the persisted snapshot trailing the graph without ever blocking a
//! mutation on storage.

pub mod sync_service;
pub mod telemetry;

pub use sync_service::SessionSyncService;
