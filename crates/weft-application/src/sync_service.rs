//! Session sync service.
//!
//! Wires the session graph store to the debounced persister: every
//! mutation that actually changed the graph projects a snapshot and hands
//! it off for best-effort persistence. Mutations run synchronously under
//! the write guard — no await inside a mutation — so the merge rules stay
//! the only arbiter of concurrent arrivals.

use std::collections::HashSet;

use tokio::sync::RwLock;
use weft_core::config::SyncConfig;
use weft_core::error::Result;
use weft_core::projection::project;
use weft_core::session::{
    Agent, AgentMessage, ConversationEvent, FilePreview, InsertOutcome, Session,
    SessionGraphStore, StreamEvent, ViewMode,
};
use weft_infrastructure::debounce::DebouncedPersister;
use weft_infrastructure::snapshot_store::SnapshotRepository;

/// Application-facing facade over the store and its persistence.
///
/// Constructed once at startup and injected wherever state access is
/// needed; there is deliberately no global instance.
pub struct SessionSyncService {
    store: RwLock<SessionGraphStore>,
    persister: DebouncedPersister,
}

impl SessionSyncService {
    pub fn new(store: SessionGraphStore, persister: DebouncedPersister) -> Self {
        Self {
            store: RwLock::new(store),
            persister,
        }
    }

    /// Rebuilds a store from the last persisted snapshot, or starts fresh
    /// when none exists.
    pub async fn load_store(
        repository: &dyn SnapshotRepository,
        key: &str,
        config: SyncConfig,
    ) -> Result<SessionGraphStore> {
        match repository.load(key).await? {
            Some(snapshot) => {
                tracing::debug!(key, "restoring session graph from snapshot");
                Ok(SessionGraphStore::hydrate(snapshot, config))
            }
            None => Ok(SessionGraphStore::new(config)),
        }
    }

    /// Runs a read-only closure against the store.
    pub async fn read<R>(&self, read: impl FnOnce(&SessionGraphStore) -> R) -> R {
        let store = self.store.read().await;
        read(&store)
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    pub async fn create_session(&self, session: Session) {
        {
            let mut store = self.store.write().await;
            store.create_session(session);
        }
        self.schedule_snapshot().await;
    }

    pub async fn delete_session(&self, session_id: &str) -> bool {
        let changed = self.store.write().await.delete_session(session_id);
        if changed {
            self.schedule_snapshot().await;
        }
        changed
    }

    pub async fn set_current_session(&self, session_id: &str) -> bool {
        let changed = self.store.write().await.set_current_session(session_id);
        if changed {
            self.schedule_snapshot().await;
        }
        changed
    }

    pub async fn set_view_mode(&self, session_id: &str, view_mode: ViewMode) -> bool {
        let changed = self.store.write().await.set_view_mode(session_id, view_mode);
        if changed {
            self.schedule_snapshot().await;
        }
        changed
    }

    /// Reconciles the local cache against the backend's authoritative set
    /// of session ids, dropping sessions deleted elsewhere.
    pub async fn sync_with_backend(&self, valid_ids: &HashSet<String>) -> bool {
        let changed = self.store.write().await.sync_with_backend(valid_ids);
        if changed {
            tracing::debug!("backend sync removed locally cached sessions");
            self.schedule_snapshot().await;
        }
        changed
    }

    // ------------------------------------------------------------------
    // Agents and conversations
    // ------------------------------------------------------------------

    pub async fn add_agent(&self, session_id: &str, agent: Agent) -> bool {
        let changed = self.store.write().await.add_agent(session_id, agent);
        if changed {
            self.schedule_snapshot().await;
        }
        changed
    }

    pub async fn remove_agent(&self, session_id: &str, agent_id: &str) -> bool {
        let changed = self.store.write().await.remove_agent(session_id, agent_id);
        if changed {
            self.schedule_snapshot().await;
        }
        changed
    }

    pub async fn update_agent(
        &self,
        session_id: &str,
        agent_id: &str,
        update: impl FnOnce(&mut Agent),
    ) -> bool {
        let changed = self
            .store
            .write()
            .await
            .update_agent(session_id, agent_id, update);
        if changed {
            self.schedule_snapshot().await;
        }
        changed
    }

    pub async fn create_conversation(
        &self,
        session_id: &str,
        conversation_id: &str,
        name: Option<&str>,
        first_message: Option<&str>,
    ) -> bool {
        let changed = self.store.write().await.create_conversation(
            session_id,
            conversation_id,
            name,
            first_message,
        );
        if changed {
            self.schedule_snapshot().await;
        }
        changed
    }

    pub async fn delete_conversation(&self, session_id: &str, conversation_id: &str) -> bool {
        let changed = self
            .store
            .write()
            .await
            .delete_conversation(session_id, conversation_id);
        if changed {
            self.schedule_snapshot().await;
        }
        changed
    }

    pub async fn attach_conversation(
        &self,
        session_id: &str,
        conversation_id: &str,
        agent_id: &str,
    ) -> bool {
        let changed = self
            .store
            .write()
            .await
            .attach_conversation(session_id, conversation_id, agent_id);
        if changed {
            self.schedule_snapshot().await;
        }
        changed
    }

    pub async fn detach_conversation(
        &self,
        session_id: &str,
        conversation_id: &str,
        agent_id: &str,
    ) -> bool {
        let changed = self
            .store
            .write()
            .await
            .detach_conversation(session_id, conversation_id, agent_id);
        if changed {
            self.schedule_snapshot().await;
        }
        changed
    }

    // ------------------------------------------------------------------
    // Messages and events
    // ------------------------------------------------------------------

    pub async fn insert_message(
        &self,
        session_id: &str,
        conversation_id: &str,
        message: AgentMessage,
    ) -> InsertOutcome {
        let outcome = self
            .store
            .write()
            .await
            .insert_message(session_id, conversation_id, message);
        if outcome.changed() {
            self.schedule_snapshot().await;
        }
        outcome
    }

    pub async fn merge_conversation_history(
        &self,
        session_id: &str,
        conversation_id: &str,
        batch: Vec<AgentMessage>,
    ) -> usize {
        let added = self.store.write().await.merge_conversation_history(
            session_id,
            conversation_id,
            batch,
        );
        if added > 0 {
            self.schedule_snapshot().await;
        }
        added
    }

    /// Applies a conversation lifecycle event pushed by the backend.
    pub async fn apply_remote_event(&self, session_id: &str, event: ConversationEvent) -> bool {
        let changed = self
            .store
            .write()
            .await
            .apply_conversation_event(session_id, event);
        if changed {
            self.schedule_snapshot().await;
        }
        changed
    }

    /// Applies a streaming event. Token deltas only touch the ephemeral
    /// buffer and schedule nothing; a finalize that commits a message
    /// persists like any other mutation.
    pub async fn apply_stream_event(&self, event: StreamEvent) -> bool {
        let committed = self.store.write().await.apply_stream_event(event);
        if committed {
            self.schedule_snapshot().await;
        }
        committed
    }

    pub async fn open_file_preview(&self, session_id: &str, preview: FilePreview) -> bool {
        let changed = self.store.write().await.open_file_preview(session_id, preview);
        if changed {
            self.schedule_snapshot().await;
        }
        changed
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Persists the current graph immediately, bypassing the debounce.
    /// Call on shutdown.
    pub async fn flush(&self) {
        let snapshot = {
            let store = self.store.read().await;
            project(&store)
        };
        self.persister.write_now(snapshot).await;
    }

    async fn schedule_snapshot(&self) {
        let snapshot = {
            let store = self.store.read().await;
            project(&store)
        };
        self.persister.write(snapshot).await;
    }
}
