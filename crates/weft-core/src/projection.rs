//! Persisted snapshot projection.
//!
//! What goes to durable storage is a projection of the graph, not the graph
//! itself: UI-affinity state in full, message lists truncated to the cap at
//! serialization time (independent of the in-memory cap), and file-preview
//! bodies stripped — the backend re-serves content on reload. The root
//! object is versioned defensively; readers ignore unknown fields, so no
//! strict schema gate is needed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::SyncConfig;
use crate::session::{
    Agent, ConversationSession, FilePreview, FreeformPosition, GridSpan, Session,
    SessionGraphStore, ViewMode, WorkspaceStatus,
};

pub const SNAPSHOT_VERSION: u32 = 1;

fn snapshot_version() -> u32 {
    SNAPSHOT_VERSION
}

/// Root of the persisted projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    #[serde(default = "snapshot_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_session_id: Option<String>,
    #[serde(default)]
    pub sessions: Vec<SessionSnapshot>,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            current_session_id: None,
            sessions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: String,
    pub name: String,
    pub workspace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default)]
    pub view_mode: ViewMode,
    #[serde(default)]
    pub workspace_status: WorkspaceStatus,
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub conversations: Vec<ConversationSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_agent_id: Option<String>,
    #[serde(default)]
    pub grid_layout: HashMap<String, GridSpan>,
    #[serde(default)]
    pub freeform_layout: HashMap<String, FreeformPosition>,
    #[serde(default)]
    pub recent_files: Vec<FilePreviewSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSnapshot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub messages: Vec<crate::session::AgentMessage>,
    #[serde(default)]
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attached_agent_ids: Vec<String>,
    /// Legacy single-agent mirror, kept on the wire for older readers.
    /// Always the first element of `attached_agent_ids`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_to_agent_id: Option<String>,
}

/// File preview with the body stripped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePreviewSnapshot {
    pub path: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    pub opened_at: DateTime<Utc>,
}

/// Projects the store into its persisted form. Sessions are emitted in
/// creation order so the output is deterministic.
pub fn project(store: &SessionGraphStore) -> StateSnapshot {
    let mut sessions: Vec<&Session> = store.sessions().collect();
    sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    StateSnapshot {
        version: SNAPSHOT_VERSION,
        current_session_id: store.current_session_id().map(str::to_string),
        sessions: sessions
            .into_iter()
            .map(|session| project_session(session, store.config()))
            .collect(),
    }
}

fn project_session(session: &Session, config: &SyncConfig) -> SessionSnapshot {
    let mut agents: Vec<Agent> = session.agents.values().cloned().collect();
    agents.sort_by(|a, b| a.id.cmp(&b.id));

    let mut conversations: Vec<ConversationSnapshot> = session
        .conversations
        .values()
        .map(|conversation| project_conversation(conversation, config.message_cap))
        .collect();
    conversations.sort_by(|a, b| a.id.cmp(&b.id));

    SessionSnapshot {
        id: session.id.clone(),
        name: session.name.clone(),
        workspace_id: session.workspace_id.clone(),
        branch: session.branch.clone(),
        view_mode: session.view_mode,
        workspace_status: session.workspace_status,
        agents,
        conversations,
        active_agent_id: session.active_agent_id.clone(),
        grid_layout: session.grid_layout.clone(),
        freeform_layout: session.freeform_layout.clone(),
        recent_files: session.recent_files.iter().map(strip_preview).collect(),
        created_at: session.created_at,
        updated_at: session.updated_at,
    }
}

fn project_conversation(conversation: &ConversationSession, cap: usize) -> ConversationSnapshot {
    let skip = conversation.messages.len().saturating_sub(cap);
    let messages: Vec<_> = conversation.messages.iter().skip(skip).cloned().collect();
    ConversationSnapshot {
        id: conversation.id.clone(),
        name: conversation.name.clone(),
        message_count: messages.len(),
        messages,
        last_message_at: conversation.last_message_at,
        attached_agent_ids: conversation.attached_agent_ids.clone(),
        attached_to_agent_id: conversation.attached_to_agent_id().map(str::to_string),
    }
}

fn strip_preview(preview: &FilePreview) -> FilePreviewSnapshot {
    FilePreviewSnapshot {
        path: preview.path.clone(),
        name: preview.name.clone(),
        size_bytes: preview.size_bytes,
        modified_at: preview.modified_at,
        opened_at: preview.opened_at,
    }
}

impl From<ConversationSnapshot> for ConversationSession {
    fn from(snapshot: ConversationSnapshot) -> Self {
        let ConversationSnapshot {
            id,
            name,
            messages,
            message_count: _,
            last_message_at,
            mut attached_agent_ids,
            attached_to_agent_id,
        } = snapshot;
        // Snapshots written before the many-to-many attach carry only the
        // singular field; fold it into the set.
        if attached_agent_ids.is_empty() {
            attached_agent_ids.extend(attached_to_agent_id);
        }
        let message_count = messages.len();
        Self {
            id,
            name,
            messages,
            message_count,
            last_message_at,
            attached_agent_ids,
        }
    }
}

impl From<FilePreviewSnapshot> for FilePreview {
    fn from(snapshot: FilePreviewSnapshot) -> Self {
        Self {
            path: snapshot.path,
            name: snapshot.name,
            content: None,
            size_bytes: snapshot.size_bytes,
            modified_at: snapshot.modified_at,
            opened_at: snapshot.opened_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Agent, AgentMessage, AgentRole};

    fn populated_store() -> SessionGraphStore {
        let mut store = SessionGraphStore::new(SyncConfig::default());
        store.create_session(Session::new("s1", "demo", "ws-1"));
        store.add_agent("s1", Agent::new("a1", AgentRole::Coder, "opus"));
        store.create_conversation("s1", "c1", Some("triage"), None);
        store.attach_conversation("s1", "c1", "a1");
        store.insert_message("s1", "c1", AgentMessage::user("m1", "hello"));
        store.open_file_preview(
            "s1",
            FilePreview {
                path: "src/lib.rs".to_string(),
                name: "lib.rs".to_string(),
                content: Some("pub mod session;".to_string()),
                size_bytes: Some(17),
                modified_at: None,
                opened_at: Utc::now(),
            },
        );
        store
    }

    #[test]
    fn test_project_strips_preview_bodies() {
        let snapshot = project(&populated_store());
        let session = &snapshot.sessions[0];
        assert_eq!(session.recent_files.len(), 1);
        assert_eq!(session.recent_files[0].path, "src/lib.rs");
        // Snapshot type has no content field at all; serialize to be sure.
        let raw = serde_json::to_string(&snapshot).unwrap();
        assert!(!raw.contains("pub mod session;"));
    }

    #[test]
    fn test_project_materializes_legacy_mirror() {
        let snapshot = project(&populated_store());
        let conversation = &snapshot.sessions[0].conversations[0];
        assert_eq!(conversation.attached_to_agent_id.as_deref(), Some("a1"));
        assert_eq!(conversation.attached_agent_ids, vec!["a1"]);
    }

    #[test]
    fn test_projected_conversation_stays_within_cap() {
        let mut store = populated_store();
        // A closure-based update may grow the list arbitrarily; the bound
        // must hold again by the time a snapshot is cut.
        store.update_conversation("s1", "c1", |conversation| {
            for i in 0..250 {
                conversation
                    .messages
                    .push(AgentMessage::user(format!("x{i}"), "filler"));
            }
        });
        let snapshot = project(&store);
        let conversation = &snapshot.sessions[0].conversations[0];
        assert_eq!(conversation.messages.len(), 100);
        assert_eq!(conversation.message_count, 100);
    }

    #[test]
    fn test_snapshot_reader_ignores_unknown_fields() {
        let raw = r#"{
            "version": 3,
            "currentSessionId": "s1",
            "sessions": [],
            "futureField": {"nested": true}
        }"#;
        let snapshot: StateSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snapshot.version, 3);
        assert_eq!(snapshot.current_session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_hydrate_round_trip() {
        let store = populated_store();
        let snapshot = project(&store);
        let restored = SessionGraphStore::hydrate(snapshot.clone(), SyncConfig::default());

        assert_eq!(restored.current_session_id(), Some("s1"));
        assert_eq!(restored.session_count(), 1);
        let conversation = restored.conversation("s1", "c1").unwrap();
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(
            restored.agent("s1", "a1").unwrap().conversation_session_id.as_deref(),
            Some("c1")
        );
        assert_eq!(project(&restored), snapshot);
    }

    #[test]
    fn test_hydrate_drops_dangling_current_pointer() {
        let snapshot = StateSnapshot {
            version: SNAPSHOT_VERSION,
            current_session_id: Some("gone".to_string()),
            sessions: Vec::new(),
        };
        let restored = SessionGraphStore::hydrate(snapshot, SyncConfig::default());
        assert_eq!(restored.current_session_id(), None);
    }
}
