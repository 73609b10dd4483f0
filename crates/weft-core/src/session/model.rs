//! Session domain model.
//!
//! A session is a workspace-bound container for agents and conversations,
//! plus the UI-affinity state (layout, file previews) that follows it
//! across devices.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent::Agent;
use super::conversation::ConversationSession;

/// How the session's panels are arranged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Grid,
    Focus,
    Freeform,
}

/// Lifecycle state of the workspace server backing a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceStatus {
    Provisioning,
    #[default]
    Running,
    Stopped,
    Error,
}

/// Grid cell footprint of an agent panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSpan {
    pub cols: u8,
    pub rows: u8,
}

impl Default for GridSpan {
    fn default() -> Self {
        Self { cols: 1, rows: 1 }
    }
}

/// Free placement of an agent panel in freeform view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeformPosition {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub z_index: u32,
}

/// A recently previewed file. `content` is an in-memory convenience only;
/// the persisted projection strips it (the backend re-serves bodies).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePreview {
    pub path: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    pub opened_at: DateTime<Utc>,
}

/// A workspace-bound conversational container.
///
/// Owns its agents and conversations exclusively; deleting a session drops
/// everything nested in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
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
    pub agents: HashMap<String, Agent>,
    #[serde(default)]
    pub conversations: HashMap<String, ConversationSession>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_agent_id: Option<String>,
    /// Grid spans keyed by agent id.
    #[serde(default)]
    pub grid_layout: HashMap<String, GridSpan>,
    /// Freeform placements keyed by agent id.
    #[serde(default)]
    pub freeform_layout: HashMap<String, FreeformPosition>,
    /// Most recent first, bounded by the configured cap.
    #[serde(default)]
    pub recent_files: Vec<FilePreview>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        workspace_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            workspace_id: workspace_id.into(),
            branch: None,
            view_mode: ViewMode::default(),
            workspace_status: WorkspaceStatus::default(),
            agents: HashMap::new(),
            conversations: HashMap::new(),
            active_agent_id: None,
            grid_layout: HashMap::new(),
            freeform_layout: HashMap::new(),
            recent_files: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}
