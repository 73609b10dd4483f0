//! Agent participant model.

use serde::{Deserialize, Serialize};

/// Capability class an agent is provisioned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Coder,
    Reviewer,
    Planner,
    Researcher,
}

/// How much autonomy the agent has before asking the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionMode {
    /// Read-only planning; no mutations without explicit approval.
    Plan,
    /// Ask before every privileged action.
    Ask,
    /// Proceed on allowlisted actions, ask otherwise.
    #[default]
    Auto,
    /// Full autonomy.
    Sovereign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Active,
    Error,
}

/// A participant bound to one role and model.
///
/// `conversation_session_id`, when set, must reference a conversation that
/// lists this agent in its attachment set; the store's attach/detach and
/// cascade rules maintain that jointly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub role: AgentRole,
    /// Model identifier, as the backend names it.
    pub model: String,
    #[serde(default)]
    pub permission_mode: PermissionMode,
    /// Mode to restore on auto-revert (e.g. leaving plan mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_permission_mode: Option<PermissionMode>,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_session_id: Option<String>,
}

impl Agent {
    pub fn new(id: impl Into<String>, role: AgentRole, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            model: model.into(),
            permission_mode: PermissionMode::default(),
            previous_permission_mode: None,
            status: AgentStatus::default(),
            conversation_session_id: None,
        }
    }

    /// Switches permission mode, remembering the current one for revert.
    pub fn set_permission_mode(&mut self, mode: PermissionMode) {
        if self.permission_mode == mode {
            return;
        }
        self.previous_permission_mode = Some(self.permission_mode);
        self.permission_mode = mode;
    }

    /// Restores the previously active permission mode, if any.
    pub fn revert_permission_mode(&mut self) -> bool {
        match self.previous_permission_mode.take() {
            Some(previous) => {
                self.permission_mode = previous;
                true
            }
            None => false,
        }
    }
}
