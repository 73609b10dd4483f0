//! Conversation thread model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::AgentMessage;

/// Placeholder name for a conversation that has not produced a message yet.
pub const DEFAULT_CONVERSATION_NAME: &str = "New Conversation";

/// An ordered message thread, independent of any single agent.
///
/// Conversations attach to agents many-to-many; `attached_agent_ids` is the
/// authoritative side of that relation and each listed agent's
/// `conversation_session_id` must point back here. The message list is
/// bounded — see [`ConversationSession::normalize`].
///
/// Invariant: `message_count == messages.len()` after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSession {
    pub id: String,
    /// Derived display name; starts as [`DEFAULT_CONVERSATION_NAME`].
    pub name: String,
    #[serde(default)]
    pub messages: Vec<AgentMessage>,
    #[serde(default)]
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attached_agent_ids: Vec<String>,
}

impl ConversationSession {
    /// Creates an empty conversation with the given name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            messages: Vec::new(),
            message_count: 0,
            last_message_at: None,
            attached_agent_ids: Vec::new(),
        }
    }

    /// Creates an empty conversation with the placeholder name.
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self::new(id, DEFAULT_CONVERSATION_NAME)
    }

    /// Legacy single-agent view of the attachment set: its first element.
    ///
    /// Derived, never stored, so it cannot drift from `attached_agent_ids`.
    /// The persisted projection materializes it for older readers.
    pub fn attached_to_agent_id(&self) -> Option<&str> {
        self.attached_agent_ids.first().map(String::as_str)
    }

    /// Whether the name is still the placeholder (eligible for derivation
    /// from the first message).
    pub fn has_default_name(&self) -> bool {
        self.name == DEFAULT_CONVERSATION_NAME
    }

    /// Re-establishes the bounded-collection invariant: trims the list to
    /// `cap` keeping the most recent suffix, syncs `message_count`, and
    /// advances (never regresses) `last_message_at`.
    pub fn normalize(&mut self, cap: usize) {
        if self.messages.len() > cap {
            let overflow = self.messages.len() - cap;
            self.messages.drain(..overflow);
        }
        self.message_count = self.messages.len();
        if let Some(latest) = self.messages.iter().rev().find_map(|m| m.timestamp) {
            if self.last_message_at.is_none_or(|current| current < latest) {
                self.last_message_at = Some(latest);
            }
        }
    }
}

/// Derives a display name from message content: a character-budgeted prefix,
/// cut back to a word boundary when one lands past the midpoint.
pub fn derive_conversation_name(content: &str, max_chars: usize) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return DEFAULT_CONVERSATION_NAME.to_string();
    }
    let total = trimmed.chars().count();
    if total <= max_chars {
        return trimmed.to_string();
    }
    let mut name: String = trimmed.chars().take(max_chars).collect();
    if let Some(cut) = name.rfind(' ') {
        if cut > max_chars / 2 {
            name.truncate(cut);
        }
    }
    name.push('…');
    name
}
