//! Conversation message types.
//!
//! A message id is either a client-generated temporary id (prefixed with
//! [`TEMP_ID_PREFIX`], used for optimistic inserts before the backend has
//! assigned one) or a backend-assigned permanent id. The merge engine
//! rewrites temporary ids in place once the permanent counterpart is known.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix marking a client-generated provisional message id.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Represents the role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the user.
    User,
    /// Message from the AI assistant.
    Assistant,
}

/// A tool invocation recorded on an assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
}

/// A single turn in a conversation.
///
/// `timestamp` is optional on the wire; the merge engine tolerates its
/// absence (undated entries sort last and are window-compared as "now").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    /// Reasoning trace, when the backend surfaced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl AgentMessage {
    /// Creates a user message stamped with the current time.
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: MessageRole::User,
            content: content.into(),
            thinking: None,
            timestamp: Some(Utc::now()),
            tool_calls: Vec::new(),
        }
    }

    /// Creates an assistant message stamped with the current time.
    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            ..Self::user(id, content)
        }
    }

    /// Creates an optimistic user message with a fresh temporary id.
    pub fn optimistic_user(content: impl Into<String>) -> Self {
        Self::user(temp_message_id(), content)
    }

    /// Overrides the timestamp (useful for replayed history).
    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Whether this message still carries a provisional id.
    pub fn has_temp_id(&self) -> bool {
        is_temp_id(&self.id)
    }

    /// Timestamp used for ordering/window comparisons; missing stamps are
    /// treated as `now`.
    pub fn effective_timestamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.timestamp.unwrap_or(now)
    }
}

/// Generates a fresh provisional message id.
pub fn temp_message_id() -> String {
    format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4())
}

/// Whether `id` has the provisional-id shape. This is a prefix convention,
/// not a UUID-version check.
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_id_shape() {
        let id = temp_message_id();
        assert!(is_temp_id(&id));
        assert!(!is_temp_id("msg-42"));
    }

    #[test]
    fn test_optimistic_user_is_provisional() {
        let message = AgentMessage::optimistic_user("hello");
        assert!(message.has_temp_id());
        assert_eq!(message.role, MessageRole::User);
        assert!(message.timestamp.is_some());
    }

    #[test]
    fn test_effective_timestamp_falls_back_to_now() {
        let now = Utc::now();
        let message = AgentMessage::user("m1", "hi").with_timestamp(None);
        assert_eq!(message.effective_timestamp(now), now);
    }

    #[test]
    fn test_wire_shape_tolerates_missing_fields() {
        let message: AgentMessage =
            serde_json::from_str(r#"{"id":"m1","role":"assistant","content":"ok"}"#).unwrap();
        assert_eq!(message.role, MessageRole::Assistant);
        assert!(message.timestamp.is_none());
        assert!(message.tool_calls.is_empty());
    }
}
