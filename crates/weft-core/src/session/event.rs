//! Inbound real-time event shapes.
//!
//! The backend pushes conversation lifecycle events and streaming deltas.
//! Both unions carry an `Unknown` fallback arm so that forward-compatible
//! server payloads deserialize to a no-op instead of an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::{AgentMessage, ToolCall};

/// Full-or-partial conversation body carried by a created event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub messages: Vec<AgentMessage>,
    #[serde(default)]
    pub attached_agent_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Partial update carried by an updated event. Absent fields are left
/// untouched; `messages` is merged through the batch path, not replaced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationPatch {
    pub name: Option<String>,
    pub messages: Option<Vec<AgentMessage>>,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Conversation lifecycle events, scoped to a session by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ConversationEvent {
    ConversationCreated {
        conversation: ConversationPayload,
    },
    ConversationUpdated {
        conversation_id: String,
        #[serde(flatten)]
        patch: ConversationPatch,
    },
    ConversationDeleted {
        conversation_id: String,
    },
    ConversationAttached {
        conversation_id: String,
        agent_id: String,
    },
    ConversationDetached {
        conversation_id: String,
        agent_id: String,
    },
    /// Any event kind this client does not know yet. Applied as a no-op.
    #[serde(other)]
    Unknown,
}

/// Streaming token events from the response transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StreamEvent {
    StreamStarted {
        session_id: String,
        agent_id: String,
        message_id: String,
    },
    StreamToken {
        message_id: String,
        token: String,
    },
    StreamThinking {
        message_id: String,
        text: String,
    },
    /// Carries the authoritative final text, which may differ from the
    /// accumulated token buffer.
    StreamFinalized {
        message_id: String,
        full_content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_event_round_trip() {
        let raw = r#"{
            "type": "conversation_created",
            "conversation": {
                "id": "c1",
                "name": "triage",
                "attachedAgentIds": ["a1"]
            }
        }"#;
        let event: ConversationEvent = serde_json::from_str(raw).unwrap();
        match event {
            ConversationEvent::ConversationCreated { conversation } => {
                assert_eq!(conversation.id, "c1");
                assert_eq!(conversation.attached_agent_ids, vec!["a1"]);
                assert!(conversation.messages.is_empty());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_updated_event_carries_flat_patch() {
        let raw = r#"{
            "type": "conversation_updated",
            "conversationId": "c1",
            "name": "renamed"
        }"#;
        let event: ConversationEvent = serde_json::from_str(raw).unwrap();
        match event {
            ConversationEvent::ConversationUpdated { conversation_id, patch } => {
                assert_eq!(conversation_id, "c1");
                assert_eq!(patch.name.as_deref(), Some("renamed"));
                assert!(patch.messages.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_kind_is_tolerated() {
        let raw = r#"{"type": "conversation_archived"}"#;
        let event: ConversationEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event, ConversationEvent::Unknown);
    }

    #[test]
    fn test_stream_finalized_wire_names() {
        let raw = r#"{
            "type": "stream_finalized",
            "messageId": "m1",
            "fullContent": "Hi there"
        }"#;
        let event: StreamEvent = serde_json::from_str(raw).unwrap();
        match event {
            StreamEvent::StreamFinalized { message_id, full_content, tool_calls } => {
                assert_eq!(message_id, "m1");
                assert_eq!(full_content, "Hi there");
                assert!(tool_calls.is_empty());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_stream_event_is_tolerated() {
        let raw = r#"{"type": "stream_heartbeat", "messageId": "m1"}"#;
        let event: StreamEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event, StreamEvent::Unknown);
    }
}
