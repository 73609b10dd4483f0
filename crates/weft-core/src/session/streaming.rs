//! In-flight response accumulation.
//!
//! Streaming state lives in a side table keyed by message id, outside the
//! persisted graph: appending a token must not re-persist or re-render the
//! conversation, and the message list never has to special-case a mutable
//! in-place entry. On finalize the accumulated data is copied into a real
//! [`AgentMessage`](super::message::AgentMessage) and the entry is dropped.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Ephemeral accumulator for one in-flight agent response.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingMessage {
    pub message_id: String,
    pub session_id: String,
    pub agent_id: String,
    /// Token accumulator. The finalize call may carry an authoritative
    /// full-content override; this buffer is the live preview.
    pub content: String,
    /// Reasoning-trace accumulator.
    pub thinking: String,
    pub is_streaming: bool,
    pub started_at: DateTime<Utc>,
}

/// Side table of in-flight responses.
#[derive(Debug, Default)]
pub struct StreamingBuffer {
    entries: HashMap<String, StreamingMessage>,
}

impl StreamingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an entry with empty buffers. Silently refuses when the id is
    /// already live — callers must finalize or abandon first.
    pub fn start(&mut self, session_id: &str, agent_id: &str, message_id: &str) -> bool {
        if self.entries.contains_key(message_id) {
            return false;
        }
        self.entries.insert(
            message_id.to_string(),
            StreamingMessage {
                message_id: message_id.to_string(),
                session_id: session_id.to_string(),
                agent_id: agent_id.to_string(),
                content: String::new(),
                thinking: String::new(),
                is_streaming: true,
                started_at: Utc::now(),
            },
        );
        true
    }

    /// Appends to the content buffer. No-op when the entry is gone (late
    /// tokens after cancellation or finalize).
    pub fn append_token(&mut self, message_id: &str, token: &str) -> bool {
        match self.entries.get_mut(message_id) {
            Some(entry) => {
                entry.content.push_str(token);
                true
            }
            None => false,
        }
    }

    /// Appends to the reasoning buffer, same late-arrival guard.
    pub fn append_thinking(&mut self, message_id: &str, text: &str) -> bool {
        match self.entries.get_mut(message_id) {
            Some(entry) => {
                entry.thinking.push_str(text);
                true
            }
            None => false,
        }
    }

    /// Removes and returns the entry. Idempotent: a second finalize for the
    /// same id returns `None`, which callers treat as "nothing to finalize".
    pub fn finalize(&mut self, message_id: &str) -> Option<StreamingMessage> {
        self.entries.remove(message_id)
    }

    /// Read-only snapshot of an in-flight entry.
    pub fn get(&self, message_id: &str) -> Option<&StreamingMessage> {
        self.entries.get(message_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry belonging to a session. Keeps the side table from
    /// outliving deleted graph nodes.
    pub fn clear_session(&mut self, session_id: &str) {
        self.entries.retain(|_, entry| entry.session_id != session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_is_first_writer_wins() {
        let mut buffer = StreamingBuffer::new();
        assert!(buffer.start("s1", "a1", "m1"));
        buffer.append_token("m1", "Hi");
        assert!(!buffer.start("s1", "a1", "m1"));
        assert_eq!(buffer.get("m1").unwrap().content, "Hi");
    }

    #[test]
    fn test_late_tokens_are_dropped() {
        let mut buffer = StreamingBuffer::new();
        assert!(!buffer.append_token("m1", "late"));
        assert!(!buffer.append_thinking("m1", "late"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_accumulates_content_and_thinking_separately() {
        let mut buffer = StreamingBuffer::new();
        buffer.start("s1", "a1", "m1");
        buffer.append_token("m1", "Hi");
        buffer.append_token("m1", " there");
        buffer.append_thinking("m1", "user greeted");

        let entry = buffer.get("m1").unwrap();
        assert_eq!(entry.content, "Hi there");
        assert_eq!(entry.thinking, "user greeted");
        assert!(entry.is_streaming);
    }

    #[test]
    fn test_finalize_removes_exactly_once() {
        let mut buffer = StreamingBuffer::new();
        buffer.start("s1", "a1", "m1");
        buffer.append_token("m1", "Hi");

        let finalized = buffer.finalize("m1").unwrap();
        assert_eq!(finalized.agent_id, "a1");
        assert_eq!(finalized.session_id, "s1");
        assert_eq!(finalized.content, "Hi");

        assert!(buffer.finalize("m1").is_none());
    }

    #[test]
    fn test_clear_session_scopes_by_owner() {
        let mut buffer = StreamingBuffer::new();
        buffer.start("s1", "a1", "m1");
        buffer.start("s2", "a2", "m2");
        buffer.clear_session("s1");

        assert!(buffer.get("m1").is_none());
        assert!(buffer.get("m2").is_some());
    }
}
