//! Conversation merge engine.
//!
//! The same logical message can reach a conversation over three channels
//! with no ordering guarantee: the optimistic local insert, the real-time
//! push echo, and the stream finalization. Id equality alone cannot
//! deduplicate them — the optimistic copy and the authoritative copy carry
//! different ids by construction — so the engine falls back to
//! content+role matching (time-windowed for assistant turns, where a user
//! retry could coincidentally repeat content).
//!
//! Every entry point is deterministic given an explicit `now` instant and
//! leaves the conversation untouched when it reports no change.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::config::SyncConfig;
use super::conversation::{ConversationSession, derive_conversation_name};
use super::message::{AgentMessage, MessageRole, is_temp_id};

/// What a single-message insert did to the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Duplicate delivery; the list is exactly as it was.
    Unchanged,
    /// An existing entry was recognized as the same logical turn and had
    /// its id rewritten in place.
    Reconciled { id: String },
    /// The message was appended.
    Appended,
}

impl InsertOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, InsertOutcome::Unchanged)
    }
}

/// Inserts one incoming message, deduplicating against every channel it
/// could already have arrived on.
///
/// Resolution order:
/// 1. exact id match → unchanged;
/// 2. temp-id user message whose permanent twin (same content) already
///    landed → unchanged;
/// 3. permanent-id user message whose optimistic echo is present → rewrite
///    the echo's id in place, keeping its content and timestamp;
/// 4. assistant message matching an existing assistant entry by content
///    within the merge window → rewrite that entry's id;
/// 5. otherwise append, deriving the conversation name from the first
///    message when the name is still the placeholder.
///
/// The bounded-collection invariant is re-established on return.
pub fn insert_message(
    conversation: &mut ConversationSession,
    incoming: AgentMessage,
    config: &SyncConfig,
    now: DateTime<Utc>,
) -> InsertOutcome {
    if conversation.messages.iter().any(|m| m.id == incoming.id) {
        return InsertOutcome::Unchanged;
    }

    let role = incoming.role;
    match role {
        MessageRole::User if incoming.has_temp_id() => {
            // The confirmed copy outran the optimistic echo.
            let confirmed_already_present = conversation.messages.iter().any(|m| {
                m.role == MessageRole::User && !is_temp_id(&m.id) && m.content == incoming.content
            });
            if confirmed_already_present {
                return InsertOutcome::Unchanged;
            }
        }
        MessageRole::User => {
            let echo = conversation.messages.iter_mut().find(|m| {
                m.role == MessageRole::User && is_temp_id(&m.id) && m.content == incoming.content
            });
            if let Some(echo) = echo {
                echo.id = incoming.id;
                return InsertOutcome::Reconciled {
                    id: echo.id.clone(),
                };
            }
        }
        MessageRole::Assistant => {
            let window = config.assistant_merge_window();
            let incoming_at = incoming.effective_timestamp(now);
            let twin = conversation.messages.iter_mut().find(|m| {
                m.role == MessageRole::Assistant
                    && m.content == incoming.content
                    && (m.effective_timestamp(now) - incoming_at).abs() <= window
            });
            if let Some(twin) = twin {
                if twin.id == incoming.id {
                    return InsertOutcome::Unchanged;
                }
                twin.id = incoming.id;
                return InsertOutcome::Reconciled {
                    id: twin.id.clone(),
                };
            }
        }
    }

    if conversation.messages.is_empty() && conversation.has_default_name() {
        conversation.name = derive_conversation_name(&incoming.content, config.name_preview_chars);
    }
    conversation.last_message_at = Some(incoming.effective_timestamp(now));
    conversation.messages.push(incoming);
    conversation.normalize(config.message_cap);
    InsertOutcome::Appended
}

/// Merges a confirmed slice of history (e.g. a reconnect resync) into the
/// conversation. Returns the number of messages added.
///
/// Batch entries are deduplicated by id (first occurrence wins, including
/// against messages already present), the combined list is stable-sorted by
/// timestamp with undated entries last, a final id pass guards against ids
/// surfacing twice after the sort, and the cap is re-enforced.
pub fn merge_history(
    conversation: &mut ConversationSession,
    batch: Vec<AgentMessage>,
    config: &SyncConfig,
) -> usize {
    let mut seen: HashSet<String> = conversation
        .messages
        .iter()
        .map(|m| m.id.clone())
        .collect();

    let fresh: Vec<AgentMessage> = batch
        .into_iter()
        .filter(|message| seen.insert(message.id.clone()))
        .collect();
    if fresh.is_empty() {
        return 0;
    }

    let added = fresh.len();
    conversation.messages.extend(fresh);
    conversation
        .messages
        .sort_by_key(|m| m.timestamp.map_or(i64::MAX, |t| t.timestamp_millis()));

    let mut final_ids = HashSet::new();
    conversation
        .messages
        .retain(|m| final_ids.insert(m.id.clone()));

    conversation.normalize(config.message_cap);
    added
}

/// Appends a message verbatim if its id is not already present. Used for
/// stream finalization, which has an authoritative id and needs no
/// content-based reconciliation.
pub fn append_message(
    conversation: &mut ConversationSession,
    message: AgentMessage,
    config: &SyncConfig,
    now: DateTime<Utc>,
) -> bool {
    if conversation.messages.iter().any(|m| m.id == message.id) {
        return false;
    }
    conversation.last_message_at = Some(message.effective_timestamp(now));
    conversation.messages.push(message);
    conversation.normalize(config.message_cap);
    true
}

/// Deletes a message by id. A plain filter; no cascading effects.
pub fn remove_message(conversation: &mut ConversationSession, message_id: &str) -> bool {
    let before = conversation.messages.len();
    conversation.messages.retain(|m| m.id != message_id);
    if conversation.messages.len() == before {
        return false;
    }
    conversation.message_count = conversation.messages.len();
    true
}

/// Rewrites a message id in place. Refuses when the target id already
/// exists (would break permanent-id uniqueness) or the source is missing.
pub fn rewrite_message_id(
    conversation: &mut ConversationSession,
    old_id: &str,
    new_id: &str,
) -> bool {
    if conversation.messages.iter().any(|m| m.id == new_id) {
        return false;
    }
    match conversation.messages.iter_mut().find(|m| m.id == old_id) {
        Some(message) => {
            message.id = new_id.to_string();
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn config() -> SyncConfig {
        SyncConfig::default()
    }

    fn conversation() -> ConversationSession {
        ConversationSession::placeholder("c1")
    }

    #[test]
    fn test_insert_is_idempotent_by_id() {
        let now = Utc::now();
        let mut conv = conversation();
        let message = AgentMessage::user("real-1", "hello");

        assert_eq!(
            insert_message(&mut conv, message.clone(), &config(), now),
            InsertOutcome::Appended
        );
        let snapshot = conv.clone();
        assert_eq!(
            insert_message(&mut conv, message, &config(), now),
            InsertOutcome::Unchanged
        );
        assert_eq!(conv, snapshot);
    }

    #[test]
    fn test_temp_then_permanent_reconciles_to_one_entry() {
        let now = Utc::now();
        let mut conv = conversation();
        insert_message(&mut conv, AgentMessage::user("temp-1", "hello"), &config(), now);
        let outcome =
            insert_message(&mut conv, AgentMessage::user("real-1", "hello"), &config(), now);

        assert_eq!(outcome, InsertOutcome::Reconciled { id: "real-1".to_string() });
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(conv.messages[0].id, "real-1");
    }

    #[test]
    fn test_permanent_then_temp_suppresses_echo() {
        let now = Utc::now();
        let mut conv = conversation();
        insert_message(&mut conv, AgentMessage::user("real-1", "hello"), &config(), now);
        let outcome =
            insert_message(&mut conv, AgentMessage::user("temp-1", "hello"), &config(), now);

        assert_eq!(outcome, InsertOutcome::Unchanged);
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(conv.messages[0].id, "real-1");
    }

    #[test]
    fn test_reconciliation_preserves_original_content_and_timestamp() {
        let now = Utc::now();
        let stamped = AgentMessage::user("temp-1", "hello").with_timestamp(Some(now));
        let mut conv = conversation();
        insert_message(&mut conv, stamped, &config(), now);

        let later = AgentMessage::user("real-1", "hello")
            .with_timestamp(Some(now + Duration::seconds(3)));
        insert_message(&mut conv, later, &config(), now);

        assert_eq!(conv.messages[0].timestamp, Some(now));
    }

    #[test]
    fn test_assistant_within_window_merges() {
        let now = Utc::now();
        let mut conv = conversation();
        let first = AgentMessage::assistant("stream-1", "done").with_timestamp(Some(now));
        let second = AgentMessage::assistant("real-9", "done")
            .with_timestamp(Some(now + Duration::seconds(5)));

        insert_message(&mut conv, first, &config(), now);
        let outcome = insert_message(&mut conv, second, &config(), now);

        assert_eq!(outcome, InsertOutcome::Reconciled { id: "real-9".to_string() });
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(conv.messages[0].id, "real-9");
    }

    #[test]
    fn test_assistant_outside_window_appends() {
        let now = Utc::now();
        let mut conv = conversation();
        let first = AgentMessage::assistant("a-1", "done").with_timestamp(Some(now));
        let second = AgentMessage::assistant("a-2", "done")
            .with_timestamp(Some(now + Duration::seconds(15)));

        insert_message(&mut conv, first, &config(), now);
        insert_message(&mut conv, second, &config(), now);
        assert_eq!(conv.messages.len(), 2);
    }

    #[test]
    fn test_missing_timestamp_counts_as_now_for_window() {
        let now = Utc::now();
        let mut conv = conversation();
        let first = AgentMessage::assistant("a-1", "done").with_timestamp(None);
        let second = AgentMessage::assistant("a-2", "done").with_timestamp(Some(now));

        insert_message(&mut conv, first, &config(), now);
        let outcome = insert_message(&mut conv, second, &config(), now);
        assert_eq!(outcome, InsertOutcome::Reconciled { id: "a-2".to_string() });
    }

    #[test]
    fn test_first_append_derives_placeholder_name() {
        let now = Utc::now();
        let mut conv = conversation();
        insert_message(
            &mut conv,
            AgentMessage::user("real-1", "rename the release branch"),
            &config(),
            now,
        );
        assert_eq!(conv.name, "rename the release branch");

        insert_message(
            &mut conv,
            AgentMessage::user("real-2", "second message"),
            &config(),
            now,
        );
        assert_eq!(conv.name, "rename the release branch");
    }

    #[test]
    fn test_explicit_name_is_never_overwritten() {
        let now = Utc::now();
        let mut conv = ConversationSession::new("c1", "triage");
        insert_message(&mut conv, AgentMessage::user("real-1", "hello"), &config(), now);
        assert_eq!(conv.name, "triage");
    }

    #[test]
    fn test_cap_keeps_most_recent_suffix() {
        let now = Utc::now();
        let mut small = SyncConfig::default();
        small.message_cap = 5;
        let mut conv = conversation();

        for i in 0..8 {
            insert_message(
                &mut conv,
                AgentMessage::user(format!("real-{i}"), format!("msg {i}")),
                &small,
                now,
            );
        }

        assert_eq!(conv.messages.len(), 5);
        assert_eq!(conv.message_count, 5);
        let ids: Vec<&str> = conv.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["real-3", "real-4", "real-5", "real-6", "real-7"]);
    }

    #[test]
    fn test_merge_history_dedups_sorts_and_places_undated_last() {
        let now = Utc::now();
        let mut conv = conversation();
        insert_message(
            &mut conv,
            AgentMessage::user("real-1", "first").with_timestamp(Some(now)),
            &config(),
            now,
        );

        let batch = vec![
            AgentMessage::user("real-1", "first").with_timestamp(Some(now)), // already present
            AgentMessage::assistant("real-3", "later")
                .with_timestamp(Some(now + Duration::seconds(20))),
            AgentMessage::user("real-2", "earlier")
                .with_timestamp(Some(now - Duration::seconds(20))),
            AgentMessage::user("undated", "no stamp").with_timestamp(None),
            AgentMessage::user("real-2", "earlier duplicate").with_timestamp(Some(now)),
        ];

        let added = merge_history(&mut conv, batch, &config());
        assert_eq!(added, 3);

        let ids: Vec<&str> = conv.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["real-2", "real-1", "real-3", "undated"]);
        assert_eq!(conv.message_count, 4);
    }

    #[test]
    fn test_merge_history_all_duplicates_is_a_no_op() {
        let now = Utc::now();
        let mut conv = conversation();
        insert_message(
            &mut conv,
            AgentMessage::user("real-1", "first").with_timestamp(Some(now)),
            &config(),
            now,
        );
        let snapshot = conv.clone();

        let added = merge_history(
            &mut conv,
            vec![AgentMessage::user("real-1", "first").with_timestamp(Some(now))],
            &config(),
        );
        assert_eq!(added, 0);
        assert_eq!(conv, snapshot);
    }

    #[test]
    fn test_merge_history_respects_cap() {
        let now = Utc::now();
        let mut small = SyncConfig::default();
        small.message_cap = 3;
        let mut conv = conversation();

        let batch: Vec<AgentMessage> = (0..6)
            .map(|i| {
                AgentMessage::user(format!("real-{i}"), format!("msg {i}"))
                    .with_timestamp(Some(now + Duration::seconds(i)))
            })
            .collect();
        merge_history(&mut conv, batch, &small);

        let ids: Vec<&str> = conv.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["real-3", "real-4", "real-5"]);
    }

    #[test]
    fn test_append_message_skips_known_ids() {
        let now = Utc::now();
        let mut conv = conversation();
        assert!(append_message(
            &mut conv,
            AgentMessage::assistant("stream-1", "Hi there"),
            &config(),
            now
        ));
        assert!(!append_message(
            &mut conv,
            AgentMessage::assistant("stream-1", "Hi there"),
            &config(),
            now
        ));
        assert_eq!(conv.messages.len(), 1);
    }

    #[test]
    fn test_remove_message_is_a_plain_filter() {
        let now = Utc::now();
        let mut conv = conversation();
        insert_message(&mut conv, AgentMessage::user("real-1", "a"), &config(), now);
        insert_message(&mut conv, AgentMessage::user("real-2", "b"), &config(), now);

        assert!(remove_message(&mut conv, "real-1"));
        assert!(!remove_message(&mut conv, "real-1"));
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(conv.message_count, 1);
    }

    #[test]
    fn test_rewrite_refuses_duplicate_target() {
        let now = Utc::now();
        let mut conv = conversation();
        insert_message(&mut conv, AgentMessage::user("real-1", "a"), &config(), now);
        insert_message(&mut conv, AgentMessage::user("real-2", "b"), &config(), now);

        assert!(!rewrite_message_id(&mut conv, "real-1", "real-2"));
        assert!(rewrite_message_id(&mut conv, "real-1", "real-9"));
        assert_eq!(conv.messages[0].id, "real-9");
    }
}
