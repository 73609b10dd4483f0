//! Session graph store.
//!
//! Owns the normalized session → agent → conversation → message graph and
//! the streaming side table. All mutation goes through these operations;
//! every one of them is synchronous, keeps the attach/detach relation
//! mutually consistent, and degrades to a no-op (returning `false` or
//! [`InsertOutcome::Unchanged`]) when handed a stale id. Stale ids are the
//! steady state of a client fed by asynchronous events, not an error.

use std::collections::{HashMap, HashSet};

use chrono::Utc;

use crate::config::SyncConfig;
use crate::projection::StateSnapshot;
use super::agent::{Agent, AgentStatus, PermissionMode};
use super::conversation::{ConversationSession, derive_conversation_name, DEFAULT_CONVERSATION_NAME};
use super::event::{ConversationEvent, ConversationPatch, ConversationPayload, StreamEvent};
use super::merge::{self, InsertOutcome};
use super::message::{AgentMessage, MessageRole, ToolCall};
use super::model::{FilePreview, FreeformPosition, GridSpan, Session, ViewMode, WorkspaceStatus};
use super::streaming::StreamingBuffer;

/// The one shared mutable structure of the client state layer. Construct it
/// once at application start and inject it where needed.
#[derive(Debug, Default)]
pub struct SessionGraphStore {
    config: SyncConfig,
    sessions: HashMap<String, Session>,
    current_session_id: Option<String>,
    streaming: StreamingBuffer,
}

impl SessionGraphStore {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
            current_session_id: None,
            streaming: StreamingBuffer::new(),
        }
    }

    /// Rebuilds a store from a persisted snapshot. The current pointer is
    /// dropped if its session is gone; conversation bounds and agent
    /// pointers are re-established, since persisted data may predate a
    /// rule change or have been written by an older client.
    pub fn hydrate(snapshot: StateSnapshot, config: SyncConfig) -> Self {
        let cap = config.message_cap;
        let mut sessions = HashMap::with_capacity(snapshot.sessions.len());
        for snap in snapshot.sessions {
            let mut session = Session {
                id: snap.id,
                name: snap.name,
                workspace_id: snap.workspace_id,
                branch: snap.branch,
                view_mode: snap.view_mode,
                workspace_status: snap.workspace_status,
                agents: snap
                    .agents
                    .into_iter()
                    .map(|agent| (agent.id.clone(), agent))
                    .collect(),
                conversations: snap
                    .conversations
                    .into_iter()
                    .map(|conversation_snapshot| {
                        let mut conversation = ConversationSession::from(conversation_snapshot);
                        conversation.normalize(cap);
                        (conversation.id.clone(), conversation)
                    })
                    .collect(),
                active_agent_id: snap.active_agent_id,
                grid_layout: snap.grid_layout,
                freeform_layout: snap.freeform_layout,
                recent_files: snap.recent_files.into_iter().map(FilePreview::from).collect(),
                created_at: snap.created_at,
                updated_at: snap.updated_at,
            };
            reconcile_agent_pointers(&mut session);
            sessions.insert(session.id.clone(), session);
        }
        let current_session_id = snapshot
            .current_session_id
            .filter(|id| sessions.contains_key(id));
        Self {
            config,
            sessions,
            current_session_id,
            streaming: StreamingBuffer::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Read accessors
    // ------------------------------------------------------------------

    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn current_session_id(&self) -> Option<&str> {
        self.current_session_id.as_deref()
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.current_session_id
            .as_ref()
            .and_then(|id| self.sessions.get(id))
    }

    pub fn agent(&self, session_id: &str, agent_id: &str) -> Option<&Agent> {
        self.sessions.get(session_id)?.agents.get(agent_id)
    }

    pub fn conversation(
        &self,
        session_id: &str,
        conversation_id: &str,
    ) -> Option<&ConversationSession> {
        self.sessions.get(session_id)?.conversations.get(conversation_id)
    }

    pub fn streaming(&self) -> &StreamingBuffer {
        &self.streaming
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Adds a session and makes it current. Replaces any session already
    /// stored under the same id.
    pub fn create_session(&mut self, session: Session) {
        self.current_session_id = Some(session.id.clone());
        self.sessions.insert(session.id.clone(), session);
    }

    /// Deletes a session and everything nested in it. Clears the current
    /// pointer when it referenced the deleted session.
    pub fn delete_session(&mut self, session_id: &str) -> bool {
        if self.sessions.remove(session_id).is_none() {
            return false;
        }
        self.streaming.clear_session(session_id);
        if self.current_session_id.as_deref() == Some(session_id) {
            self.current_session_id = None;
        }
        true
    }

    pub fn set_current_session(&mut self, session_id: &str) -> bool {
        if !self.sessions.contains_key(session_id) {
            return false;
        }
        if self.current_session_id.as_deref() == Some(session_id) {
            return false;
        }
        self.current_session_id = Some(session_id.to_string());
        true
    }

    pub fn rename_session(&mut self, session_id: &str, name: &str) -> bool {
        self.touch_session(session_id, |session| {
            if session.name == name {
                return false;
            }
            session.name = name.to_string();
            true
        })
    }

    pub fn set_view_mode(&mut self, session_id: &str, view_mode: ViewMode) -> bool {
        self.touch_session(session_id, |session| {
            if session.view_mode == view_mode {
                return false;
            }
            session.view_mode = view_mode;
            true
        })
    }

    pub fn set_workspace_status(&mut self, session_id: &str, status: WorkspaceStatus) -> bool {
        self.touch_session(session_id, |session| {
            if session.workspace_status == status {
                return false;
            }
            session.workspace_status = status;
            true
        })
    }

    /// Drops every locally cached session whose id is absent from the
    /// backend's authoritative set (cross-device deletion). Returns `false`
    /// without touching anything when every cached session is still valid,
    /// so callers can skip downstream work.
    pub fn sync_with_backend(&mut self, valid_ids: &HashSet<String>) -> bool {
        let stale: Vec<String> = self
            .sessions
            .keys()
            .filter(|id| !valid_ids.contains(*id))
            .cloned()
            .collect();
        if stale.is_empty() {
            return false;
        }
        for session_id in &stale {
            self.sessions.remove(session_id);
            self.streaming.clear_session(session_id);
            if self.current_session_id.as_deref() == Some(session_id.as_str()) {
                self.current_session_id = None;
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Agent lifecycle
    // ------------------------------------------------------------------

    pub fn add_agent(&mut self, session_id: &str, agent: Agent) -> bool {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        session.agents.insert(agent.id.clone(), agent);
        session.updated_at = Utc::now();
        true
    }

    /// Removes an agent, detaching it from every conversation and clearing
    /// the active-agent pointer when it referenced the removed agent.
    pub fn remove_agent(&mut self, session_id: &str, agent_id: &str) -> bool {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        if session.agents.remove(agent_id).is_none() {
            return false;
        }
        for conversation in session.conversations.values_mut() {
            conversation.attached_agent_ids.retain(|id| id != agent_id);
        }
        if session.active_agent_id.as_deref() == Some(agent_id) {
            session.active_agent_id = None;
        }
        session.grid_layout.remove(agent_id);
        session.freeform_layout.remove(agent_id);
        session.updated_at = Utc::now();
        true
    }

    /// Applies a partial update to an agent.
    pub fn update_agent(
        &mut self,
        session_id: &str,
        agent_id: &str,
        update: impl FnOnce(&mut Agent),
    ) -> bool {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        let Some(agent) = session.agents.get_mut(agent_id) else {
            return false;
        };
        update(agent);
        session.updated_at = Utc::now();
        true
    }

    pub fn set_active_agent(&mut self, session_id: &str, agent_id: &str) -> bool {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        if !session.agents.contains_key(agent_id) {
            return false;
        }
        if session.active_agent_id.as_deref() == Some(agent_id) {
            return false;
        }
        session.active_agent_id = Some(agent_id.to_string());
        true
    }

    pub fn set_permission_mode(
        &mut self,
        session_id: &str,
        agent_id: &str,
        mode: PermissionMode,
    ) -> bool {
        self.update_agent(session_id, agent_id, |agent| agent.set_permission_mode(mode))
    }

    pub fn revert_permission_mode(&mut self, session_id: &str, agent_id: &str) -> bool {
        let mut reverted = false;
        self.update_agent(session_id, agent_id, |agent| {
            reverted = agent.revert_permission_mode();
        }) && reverted
    }

    // ------------------------------------------------------------------
    // Conversation lifecycle
    // ------------------------------------------------------------------

    /// Creates an empty conversation. The name comes from `name`, else is
    /// derived from `first_message`, else stays the placeholder. Messages
    /// are deliberately not seeded here: the creator's own first message
    /// arrives through the real-time echo, and seeding it would double it.
    pub fn create_conversation(
        &mut self,
        session_id: &str,
        conversation_id: &str,
        name: Option<&str>,
        first_message: Option<&str>,
    ) -> bool {
        let preview_chars = self.config.name_preview_chars;
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        if session.conversations.contains_key(conversation_id) {
            return false;
        }
        let name = match (name, first_message) {
            (Some(explicit), _) if !explicit.trim().is_empty() => explicit.trim().to_string(),
            (_, Some(message)) => derive_conversation_name(message, preview_chars),
            _ => DEFAULT_CONVERSATION_NAME.to_string(),
        };
        session.conversations.insert(
            conversation_id.to_string(),
            ConversationSession::new(conversation_id, name),
        );
        session.updated_at = Utc::now();
        true
    }

    /// Applies a partial update to a conversation. The bounded-collection
    /// and count invariants are re-established afterwards regardless of
    /// what the closure did to the message list.
    pub fn update_conversation(
        &mut self,
        session_id: &str,
        conversation_id: &str,
        update: impl FnOnce(&mut ConversationSession),
    ) -> bool {
        let cap = self.config.message_cap;
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        let Some(conversation) = session.conversations.get_mut(conversation_id) else {
            return false;
        };
        update(conversation);
        conversation.normalize(cap);
        session.updated_at = Utc::now();
        true
    }

    /// Deletes a conversation, clearing the pointer of every agent that
    /// referenced it.
    pub fn delete_conversation(&mut self, session_id: &str, conversation_id: &str) -> bool {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        if session.conversations.remove(conversation_id).is_none() {
            return false;
        }
        for agent in session.agents.values_mut() {
            if agent.conversation_session_id.as_deref() == Some(conversation_id) {
                agent.conversation_session_id = None;
            }
        }
        session.updated_at = Utc::now();
        true
    }

    /// Bulk-replaces a session's conversations from the backend as the
    /// source of truth, then re-reconciles every agent pointer against the
    /// new attachment sets.
    pub fn set_conversations(
        &mut self,
        session_id: &str,
        conversations: Vec<ConversationSession>,
    ) -> bool {
        let cap = self.config.message_cap;
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        session.conversations = conversations
            .into_iter()
            .map(|mut conversation| {
                conversation.normalize(cap);
                (conversation.id.clone(), conversation)
            })
            .collect();
        reconcile_agent_pointers(session);
        session.updated_at = Utc::now();
        true
    }

    // ------------------------------------------------------------------
    // Attach / detach
    // ------------------------------------------------------------------

    /// Links a conversation and an agent. Adds the agent to the attachment
    /// set if absent and sets the agent's pointer only when unset (an agent
    /// follows at most one conversation).
    pub fn attach_conversation(
        &mut self,
        session_id: &str,
        conversation_id: &str,
        agent_id: &str,
    ) -> bool {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        let (Some(conversation), Some(agent)) = (
            session.conversations.get_mut(conversation_id),
            session.agents.get_mut(agent_id),
        ) else {
            return false;
        };

        let mut changed = false;
        if !conversation.attached_agent_ids.iter().any(|id| id == agent_id) {
            conversation.attached_agent_ids.push(agent_id.to_string());
            changed = true;
        }
        if agent.conversation_session_id.is_none() {
            agent.conversation_session_id = Some(conversation_id.to_string());
            changed = true;
        }
        if changed {
            session.updated_at = Utc::now();
        }
        changed
    }

    /// Unlinks a conversation and an agent. The agent's pointer is cleared
    /// only when it references this conversation.
    pub fn detach_conversation(
        &mut self,
        session_id: &str,
        conversation_id: &str,
        agent_id: &str,
    ) -> bool {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        let Some(conversation) = session.conversations.get_mut(conversation_id) else {
            return false;
        };

        let before = conversation.attached_agent_ids.len();
        conversation.attached_agent_ids.retain(|id| id != agent_id);
        let mut changed = conversation.attached_agent_ids.len() != before;

        if let Some(agent) = session.agents.get_mut(agent_id) {
            if agent.conversation_session_id.as_deref() == Some(conversation_id) {
                agent.conversation_session_id = None;
                changed = true;
            }
        }
        if changed {
            session.updated_at = Utc::now();
        }
        changed
    }

    // ------------------------------------------------------------------
    // Message operations
    // ------------------------------------------------------------------

    /// Single-message insert through the merge engine.
    pub fn insert_message(
        &mut self,
        session_id: &str,
        conversation_id: &str,
        message: AgentMessage,
    ) -> InsertOutcome {
        let config = self.config.clone();
        let Some(session) = self.sessions.get_mut(session_id) else {
            return InsertOutcome::Unchanged;
        };
        let Some(conversation) = session.conversations.get_mut(conversation_id) else {
            return InsertOutcome::Unchanged;
        };
        let outcome = merge::insert_message(conversation, message, &config, Utc::now());
        if outcome.changed() {
            session.updated_at = Utc::now();
        }
        outcome
    }

    /// Batch merge of confirmed history through the merge engine.
    pub fn merge_conversation_history(
        &mut self,
        session_id: &str,
        conversation_id: &str,
        batch: Vec<AgentMessage>,
    ) -> usize {
        let config = self.config.clone();
        let Some(session) = self.sessions.get_mut(session_id) else {
            return 0;
        };
        let Some(conversation) = session.conversations.get_mut(conversation_id) else {
            return 0;
        };
        let added = merge::merge_history(conversation, batch, &config);
        if added > 0 {
            session.updated_at = Utc::now();
        }
        added
    }

    pub fn remove_message(
        &mut self,
        session_id: &str,
        conversation_id: &str,
        message_id: &str,
    ) -> bool {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        let Some(conversation) = session.conversations.get_mut(conversation_id) else {
            return false;
        };
        merge::remove_message(conversation, message_id)
    }

    pub fn rewrite_message_id(
        &mut self,
        session_id: &str,
        conversation_id: &str,
        old_id: &str,
        new_id: &str,
    ) -> bool {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        let Some(conversation) = session.conversations.get_mut(conversation_id) else {
            return false;
        };
        merge::rewrite_message_id(conversation, old_id, new_id)
    }

    // ------------------------------------------------------------------
    // Remote event application
    // ------------------------------------------------------------------

    /// Applies one conversation lifecycle event. Unknown kinds are a no-op.
    /// Returns whether the graph changed.
    pub fn apply_conversation_event(&mut self, session_id: &str, event: ConversationEvent) -> bool {
        match event {
            ConversationEvent::ConversationCreated { conversation } => {
                self.apply_conversation_created(session_id, conversation)
            }
            ConversationEvent::ConversationUpdated {
                conversation_id,
                patch,
            } => self.apply_conversation_updated(session_id, &conversation_id, patch),
            ConversationEvent::ConversationDeleted { conversation_id } => {
                self.delete_conversation(session_id, &conversation_id)
            }
            ConversationEvent::ConversationAttached {
                conversation_id,
                agent_id,
            } => self.attach_conversation(session_id, &conversation_id, &agent_id),
            ConversationEvent::ConversationDetached {
                conversation_id,
                agent_id,
            } => self.detach_conversation(session_id, &conversation_id, &agent_id),
            ConversationEvent::Unknown => false,
        }
    }

    fn apply_conversation_created(
        &mut self,
        session_id: &str,
        payload: ConversationPayload,
    ) -> bool {
        if self
            .conversation(session_id, &payload.id)
            .is_some()
        {
            // Replayed creation of a known conversation: fold into update.
            let conversation_id = payload.id.clone();
            let patch = ConversationPatch {
                name: payload.name,
                messages: Some(payload.messages),
                last_message_at: payload.last_message_at,
            };
            return self.apply_conversation_updated(session_id, &conversation_id, patch);
        }

        let cap = self.config.message_cap;
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        let mut conversation = ConversationSession {
            id: payload.id.clone(),
            name: payload
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CONVERSATION_NAME.to_string()),
            messages: payload.messages,
            message_count: 0,
            last_message_at: payload.last_message_at,
            attached_agent_ids: payload.attached_agent_ids,
        };
        conversation.normalize(cap);

        for agent_id in &conversation.attached_agent_ids {
            if let Some(agent) = session.agents.get_mut(agent_id) {
                if agent.conversation_session_id.is_none() {
                    agent.conversation_session_id = Some(conversation.id.clone());
                }
            }
        }
        session
            .conversations
            .insert(conversation.id.clone(), conversation);
        session.updated_at = Utc::now();
        true
    }

    fn apply_conversation_updated(
        &mut self,
        session_id: &str,
        conversation_id: &str,
        patch: ConversationPatch,
    ) -> bool {
        let config = self.config.clone();
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        let Some(conversation) = session.conversations.get_mut(conversation_id) else {
            return false;
        };

        let mut changed = false;
        if let Some(name) = patch.name {
            if conversation.name != name {
                conversation.name = name;
                changed = true;
            }
        }
        if let Some(batch) = patch.messages {
            changed |= merge::merge_history(conversation, batch, &config) > 0;
        }
        if let Some(stamp) = patch.last_message_at {
            if conversation.last_message_at.is_none_or(|current| current < stamp) {
                conversation.last_message_at = Some(stamp);
                changed = true;
            }
        }
        if changed {
            session.updated_at = Utc::now();
        }
        changed
    }

    // ------------------------------------------------------------------
    // Streaming integration
    // ------------------------------------------------------------------

    /// Applies one streaming event. Returns whether the persisted graph
    /// changed — token/thinking deltas only touch the ephemeral buffer.
    pub fn apply_stream_event(&mut self, event: StreamEvent) -> bool {
        match event {
            StreamEvent::StreamStarted {
                session_id,
                agent_id,
                message_id,
            } => {
                self.start_streaming(&session_id, &agent_id, &message_id);
                false
            }
            StreamEvent::StreamToken { message_id, token } => {
                self.append_stream_token(&message_id, &token);
                false
            }
            StreamEvent::StreamThinking { message_id, text } => {
                self.append_stream_thinking(&message_id, &text);
                false
            }
            StreamEvent::StreamFinalized {
                message_id,
                full_content,
                tool_calls,
            } => self.finalize_streaming(&message_id, &full_content, tool_calls),
            StreamEvent::Unknown => false,
        }
    }

    pub fn start_streaming(&mut self, session_id: &str, agent_id: &str, message_id: &str) -> bool {
        if !self.streaming.start(session_id, agent_id, message_id) {
            return false;
        }
        self.update_agent(session_id, agent_id, |agent| {
            agent.status = AgentStatus::Active;
        });
        true
    }

    pub fn append_stream_token(&mut self, message_id: &str, token: &str) -> bool {
        self.streaming.append_token(message_id, token)
    }

    pub fn append_stream_thinking(&mut self, message_id: &str, text: &str) -> bool {
        self.streaming.append_thinking(message_id, text)
    }

    /// Commits an in-flight response as a permanent message.
    ///
    /// `full_content` is the authoritative text (it may differ from the
    /// accumulated buffer). The message lands in the conversation attached
    /// to the streaming agent, unless the agent is gone, detached, or the
    /// id already exists there. A second finalize for the same id finds the
    /// buffer empty and is a no-op.
    pub fn finalize_streaming(
        &mut self,
        message_id: &str,
        full_content: &str,
        tool_calls: Vec<ToolCall>,
    ) -> bool {
        let Some(stream) = self.streaming.finalize(message_id) else {
            return false;
        };
        let config = self.config.clone();
        let thinking = (!stream.thinking.is_empty()).then_some(stream.thinking);

        let Some(session) = self.sessions.get_mut(&stream.session_id) else {
            return false;
        };
        if let Some(agent) = session.agents.get_mut(&stream.agent_id) {
            agent.status = AgentStatus::Idle;
        }
        let Some(conversation_id) = session
            .agents
            .get(&stream.agent_id)
            .and_then(|agent| agent.conversation_session_id.clone())
        else {
            return false;
        };
        let Some(conversation) = session.conversations.get_mut(&conversation_id) else {
            return false;
        };

        let message = AgentMessage {
            id: message_id.to_string(),
            role: MessageRole::Assistant,
            content: full_content.to_string(),
            thinking,
            timestamp: Some(Utc::now()),
            tool_calls,
        };
        let appended = merge::append_message(conversation, message, &config, Utc::now());
        if appended {
            session.updated_at = Utc::now();
        }
        appended
    }

    // ------------------------------------------------------------------
    // UI affinity
    // ------------------------------------------------------------------

    pub fn set_grid_span(&mut self, session_id: &str, agent_id: &str, span: GridSpan) -> bool {
        self.touch_session(session_id, |session| {
            if !session.agents.contains_key(agent_id) {
                return false;
            }
            session.grid_layout.insert(agent_id.to_string(), span);
            true
        })
    }

    pub fn set_freeform_position(
        &mut self,
        session_id: &str,
        agent_id: &str,
        position: FreeformPosition,
    ) -> bool {
        self.touch_session(session_id, |session| {
            if !session.agents.contains_key(agent_id) {
                return false;
            }
            session.freeform_layout.insert(agent_id.to_string(), position);
            true
        })
    }

    /// Records a file preview, most recent first, deduplicated by path and
    /// bounded by the configured cap (oldest dropped).
    pub fn open_file_preview(&mut self, session_id: &str, preview: FilePreview) -> bool {
        let cap = self.config.recent_file_cap;
        self.touch_session(session_id, |session| {
            session.recent_files.retain(|f| f.path != preview.path);
            session.recent_files.insert(0, preview);
            session.recent_files.truncate(cap);
            true
        })
    }

    pub fn close_file_preview(&mut self, session_id: &str, path: &str) -> bool {
        self.touch_session(session_id, |session| {
            let before = session.recent_files.len();
            session.recent_files.retain(|f| f.path != path);
            session.recent_files.len() != before
        })
    }

    /// Runs a session mutation, bumping `updated_at` when it reports a
    /// change.
    fn touch_session(
        &mut self,
        session_id: &str,
        mutate: impl FnOnce(&mut Session) -> bool,
    ) -> bool {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        let changed = mutate(session);
        if changed {
            session.updated_at = Utc::now();
        }
        changed
    }
}

/// Heals the agent↔conversation relation after a wholesale replacement of
/// either side: pointers to conversations that no longer list the agent are
/// cleared, unset pointers of attached agents are filled in, and a dangling
/// active-agent pointer is dropped.
fn reconcile_agent_pointers(session: &mut Session) {
    for agent in session.agents.values_mut() {
        let still_attached = agent.conversation_session_id.as_ref().is_some_and(|id| {
            session
                .conversations
                .get(id)
                .is_some_and(|c| c.attached_agent_ids.contains(&agent.id))
        });
        if !still_attached {
            agent.conversation_session_id = None;
        }
    }
    for (conversation_id, conversation) in &session.conversations {
        for agent_id in &conversation.attached_agent_ids {
            if let Some(agent) = session.agents.get_mut(agent_id) {
                if agent.conversation_session_id.is_none() {
                    agent.conversation_session_id = Some(conversation_id.clone());
                }
            }
        }
    }
    if session
        .active_agent_id
        .as_ref()
        .is_some_and(|id| !session.agents.contains_key(id))
    {
        session.active_agent_id = None;
    }
}
