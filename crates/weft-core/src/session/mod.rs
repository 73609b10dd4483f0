//! Session domain module.
//!
//! Everything the client state layer knows about sessions lives here:
//! the domain models, the conversation merge engine, the streaming side
//! table, the inbound event shapes, and the graph store that ties them
//! together.
//!
//! # Module Structure
//!
//! - `model`: session container and UI-affinity types
//! - `agent`: agent participant and permission modes
//! - `conversation`: message thread and name derivation
//! - `message`: message types and temp-id convention
//! - `merge`: deduplicating/reconciling merge engine
//! - `streaming`: ephemeral in-flight response buffer
//! - `event`: inbound real-time event unions
//! - `store`: the session graph store

mod agent;
mod conversation;
mod event;
mod merge;
mod message;
mod model;
mod store;
mod streaming;

// Re-export public API
pub use agent::{Agent, AgentRole, AgentStatus, PermissionMode};
pub use conversation::{ConversationSession, DEFAULT_CONVERSATION_NAME, derive_conversation_name};
pub use event::{ConversationEvent, ConversationPatch, ConversationPayload, StreamEvent};
pub use merge::{InsertOutcome, append_message, insert_message, merge_history, remove_message, rewrite_message_id};
pub use message::{AgentMessage, MessageRole, TEMP_ID_PREFIX, ToolCall, is_temp_id, temp_message_id};
pub use model::{FilePreview, FreeformPosition, GridSpan, Session, ViewMode, WorkspaceStatus};
pub use store::SessionGraphStore;
pub use streaming::{StreamingBuffer, StreamingMessage};
