//! Core state-synchronization logic for agent workspace clients.
//!
//! This crate owns the normalized session → agent → conversation → message
//! graph and the rules that keep it consistent while the same logical
//! message arrives over independent channels (optimistic local echo,
//! real-time push, stream finalization) in any order. It is pure logic:
//! no I/O, no transport, no UI.
//!
//! The layers above feed it through three narrow surfaces:
//! [`session::SessionGraphStore`] for mutations,
//! [`session::ConversationEvent`]/[`session::StreamEvent`] for inbound
//! real-time payloads, and [`projection::project`] for the persisted view.

pub mod config;
pub mod error;
pub mod projection;
pub mod session;

// Re-export common error type
pub use error::WeftError;
