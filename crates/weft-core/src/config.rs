//! Synchronization heuristics.
//!
//! The merge window and collection caps are tuning knobs, not correctness
//! constants: the engine's invariants hold for any positive values. The
//! defaults reproduce the behavior the backend fleet is calibrated against.

use chrono::Duration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum messages retained per conversation; oldest evicted first.
    pub message_cap: usize,
    /// Window within which an assistant message with identical content is
    /// treated as the same logical turn arriving on another channel.
    pub assistant_merge_window_secs: i64,
    /// Maximum file previews kept per session, most recent first.
    pub recent_file_cap: usize,
    /// Character budget when deriving a conversation name from its first
    /// message.
    pub name_preview_chars: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            message_cap: 100,
            assistant_merge_window_secs: 10,
            recent_file_cap: 20,
            name_preview_chars: 48,
        }
    }
}

impl SyncConfig {
    /// The assistant reconciliation window as a duration.
    pub fn assistant_merge_window(&self) -> Duration {
        Duration::seconds(self.assistant_merge_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.message_cap, 100);
        assert_eq!(config.assistant_merge_window_secs, 10);
        assert_eq!(config.recent_file_cap, 20);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: SyncConfig = toml::from_str("message_cap = 5").unwrap();
        assert_eq!(config.message_cap, 5);
        assert_eq!(config.assistant_merge_window_secs, 10);
    }
}
