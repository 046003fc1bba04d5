//! Channel configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings shared by every channel actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Whether a chat message is relayed back to its sender too.
    pub echo_chat: bool,

    /// Refuse chat from members still using their default mask (they get
    /// a NickError instead).
    pub require_mask_for_chat: bool,

    /// Capacity of each actor's command queue. Audio is dropped rather
    /// than queued when it is full.
    pub command_buffer: usize,

    /// Capacity of each member's outbox. Audio is only queued while more
    /// than a quarter of it is free.
    pub member_queue: usize,

    /// Longest a caller waits for an actor to answer a request. The server
    /// sets it from its own `actor_timeout`.
    #[serde(skip)]
    pub reply_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            echo_chat: true,
            require_mask_for_chat: false,
            command_buffer: 64,
            member_queue: 256,
            reply_timeout: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_config_deserializes_with_defaults() {
        let config: ChannelConfig = serde_json::from_str(r#"{"echo_chat": false}"#).unwrap();
        assert!(!config.echo_chat);
        assert!(!config.require_mask_for_chat);
        assert_eq!(config.command_buffer, 64);
        assert_eq!(config.member_queue, 256);
        assert_eq!(config.reply_timeout, Duration::from_secs(2));
    }
}
