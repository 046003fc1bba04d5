//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use voudp_channel::ChannelConfig;
use voudp_session::SessionConfig;
use voudp_transport::ReliableConfig;

/// Everything tunable about a running server, grouped by layer.
///
/// Deserializes from partial documents; missing fields take their
/// defaults:
///
/// ```rust
/// let config: voudp::ServerConfig =
///     serde_json::from_str(r#"{ "channel": { "echo_chat": false } }"#).unwrap();
/// assert!(!config.channel.echo_chat);
/// assert_eq!(config.session.max_sessions, 1024);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub session: SessionConfig,
    pub channel: ChannelConfig,
    pub reliable: ReliableConfig,

    /// Longest a session waits for a channel actor to answer.
    pub actor_timeout: Duration,

    /// Datagrams buffered per session before new ones are dropped.
    pub inbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            channel: ChannelConfig::default(),
            reliable: ReliableConfig::default(),
            actor_timeout: Duration::from_secs(2),
            inbox_capacity: 64,
        }
    }
}
