//! Channel manager: creates, tracks, and routes members to channels.
//!
//! Channels exist only while they have members. The first Join for an id
//! spawns its actor; the actor retires on its own when its last member
//! leaves, and the manager notices the closed handle the next time it
//! looks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use voudp_protocol::ChannelId;

use crate::channel::spawn_channel;
use crate::{ChannelConfig, ChannelError, ChannelHandle, HookDispatcher, JoinAccepted, Member, Verdict};

/// How many times a Join is retried when it lands on an actor that is just
/// retiring.
const JOIN_ATTEMPTS: usize = 3;

/// Tracks every live channel.
///
/// The map sits behind its own lock, held only long enough to look up or
/// spawn a handle. Requests to the actors themselves happen outside it, so
/// a slow channel never blocks lookups for another.
#[derive(Debug)]
pub struct ChannelManager {
    channels: Mutex<HashMap<ChannelId, ChannelHandle>>,
    config: ChannelConfig,
    hooks: Arc<HookDispatcher>,
}

impl ChannelManager {
    pub fn new(config: ChannelConfig, hooks: HookDispatcher) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            config,
            hooks: Arc::new(hooks),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn hooks(&self) -> &HookDispatcher {
        &self.hooks
    }

    /// Returns the live handle for `channel_id`, spawning an actor if there
    /// is none (or the previous one retired).
    async fn handle_or_spawn(&self, channel_id: ChannelId) -> ChannelHandle {
        let mut channels = self.channels.lock().await;
        channels.retain(|_, handle| !handle.is_closed());

        channels
            .entry(channel_id)
            .or_insert_with(|| {
                tracing::info!(channel = %channel_id, "channel created");
                spawn_channel(channel_id, self.config.clone(), Arc::clone(&self.hooks))
            })
            .clone()
    }

    /// Joins `member` to `channel_id`, creating the channel on demand.
    /// Returns the handle of the channel that answered along with its
    /// verdict.
    ///
    /// If the actor retires between lookup and delivery, the join is
    /// retried against a fresh actor.
    pub async fn join(
        &self,
        channel_id: ChannelId,
        member: Member,
    ) -> Result<(ChannelHandle, Verdict<JoinAccepted>), ChannelError> {
        for attempt in 1..=JOIN_ATTEMPTS {
            let handle = self.handle_or_spawn(channel_id).await;
            match handle.join(member.clone()).await {
                Ok(verdict) => return Ok((handle, verdict)),
                Err(ChannelError::Unavailable(_)) => {
                    tracing::debug!(channel = %channel_id, session = %member.session, attempt, "channel retired during join; retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(ChannelError::Unavailable(channel_id))
    }

    /// The live handle for `channel_id`, if the channel exists.
    pub async fn get(&self, channel_id: ChannelId) -> Option<ChannelHandle> {
        self.channels
            .lock()
            .await
            .get(&channel_id)
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    /// Ids of every live channel, ascending.
    pub async fn channel_ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self
            .channels
            .lock()
            .await
            .iter()
            .filter(|(_, handle)| !handle.is_closed())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Stops every channel actor. Members are not notified.
    pub async fn shutdown_all(&self) {
        let handles: Vec<ChannelHandle> = self.channels.lock().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            let _ = handle.shutdown().await;
        }
    }
}
