//! Error types for the channel layer.

use voudp_protocol::{ChannelId, MaskError, SessionId};

/// Errors that can occur during channel operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The actor's queue is closed: the channel retired, usually because
    /// its last member just left.
    #[error("channel {0} is unavailable")]
    Unavailable(ChannelId),

    /// The actor did not answer within the reply timeout.
    #[error("channel {0} did not answer in time")]
    Timeout(ChannelId),

    #[error("session {0} is not a member of channel {1}")]
    NotMember(SessionId, ChannelId),

    #[error("session {0} is already a member of channel {1}")]
    AlreadyMember(SessionId, ChannelId),

    /// The requested mask was refused. Answered with `NickError`.
    #[error("mask rejected: {0}")]
    Mask(#[from] MaskError),

    /// Chat from a member without a chosen mask while the channel requires
    /// one. Answered with `NickError`.
    #[error("a mask is required to chat")]
    Unmasked,
}
