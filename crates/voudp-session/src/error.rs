//! Error types for the session layer.

use std::net::SocketAddr;

/// Errors that can occur during session management.
///
/// None of these is fatal to anything but (at most) the session it names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// A well-formed packet that makes no sense in the session's current
    /// state, e.g. Audio before Join. The packet is dropped and the session
    /// survives.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// Console registration presented the wrong secret.
    #[error("console authentication failed")]
    ConsoleAuthFailed,

    /// The registry is at its configured capacity.
    #[error("session limit of {max} reached")]
    Full { max: usize },

    /// A session already exists for this address.
    #[error("session already open for {0}")]
    AlreadyOpen(SocketAddr),

    /// No session exists for this address.
    #[error("no session for {0}")]
    NotFound(SocketAddr),
}
