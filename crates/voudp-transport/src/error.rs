/// Errors that can occur on the socket itself.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the UDP socket failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// Sending a datagram failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving a datagram failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The local address could not be read.
    #[error("local address unavailable: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// An inbound datagram that must be discarded without reply.
///
/// The variants exist for logs and tests only. Nothing derived from them is
/// ever sent back to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Shorter than a nonce plus an authentication tag.
    #[error("datagram too short")]
    TooShort,

    /// Wrong key, corrupted ciphertext or forged tag.
    #[error("authentication failed")]
    Rejected,

    /// The nonce was already seen, or is older than the replay window.
    #[error("replayed or stale nonce")]
    Replayed,

    /// The nonce prefix differs from the one pinned for this peer.
    #[error("nonce prefix mismatch")]
    PrefixMismatch,
}

/// Sealing an outbound packet failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SealError {
    /// The 8-byte nonce counter is used up; the session must close.
    #[error("nonce counter exhausted")]
    NonceExhausted,

    #[error("encryption failed")]
    Encrypt,
}

/// A reliable or ACK header is cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("reliable frame truncated")]
pub struct FrameError;

/// A pending reliable packet used its whole retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("packet {seq} unacknowledged after {attempts} attempts")]
pub struct ReliabilityTimeout {
    pub seq: u32,
    pub attempts: u32,
}
