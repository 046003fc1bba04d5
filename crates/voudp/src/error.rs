//! Unified error type for the VoUDP engine.

use voudp_channel::ChannelError;
use voudp_protocol::DecodeError;
use voudp_session::SessionError;
use voudp_transport::{AuthError, ReliabilityTimeout, SealError, TransportError};

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `voudp` crate you deal with this single error type
/// instead of importing errors from each layer. The `#[from]` attribute on
/// each variant generates the `From` impl, so `?` converts layer errors
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum VoudpError {
    /// Socket I/O (bind, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An inbound datagram failed authentication or replay checks.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// An outbound packet could not be encrypted. Fatal to the session.
    #[error(transparent)]
    Seal(#[from] SealError),

    /// A reliable packet ran out of retries. Fatal to the session.
    #[error(transparent)]
    Reliability(#[from] ReliabilityTimeout),

    /// Malformed wire data.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The builder was given neither a key nor a passphrase.
    #[error("no encryption key configured")]
    MissingKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_seal_error() {
        let err: VoudpError = SealError::NonceExhausted.into();
        assert!(matches!(err, VoudpError::Seal(_)));
        assert_eq!(err.to_string(), "nonce counter exhausted");
    }

    #[test]
    fn test_from_reliability_timeout() {
        let err: VoudpError = ReliabilityTimeout { seq: 7, attempts: 6 }.into();
        assert!(matches!(err, VoudpError::Reliability(_)));
        assert!(err.to_string().contains("7"));
    }

    #[test]
    fn test_from_decode_error() {
        let err: VoudpError = DecodeError::UnknownTag(0x42).into();
        assert!(matches!(err, VoudpError::Decode(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err: VoudpError = SessionError::ConsoleAuthFailed.into();
        assert!(matches!(err, VoudpError::Session(_)));
    }

    #[test]
    fn test_from_channel_error() {
        let err: VoudpError = ChannelError::Unavailable(voudp_protocol::ChannelId(3)).into();
        assert!(matches!(err, VoudpError::Channel(_)));
        assert!(err.to_string().contains("#3"));
    }
}
