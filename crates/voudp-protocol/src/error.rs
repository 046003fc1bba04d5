//! Error types for the protocol layer.
//!
//! Each crate in VoUDP defines its own error enum. When you see a
//! `DecodeError`, the bytes were malformed; the datagram is dropped and
//! the session it came from is not affected.

/// Why a buffer could not be turned into a packet.
///
/// `#[derive(thiserror::Error)]` generates the `std::error::Error` impl and
/// the `#[error("...")]` strings become the `Display` output seen in logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Fewer bytes than the variant's minimum, including an empty buffer.
    #[error("packet truncated")]
    Truncated,

    /// The first byte is not a tag we know for this direction.
    #[error("unknown packet tag 0x{0:02x}")]
    UnknownTag(u8),

    /// A string field is not valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,

    /// An expected 0x01 separator (or the List trailer) is missing.
    #[error("missing 0x01 delimiter")]
    MalformedDelimiter,
}

/// Why a requested display mask was refused.
///
/// Every variant is answered on the wire the same way (a `NickError`
/// packet); the distinction only matters for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MaskError {
    #[error("mask is empty")]
    Empty,

    #[error("mask is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },

    /// Control characters (the 0x01 delimiter among them) are refused so a
    /// mask can always sit in a delimited field.
    #[error("mask contains a control character")]
    InvalidCharacter,

    /// The `guest-` prefix is reserved for default masks.
    #[error("mask uses the reserved default prefix")]
    Reserved,

    /// Another member of the same channel already uses this mask.
    #[error("mask already taken in this channel")]
    Taken,
}
