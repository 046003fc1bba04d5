//! Identity and value types shared by every VoUDP layer.
//!
//! Everything here is small, `Copy` where possible, and free of any
//! networking concerns. The packet enum in `packet.rs` is built from these.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a session (one remote UDP endpoint).
///
/// This is a newtype wrapper around `u64`: the compiler will not let a
/// `ChannelId` slip into a function expecting a `SessionId`, even though
/// both are plain integers underneath.
///
/// `#[serde(transparent)]` serializes it as the bare number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(pub u64);

/// `tracing::info!(%session, "joined")` prints "S-42".
impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

/// A voice channel identifier.
///
/// On the wire this is a 4-byte big-endian integer. Any `u32` is a valid
/// channel: channels are created on demand by the first Join.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChannelId(pub u32);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Which way a packet travels.
///
/// Two tags (0x05 and 0x06) carry a different layout depending on the
/// direction, and a few tags are only meaningful one way, so decoding
/// needs to know which side of the conversation it is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client (or console) → server.
    ToServer,
    /// Server → client.
    ToClient,
}

// ---------------------------------------------------------------------------
// Control options
// ---------------------------------------------------------------------------

/// The option byte of a Control packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOption {
    Deafen,
    Undeafen,
    Mute,
    Unmute,
    /// Carries the new volume in the first byte of `extra`.
    SetVolume,
}

impl ControlOption {
    /// Maps the wire byte to an option. Unknown bytes yield `None` and the
    /// packet is ignored by the session layer.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Deafen),
            0x02 => Some(Self::Undeafen),
            0x03 => Some(Self::Mute),
            0x04 => Some(Self::Unmute),
            0x05 => Some(Self::SetVolume),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Deafen => 0x01,
            Self::Undeafen => 0x02,
            Self::Mute => 0x03,
            Self::Unmute => 0x04,
            Self::SetVolume => 0x05,
        }
    }
}

// ---------------------------------------------------------------------------
// List entries
// ---------------------------------------------------------------------------

/// Per-member status bits carried in each List entry.
///
/// Bit 0 is mute (`m`), bit 1 is deaf (`d`). Any other bit is ignored when
/// decoding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
pub struct ListFlags {
    pub muted: bool,
    pub deafened: bool,
}

impl ListFlags {
    const MUTE: u8 = 0b01;
    const DEAF: u8 = 0b10;

    pub fn from_byte(byte: u8) -> Self {
        Self {
            muted: byte & Self::MUTE != 0,
            deafened: byte & Self::DEAF != 0,
        }
    }

    pub fn to_byte(self) -> u8 {
        let mut byte = 0;
        if self.muted {
            byte |= Self::MUTE;
        }
        if self.deafened {
            byte |= Self::DEAF;
        }
        byte
    }
}

/// One member line in a List packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub mask: String,
    pub flags: ListFlags,
}

// ---------------------------------------------------------------------------
// Command catalog
// ---------------------------------------------------------------------------

/// One command advertised to a client in answer to `SyncCommands`.
///
/// The engine never interprets these; they come from whatever command
/// collaborator the server was built with and are relayed verbatim so the
/// client can offer completion. Each string travels with a 1-byte length
/// prefix and is clipped to 255 bytes when encoded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandEntry {
    pub name: String,
    pub description: String,
    pub usage: String,
    /// Opaque grouping byte, meaningful to the client UI only.
    pub category: u8,
    /// Opaque flag byte, meaningful to the client UI only.
    pub flags: u8,
    #[serde(default)]
    pub aliases: Vec<String>,
}
