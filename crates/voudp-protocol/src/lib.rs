//! Wire protocol for VoUDP.
//!
//! This crate defines the "language" that clients, consoles and the server
//! speak:
//!
//! - **Packets** ([`Packet`], [`ConsolePacket`]): every message that
//!   travels inside the encrypted envelope.
//! - **Codec** ([`decode`], [`Packet::encode`]): the hand-rolled binary
//!   layout of those packets.
//! - **Masks** ([`validate_mask`], [`default_mask`]): the rules a display
//!   name must satisfy before anyone else sees it.
//! - **Errors** ([`DecodeError`], [`MaskError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (encrypted datagrams and
//! the reliable sublayer) and the session/channel state machine. It knows
//! nothing about sockets, keys or members.
//!
//! ```text
//! Transport (plaintext bytes) → Protocol (Packet) → Session / Channel
//! ```

mod codec;
mod error;
mod mask;
mod packet;
mod types;

pub use codec::decode;
pub use error::{DecodeError, MaskError};
pub use mask::{DEFAULT_MASK_PREFIX, MAX_MASK_LEN, default_mask, validate_mask};
pub use packet::{ConsolePacket, Packet, tag};
pub use types::{
    ChannelId, CommandEntry, ControlOption, Direction, ListEntry, ListFlags, SessionId,
};
