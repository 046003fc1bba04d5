//! The packets VoUDP peers exchange.
//!
//! Each packet starts with a one-byte tag. The table below is the complete
//! wire vocabulary; `codec.rs` turns these enums into bytes and back.
//!
//! ```text
//! tag   C2S                      S2C
//! 0x01  Join{u32}                -
//! 0x02  Audio{frame}             Audio{frame}
//! 0x03  Leave                    -
//! 0x04  Mask{name}               -
//! 0x05  ListRequest              List{u32, u32, entries.., 0x01}
//! 0x06  Chat{text}               ChatRelay{sender 0x01 text}
//! 0x07  -                        NickError
//! 0x08  Control{u8, extra}       -
//! 0x0a  -                        FlowJoin{username}
//! 0x0b  -                        FlowLeave{username}
//! 0x0c  SyncCommands             CommandCatalog{..}
//! 0x0d  ConsoleCommand{text}     -
//! 0x0e  -                        CommandReply{text}
//! 0x0f  -                        CommandError{text}
//! 0x10  -                        Renick{len old len new}
//! 0x11  -                        Dm{text}
//! 0xff  ConsoleRegister{secret}  -
//! ```

use crate::{ChannelId, CommandEntry, ListEntry};

/// Wire tags. Kept in one place so the codec and tests agree.
pub mod tag {
    pub const JOIN: u8 = 0x01;
    pub const AUDIO: u8 = 0x02;
    pub const LEAVE: u8 = 0x03;
    pub const MASK: u8 = 0x04;
    pub const LIST: u8 = 0x05;
    pub const CHAT: u8 = 0x06;
    pub const NICK_ERROR: u8 = 0x07;
    pub const CONTROL: u8 = 0x08;
    pub const FLOW_JOIN: u8 = 0x0a;
    pub const FLOW_LEAVE: u8 = 0x0b;
    pub const SYNC_COMMANDS: u8 = 0x0c;
    pub const CONSOLE_COMMAND: u8 = 0x0d;
    pub const COMMAND_REPLY: u8 = 0x0e;
    pub const COMMAND_ERROR: u8 = 0x0f;
    pub const RENICK: u8 = 0x10;
    pub const DM: u8 = 0x11;
    pub const CONSOLE_REGISTER: u8 = 0xff;

    /// Console dialect: end of session.
    pub const CONSOLE_EOF: u8 = 0x03;
    /// Console dialect: keepalive.
    pub const CONSOLE_KEEPALIVE: u8 = 0x04;

    /// Separator used by List entries and the S2C chat sender field.
    pub const DELIMITER: u8 = 0x01;
}

/// A client or server packet.
///
/// Variants are grouped by who sends them. Strings whose length is implied
/// by "rest of buffer" may contain any UTF-8; strings followed by a
/// delimiter (`ListEntry::mask`, `ChatRelay::sender`) must hold validated
/// masks, which never contain the delimiter byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    // -- client → server --
    Join { channel_id: ChannelId },
    Leave,
    Mask { name: String },
    ListRequest,
    Chat { text: String },
    Control { option: u8, extra: Vec<u8> },
    SyncCommands,
    ConsoleCommand { text: String },
    ConsoleRegister { secret: String },

    // -- both directions --
    /// An opaque Opus frame, relayed verbatim.
    Audio { frame: Vec<u8> },

    // -- server → client --
    List {
        unmasked_count: u32,
        masked_count: u32,
        entries: Vec<ListEntry>,
    },
    ChatRelay { sender: String, text: String },
    NickError,
    FlowJoin { username: String },
    FlowLeave { username: String },
    Renick { old_mask: String, new_mask: String },
    CommandCatalog { entries: Vec<CommandEntry> },
    CommandReply { text: String },
    CommandError { text: String },
    Dm { text: String },
}

impl Packet {
    /// The tag byte this packet is encoded with.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Join { .. } => tag::JOIN,
            Self::Leave => tag::LEAVE,
            Self::Mask { .. } => tag::MASK,
            Self::ListRequest | Self::List { .. } => tag::LIST,
            Self::Chat { .. } | Self::ChatRelay { .. } => tag::CHAT,
            Self::Control { .. } => tag::CONTROL,
            Self::SyncCommands | Self::CommandCatalog { .. } => tag::SYNC_COMMANDS,
            Self::ConsoleCommand { .. } => tag::CONSOLE_COMMAND,
            Self::ConsoleRegister { .. } => tag::CONSOLE_REGISTER,
            Self::Audio { .. } => tag::AUDIO,
            Self::NickError => tag::NICK_ERROR,
            Self::FlowJoin { .. } => tag::FLOW_JOIN,
            Self::FlowLeave { .. } => tag::FLOW_LEAVE,
            Self::Renick { .. } => tag::RENICK,
            Self::CommandReply { .. } => tag::COMMAND_REPLY,
            Self::CommandError { .. } => tag::COMMAND_ERROR,
            Self::Dm { .. } => tag::DM,
        }
    }

    /// Whether this packet must travel inside the reliable sublayer.
    ///
    /// Audio, List and the flow notifications are best-effort: a newer one
    /// supersedes a lost one, so retransmitting them only adds latency.
    pub fn is_reliable(&self) -> bool {
        !matches!(
            self,
            Self::Audio { .. }
                | Self::ListRequest
                | Self::List { .. }
                | Self::FlowJoin { .. }
                | Self::FlowLeave { .. }
                | Self::Renick { .. }
        )
    }
}

/// Packets a registered console sends.
///
/// Consoles speak a reduced dialect whose tags overlap the client ones
/// (0x03, 0x04), so they get their own enum and decoder. Every console
/// packet is reliable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsolePacket {
    Command { text: String },
    Eof,
    Keepalive,
}
