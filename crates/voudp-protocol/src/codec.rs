//! Binary encoding and decoding of [`Packet`] and [`ConsolePacket`].
//!
//! The format is hand-rolled: one tag byte, then a fixed layout per tag.
//! Multi-byte integers are big-endian. Strings are UTF-8 and never
//! null-terminated; their length is implied by one of:
//!
//! - the end of the buffer ("rest" strings),
//! - a 1-byte length prefix ("short" strings, e.g. Renick's masks),
//! - a trailing 0x01 delimiter (List entries, the S2C chat sender).
//!
//! Encoding never fails. Decoding checks every read against the remaining
//! buffer, so a malicious datagram can only ever produce a [`DecodeError`].

use crate::packet::tag;
use crate::{
    ChannelId, CommandEntry, ConsolePacket, DecodeError, Direction, ListEntry,
    ListFlags, Packet,
};

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// A cursor over a borrowed byte slice.
///
/// Every method either consumes bytes and returns them or returns an error
/// without consuming anything useful. The `'a` lifetime ties the returned
/// slices to the input buffer, so no copies are made until a `String` or
/// `Vec` is actually needed.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn remaining(&self) -> &'a [u8] {
        self.buf
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.buf.len() < n {
            return Err(DecodeError::Truncated);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    fn rest_str(&mut self) -> Result<String, DecodeError> {
        utf8(self.rest())
    }

    fn short_str(&mut self) -> Result<String, DecodeError> {
        let len = self.u8()? as usize;
        utf8(self.take(len)?)
    }

    /// Consumes bytes up to and including the next delimiter and returns
    /// the bytes before it.
    fn until_delimiter(&mut self) -> Result<&'a [u8], DecodeError> {
        let pos = self
            .buf
            .iter()
            .position(|&b| b == tag::DELIMITER)
            .ok_or(DecodeError::MalformedDelimiter)?;
        let field = &self.buf[..pos];
        self.buf = &self.buf[pos + 1..];
        Ok(field)
    }
}

fn utf8(bytes: &[u8]) -> Result<String, DecodeError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| DecodeError::InvalidUtf8)
}

// ---------------------------------------------------------------------------
// Writer helpers
// ---------------------------------------------------------------------------

/// Writes a string with a 1-byte length prefix, clipping it to 255 bytes
/// on a character boundary.
fn put_short_str(out: &mut Vec<u8>, s: &str) {
    let mut end = s.len().min(u8::MAX as usize);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    out.push(end as u8);
    out.extend_from_slice(&s.as_bytes()[..end]);
}

fn put_tagged(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(tag);
    out.extend_from_slice(body);
    out
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// Parses one packet travelling in `direction`.
///
/// A tag that only exists in the other direction is reported as
/// [`DecodeError::UnknownTag`], same as a tag nobody uses. Bytes left over
/// after a fixed-size variant are ignored.
pub fn decode(bytes: &[u8], direction: Direction) -> Result<Packet, DecodeError> {
    let mut r = Reader::new(bytes);
    let tag = r.u8()?;

    use Direction::{ToClient, ToServer};
    let packet = match (tag, direction) {
        (tag::AUDIO, _) => Packet::Audio {
            frame: r.rest().to_vec(),
        },

        (tag::JOIN, ToServer) => Packet::Join {
            channel_id: ChannelId(r.u32()?),
        },
        (tag::LEAVE, ToServer) => Packet::Leave,
        (tag::MASK, ToServer) => Packet::Mask { name: r.rest_str()? },
        (tag::LIST, ToServer) => Packet::ListRequest,
        (tag::CHAT, ToServer) => Packet::Chat { text: r.rest_str()? },
        (tag::CONTROL, ToServer) => Packet::Control {
            option: r.u8()?,
            extra: r.rest().to_vec(),
        },
        (tag::SYNC_COMMANDS, ToServer) => Packet::SyncCommands,
        (tag::CONSOLE_COMMAND, ToServer) => Packet::ConsoleCommand {
            text: r.rest_str()?,
        },
        (tag::CONSOLE_REGISTER, ToServer) => Packet::ConsoleRegister {
            secret: r.rest_str()?,
        },

        (tag::LIST, ToClient) => decode_list(&mut r)?,
        (tag::CHAT, ToClient) => {
            let sender = utf8(r.until_delimiter()?)?;
            Packet::ChatRelay {
                sender,
                text: r.rest_str()?,
            }
        }
        (tag::NICK_ERROR, ToClient) => Packet::NickError,
        (tag::FLOW_JOIN, ToClient) => Packet::FlowJoin {
            username: r.rest_str()?,
        },
        (tag::FLOW_LEAVE, ToClient) => Packet::FlowLeave {
            username: r.rest_str()?,
        },
        (tag::SYNC_COMMANDS, ToClient) => decode_catalog(&mut r)?,
        (tag::COMMAND_REPLY, ToClient) => Packet::CommandReply {
            text: r.rest_str()?,
        },
        (tag::COMMAND_ERROR, ToClient) => Packet::CommandError {
            text: r.rest_str()?,
        },
        (tag::RENICK, ToClient) => Packet::Renick {
            old_mask: r.short_str()?,
            new_mask: r.short_str()?,
        },
        (tag::DM, ToClient) => Packet::Dm { text: r.rest_str()? },

        (other, _) => return Err(DecodeError::UnknownTag(other)),
    };
    Ok(packet)
}

/// `u32 unmasked, u32 masked, { mask 0x01 flags }*, 0x01`
fn decode_list(r: &mut Reader<'_>) -> Result<Packet, DecodeError> {
    let unmasked_count = r.u32()?;
    let masked_count = r.u32()?;
    let mut entries = Vec::new();

    loop {
        match r.remaining() {
            [] => return Err(DecodeError::MalformedDelimiter),
            [tag::DELIMITER] => break,
            _ => {}
        }
        let mask = utf8(r.until_delimiter()?)?;
        let flags = ListFlags::from_byte(r.u8()?);
        entries.push(ListEntry { mask, flags });
    }

    Ok(Packet::List {
        unmasked_count,
        masked_count,
        entries,
    })
}

fn decode_catalog(r: &mut Reader<'_>) -> Result<Packet, DecodeError> {
    let count = r.u16()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = r.short_str()?;
        let description = r.short_str()?;
        let usage = r.short_str()?;
        let category = r.u8()?;
        let flags = r.u8()?;
        let alias_count = r.u8()?;
        let mut aliases = Vec::with_capacity(alias_count as usize);
        for _ in 0..alias_count {
            aliases.push(r.short_str()?);
        }
        entries.push(CommandEntry {
            name,
            description,
            usage,
            category,
            flags,
            aliases,
        });
    }
    Ok(Packet::CommandCatalog { entries })
}

impl Packet {
    /// Parses a packet. Shorthand for [`decode`].
    pub fn decode(bytes: &[u8], direction: Direction) -> Result<Self, DecodeError> {
        decode(bytes, direction)
    }

    /// Serializes the packet to its wire form.
    pub fn encode(&self) -> Vec<u8> {
        let tag = self.tag();
        match self {
            Self::Leave
            | Self::ListRequest
            | Self::SyncCommands
            | Self::NickError => vec![tag],

            Self::Join { channel_id } => put_tagged(tag, &channel_id.0.to_be_bytes()),

            Self::Audio { frame } => put_tagged(tag, frame),

            Self::Mask { name: s }
            | Self::Chat { text: s }
            | Self::ConsoleCommand { text: s }
            | Self::ConsoleRegister { secret: s }
            | Self::FlowJoin { username: s }
            | Self::FlowLeave { username: s }
            | Self::CommandReply { text: s }
            | Self::CommandError { text: s }
            | Self::Dm { text: s } => put_tagged(tag, s.as_bytes()),

            Self::Control { option, extra } => {
                let mut out = Vec::with_capacity(2 + extra.len());
                out.push(tag);
                out.push(*option);
                out.extend_from_slice(extra);
                out
            }

            Self::List {
                unmasked_count,
                masked_count,
                entries,
            } => {
                let mut out = Vec::with_capacity(10 + entries.len() * 8);
                out.push(tag);
                out.extend_from_slice(&unmasked_count.to_be_bytes());
                out.extend_from_slice(&masked_count.to_be_bytes());
                for entry in entries {
                    out.extend_from_slice(entry.mask.as_bytes());
                    out.push(tag::DELIMITER);
                    out.push(entry.flags.to_byte());
                }
                out.push(tag::DELIMITER);
                out
            }

            Self::ChatRelay { sender, text } => {
                let mut out = Vec::with_capacity(2 + sender.len() + text.len());
                out.push(tag);
                out.extend_from_slice(sender.as_bytes());
                out.push(tag::DELIMITER);
                out.extend_from_slice(text.as_bytes());
                out
            }

            Self::Renick { old_mask, new_mask } => {
                let mut out = Vec::with_capacity(3 + old_mask.len() + new_mask.len());
                out.push(tag);
                put_short_str(&mut out, old_mask);
                put_short_str(&mut out, new_mask);
                out
            }

            Self::CommandCatalog { entries } => {
                let count = entries.len().min(u16::MAX as usize);
                let mut out = vec![tag];
                out.extend_from_slice(&(count as u16).to_be_bytes());
                for entry in entries.iter().take(count) {
                    put_short_str(&mut out, &entry.name);
                    put_short_str(&mut out, &entry.description);
                    put_short_str(&mut out, &entry.usage);
                    out.push(entry.category);
                    out.push(entry.flags);
                    let aliases = entry.aliases.len().min(u8::MAX as usize);
                    out.push(aliases as u8);
                    for alias in entry.aliases.iter().take(aliases) {
                        put_short_str(&mut out, alias);
                    }
                }
                out
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ConsolePacket
// ---------------------------------------------------------------------------

impl ConsolePacket {
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        match r.u8()? {
            tag::CONSOLE_COMMAND => Ok(Self::Command { text: r.rest_str()? }),
            tag::CONSOLE_EOF => Ok(Self::Eof),
            tag::CONSOLE_KEEPALIVE => Ok(Self::Keepalive),
            other => Err(DecodeError::UnknownTag(other)),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Command { text } => put_tagged(tag::CONSOLE_COMMAND, text.as_bytes()),
            Self::Eof => vec![tag::CONSOLE_EOF],
            Self::Keepalive => vec![tag::CONSOLE_KEEPALIVE],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(packet: Packet, direction: Direction) {
        let bytes = packet.encode();
        assert_eq!(decode(&bytes, direction), Ok(packet));
    }

    fn entry(mask: &str, muted: bool, deafened: bool) -> ListEntry {
        ListEntry {
            mask: mask.into(),
            flags: ListFlags { muted, deafened },
        }
    }

    // =====================================================================
    // Exact wire layouts
    // =====================================================================

    #[test]
    fn test_encode_join_is_big_endian() {
        let bytes = Packet::Join {
            channel_id: ChannelId(0x0102_0304),
        }
        .encode();
        assert_eq!(bytes, vec![0x01, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_encode_list_single_member_layout() {
        let bytes = Packet::List {
            unmasked_count: 1,
            masked_count: 0,
            entries: vec![entry("guest-1", false, false)],
        }
        .encode();

        let mut expected = vec![0x05, 0, 0, 0, 1, 0, 0, 0, 0];
        expected.extend_from_slice(b"guest-1");
        expected.extend_from_slice(&[0x01, 0x00, 0x01]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_encode_chat_relay_layout() {
        let bytes = Packet::ChatRelay {
            sender: "bob".into(),
            text: "hi".into(),
        }
        .encode();
        assert_eq!(bytes, b"\x06bob\x01hi".to_vec());
    }

    #[test]
    fn test_encode_renick_uses_length_prefixes() {
        let bytes = Packet::Renick {
            old_mask: "a".into(),
            new_mask: "bob".into(),
        }
        .encode();
        assert_eq!(bytes, b"\x10\x01a\x03bob".to_vec());
    }

    #[test]
    fn test_encode_short_str_clips_on_char_boundary() {
        // 128 two-byte characters = 256 bytes; the clip must not split one.
        let long = "é".repeat(128);
        let bytes = Packet::Renick {
            old_mask: long,
            new_mask: String::new(),
        }
        .encode();
        assert_eq!(bytes[1], 254);
        match decode(&bytes, Direction::ToClient).unwrap() {
            Packet::Renick { old_mask, new_mask } => {
                assert_eq!(old_mask, "é".repeat(127));
                assert!(new_mask.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    // =====================================================================
    // Round trips, one per variant, with boundary strings
    // =====================================================================

    #[test]
    fn test_round_trip_client_packets() {
        use Direction::ToServer;
        round_trip(Packet::Join { channel_id: ChannelId(u32::MAX) }, ToServer);
        round_trip(Packet::Leave, ToServer);
        round_trip(Packet::Mask { name: String::new() }, ToServer);
        round_trip(Packet::Mask { name: "b".into() }, ToServer);
        round_trip(Packet::ListRequest, ToServer);
        round_trip(Packet::Chat { text: "hello, world".into() }, ToServer);
        round_trip(Packet::Control { option: 0x03, extra: vec![] }, ToServer);
        round_trip(Packet::Control { option: 0x05, extra: vec![128] }, ToServer);
        round_trip(Packet::SyncCommands, ToServer);
        round_trip(Packet::ConsoleCommand { text: "status".into() }, ToServer);
        round_trip(Packet::ConsoleRegister { secret: "s3cret".into() }, ToServer);
        round_trip(Packet::Audio { frame: vec![] }, ToServer);
        round_trip(Packet::Audio { frame: vec![0xde, 0xad, 0x01] }, ToServer);
    }

    #[test]
    fn test_round_trip_server_packets() {
        use Direction::ToClient;
        round_trip(Packet::NickError, ToClient);
        round_trip(Packet::FlowJoin { username: "a".into() }, ToClient);
        round_trip(Packet::FlowLeave { username: String::new() }, ToClient);
        round_trip(Packet::Dm { text: "welcome".into() }, ToClient);
        round_trip(Packet::CommandReply { text: "ok".into() }, ToClient);
        round_trip(Packet::CommandError { text: String::new() }, ToClient);
        round_trip(
            Packet::ChatRelay {
                sender: String::new(),
                text: "text may hold \u{1} freely".into(),
            },
            ToClient,
        );
        round_trip(
            Packet::Renick {
                old_mask: "x".repeat(255),
                new_mask: String::new(),
            },
            ToClient,
        );
        round_trip(Packet::Audio { frame: vec![7; 960] }, ToClient);
    }

    #[test]
    fn test_round_trip_list_variants() {
        use Direction::ToClient;
        round_trip(
            Packet::List {
                unmasked_count: 0,
                masked_count: 0,
                entries: vec![],
            },
            ToClient,
        );
        round_trip(
            Packet::List {
                unmasked_count: 1,
                masked_count: 2,
                entries: vec![
                    entry("", true, false),
                    entry("bob", false, true),
                    entry(&"m".repeat(32), true, true),
                ],
            },
            ToClient,
        );
    }

    #[test]
    fn test_round_trip_command_catalog() {
        round_trip(
            Packet::CommandCatalog {
                entries: vec![
                    CommandEntry {
                        name: "help".into(),
                        description: "show commands".into(),
                        usage: "/help [command]".into(),
                        category: 1,
                        flags: 0,
                        aliases: vec!["h".into(), "?".into()],
                    },
                    CommandEntry::default(),
                ],
            },
            Direction::ToClient,
        );
    }

    // =====================================================================
    // Decode failures
    // =====================================================================

    #[test]
    fn test_decode_empty_returns_truncated() {
        assert_eq!(decode(&[], Direction::ToServer), Err(DecodeError::Truncated));
    }

    #[test]
    fn test_decode_short_join_returns_truncated() {
        assert_eq!(
            decode(&[0x01, 0x00, 0x00], Direction::ToServer),
            Err(DecodeError::Truncated)
        );
    }

    #[test]
    fn test_decode_control_without_option_returns_truncated() {
        assert_eq!(decode(&[0x08], Direction::ToServer), Err(DecodeError::Truncated));
    }

    #[test]
    fn test_decode_unknown_tag_returns_error() {
        assert_eq!(
            decode(&[0x42], Direction::ToServer),
            Err(DecodeError::UnknownTag(0x42))
        );
    }

    #[test]
    fn test_decode_server_only_tag_from_client_returns_unknown() {
        assert_eq!(
            decode(&[0x11, b'x'], Direction::ToServer),
            Err(DecodeError::UnknownTag(0x11))
        );
    }

    #[test]
    fn test_decode_invalid_utf8_returns_error() {
        assert_eq!(
            decode(&[0x04, 0xff, 0xfe], Direction::ToServer),
            Err(DecodeError::InvalidUtf8)
        );
    }

    #[test]
    fn test_decode_chat_relay_without_delimiter_returns_error() {
        assert_eq!(
            decode(b"\x06bob-says-hi", Direction::ToClient),
            Err(DecodeError::MalformedDelimiter)
        );
    }

    #[test]
    fn test_decode_list_without_trailer_returns_error() {
        let mut bytes = vec![0x05, 0, 0, 0, 1, 0, 0, 0, 0];
        bytes.extend_from_slice(b"bob\x01\x00");
        assert_eq!(
            decode(&bytes, Direction::ToClient),
            Err(DecodeError::MalformedDelimiter)
        );
    }

    #[test]
    fn test_decode_list_missing_flags_returns_truncated() {
        let mut bytes = vec![0x05, 0, 0, 0, 1, 0, 0, 0, 0];
        // "bob" and its delimiter, then the flags byte is missing.
        bytes.extend_from_slice(b"bob\x01");
        assert_eq!(
            decode(&bytes, Direction::ToClient),
            Err(DecodeError::Truncated)
        );
    }

    #[test]
    fn test_decode_renick_short_length_returns_truncated() {
        assert_eq!(
            decode(b"\x10\x05ab", Direction::ToClient),
            Err(DecodeError::Truncated)
        );
    }

    // =====================================================================
    // Console dialect
    // =====================================================================

    #[test]
    fn test_console_packet_round_trip() {
        for packet in [
            ConsolePacket::Command { text: "kick bob".into() },
            ConsolePacket::Eof,
            ConsolePacket::Keepalive,
        ] {
            assert_eq!(ConsolePacket::decode(&packet.encode()), Ok(packet));
        }
    }

    #[test]
    fn test_console_packet_overlapping_tags_decode_as_console() {
        // 0x03 is Leave and 0x04 is Mask for clients.
        assert_eq!(ConsolePacket::decode(&[0x03]), Ok(ConsolePacket::Eof));
        assert_eq!(ConsolePacket::decode(&[0x04]), Ok(ConsolePacket::Keepalive));
    }

    #[test]
    fn test_console_packet_client_tag_returns_unknown() {
        assert_eq!(
            ConsolePacket::decode(&[0x06, b'h']),
            Err(DecodeError::UnknownTag(0x06))
        );
    }
}
