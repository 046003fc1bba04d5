//! At-least-once delivery on top of lossy datagrams.
//!
//! Reliable packets get a sequence header inside the encrypted payload:
//!
//! ```text
//! RELIABLE: 0x80 ‖ seq (u32 BE) ‖ inner packet
//! ACK:      0x81 ‖ seq (u32 BE)
//! ```
//!
//! The sublayer confirms delivery. It does not reorder: whatever arrives is
//! handed up in arrival order, duplicates filtered out.
//!
//! Both halves are plain state machines driven by the caller's clock, so the
//! session task decides when to poll and tests can step time explicitly.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::window::{Seen, SlidingWindow};
use crate::{FrameError, ReliabilityTimeout};

/// Leading byte of a reliable frame.
pub const RELIABLE: u8 = 0x80;
/// Leading byte of an acknowledgment.
pub const ACK: u8 = 0x81;

const HEADER_LEN: usize = 5;

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// What a decrypted payload turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    Reliable { seq: u32, inner: &'a [u8] },
    Ack { seq: u32 },
    /// A bare packet outside the reliable sublayer.
    Raw(&'a [u8]),
}

impl<'a> Frame<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, FrameError> {
        match bytes.first() {
            Some(&RELIABLE) => Ok(Self::Reliable {
                seq: read_seq(bytes)?,
                inner: &bytes[HEADER_LEN..],
            }),
            Some(&ACK) => Ok(Self::Ack {
                seq: read_seq(bytes)?,
            }),
            _ => Ok(Self::Raw(bytes)),
        }
    }
}

fn read_seq(bytes: &[u8]) -> Result<u32, FrameError> {
    let seq = bytes.get(1..HEADER_LEN).ok_or(FrameError)?;
    Ok(u32::from_be_bytes([seq[0], seq[1], seq[2], seq[3]]))
}

pub fn encode_reliable(seq: u32, inner: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + inner.len());
    out.push(RELIABLE);
    out.extend_from_slice(&seq.to_be_bytes());
    out.extend_from_slice(inner);
    out
}

pub fn encode_ack(seq: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN);
    out.push(ACK);
    out.extend_from_slice(&seq.to_be_bytes());
    out
}

// ---------------------------------------------------------------------------
// ReliableConfig
// ---------------------------------------------------------------------------

/// Retransmission tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliableConfig {
    /// How long to wait for an ACK before resending.
    pub ack_timeout: Duration,

    /// How many times a packet is resent before the peer is declared
    /// unreachable.
    pub max_retries: u32,
}

impl Default for ReliableConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(100),
            max_retries: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// ReliableSender
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Pending {
    bytes: Vec<u8>,
    sent_at: Instant,
    retries: u32,
}

/// A frame whose ACK is overdue, to be sent again as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retransmit {
    pub seq: u32,
    pub bytes: Vec<u8>,
    /// How many times this frame has now been resent.
    pub attempt: u32,
}

/// Outbound half: sequence allocation and the pending-ACK table.
#[derive(Debug)]
pub struct ReliableSender {
    next_seq: u32,
    pending: BTreeMap<u32, Pending>,
    config: ReliableConfig,
}

impl ReliableSender {
    pub fn new(config: ReliableConfig) -> Self {
        Self {
            next_seq: 1,
            pending: BTreeMap::new(),
            config,
        }
    }

    /// Wraps `inner` with the next sequence number and remembers it until
    /// acknowledged. Returns the sequence and the bytes to transmit.
    pub fn wrap(&mut self, inner: &[u8], now: Instant) -> (u32, Vec<u8>) {
        let seq = self.next_seq;
        // Zero is never allocated, so a wrapped counter skips it.
        self.next_seq = self.next_seq.checked_add(1).unwrap_or(1);

        let bytes = encode_reliable(seq, inner);
        self.pending.insert(
            seq,
            Pending {
                bytes: bytes.clone(),
                sent_at: now,
                retries: 0,
            },
        );
        (seq, bytes)
    }

    /// Marks `seq` delivered. Returns `false` for duplicate or unknown ACKs,
    /// which change nothing.
    pub fn acknowledge(&mut self, seq: u32) -> bool {
        self.pending.remove(&seq).is_some()
    }

    /// Collects every pending frame whose ACK is overdue.
    ///
    /// Fails once any frame that already used its retry budget times out
    /// again; the caller tears the session down.
    pub fn poll(&mut self, now: Instant) -> Result<Vec<Retransmit>, ReliabilityTimeout> {
        let mut due = Vec::new();
        for (&seq, pending) in self.pending.iter_mut() {
            if now.duration_since(pending.sent_at) < self.config.ack_timeout {
                continue;
            }
            if pending.retries >= self.config.max_retries {
                return Err(ReliabilityTimeout {
                    seq,
                    attempts: pending.retries + 1,
                });
            }
            pending.retries += 1;
            pending.sent_at = now;
            due.push(Retransmit {
                seq,
                bytes: pending.bytes.clone(),
                attempt: pending.retries,
            });
        }
        Ok(due)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drops every pending record. Called when the session closes.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

// ---------------------------------------------------------------------------
// ReliableReceiver
// ---------------------------------------------------------------------------

/// What the receiver made of an inbound reliable frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// First copy: ACK it and hand the packet up.
    Deliver,
    /// Already delivered: ACK it again (our previous ACK was probably
    /// lost) but drop the packet.
    Duplicate,
    /// Too old to know whether it was delivered. Neither ACK nor deliver,
    /// so the sender keeps retrying or gives up on its own.
    Stale,
}

impl Delivery {
    /// Whether the frame should be acknowledged.
    pub fn should_ack(self) -> bool {
        self != Self::Stale
    }
}

/// Inbound half: remembers which sequences were already delivered.
#[derive(Debug, Default)]
pub struct ReliableReceiver {
    delivered: SlidingWindow,
}

impl ReliableReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, seq: u32) -> Delivery {
        match self.delivered.record(u64::from(seq)) {
            Seen::New => Delivery::Deliver,
            Seen::Duplicate => Delivery::Duplicate,
            Seen::Stale => Delivery::Stale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_frame_parse_reliable() {
        let bytes = encode_reliable(7, b"\x0dstatus");
        assert_eq!(
            Frame::parse(&bytes),
            Ok(Frame::Reliable {
                seq: 7,
                inner: b"\x0dstatus"
            })
        );
    }

    #[test]
    fn test_frame_parse_ack() {
        assert_eq!(Frame::parse(&encode_ack(9)), Ok(Frame::Ack { seq: 9 }));
    }

    #[test]
    fn test_frame_parse_raw_passes_through() {
        assert_eq!(Frame::parse(b"\x02abc"), Ok(Frame::Raw(b"\x02abc")));
        assert_eq!(Frame::parse(b""), Ok(Frame::Raw(b"")));
    }

    #[test]
    fn test_frame_parse_truncated_header_returns_error() {
        assert_eq!(Frame::parse(&[RELIABLE, 0, 0]), Err(FrameError));
        assert_eq!(Frame::parse(&[ACK]), Err(FrameError));
    }

    #[test]
    fn test_wrap_assigns_increasing_sequences_from_one() {
        let mut sender = ReliableSender::new(ReliableConfig::default());
        let now = Instant::now();
        assert_eq!(sender.wrap(b"a", now).0, 1);
        assert_eq!(sender.wrap(b"b", now).0, 2);
        assert_eq!(sender.pending_len(), 2);
    }

    #[test]
    fn test_acknowledge_duplicate_is_noop() {
        let mut sender = ReliableSender::new(ReliableConfig::default());
        let (seq, _) = sender.wrap(b"a", Instant::now());

        assert!(sender.acknowledge(seq));
        assert!(!sender.acknowledge(seq));
        assert!(!sender.acknowledge(999));
        assert_eq!(sender.pending_len(), 0);
    }

    #[test]
    fn test_poll_before_timeout_sends_nothing() {
        let mut sender = ReliableSender::new(ReliableConfig::default());
        let start = Instant::now();
        sender.wrap(b"a", start);
        assert!(sender.poll(start + ms(99)).unwrap().is_empty());
    }

    #[test]
    fn test_poll_resends_identical_bytes_with_same_sequence() {
        // Burn sequences 1..=6 so the packet under test gets 7.
        let mut sender = ReliableSender::new(ReliableConfig::default());
        let start = Instant::now();
        for _ in 0..6 {
            let (seq, _) = sender.wrap(b"x", start);
            sender.acknowledge(seq);
        }

        let inner = b"\x0dstatus";
        let (seq, original) = sender.wrap(inner, start);
        assert_eq!(seq, 7);

        let due = sender.poll(start + ms(100)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].seq, 7);
        assert_eq!(due[0].bytes, original);
        assert_eq!(due[0].attempt, 1);
        assert_eq!(
            Frame::parse(&due[0].bytes),
            Ok(Frame::Reliable { seq: 7, inner })
        );
    }

    #[test]
    fn test_poll_acked_packet_not_resent() {
        let mut sender = ReliableSender::new(ReliableConfig::default());
        let start = Instant::now();
        let (seq, _) = sender.wrap(b"a", start);
        sender.acknowledge(seq);
        assert!(sender.poll(start + ms(500)).unwrap().is_empty());
    }

    #[test]
    fn test_poll_after_retry_ceiling_returns_timeout() {
        let config = ReliableConfig {
            ack_timeout: ms(100),
            max_retries: 3,
        };
        let mut sender = ReliableSender::new(config);
        let mut now = Instant::now();
        let (seq, _) = sender.wrap(b"a", now);

        for attempt in 1..=3 {
            now += ms(100);
            let due = sender.poll(now).unwrap();
            assert_eq!(due[0].attempt, attempt);
        }

        now += ms(100);
        assert_eq!(
            sender.poll(now),
            Err(ReliabilityTimeout { seq, attempts: 4 })
        );
    }

    #[test]
    fn test_clear_releases_pending() {
        let mut sender = ReliableSender::new(ReliableConfig::default());
        let start = Instant::now();
        sender.wrap(b"a", start);
        sender.wrap(b"b", start);
        sender.clear();
        assert_eq!(sender.pending_len(), 0);
        assert!(sender.poll(start + ms(1_000)).unwrap().is_empty());
    }

    #[test]
    fn test_receiver_delivers_once_in_any_order() {
        let mut receiver = ReliableReceiver::new();
        assert_eq!(receiver.accept(2), Delivery::Deliver);
        assert_eq!(receiver.accept(1), Delivery::Deliver);
        assert_eq!(receiver.accept(2), Delivery::Duplicate);
        assert_eq!(receiver.accept(1), Delivery::Duplicate);
        assert_eq!(receiver.accept(3), Delivery::Deliver);
    }

    #[test]
    fn test_receiver_accept_beyond_window_is_not_acked() {
        let mut receiver = ReliableReceiver::new();
        for seq in 2..=70 {
            assert_eq!(receiver.accept(seq), Delivery::Deliver);
        }

        // seq 1 never arrived, but it is now outside the window.
        let late = receiver.accept(1);
        assert_eq!(late, Delivery::Stale);
        assert!(!late.should_ack());
        assert!(receiver.accept(70).should_ack());
    }

    #[test]
    fn test_reliable_config_default_values() {
        let config = ReliableConfig::default();
        assert_eq!(config.ack_timeout, ms(100));
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn test_reliable_config_partial_json_keeps_defaults() {
        let config: ReliableConfig = serde_json::from_str(r#"{"max_retries": 2}"#).unwrap();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.ack_timeout, ms(100));

        let json = serde_json::to_string(&config).unwrap();
        let back: ReliableConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ack_timeout, config.ack_timeout);
    }
}
