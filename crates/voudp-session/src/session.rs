//! Session types: the server's record of one remote endpoint.
//!
//! A session tracks:
//! - WHO the peer is (`SessionId`, address, display mask)
//! - WHAT state it is in (unjoined, in a channel, closed)
//! - HOW it presents itself to others (mute/deaf flags, volume)
//!
//! The transition rules live here as plain methods so they can be tested
//! without sockets or tasks. The session handler calls `begin_*` to check a
//! request, does the channel round-trip, then calls `commit_*`.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use voudp_protocol::{ChannelId, ControlOption, ListFlags, SessionId, default_mask};

use crate::SessionError;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
///
/// Sensible defaults are provided; override the fields you care about with
/// struct update syntax: `SessionConfig { idle_timeout, ..Default::default() }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// A session with no authenticated traffic for this long is closed.
    /// Consoles keep themselves alive with Keepalive packets.
    pub idle_timeout: Duration,

    /// Upper bound on concurrent sessions. Datagrams from new addresses
    /// beyond it are dropped.
    pub max_sessions: usize,

    /// Sent as a DM after a session's first successful Join.
    pub welcome_message: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(10),
            max_sessions: 1024,
            welcome_message: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionKind / SessionState
// ---------------------------------------------------------------------------

/// Whether a session is a voice client or an administration console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionKind {
    #[default]
    Client,
    Console,
}

/// The lifecycle state of a session.
///
/// ```text
///            Join(c)               Join(d)
/// Unjoined ──────────→ Joined(c) ──────────→ Joined(d)
///    │                    │
///    └──── Leave ─────────┴──── Leave / kick / timeout ───→ Closed
/// ```
///
/// `Joined` always names a channel in which the session is currently a
/// member: the handler commits the state only after the channel accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unjoined,
    Joined(ChannelId),
    Closed,
}

/// What a Join request needs before it can be committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPlan {
    /// Not in any channel yet.
    Fresh,
    /// Leave `from` first, then join.
    Switch { from: ChannelId },
    /// Already a member of the requested channel.
    AlreadyThere,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A single endpoint's session.
///
/// Owned by exactly one task (the session handler), so plain fields and
/// `&mut self` are enough; nothing here is shared.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub addr: SocketAddr,
    kind: SessionKind,
    state: SessionState,

    /// The name other members see.
    pub mask: String,
    /// `true` once the user picked a mask; default `guest-N` masks are
    /// unmasked.
    pub masked: bool,

    pub muted: bool,
    pub deafened: bool,
    /// Client-requested playback volume, 0–255. Stored and reported only;
    /// the engine does no mixing.
    pub volume: u8,

    /// Whether the welcome DM was already sent.
    pub greeted: bool,
}

impl Session {
    pub fn new(id: SessionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            kind: SessionKind::Client,
            state: SessionState::Unjoined,
            mask: default_mask(id),
            masked: false,
            muted: false,
            deafened: false,
            volume: u8::MAX,
            greeted: false,
        }
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn channel(&self) -> Option<ChannelId> {
        match self.state {
            SessionState::Joined(channel) => Some(channel),
            _ => None,
        }
    }

    pub fn is_console(&self) -> bool {
        self.kind == SessionKind::Console
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    // -- transitions ------------------------------------------------------

    /// Checks whether a Join to `channel` is allowed and what it involves.
    pub fn begin_join(&self, channel: ChannelId) -> Result<JoinPlan, SessionError> {
        if self.is_console() {
            return Err(SessionError::ProtocolViolation("consoles cannot join channels"));
        }
        match self.state {
            SessionState::Unjoined => Ok(JoinPlan::Fresh),
            SessionState::Joined(current) if current == channel => Ok(JoinPlan::AlreadyThere),
            SessionState::Joined(current) => Ok(JoinPlan::Switch { from: current }),
            SessionState::Closed => Err(SessionError::ProtocolViolation("session closed")),
        }
    }

    /// Records that the channel accepted the session.
    ///
    /// The channel may have reset the mask (collision in the new channel),
    /// so the accepted mask is stored as given.
    pub fn commit_join(&mut self, channel: ChannelId, mask: String, masked: bool) {
        self.state = SessionState::Joined(channel);
        self.mask = mask;
        self.masked = masked;
    }

    /// Records that the session left its channel but stays open (the first
    /// half of a channel switch, or a switch whose second half was refused).
    pub fn commit_leave(&mut self) {
        if matches!(self.state, SessionState::Joined(_)) {
            self.state = SessionState::Unjoined;
        }
    }

    /// Terminal. Returns the channel the session was in, if any, so the
    /// caller can release the membership.
    pub fn close(&mut self) -> Option<ChannelId> {
        let channel = self.channel();
        self.state = SessionState::Closed;
        channel
    }

    /// Channel-scoped packets (Mask, Control, Chat, Audio) need a channel.
    pub fn require_joined(&self) -> Result<ChannelId, SessionError> {
        self.channel()
            .ok_or(SessionError::ProtocolViolation("not in a channel"))
    }

    /// Turns an unjoined client into a console.
    pub fn promote_to_console(&mut self) -> Result<(), SessionError> {
        match (self.kind, self.state) {
            (SessionKind::Client, SessionState::Unjoined) => {
                self.kind = SessionKind::Console;
                Ok(())
            }
            (SessionKind::Console, _) => {
                Err(SessionError::ProtocolViolation("already a console"))
            }
            _ => Err(SessionError::ProtocolViolation(
                "console registration requires an unjoined session",
            )),
        }
    }

    // -- profile ----------------------------------------------------------

    pub fn set_mask(&mut self, mask: String) {
        self.mask = mask;
        self.masked = true;
    }

    pub fn reset_mask(&mut self) {
        self.mask = default_mask(self.id);
        self.masked = false;
    }

    /// Applies a Control option. Returns `true` if the List-visible flags
    /// changed.
    pub fn apply_control(&mut self, option: ControlOption, extra: &[u8]) -> bool {
        let before = self.flags();
        match option {
            ControlOption::Deafen => self.deafened = true,
            ControlOption::Undeafen => self.deafened = false,
            ControlOption::Mute => self.muted = true,
            ControlOption::Unmute => self.muted = false,
            ControlOption::SetVolume => {
                if let Some(&volume) = extra.first() {
                    self.volume = volume;
                }
            }
        }
        self.flags() != before
    }

    pub fn flags(&self) -> ListFlags {
        ListFlags {
            muted: self.muted,
            deafened: self.deafened,
        }
    }
}
