//! Channel management for VoUDP.
//!
//! This crate handles the shared spaces sessions talk in:
//!
//! 1. **Channel actors**: one Tokio task per live channel owning its
//!    ordered member list ([`ChannelHandle`], [`spawn_channel`])
//! 2. **Channel registry**: create on first Join, retire when empty
//!    ([`ChannelManager`])
//! 3. **Event hooks**: operator logic that can cancel, reply or kick
//!    ([`Hook`], [`HookDispatcher`], [`WordFilter`], [`Greeter`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)  ← session handlers send requests to channel actors
//!     ↕
//! Channel Layer (this crate)  ← membership, relay, hooks
//!     ↕
//! Protocol Layer (below)  ← Packet, ListEntry, mask rules
//! ```

mod channel;
mod config;
mod error;
mod hook;
mod hooks;
mod manager;

pub use channel::{
    ChannelHandle, JoinAccepted, Member, MemberReceiver, MemberSender, RosterEntry, Verdict,
    member_outbox, spawn_channel,
};
pub use config::ChannelConfig;
pub use error::ChannelError;
pub use hook::{Action, ActionKind, Dispatch, Hook, HookContext, HookDispatcher};
pub use hooks::{Greeter, WordFilter, WordFilterConfig};
pub use manager::ChannelManager;
