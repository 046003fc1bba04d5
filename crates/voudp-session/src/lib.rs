//! Session management for VoUDP.
//!
//! This crate handles the lifecycle of remote endpoints:
//!
//! 1. **Session state**: the per-endpoint state machine and profile
//!    ([`Session`], [`SessionState`])
//! 2. **Session tracking**: knowing which addresses are live
//!    ([`SessionManager`])
//! 3. **Console registration**: deciding who may administer the server
//!    ([`ConsoleAuthenticator`], [`SharedSecret`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Channel Layer (above)  ← members are sessions that joined a channel
//!     ↕
//! Session Layer (this crate)  ← identity, masks, flags, lifecycle
//!     ↕
//! Protocol Layer (below)  ← SessionId, ChannelId, mask rules
//! ```

mod auth;
mod error;
mod manager;
mod session;

pub use auth::{ConsoleAuthenticator, DenyConsoles, SharedSecret};
pub use error::SessionError;
pub use manager::{SessionEntry, SessionManager};
pub use session::{JoinPlan, Session, SessionConfig, SessionKind, SessionState};
