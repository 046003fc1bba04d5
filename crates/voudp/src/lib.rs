//! # VoUDP
//!
//! Encrypted voice-over-UDP relay engine.
//!
//! A server keeps one session per client address, relays audio and chat
//! between the members of numbered channels, and lets operators shape what
//! happens through event hooks and a command handler. Every datagram is
//! sealed with ChaCha20-Poly1305; control traffic that must arrive rides a
//! small ACK/retransmit layer.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voudp::prelude::*;
//!
//! # async fn run() -> Result<(), VoudpError> {
//! let mut commands = CommandRegistry::new();
//! commands.register(
//!     CommandEntry {
//!         name: "ping".into(),
//!         ..Default::default()
//!     },
//!     |_, _| CommandOutcome::Reply("pong".into()),
//! );
//!
//! let server = VoudpServer::builder()
//!     .bind("0.0.0.0:37549")
//!     .passphrase("correct horse battery staple")
//!     .hook(Arc::new(WordFilter::new(WordFilterConfig::default())))
//!     .commands(commands)
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod command;
mod config;
mod error;
mod handler;
mod server;

pub use command::{CommandFn, CommandHandler, CommandOutcome, CommandRegistry, Invoker, NoCommands};
pub use config::ServerConfig;
pub use error::VoudpError;
pub use server::{ServerHandle, VoudpServer, VoudpServerBuilder};

pub use voudp_channel::{
    Action, ActionKind, ChannelConfig, ChannelError, Greeter, Hook, HookContext, RosterEntry,
    WordFilter, WordFilterConfig,
};
pub use voudp_protocol::{ChannelId, CommandEntry, ListFlags, SessionId};
pub use voudp_session::{
    ConsoleAuthenticator, DenyConsoles, SessionConfig, SessionError, SharedSecret,
};
pub use voudp_transport::{ReliableConfig, SecretKey};

/// Everything needed to build and run a server and write hooks or commands.
pub mod prelude {
    pub use crate::{
        Action, ActionKind, ChannelId, CommandEntry, CommandHandler, CommandOutcome,
        CommandRegistry, ConsoleAuthenticator, Greeter, Hook, HookContext, Invoker, SecretKey,
        ServerConfig, ServerHandle, SessionError, SessionId, VoudpError, VoudpServer,
        VoudpServerBuilder, WordFilter, WordFilterConfig,
    };
}
