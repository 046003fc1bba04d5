//! `VoudpServer` builder and receive loop.
//!
//! This is the entry point for running a VoUDP relay. It ties together all
//! the layers: transport → protocol → session → channel.
//!
//! ```text
//!                      ┌──────────────┐
//! socket ──recv──→     │ receive loop │ ──open()──→ session inbox ──→ session task
//!                      └──────────────┘                                │
//! socket ←──send── seal ←── reliable wrap ←── session outbox ←── channel actors
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use voudp_channel::{ChannelManager, Hook, HookDispatcher, RosterEntry};
use voudp_protocol::ChannelId;
use voudp_session::{ConsoleAuthenticator, DenyConsoles, SessionManager, SharedSecret};
use voudp_transport::{Cipher, DatagramSocket, MAX_DATAGRAM, Opened, SecretKey, UdpTransport};

use crate::handler::{SessionTask, handle_session};
use crate::{CommandHandler, NoCommands, ServerConfig, VoudpError};

/// The receive loop's route to a session task: that task's inbox.
pub(crate) type SessionLink = mpsc::Sender<Opened>;

/// Shared server state passed to each session task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The session
/// registry sits behind a `Mutex` that is only held for lookups and
/// inserts; the channel registry locks internally.
pub(crate) struct ServerState<A: ConsoleAuthenticator> {
    pub(crate) sessions: Arc<Mutex<SessionManager<SessionLink>>>,
    pub(crate) channels: Arc<ChannelManager>,
    pub(crate) socket: Arc<UdpTransport>,
    pub(crate) cipher: Cipher,
    pub(crate) auth: A,
    pub(crate) commands: Arc<dyn CommandHandler>,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting a VoUDP server.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use voudp::prelude::*;
///
/// # async fn run() -> Result<(), VoudpError> {
/// let server = VoudpServer::builder()
///     .bind("0.0.0.0:37549")
///     .passphrase("correct horse battery staple")
///     .console_secret("s3cret")
///     .hook(Arc::new(Greeter::default()))
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct VoudpServerBuilder<A: ConsoleAuthenticator = DenyConsoles> {
    bind_addr: String,
    key: Option<SecretKey>,
    passphrase: Option<String>,
    auth: A,
    hooks: HookDispatcher,
    commands: Arc<dyn CommandHandler>,
    config: ServerConfig,
}

impl VoudpServerBuilder {
    /// Creates a new builder with default settings. Consoles are refused
    /// until a secret or authenticator is configured.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:37549".to_string(),
            key: None,
            passphrase: None,
            auth: DenyConsoles,
            hooks: HookDispatcher::new(),
            commands: Arc::new(NoCommands),
            config: ServerConfig::default(),
        }
    }
}

impl Default for VoudpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ConsoleAuthenticator> VoudpServerBuilder<A> {
    /// Sets the address to bind the UDP socket to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Uses raw key material. Takes precedence over [`passphrase`](Self::passphrase).
    pub fn key(mut self, key: SecretKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Derives the key from a passphrase (PBKDF2, done once in `build`).
    pub fn passphrase(mut self, passphrase: &str) -> Self {
        self.passphrase = Some(passphrase.to_string());
        self
    }

    /// Lets consoles register with this secret.
    pub fn console_secret(self, secret: &str) -> VoudpServerBuilder<SharedSecret> {
        self.authenticator(SharedSecret::new(secret))
    }

    /// Uses a custom console authenticator.
    pub fn authenticator<B: ConsoleAuthenticator>(self, auth: B) -> VoudpServerBuilder<B> {
        VoudpServerBuilder {
            bind_addr: self.bind_addr,
            key: self.key,
            passphrase: self.passphrase,
            auth,
            hooks: self.hooks,
            commands: self.commands,
            config: self.config,
        }
    }

    /// Appends an event hook. Hooks run in the order they were added.
    pub fn hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.register(hook);
        self
    }

    /// Sets the command handler for consoles and clients.
    pub fn commands(mut self, commands: impl CommandHandler) -> Self {
        self.commands = Arc::new(commands);
        self
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the socket and assembles the server.
    ///
    /// # Errors
    /// - [`VoudpError::MissingKey`] if neither a key nor a passphrase was set
    /// - [`VoudpError::Transport`] if the socket cannot be bound
    pub async fn build(self) -> Result<VoudpServer<A>, VoudpError> {
        let key = match (self.key, self.passphrase) {
            (Some(key), _) => key,
            (None, Some(passphrase)) => SecretKey::derive(&passphrase),
            (None, None) => return Err(VoudpError::MissingKey),
        };

        let socket = Arc::new(UdpTransport::bind(&self.bind_addr).await?);

        let mut config = self.config;
        config.channel.reply_timeout = config.actor_timeout;

        let state = Arc::new(ServerState {
            sessions: Arc::new(Mutex::new(SessionManager::new(config.session.clone()))),
            channels: Arc::new(ChannelManager::new(config.channel.clone(), self.hooks)),
            socket,
            cipher: Cipher::new(&key),
            auth: self.auth,
            commands: self.commands,
            config,
        });

        Ok(VoudpServer { state })
    }
}

// ---------------------------------------------------------------------------
// VoudpServer
// ---------------------------------------------------------------------------

/// A bound VoUDP server.
///
/// Call [`run()`](Self::run) to start relaying.
pub struct VoudpServer<A: ConsoleAuthenticator = DenyConsoles> {
    state: Arc<ServerState<A>>,
}

impl VoudpServer {
    /// Creates a new builder.
    pub fn builder() -> VoudpServerBuilder {
        VoudpServerBuilder::new()
    }
}

impl<A: ConsoleAuthenticator> VoudpServer<A> {
    /// Returns the local address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, VoudpError> {
        Ok(self.state.socket.local_addr()?)
    }

    /// A read-only view of the server for monitoring and tests. Stays valid
    /// after `run()` takes the server.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            sessions: Arc::clone(&self.state.sessions),
            channels: Arc::clone(&self.state.channels),
        }
    }

    /// Runs the receive loop.
    ///
    /// Every datagram is authenticated here, then handed to the task that
    /// owns the sender's session (spawning one for a new address). Runs
    /// until the process is terminated.
    pub async fn run(self) -> Result<(), VoudpError> {
        tracing::info!(addr = ?self.state.socket.local_addr().ok(), "VoUDP server running");

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, addr) = match self.state.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    // ICMP errors from earlier sends surface here on some
                    // platforms; they are about a peer, not the socket.
                    tracing::debug!(error = %e, "receive failed");
                    continue;
                }
            };

            let opened = match self.state.cipher.open(&buf[..len]) {
                Ok(opened) => opened,
                Err(e) => {
                    tracing::trace!(%addr, error = %e, "dropping unauthenticated datagram");
                    continue;
                }
            };

            self.route(addr, opened).await;
        }
    }

    /// Delivers an authenticated datagram to its session task.
    async fn route(&self, addr: SocketAddr, opened: Opened) {
        let spawned = {
            let mut sessions = self.state.sessions.lock().await;
            match sessions.get(&addr) {
                Some(entry) => {
                    if entry.link.try_send(opened).is_err() {
                        tracing::trace!(%addr, session = %entry.id, "session inbox full; datagram dropped");
                    }
                    return;
                }
                None => {
                    let (link, inbox) = mpsc::channel(self.state.config.inbox_capacity.max(1));
                    match sessions.open(addr, link.clone()) {
                        Ok(id) => {
                            // Fresh queue: this cannot be full.
                            let _ = link.try_send(opened);
                            (id, inbox)
                        }
                        Err(e) => {
                            tracing::debug!(%addr, error = %e, "refusing new session");
                            return;
                        }
                    }
                }
            }
        };

        let (id, inbox) = spawned;
        let task = SessionTask::new(id, addr, Arc::clone(&self.state));
        tokio::spawn(handle_session(task, inbox));
    }
}

// ---------------------------------------------------------------------------
// ServerHandle
// ---------------------------------------------------------------------------

/// Cheap, cloneable view of a server's registries.
#[derive(Clone)]
pub struct ServerHandle {
    sessions: Arc<Mutex<SessionManager<SessionLink>>>,
    channels: Arc<ChannelManager>,
}

impl ServerHandle {
    /// Open sessions, consoles included.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Addresses of every registered console.
    pub async fn consoles(&self) -> Vec<SocketAddr> {
        self.sessions.lock().await.consoles()
    }

    /// Ids of every channel that currently has members, ascending.
    pub async fn channel_ids(&self) -> Vec<ChannelId> {
        self.channels.channel_ids().await
    }

    /// Members of `channel` in join order. Empty for a channel that does
    /// not exist.
    pub async fn roster(&self, channel: ChannelId) -> Result<Vec<RosterEntry>, VoudpError> {
        match self.channels.get(channel).await {
            Some(handle) => Ok(handle.roster().await?),
            None => Ok(Vec::new()),
        }
    }
}
