//! The session registry: which remote addresses currently have a session.
//!
//! The receive loop consults it for every datagram to find the task that
//! owns the sender's session. It stores a caller-chosen "link" per entry
//! (in the server, the sending half of that task's inbox), which keeps
//! this crate free of the server's plumbing types.
//!
//! # Concurrency note
//!
//! `SessionManager` is NOT thread-safe by itself: it is a plain `HashMap`.
//! The server keeps it behind a mutex and holds that lock only for a lookup
//! or an insert, never across an `.await` on network I/O or a channel.

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::time::Instant;
use voudp_protocol::SessionId;

use crate::{SessionConfig, SessionError, SessionKind};

/// One registered session.
#[derive(Debug)]
pub struct SessionEntry<L> {
    pub id: SessionId,
    pub kind: SessionKind,
    pub link: L,
    pub opened_at: Instant,
}

/// Tracks every open session, keyed by remote address.
///
/// ## Lifecycle
///
/// ```text
/// first datagram ──→ open() ──→ [registered] ──→ close()
///                                   │
///                         ConsoleRegister ok ──→ set_kind(Console)
/// ```
#[derive(Debug)]
pub struct SessionManager<L> {
    sessions: HashMap<SocketAddr, SessionEntry<L>>,
    next_id: u64,
    config: SessionConfig,
}

impl<L> SessionManager<L> {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            next_id: 1,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Registers a new session for `addr` and allocates its id.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyOpen`]: `addr` already has a session
    /// - [`SessionError::Full`]: `max_sessions` reached
    pub fn open(&mut self, addr: SocketAddr, link: L) -> Result<SessionId, SessionError> {
        if self.sessions.contains_key(&addr) {
            return Err(SessionError::AlreadyOpen(addr));
        }
        if self.sessions.len() >= self.config.max_sessions {
            return Err(SessionError::Full {
                max: self.config.max_sessions,
            });
        }

        let id = SessionId(self.next_id);
        self.next_id += 1;
        self.sessions.insert(
            addr,
            SessionEntry {
                id,
                kind: SessionKind::Client,
                link,
                opened_at: Instant::now(),
            },
        );
        tracing::info!(session = %id, %addr, "session opened");
        Ok(id)
    }

    /// Removes the session for `addr`, but only if it is still session
    /// `id`. A late cleanup from an old session can't remove a newer one
    /// that reused the address.
    pub fn close(&mut self, addr: SocketAddr, id: SessionId) -> Option<SessionEntry<L>> {
        match self.sessions.get(&addr) {
            Some(entry) if entry.id == id => {
                tracing::info!(session = %id, %addr, "session closed");
                self.sessions.remove(&addr)
            }
            _ => None,
        }
    }

    pub fn set_kind(&mut self, addr: SocketAddr, kind: SessionKind) -> Result<(), SessionError> {
        let entry = self
            .sessions
            .get_mut(&addr)
            .ok_or(SessionError::NotFound(addr))?;
        entry.kind = kind;
        Ok(())
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&SessionEntry<L>> {
        self.sessions.get(addr)
    }

    /// Addresses of every registered console.
    pub fn consoles(&self) -> Vec<SocketAddr> {
        self.sessions
            .iter()
            .filter(|(_, entry)| entry.kind == SessionKind::Console)
            .map(|(addr, _)| *addr)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
