//! The `Hook` trait: the main extension point for server operators.
//!
//! A hook observes member actions before they take effect and may:
//! - **cancel** the action (Join, Message, Renick; Leave is observe-only)
//! - **reply** privately to the acting member (delivered as DMs)
//! - **kick** the acting member with a reason
//!
//! Hooks run inside the channel actor, in registration order, so they see
//! actions in exactly the order the channel commits them. Keep them fast:
//! a slow hook stalls its channel (but never another one).
//!
//! ```text
//! member action ──→ HookDispatcher::dispatch ──→ hook 1 ──→ hook 2 ──→ ...
//!                                                   │
//!                                 cancel / kick ────┘ (stops the chain)
//! ```

use std::net::SocketAddr;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use voudp_protocol::{ChannelId, SessionId};

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// The kind of member action being dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Join,
    Message { text: String },
    Leave,
    Renick { new_mask: String },
}

impl ActionKind {
    /// Leave always goes through; hooks only get to watch it.
    pub fn is_cancellable(&self) -> bool {
        !matches!(self, ActionKind::Leave)
    }
}

/// A member action, as seen by hooks.
///
/// `username` is the member's mask at the time of the action (for Renick,
/// the mask before the change).
#[derive(Debug, Clone)]
pub struct Action {
    pub kind: ActionKind,
    pub session: SessionId,
    pub addr: SocketAddr,
    pub channel: ChannelId,
    pub username: String,
}

// ---------------------------------------------------------------------------
// HookContext
// ---------------------------------------------------------------------------

/// What a hook can read and decide about the current action.
///
/// The same context is threaded through every hook in the chain, so a later
/// hook sees replies queued by an earlier one.
#[derive(Debug)]
pub struct HookContext<'a> {
    action: &'a Action,
    cancelled: bool,
    replies: Vec<String>,
    kick: Option<String>,
}

impl<'a> HookContext<'a> {
    fn new(action: &'a Action) -> Self {
        Self {
            action,
            cancelled: false,
            replies: Vec::new(),
            kick: None,
        }
    }

    pub fn action(&self) -> &ActionKind {
        &self.action.kind
    }

    pub fn session(&self) -> SessionId {
        self.action.session
    }

    pub fn get_addr(&self) -> SocketAddr {
        self.action.addr
    }

    pub fn get_channel_id(&self) -> ChannelId {
        self.action.channel
    }

    pub fn get_username(&self) -> &str {
        &self.action.username
    }

    /// The chat text for Message actions, the requested mask for Renick.
    pub fn get_message(&self) -> Option<&str> {
        match &self.action.kind {
            ActionKind::Message { text } => Some(text),
            ActionKind::Renick { new_mask } => Some(new_mask),
            ActionKind::Join | ActionKind::Leave => None,
        }
    }

    /// Stops the action from taking effect. Ignored for Leave.
    pub fn cancel(&mut self) {
        if self.action.kind.is_cancellable() {
            self.cancelled = true;
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Queues a private message to the acting member.
    pub fn reply(&mut self, text: impl Into<String>) {
        self.replies.push(text.into());
    }

    /// Removes the acting member from the server. The reason is delivered
    /// to them before their session closes. Ignored for Leave.
    pub fn kick(&mut self, reason: impl Into<String>) {
        if self.action.kind.is_cancellable() {
            self.kick = Some(reason.into());
        }
    }

    fn stops_chain(&self) -> bool {
        self.cancelled || self.kick.is_some()
    }
}

// ---------------------------------------------------------------------------
// Hook
// ---------------------------------------------------------------------------

/// An event hook. Every method defaults to a no-op, so implementors only
/// write the events they care about.
///
/// Hooks are shared by every channel actor, so any per-user state they
/// keep needs interior mutability (a `Mutex` is fine; hooks run off the
/// network path).
pub trait Hook: Send + Sync + 'static {
    /// Used in logs.
    fn name(&self) -> &str;

    fn on_join(&self, _ctx: &mut HookContext<'_>) {}

    fn on_message(&self, _ctx: &mut HookContext<'_>) {}

    fn on_leave(&self, _ctx: &mut HookContext<'_>) {}

    fn on_renick(&self, _ctx: &mut HookContext<'_>) {}
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// The combined decision of every hook that ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dispatch {
    pub cancelled: bool,
    pub replies: Vec<String>,
    pub kick: Option<String>,
}

/// The ordered list of registered hooks.
#[derive(Clone, Default)]
pub struct HookDispatcher {
    hooks: Vec<Arc<dyn Hook>>,
}

impl std::fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|hook| hook.name()))
            .finish()
    }
}

impl HookDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every hook for `action` in registration order.
    ///
    /// The first cancel or kick stops the chain. A hook that panics is
    /// logged and treated as if it had done nothing: anything it changed
    /// in the context before panicking is rolled back.
    pub fn dispatch(&self, action: &Action) -> Dispatch {
        let mut ctx = HookContext::new(action);

        for hook in &self.hooks {
            let replies_before = ctx.replies.len();
            let (cancelled_before, kick_before) = (ctx.cancelled, ctx.kick.clone());

            let outcome = catch_unwind(AssertUnwindSafe(|| match &action.kind {
                ActionKind::Join => hook.on_join(&mut ctx),
                ActionKind::Message { .. } => hook.on_message(&mut ctx),
                ActionKind::Leave => hook.on_leave(&mut ctx),
                ActionKind::Renick { .. } => hook.on_renick(&mut ctx),
            }));

            if outcome.is_err() {
                tracing::error!(
                    hook = hook.name(),
                    session = %action.session,
                    channel = %action.channel,
                    "hook panicked; ignoring it for this action"
                );
                ctx.replies.truncate(replies_before);
                ctx.cancelled = cancelled_before;
                ctx.kick = kick_before;
                continue;
            }

            if ctx.stops_chain() {
                tracing::debug!(
                    hook = hook.name(),
                    session = %action.session,
                    cancelled = ctx.cancelled,
                    kicked = ctx.kick.is_some(),
                    "hook stopped the action"
                );
                break;
            }
        }

        Dispatch {
            cancelled: ctx.cancelled,
            replies: ctx.replies,
            kick: ctx.kick,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Naming convention: `test_{function}_{scenario}_{expected}`.

    use std::sync::Mutex;

    use super::*;

    fn action(kind: ActionKind) -> Action {
        Action {
            kind,
            session: SessionId(1),
            addr: "127.0.0.1:5000".parse().unwrap(),
            channel: ChannelId(1),
            username: "alice".into(),
        }
    }

    /// Records the names of hooks as they run.
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        cancel: bool,
    }

    impl Hook for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn on_message(&self, ctx: &mut HookContext<'_>) {
            self.log.lock().unwrap().push(self.name);
            ctx.reply(format!("seen by {}", self.name));
            if self.cancel {
                ctx.cancel();
            }
        }

        fn on_leave(&self, ctx: &mut HookContext<'_>) {
            self.log.lock().unwrap().push(self.name);
            ctx.cancel();
            ctx.kick("nope");
        }
    }

    struct Panicker;

    impl Hook for Panicker {
        fn name(&self) -> &str {
            "panicker"
        }

        fn on_message(&self, ctx: &mut HookContext<'_>) {
            ctx.cancel();
            ctx.reply("half-done");
            panic!("hook bug");
        }
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>, cancel: bool) -> Arc<dyn Hook> {
        Arc::new(Recorder {
            name,
            log: Arc::clone(log),
            cancel,
        })
    }

    #[test]
    fn test_dispatch_no_hooks_returns_default() {
        let dispatcher = HookDispatcher::new();
        let out = dispatcher.dispatch(&action(ActionKind::Join));
        assert_eq!(out, Dispatch::default());
    }

    #[test]
    fn test_dispatch_runs_hooks_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = HookDispatcher::new();
        dispatcher.register(recorder("a", &log, false));
        dispatcher.register(recorder("b", &log, false));

        let out = dispatcher.dispatch(&action(ActionKind::Message { text: "hi".into() }));

        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(out.replies, vec!["seen by a", "seen by b"]);
        assert!(!out.cancelled);
    }

    #[test]
    fn test_dispatch_cancel_stops_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = HookDispatcher::new();
        dispatcher.register(recorder("a", &log, true));
        dispatcher.register(recorder("b", &log, false));

        let out = dispatcher.dispatch(&action(ActionKind::Message { text: "hi".into() }));

        assert!(out.cancelled);
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_dispatch_leave_ignores_cancel_and_kick() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = HookDispatcher::new();
        dispatcher.register(recorder("a", &log, false));
        dispatcher.register(recorder("b", &log, false));

        let out = dispatcher.dispatch(&action(ActionKind::Leave));

        assert!(!out.cancelled);
        assert!(out.kick.is_none());
        // Nothing stopped the chain.
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_dispatch_panicking_hook_is_rolled_back() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = HookDispatcher::new();
        dispatcher.register(Arc::new(Panicker));
        dispatcher.register(recorder("after", &log, false));

        let out = dispatcher.dispatch(&action(ActionKind::Message { text: "hi".into() }));

        assert!(!out.cancelled);
        assert_eq!(out.replies, vec!["seen by after"]);
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }

    #[test]
    fn test_context_message_exposes_text_and_new_mask() {
        let msg = action(ActionKind::Message { text: "hello".into() });
        assert_eq!(HookContext::new(&msg).get_message(), Some("hello"));

        let renick = action(ActionKind::Renick { new_mask: "bob".into() });
        let ctx = HookContext::new(&renick);
        assert_eq!(ctx.get_message(), Some("bob"));
        assert_eq!(ctx.get_username(), "alice");

        let join = action(ActionKind::Join);
        assert_eq!(HookContext::new(&join).get_message(), None);
    }
}
