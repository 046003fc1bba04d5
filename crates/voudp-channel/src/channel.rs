//! Channel actor: an isolated Tokio task that owns one channel's roster.
//!
//! Each channel runs in its own task, communicating with the session
//! handlers through an mpsc queue. Membership, masks and flags of a channel
//! are only ever touched by its actor, so every member sees the same order
//! of joins, leaves, renames and chat.
//!
//! Packets for members are pushed straight into each member's outbox (a
//! bounded queue drained by that member's session task), so the actor
//! never waits on the network. Audio only takes the upper part of an
//! outbox; the last quarter is kept for control packets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use voudp_protocol::{
    ChannelId, ListEntry, ListFlags, MaskError, Packet, SessionId, default_mask, validate_mask,
};

use crate::hook::{Action, ActionKind, Dispatch, HookDispatcher};
use crate::{ChannelConfig, ChannelError};

/// Queue that delivers packets to one member's session task.
pub type MemberSender = mpsc::Sender<Packet>;
pub type MemberReceiver = mpsc::Receiver<Packet>;

/// Creates a member outbox holding at most `capacity` packets.
pub fn member_outbox(capacity: usize) -> (MemberSender, MemberReceiver) {
    mpsc::channel(capacity.max(1))
}

/// A session as the channel sees it.
#[derive(Debug, Clone)]
pub struct Member {
    pub session: SessionId,
    pub addr: SocketAddr,
    pub mask: String,
    /// `false` while the member still uses its default mask.
    pub masked: bool,
    pub flags: ListFlags,
    pub outbox: MemberSender,
}

impl Member {
    fn send(&self, packet: Packet) {
        match self.outbox.try_send(packet) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(packet)) => {
                tracing::warn!(session = %self.session, tag = packet.tag(), "member outbox full; packet dropped");
            }
            // The session is tearing down; its Leave is already on the way.
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// Queues an audio frame unless the outbox is down to its reserve.
    /// Returns `false` when the frame was dropped.
    fn send_audio(&self, frame: Vec<u8>) -> bool {
        let reserve = self.outbox.max_capacity() / 4;
        if self.outbox.capacity() <= reserve {
            return false;
        }
        self.outbox.try_send(Packet::Audio { frame }).is_ok()
    }
}

/// How a hook-guarded request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<T> {
    /// The action took effect.
    Committed(T),
    /// A hook cancelled it. Nothing changed.
    Cancelled,
    /// A hook kicked the member. If it was already a member it has been
    /// removed; the session should deliver the reason and close.
    Kicked(String),
}

/// The result of a committed Join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinAccepted {
    /// The mask the member has in this channel. Differs from the requested
    /// one when it collided with an existing member and was reset.
    pub mask: String,
    pub masked: bool,
}

/// One member's row in a roster snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub session: SessionId,
    pub mask: String,
    pub masked: bool,
    pub flags: ListFlags,
}

/// Commands sent to a channel actor through its queue.
///
/// Variants with a `oneshot::Sender` are requests: the caller waits for the
/// answer. The rest are fire-and-forget.
pub(crate) enum ChannelCommand {
    Join {
        member: Member,
        reply: oneshot::Sender<Result<Verdict<JoinAccepted>, ChannelError>>,
    },
    Leave {
        session: SessionId,
        reply: oneshot::Sender<Result<(), ChannelError>>,
    },
    Mask {
        session: SessionId,
        name: String,
        reply: oneshot::Sender<Result<Verdict<String>, ChannelError>>,
    },
    Chat {
        session: SessionId,
        text: String,
        reply: oneshot::Sender<Result<Verdict<()>, ChannelError>>,
    },
    Control {
        session: SessionId,
        flags: ListFlags,
    },
    Audio {
        session: SessionId,
        frame: Vec<u8>,
    },
    SendList {
        session: SessionId,
    },
    Roster {
        reply: oneshot::Sender<Vec<RosterEntry>>,
    },
    Shutdown,
}

// ---------------------------------------------------------------------------
// ChannelHandle
// ---------------------------------------------------------------------------

/// Handle to a running channel actor.
///
/// Cheap to clone: an `mpsc::Sender` plus the channel's id. The
/// `ChannelManager` holds one per live channel.
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    channel_id: ChannelId,
    sender: mpsc::Sender<ChannelCommand>,
    reply_timeout: Duration,
}

impl ChannelHandle {
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// `true` once the actor has stopped. A closed handle never reopens.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Sends a request and waits (bounded by the reply timeout) for the
    /// answer.
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ChannelCommand,
    ) -> Result<T, ChannelError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| ChannelError::Unavailable(self.channel_id))?;
        match tokio::time::timeout(self.reply_timeout, reply_rx).await {
            Ok(Ok(value)) => Ok(value),
            // Actor dropped the command on its way out.
            Ok(Err(_)) => Err(ChannelError::Unavailable(self.channel_id)),
            Err(_) => Err(ChannelError::Timeout(self.channel_id)),
        }
    }

    /// Adds a member. Hooks run first and may cancel or kick.
    pub async fn join(&self, member: Member) -> Result<Verdict<JoinAccepted>, ChannelError> {
        self.request(|reply| ChannelCommand::Join { member, reply })
            .await?
    }

    /// Removes a member. Hooks observe it but cannot stop it.
    ///
    /// Once this returns anything but `Unavailable` the Leave is queued and
    /// the actor will apply it, even if the reply timed out.
    pub async fn leave(&self, session: SessionId) -> Result<(), ChannelError> {
        self.request(|reply| ChannelCommand::Leave { session, reply })
            .await?
    }

    /// Renames a member. On success every member (including the renamed
    /// one) receives a Renick.
    pub async fn set_mask(
        &self,
        session: SessionId,
        name: String,
    ) -> Result<Verdict<String>, ChannelError> {
        self.request(|reply| ChannelCommand::Mask {
            session,
            name,
            reply,
        })
        .await?
    }

    pub async fn chat(&self, session: SessionId, text: String) -> Result<Verdict<()>, ChannelError> {
        self.request(|reply| ChannelCommand::Chat {
            session,
            text,
            reply,
        })
        .await?
    }

    /// Updates a member's mute/deaf flags (fire-and-forget).
    pub async fn set_flags(&self, session: SessionId, flags: ListFlags) -> Result<(), ChannelError> {
        self.sender
            .send(ChannelCommand::Control { session, flags })
            .await
            .map_err(|_| ChannelError::Unavailable(self.channel_id))
    }

    /// Relays an audio frame. Never waits: if the actor is backed up, the
    /// frame is dropped.
    pub fn send_audio(&self, session: SessionId, frame: Vec<u8>) -> Result<(), ChannelError> {
        match self.sender.try_send(ChannelCommand::Audio { session, frame }) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!(channel = %self.channel_id, %session, "channel busy; audio dropped");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(ChannelError::Unavailable(self.channel_id))
            }
        }
    }

    /// Asks the actor to send the member a fresh List.
    pub async fn request_list(&self, session: SessionId) -> Result<(), ChannelError> {
        self.sender
            .send(ChannelCommand::SendList { session })
            .await
            .map_err(|_| ChannelError::Unavailable(self.channel_id))
    }

    /// Snapshot of the members in join order.
    pub async fn roster(&self) -> Result<Vec<RosterEntry>, ChannelError> {
        self.request(|reply| ChannelCommand::Roster { reply }).await
    }

    /// Stops the actor. Members are not notified.
    pub async fn shutdown(&self) -> Result<(), ChannelError> {
        self.sender
            .send(ChannelCommand::Shutdown)
            .await
            .map_err(|_| ChannelError::Unavailable(self.channel_id))
    }
}

// ---------------------------------------------------------------------------
// ChannelActor
// ---------------------------------------------------------------------------

/// The internal channel state. Runs inside a Tokio task.
struct ChannelActor {
    channel_id: ChannelId,
    config: ChannelConfig,
    /// In join order; List entries follow it.
    members: Vec<Member>,
    hooks: Arc<HookDispatcher>,
    receiver: mpsc::Receiver<ChannelCommand>,
}

impl ChannelActor {
    /// Processes commands until shutdown or until the channel is empty.
    ///
    /// A fresh actor's first command is the Join that created it, so
    /// "empty after a command" means the last member left (or the first
    /// join was refused) and the channel retires.
    async fn run(mut self) {
        tracing::info!(channel = %self.channel_id, "channel actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                ChannelCommand::Join { member, reply } => self.answer_join(member, reply),
                ChannelCommand::Leave { session, reply } => {
                    let result = self.handle_leave(session);
                    let _ = reply.send(result);
                }
                ChannelCommand::Mask {
                    session,
                    name,
                    reply,
                } => {
                    let result = self.handle_mask(session, name);
                    let _ = reply.send(result);
                }
                ChannelCommand::Chat {
                    session,
                    text,
                    reply,
                } => {
                    let result = self.handle_chat(session, text);
                    let _ = reply.send(result);
                }
                ChannelCommand::Control { session, flags } => {
                    self.handle_control(session, flags);
                }
                ChannelCommand::Audio { session, frame } => {
                    self.handle_audio(session, frame);
                }
                ChannelCommand::SendList { session } => {
                    if let Some(member) = self.member(session) {
                        member.send(self.list_packet());
                    }
                }
                ChannelCommand::Roster { reply } => {
                    let _ = reply.send(self.roster());
                }
                ChannelCommand::Shutdown => {
                    tracing::info!(channel = %self.channel_id, "channel shutting down");
                    break;
                }
            }

            if self.members.is_empty() {
                tracing::info!(channel = %self.channel_id, "channel empty; retiring");
                break;
            }
        }

        tracing::info!(channel = %self.channel_id, "channel actor stopped");
    }

    // -- lookups ----------------------------------------------------------

    fn position(&self, session: SessionId) -> Option<usize> {
        self.members.iter().position(|m| m.session == session)
    }

    fn member(&self, session: SessionId) -> Option<&Member> {
        self.members.iter().find(|m| m.session == session)
    }

    fn require_member(&self, session: SessionId) -> Result<usize, ChannelError> {
        self.position(session)
            .ok_or(ChannelError::NotMember(session, self.channel_id))
    }

    /// Whether another member (not `except`) already uses `mask`.
    fn mask_taken(&self, mask: &str, except: Option<SessionId>) -> bool {
        self.members
            .iter()
            .any(|m| m.mask == mask && Some(m.session) != except)
    }

    // -- outbound helpers -------------------------------------------------

    fn broadcast(&self, packet: &Packet, except: Option<SessionId>) {
        for member in &self.members {
            if Some(member.session) != except {
                member.send(packet.clone());
            }
        }
    }

    fn list_packet(&self) -> Packet {
        let masked_count = self.members.iter().filter(|m| m.masked).count() as u32;
        Packet::List {
            unmasked_count: self.members.len() as u32 - masked_count,
            masked_count,
            entries: self
                .members
                .iter()
                .map(|m| ListEntry {
                    mask: m.mask.clone(),
                    flags: m.flags,
                })
                .collect(),
        }
    }

    fn roster(&self) -> Vec<RosterEntry> {
        self.members
            .iter()
            .map(|m| RosterEntry {
                session: m.session,
                mask: m.mask.clone(),
                masked: m.masked,
                flags: m.flags,
            })
            .collect()
    }

    /// Runs the hooks for an action by `member` and delivers their replies.
    fn dispatch(&self, kind: ActionKind, member: &Member) -> Dispatch {
        let action = Action {
            kind,
            session: member.session,
            addr: member.addr,
            channel: self.channel_id,
            username: member.mask.clone(),
        };
        let dispatch = self.hooks.dispatch(&action);
        for text in &dispatch.replies {
            member.send(Packet::Dm { text: text.clone() });
        }
        dispatch
    }

    /// Removes the member at `idx` and tells the others.
    fn remove_at(&mut self, idx: usize) -> Member {
        let member = self.members.remove(idx);
        self.broadcast(
            &Packet::FlowLeave {
                username: member.mask.clone(),
            },
            None,
        );
        member
    }

    // -- handlers ---------------------------------------------------------

    /// Runs a Join and hands the verdict back, unless the caller has
    /// already given up on it.
    ///
    /// A caller that timed out believes the join failed, so a join it can
    /// no longer hear about is skipped, or undone if it was committed
    /// before the caller left.
    fn answer_join(
        &mut self,
        member: Member,
        reply: oneshot::Sender<Result<Verdict<JoinAccepted>, ChannelError>>,
    ) {
        let session = member.session;
        if reply.is_closed() {
            tracing::debug!(channel = %self.channel_id, %session, "join abandoned by caller; skipped");
            return;
        }

        let result = self.handle_join(member);
        let committed = matches!(result, Ok(Verdict::Committed(_)));
        if reply.send(result).is_err() && committed {
            if let Some(idx) = self.position(session) {
                tracing::debug!(channel = %self.channel_id, %session, "join abandoned after commit; rolled back");
                self.remove_at(idx);
            }
        }
    }

    fn handle_join(&mut self, mut member: Member) -> Result<Verdict<JoinAccepted>, ChannelError> {
        if self.position(member.session).is_some() {
            return Err(ChannelError::AlreadyMember(member.session, self.channel_id));
        }

        let dispatch = self.dispatch(ActionKind::Join, &member);
        if let Some(reason) = dispatch.kick {
            tracing::info!(channel = %self.channel_id, session = %member.session, %reason, "join refused with kick");
            return Ok(Verdict::Kicked(reason));
        }
        if dispatch.cancelled {
            tracing::debug!(channel = %self.channel_id, session = %member.session, "join cancelled by hook");
            return Ok(Verdict::Cancelled);
        }

        // A mask chosen elsewhere may already be in use here.
        if self.mask_taken(&member.mask, None) {
            tracing::debug!(
                channel = %self.channel_id,
                session = %member.session,
                mask = %member.mask,
                "mask taken in channel; resetting to default"
            );
            member.mask = default_mask(member.session);
            member.masked = false;
        }

        self.broadcast(
            &Packet::FlowJoin {
                username: member.mask.clone(),
            },
            None,
        );

        let accepted = JoinAccepted {
            mask: member.mask.clone(),
            masked: member.masked,
        };
        tracing::info!(channel = %self.channel_id, session = %member.session, mask = %member.mask, "member joined");
        self.members.push(member);

        if let Some(joined) = self.members.last() {
            joined.send(self.list_packet());
        }
        Ok(Verdict::Committed(accepted))
    }

    fn handle_leave(&mut self, session: SessionId) -> Result<(), ChannelError> {
        let idx = self.require_member(session)?;
        self.dispatch(ActionKind::Leave, &self.members[idx]);
        let member = self.remove_at(idx);
        tracing::info!(channel = %self.channel_id, %session, mask = %member.mask, "member left");
        Ok(())
    }

    fn handle_mask(&mut self, session: SessionId, name: String) -> Result<Verdict<String>, ChannelError> {
        let idx = self.require_member(session)?;
        validate_mask(&name)?;
        if self.members[idx].mask == name {
            return Ok(Verdict::Committed(name));
        }
        if self.mask_taken(&name, Some(session)) {
            return Err(MaskError::Taken.into());
        }

        let dispatch = self.dispatch(
            ActionKind::Renick {
                new_mask: name.clone(),
            },
            &self.members[idx],
        );
        if let Some(reason) = dispatch.kick {
            self.remove_at(idx);
            return Ok(Verdict::Kicked(reason));
        }
        if dispatch.cancelled {
            return Ok(Verdict::Cancelled);
        }

        let member = &mut self.members[idx];
        let old_mask = std::mem::replace(&mut member.mask, name.clone());
        member.masked = true;
        tracing::info!(channel = %self.channel_id, %session, old = %old_mask, new = %name, "member renamed");

        self.broadcast(
            &Packet::Renick {
                old_mask,
                new_mask: name.clone(),
            },
            None,
        );
        Ok(Verdict::Committed(name))
    }

    fn handle_chat(&mut self, session: SessionId, text: String) -> Result<Verdict<()>, ChannelError> {
        let idx = self.require_member(session)?;
        if self.config.require_mask_for_chat && !self.members[idx].masked {
            return Err(ChannelError::Unmasked);
        }

        let dispatch = self.dispatch(ActionKind::Message { text: text.clone() }, &self.members[idx]);
        if let Some(reason) = dispatch.kick {
            self.remove_at(idx);
            return Ok(Verdict::Kicked(reason));
        }
        if dispatch.cancelled {
            return Ok(Verdict::Cancelled);
        }

        let relay = Packet::ChatRelay {
            sender: self.members[idx].mask.clone(),
            text,
        };
        let except = (!self.config.echo_chat).then_some(session);
        self.broadcast(&relay, except);
        Ok(Verdict::Committed(()))
    }

    fn handle_control(&mut self, session: SessionId, flags: ListFlags) {
        if let Some(idx) = self.position(session) {
            self.members[idx].flags = flags;
        }
    }

    /// Relays a frame to every other member that isn't deafened. A muted
    /// sender's frames go nowhere.
    fn handle_audio(&self, session: SessionId, frame: Vec<u8>) {
        let Some(sender) = self.member(session) else {
            return;
        };
        if sender.flags.muted {
            return;
        }
        for member in &self.members {
            if member.session != session
                && !member.flags.deafened
                && !member.send_audio(frame.clone())
            {
                tracing::trace!(channel = %self.channel_id, session = %member.session, "member outbox busy; audio dropped");
            }
        }
    }
}

/// Spawns a new channel actor and returns a handle to it.
pub fn spawn_channel(
    channel_id: ChannelId,
    config: ChannelConfig,
    hooks: Arc<HookDispatcher>,
) -> ChannelHandle {
    let (sender, receiver) = mpsc::channel(config.command_buffer.max(1));
    let handle = ChannelHandle {
        channel_id,
        sender,
        reply_timeout: config.reply_timeout,
    };

    let actor = ChannelActor {
        channel_id,
        config,
        members: Vec::new(),
        hooks,
        receiver,
    };
    tokio::spawn(actor.run());

    handle
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: u64) -> (Member, MemberReceiver) {
        let (tx, rx) = member_outbox(64);
        let session = SessionId(id);
        let member = Member {
            session,
            addr: SocketAddr::from(([127, 0, 0, 1], 4000 + id as u16)),
            mask: default_mask(session),
            masked: false,
            flags: ListFlags::default(),
            outbox: tx,
        };
        (member, rx)
    }

    fn channel() -> ChannelHandle {
        spawn_channel(ChannelId(1), ChannelConfig::default(), Arc::new(HookDispatcher::new()))
    }

    #[tokio::test]
    async fn test_join_first_member_receives_list_of_itself() {
        let handle = channel();
        let (a, mut rx) = member(1);

        let verdict = handle.join(a).await.unwrap();
        assert_eq!(
            verdict,
            Verdict::Committed(JoinAccepted {
                mask: "guest-1".into(),
                masked: false
            })
        );

        let list = rx.recv().await.unwrap();
        assert_eq!(
            list,
            Packet::List {
                unmasked_count: 1,
                masked_count: 0,
                entries: vec![ListEntry {
                    mask: "guest-1".into(),
                    flags: ListFlags::default()
                }],
            }
        );
        // No FlowJoin about itself.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_join_twice_returns_already_member() {
        let handle = channel();
        let (a, _rx) = member(1);
        handle.join(a.clone()).await.unwrap();
        assert_eq!(
            handle.join(a).await,
            Err(ChannelError::AlreadyMember(SessionId(1), ChannelId(1)))
        );
    }

    #[tokio::test]
    async fn test_join_colliding_mask_resets_to_default() {
        let handle = channel();
        let (mut a, _rx_a) = member(1);
        a.mask = "bob".into();
        a.masked = true;
        let (mut b, _rx_b) = member(2);
        b.mask = "bob".into();
        b.masked = true;

        handle.join(a).await.unwrap();
        let verdict = handle.join(b).await.unwrap();

        assert_eq!(
            verdict,
            Verdict::Committed(JoinAccepted {
                mask: "guest-2".into(),
                masked: false
            })
        );
    }

    #[tokio::test]
    async fn test_leave_last_member_retires_channel() {
        let handle = channel();
        let (a, _rx) = member(1);
        handle.join(a).await.unwrap();
        handle.leave(SessionId(1)).await.unwrap();

        tokio::task::yield_now().await;
        assert!(matches!(
            handle.roster().await,
            Err(ChannelError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_leave_non_member_returns_not_member() {
        let handle = channel();
        let (a, _rx) = member(1);
        handle.join(a).await.unwrap();
        assert_eq!(
            handle.leave(SessionId(9)).await,
            Err(ChannelError::NotMember(SessionId(9), ChannelId(1)))
        );
    }

    #[tokio::test]
    async fn test_set_mask_invalid_returns_mask_error() {
        let handle = channel();
        let (a, _rx) = member(1);
        handle.join(a).await.unwrap();

        assert_eq!(
            handle.set_mask(SessionId(1), String::new()).await,
            Err(ChannelError::Mask(MaskError::Empty))
        );
        assert_eq!(
            handle.set_mask(SessionId(1), "guest-7".into()).await,
            Err(ChannelError::Mask(MaskError::Reserved))
        );
    }

    #[tokio::test]
    async fn test_audio_full_outbox_keeps_reserve_for_control() {
        let handle = channel();
        let (a, _rx_a) = member(1);
        let (tx, mut rx_b) = member_outbox(8);
        let (mut b, _) = member(2);
        b.outbox = tx;
        handle.join(a).await.unwrap();
        handle.join(b).await.unwrap();
        // b's List.
        rx_b.recv().await.unwrap();

        for n in 0..20u8 {
            handle.send_audio(SessionId(1), vec![n]).unwrap();
        }
        handle.chat(SessionId(1), "still here".into()).await.unwrap();

        let mut audio = 0;
        let mut chat = 0;
        while let Ok(packet) = rx_b.try_recv() {
            match packet {
                Packet::Audio { .. } => audio += 1,
                Packet::ChatRelay { .. } => chat += 1,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(audio, 6, "audio stops at the reserve");
        assert_eq!(chat, 1, "control still fits");
    }

    #[tokio::test]
    async fn test_chat_require_mask_rejects_unmasked() {
        let handle = spawn_channel(
            ChannelId(1),
            ChannelConfig {
                require_mask_for_chat: true,
                ..Default::default()
            },
            Arc::new(HookDispatcher::new()),
        );
        let (a, _rx) = member(1);
        handle.join(a).await.unwrap();

        assert_eq!(
            handle.chat(SessionId(1), "hi".into()).await,
            Err(ChannelError::Unmasked)
        );
    }
}
