//! Per-session handler: replay checks, reliability, and packet routing.
//!
//! Each session gets its own Tokio task running this handler. The flow is:
//!   1. The receive loop pushes authenticated datagrams into the inbox
//!   2. Replay window → ACK/dedup → decode (client or console dialect)
//!   3. Client packets become channel requests; console lines go to the
//!      command handler
//!   4. Packets from channel actors arrive on the outbox and are wrapped,
//!      sealed and sent
//!
//! Timers (retransmission, idle) live in the same `select!` loop, so they
//! die with the task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use voudp_channel::{
    ChannelError, ChannelHandle, Member, MemberReceiver, MemberSender, Verdict, member_outbox,
};
use voudp_protocol::{
    ChannelId, ConsolePacket, ControlOption, Direction, Packet, SessionId,
};
use voudp_session::{ConsoleAuthenticator, JoinPlan, Session, SessionError, SessionKind};
use voudp_transport::reliable::encode_ack;
use voudp_transport::{
    DatagramSocket, Delivery, Frame, NonceSequence, Opened, ReliableReceiver, ReliableSender,
    ReplayWindow,
};

use crate::server::ServerState;
use crate::{CommandOutcome, Invoker, VoudpError};

/// What the loop should do after handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Everything one session owns.
///
/// Dropping it (normally at the end of [`handle_session`], or during a
/// panic unwind) releases the session's registry entry and, if it never
/// got to leave cleanly, its channel membership. `Drop` is synchronous, so
/// the async part runs in a fire-and-forget task.
pub(crate) struct SessionTask<A: ConsoleAuthenticator> {
    state: Arc<ServerState<A>>,
    session: Session,
    /// Handle of the channel in `session.state()`, kept in step with it.
    channel: Option<ChannelHandle>,
    replay: ReplayWindow,
    nonces: NonceSequence,
    reliable_out: ReliableSender,
    reliable_in: ReliableReceiver,
    /// Given to channel actors as this member's outbox.
    outbox: MemberSender,
    outbox_rx: Option<MemberReceiver>,
    last_activity: Instant,
}

impl<A: ConsoleAuthenticator> Drop for SessionTask<A> {
    fn drop(&mut self) {
        let id = self.session.id;
        let addr = self.session.addr;
        let channel = self.channel.take();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            if let Some(handle) = channel {
                let _ = handle.leave(id).await;
            }
            state.sessions.lock().await.close(addr, id);
        });
    }
}

/// Runs a session from its first datagram until it closes.
pub(crate) async fn handle_session<A: ConsoleAuthenticator>(
    mut task: SessionTask<A>,
    mut inbox: mpsc::Receiver<Opened>,
) {
    let id = task.session.id;
    let addr = task.session.addr;
    tracing::debug!(session = %id, %addr, "session task started");

    let Some(mut outbox) = task.outbox_rx.take() else {
        return;
    };
    let idle_timeout = task.state.config.session.idle_timeout;
    // `interval` panics on a zero period.
    let period = task.state.config.reliable.ack_timeout.max(Duration::from_millis(1));
    let mut retransmit = tokio::time::interval(period);
    retransmit.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let step = tokio::select! {
            Some(opened) = inbox.recv() => task.on_datagram(opened).await,
            Some(packet) = outbox.recv() => task.send(&packet).await.map(|()| Flow::Continue),
            _ = retransmit.tick() => task.retransmit().await.map(|()| Flow::Continue),
            _ = tokio::time::sleep_until(task.last_activity + idle_timeout) => {
                tracing::info!(session = %id, %addr, "session idle; closing");
                Ok(Flow::Close)
            }
        };

        match step {
            Ok(Flow::Continue) => {}
            Ok(Flow::Close) => break,
            Err(e) => {
                tracing::warn!(session = %id, %addr, error = %e, "session failed; closing");
                break;
            }
        }
    }

    task.close().await;
    // `task` drops here → registry entry released.
}

impl<A: ConsoleAuthenticator> SessionTask<A> {
    pub(crate) fn new(id: SessionId, addr: SocketAddr, state: Arc<ServerState<A>>) -> Self {
        let (outbox, outbox_rx) = member_outbox(state.config.channel.member_queue);
        let reliable_out = ReliableSender::new(state.config.reliable.clone());
        Self {
            session: Session::new(id, addr),
            channel: None,
            replay: ReplayWindow::new(),
            nonces: NonceSequence::random(),
            reliable_out,
            reliable_in: ReliableReceiver::new(),
            outbox,
            outbox_rx: Some(outbox_rx),
            last_activity: Instant::now(),
            state,
        }
    }

    // -- inbound ----------------------------------------------------------

    async fn on_datagram(&mut self, opened: Opened) -> Result<Flow, VoudpError> {
        if let Err(e) = self.replay.accept(&opened) {
            tracing::trace!(session = %self.session.id, error = %e, "dropping replayed datagram");
            return Ok(Flow::Continue);
        }
        self.last_activity = Instant::now();

        match Frame::parse(&opened.plaintext) {
            Ok(Frame::Ack { seq }) => {
                if !self.reliable_out.acknowledge(seq) {
                    tracing::trace!(session = %self.session.id, seq, "duplicate ACK");
                }
                Ok(Flow::Continue)
            }
            Ok(Frame::Reliable { seq, inner }) => {
                let delivery = self.reliable_in.accept(seq);
                if delivery.should_ack() {
                    self.transmit(&encode_ack(seq)).await?;
                }
                match delivery {
                    Delivery::Deliver => self.on_packet(inner).await,
                    Delivery::Duplicate => Ok(Flow::Continue),
                    Delivery::Stale => {
                        tracing::debug!(session = %self.session.id, seq, "reliable frame older than the window; not acknowledged");
                        Ok(Flow::Continue)
                    }
                }
            }
            Ok(Frame::Raw(bytes)) => self.on_packet(bytes).await,
            Err(e) => {
                tracing::debug!(session = %self.session.id, error = %e, "dropping bad frame");
                Ok(Flow::Continue)
            }
        }
    }

    async fn on_packet(&mut self, bytes: &[u8]) -> Result<Flow, VoudpError> {
        if self.session.is_console() {
            match ConsolePacket::decode(bytes) {
                Ok(packet) => self.on_console_packet(packet).await,
                Err(e) => {
                    tracing::debug!(session = %self.session.id, error = %e, "dropping bad console packet");
                    Ok(Flow::Continue)
                }
            }
        } else {
            match Packet::decode(bytes, Direction::ToServer) {
                Ok(packet) => self.on_client_packet(packet).await,
                Err(e) => {
                    tracing::debug!(session = %self.session.id, error = %e, "dropping bad packet");
                    Ok(Flow::Continue)
                }
            }
        }
    }

    async fn on_client_packet(&mut self, packet: Packet) -> Result<Flow, VoudpError> {
        match packet {
            Packet::Join { channel_id } => self.join(channel_id).await,
            Packet::Leave => {
                tracing::info!(session = %self.session.id, "client left");
                Ok(Flow::Close)
            }
            Packet::Mask { name } => self.set_mask(name).await,
            Packet::ListRequest => {
                if let Some(handle) = self.joined() {
                    handle.request_list(self.session.id).await?;
                }
                Ok(Flow::Continue)
            }
            Packet::Chat { text } => self.chat(text).await,
            Packet::Control { option, extra } => self.control(option, &extra).await,
            Packet::Audio { frame } => {
                if let Some(handle) = self.joined() {
                    handle.send_audio(self.session.id, frame)?;
                }
                Ok(Flow::Continue)
            }
            Packet::SyncCommands => {
                let entries = self.state.commands.catalog(&self.invoker());
                self.send(&Packet::CommandCatalog { entries }).await?;
                Ok(Flow::Continue)
            }
            Packet::ConsoleCommand { text } => {
                let outcome = self.state.commands.execute(&self.invoker(), &text);
                self.answer(outcome).await?;
                Ok(Flow::Continue)
            }
            Packet::ConsoleRegister { secret } => self.register_console(&secret).await,
            other => {
                tracing::debug!(session = %self.session.id, tag = other.tag(), "ignoring server-bound packet kind");
                Ok(Flow::Continue)
            }
        }
    }

    async fn on_console_packet(&mut self, packet: ConsolePacket) -> Result<Flow, VoudpError> {
        match packet {
            ConsolePacket::Command { text } => {
                tracing::info!(session = %self.session.id, command = %text, "console command");
                let outcome = self.state.commands.execute(&self.invoker(), &text);
                self.answer(outcome).await?;
                Ok(Flow::Continue)
            }
            // Activity was already recorded.
            ConsolePacket::Keepalive => Ok(Flow::Continue),
            ConsolePacket::Eof => {
                tracing::info!(session = %self.session.id, "console disconnected");
                Ok(Flow::Close)
            }
        }
    }

    // -- client operations ------------------------------------------------

    /// The current channel, or `None` (after tracing the violation) when
    /// the session has not joined one.
    fn joined(&self) -> Option<&ChannelHandle> {
        match self.session.require_joined() {
            Ok(_) => self.channel.as_ref(),
            Err(e) => {
                self.violation(&e);
                None
            }
        }
    }

    fn violation(&self, error: &SessionError) {
        tracing::debug!(session = %self.session.id, %error, "packet dropped");
    }

    fn member(&self) -> Member {
        Member {
            session: self.session.id,
            addr: self.session.addr,
            mask: self.session.mask.clone(),
            masked: self.session.masked,
            flags: self.session.flags(),
            outbox: self.outbox.clone(),
        }
    }

    fn invoker(&self) -> Invoker {
        match self.session.kind() {
            SessionKind::Console => Invoker::Console {
                addr: self.session.addr,
            },
            SessionKind::Client => Invoker::Client {
                addr: self.session.addr,
                session: self.session.id,
                mask: self.session.mask.clone(),
                channel: self.session.channel(),
            },
        }
    }

    async fn join(&mut self, channel_id: ChannelId) -> Result<Flow, VoudpError> {
        let plan = match self.session.begin_join(channel_id) {
            Ok(plan) => plan,
            Err(e) => {
                self.violation(&e);
                return Ok(Flow::Continue);
            }
        };
        match plan {
            JoinPlan::AlreadyThere => {
                self.violation(&SessionError::ProtocolViolation("already in that channel"));
                return Ok(Flow::Continue);
            }
            JoinPlan::Switch { from } => {
                tracing::debug!(session = %self.session.id, %from, to = %channel_id, "switching channel");
                self.leave_channel().await;
            }
            JoinPlan::Fresh => {}
        }

        let requested = self.session.mask.clone();
        let was_masked = self.session.masked;
        let (handle, verdict) = match self.state.channels.join(channel_id, self.member()).await {
            Ok(joined) => joined,
            // The channel skips or undoes a join whose caller timed out, so
            // there is no membership to clean up here.
            Err(e) => {
                tracing::warn!(session = %self.session.id, channel = %channel_id, error = %e, "join failed");
                return Ok(Flow::Continue);
            }
        };

        match verdict {
            Verdict::Committed(accepted) => {
                self.session
                    .commit_join(channel_id, accepted.mask, accepted.masked);
                self.channel = Some(handle);
                tracing::info!(session = %self.session.id, channel = %channel_id, mask = %self.session.mask, "joined channel");

                if was_masked && !self.session.masked {
                    let text = format!(
                        "the mask \"{requested}\" is taken in {channel_id}; you are {} here",
                        self.session.mask
                    );
                    self.send(&Packet::Dm { text }).await?;
                }
                if !self.session.greeted {
                    self.session.greeted = true;
                    if let Some(text) = self.state.config.session.welcome_message.clone() {
                        self.send(&Packet::Dm { text }).await?;
                    }
                }
                Ok(Flow::Continue)
            }
            Verdict::Cancelled => {
                tracing::debug!(session = %self.session.id, channel = %channel_id, "join cancelled by hook");
                Ok(Flow::Continue)
            }
            Verdict::Kicked(reason) => self.kicked(reason).await,
        }
    }

    async fn set_mask(&mut self, name: String) -> Result<Flow, VoudpError> {
        let Some(handle) = self.joined().cloned() else {
            return Ok(Flow::Continue);
        };
        match handle.set_mask(self.session.id, name).await {
            Ok(Verdict::Committed(mask)) => {
                self.session.set_mask(mask);
                Ok(Flow::Continue)
            }
            Ok(Verdict::Cancelled) => Ok(Flow::Continue),
            Ok(Verdict::Kicked(reason)) => self.kicked(reason).await,
            Err(ChannelError::Mask(e)) => {
                tracing::debug!(session = %self.session.id, error = %e, "mask refused");
                self.send(&Packet::NickError).await?;
                Ok(Flow::Continue)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn chat(&mut self, text: String) -> Result<Flow, VoudpError> {
        let Some(handle) = self.joined().cloned() else {
            return Ok(Flow::Continue);
        };
        match handle.chat(self.session.id, text).await {
            Ok(Verdict::Committed(())) | Ok(Verdict::Cancelled) => Ok(Flow::Continue),
            Ok(Verdict::Kicked(reason)) => self.kicked(reason).await,
            Err(ChannelError::Unmasked) => {
                self.send(&Packet::NickError).await?;
                Ok(Flow::Continue)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn control(&mut self, option: u8, extra: &[u8]) -> Result<Flow, VoudpError> {
        let Some(option) = ControlOption::from_byte(option) else {
            tracing::debug!(session = %self.session.id, option, "unknown control option");
            return Ok(Flow::Continue);
        };
        let Some(handle) = self.joined().cloned() else {
            return Ok(Flow::Continue);
        };
        if self.session.apply_control(option, extra) {
            handle.set_flags(self.session.id, self.session.flags()).await?;
        }
        Ok(Flow::Continue)
    }

    async fn register_console(&mut self, secret: &str) -> Result<Flow, VoudpError> {
        if let Err(e) = self.state.auth.authenticate(secret).await {
            tracing::warn!(session = %self.session.id, addr = %self.session.addr, error = %e, "console registration rejected");
            return Ok(Flow::Continue);
        }
        if let Err(e) = self.session.promote_to_console() {
            self.violation(&e);
            return Ok(Flow::Continue);
        }
        self.state
            .sessions
            .lock()
            .await
            .set_kind(self.session.addr, SessionKind::Console)?;
        tracing::info!(session = %self.session.id, addr = %self.session.addr, "registered console");
        Ok(Flow::Continue)
    }

    /// A hook kicked this session. The channel already dropped the
    /// membership; deliver the reason and close.
    async fn kicked(&mut self, reason: String) -> Result<Flow, VoudpError> {
        tracing::info!(session = %self.session.id, %reason, "session kicked");
        self.channel = None;
        self.session.commit_leave();
        self.send(&Packet::Dm { text: reason }).await?;
        Ok(Flow::Close)
    }

    /// Leaves the current channel, keeping the session open.
    async fn leave_channel(&mut self) {
        if let Some(handle) = self.channel.take() {
            if let Err(e) = handle.leave(self.session.id).await {
                tracing::debug!(session = %self.session.id, error = %e, "leave failed");
            }
        }
        self.session.commit_leave();
    }

    async fn close(&mut self) {
        self.leave_channel().await;
        self.session.close();
        self.reliable_out.clear();
        tracing::info!(session = %self.session.id, addr = %self.session.addr, "session ended");
    }

    // -- outbound ---------------------------------------------------------

    async fn answer(&mut self, outcome: CommandOutcome) -> Result<(), VoudpError> {
        match outcome {
            CommandOutcome::Reply(text) => self.send(&Packet::CommandReply { text }).await,
            CommandOutcome::Error(text) => self.send(&Packet::CommandError { text }).await,
            CommandOutcome::Silent => Ok(()),
        }
    }

    /// Encodes, wraps reliable kinds, seals and sends one packet.
    async fn send(&mut self, packet: &Packet) -> Result<(), VoudpError> {
        let bytes = packet.encode();
        if packet.is_reliable() {
            let (_, wrapped) = self.reliable_out.wrap(&bytes, Instant::now());
            self.transmit(&wrapped).await
        } else {
            self.transmit(&bytes).await
        }
    }

    /// Resends every frame whose ACK is overdue, under a fresh nonce.
    async fn retransmit(&mut self) -> Result<(), VoudpError> {
        for frame in self.reliable_out.poll(Instant::now())? {
            tracing::debug!(session = %self.session.id, seq = frame.seq, attempt = frame.attempt, "retransmitting");
            self.transmit(&frame.bytes).await?;
        }
        Ok(())
    }

    /// Seals `plaintext` and sends it. A failed send is logged and
    /// otherwise ignored (datagram semantics); a failed seal is fatal.
    async fn transmit(&self, plaintext: &[u8]) -> Result<(), VoudpError> {
        let datagram = self.state.cipher.seal(&self.nonces, plaintext)?;
        if let Err(e) = self.state.socket.send_to(&datagram, self.session.addr).await {
            tracing::debug!(session = %self.session.id, error = %e, "send failed");
        }
        Ok(())
    }
}
