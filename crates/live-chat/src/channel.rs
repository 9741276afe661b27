//! Reconnecting chat channel.
//!
//! [`ChatChannel`] is the connection state machine. It owns the transport
//! and decides when to reconnect. [`LiveChat::open`] runs it in a tokio task together
//! with the backoff timer and hands back a [`ChatHandle`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use stream_types::timer::{Timer, arm, fire, millis};
use stream_types::{PageOrigin, StreamIdentity};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};
use url::Url;

use crate::backoff::ReconnectPolicy;
use crate::error::{ChatError, Result, SendRejected};
use crate::message::{ChatMessage, ChatUser, InboundFrame, MessageIdGenerator, validate_outgoing};
use crate::state::ConnectionState;
use crate::transport::{DuplexChannelPort, GenerationEvent, TransportEvent, TransportSink};

/// Outcome of one state machine input.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ChannelStep {
    Idle,
    Message(ChatMessage),
    Reconnect { attempt: u32, delay: Duration },
    Exhausted { attempts: u32 },
}

pub(crate) struct ChatChannel<T> {
    transport: T,
    address: Url,
    policy: ReconnectPolicy,
    user: Option<ChatUser>,
    state: ConnectionState,
    /// Reconnect attempts since the last successful open
    attempt: u32,
    /// Generation of the current connection; events tagged otherwise are stale
    generation: u64,
    /// Set by the owner before teardown; suppresses reconnects
    closing: Arc<AtomicBool>,
    /// Transport released by `close`
    closed: bool,
    ids: MessageIdGenerator,
    event_tx: mpsc::UnboundedSender<GenerationEvent>,
    dropped_frames: u64,
}

impl<T: DuplexChannelPort> ChatChannel<T> {
    pub fn new(
        transport: T,
        address: Url,
        policy: ReconnectPolicy,
        user: Option<ChatUser>,
        event_tx: mpsc::UnboundedSender<GenerationEvent>,
        closing: Arc<AtomicBool>,
    ) -> Self {
        Self {
            transport,
            address,
            policy,
            user,
            state: ConnectionState::Connecting,
            attempt: 0,
            generation: 0,
            closing,
            closed: false,
            ids: MessageIdGenerator::new(),
            event_tx,
            dropped_frames: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    fn is_closing(&self) -> bool {
        self.closed || self.closing.load(Ordering::Acquire)
    }

    /// Start a new connection attempt.
    pub fn connect(&mut self) -> ChannelStep {
        if self.is_closing() {
            return ChannelStep::Idle;
        }
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        let sink = TransportSink::new(self.generation, self.event_tx.clone());
        info!(address = %self.address, attempt = self.attempt, "Connecting to chat");

        match self.transport.open(&self.address, sink) {
            Ok(()) => ChannelStep::Idle,
            Err(e) => {
                warn!(error = %e, "Chat connection could not be started");
                self.connection_lost()
            }
        }
    }

    /// The backoff delay elapsed.
    pub fn reconnect_due(&mut self) -> ChannelStep {
        if self.is_closing() {
            return ChannelStep::Idle;
        }
        debug!(attempt = self.attempt, "Reconnect delay elapsed");
        self.connect()
    }

    pub fn handle_event(
        &mut self,
        generation: u64,
        event: TransportEvent,
        received_at: DateTime<Utc>,
    ) -> ChannelStep {
        if self.is_closing() || generation != self.generation {
            trace!(
                generation,
                current = self.generation,
                ?event,
                "Dropping stale transport event"
            );
            return ChannelStep::Idle;
        }

        match event {
            TransportEvent::Opened => {
                if self.attempt > 0 {
                    info!(attempts = self.attempt, "Chat reconnected");
                } else {
                    info!("Chat connected");
                }
                self.attempt = 0;
                self.state = ConnectionState::Open;
                ChannelStep::Idle
            }
            TransportEvent::Frame(raw) => match InboundFrame::parse(&raw) {
                Ok(frame) => frame
                    .into_message(&self.ids, received_at)
                    .map_or(ChannelStep::Idle, ChannelStep::Message),
                Err(e) => {
                    self.dropped_frames += 1;
                    warn!(error = %e, len = raw.len(), "Dropping malformed chat frame");
                    ChannelStep::Idle
                }
            },
            TransportEvent::Error(message) => {
                warn!(%message, "Chat transport error");
                self.connection_lost()
            }
            TransportEvent::Closed { reason } => {
                info!(reason = reason.as_deref().unwrap_or("none"), "Chat connection closed");
                self.connection_lost()
            }
        }
    }

    /// Unexpected close, transport error or failed connect.
    fn connection_lost(&mut self) -> ChannelStep {
        // Anything still in flight from this connection is stale now.
        self.generation += 1;
        self.transport.close();
        self.state = ConnectionState::Closed;

        let next = self.attempt.saturating_add(1);
        if !self.policy.allows(next) {
            self.state = ConnectionState::Failed;
            error!(attempts = self.attempt, "Chat reconnect attempts exhausted");
            return ChannelStep::Exhausted {
                attempts: self.attempt,
            };
        }

        self.attempt = next;
        self.state = ConnectionState::Reconnecting { attempt: next };
        let delay = self.policy.delay_for_attempt(next);
        warn!(
            attempt = next,
            max_attempts = self.policy.max_attempts,
            delay_ms = millis(delay),
            "Chat disconnected, scheduling reconnect"
        );
        ChannelStep::Reconnect {
            attempt: next,
            delay,
        }
    }

    /// Validate and send one message. Nothing reaches the transport when
    /// the message is rejected.
    pub fn send(&mut self, text: &str) -> Result<()> {
        if self.is_closing() {
            return Err(SendRejected::ShutDown.into());
        }
        let frame = validate_outgoing(text, self.user.as_ref())?;
        if !self.state.is_open() {
            return Err(SendRejected::NotOpen.into());
        }
        let encoded = frame.encode()?;
        self.transport
            .send(encoded)
            .inspect_err(|e| warn!(error = %e, "Failed to send chat message"))
    }

    pub fn set_user(&mut self, user: Option<ChatUser>) {
        debug!(
            username = user.as_ref().map(|u| u.username.as_str()),
            "Chat user changed"
        );
        self.user = user;
    }

    /// Deliberate close. Returns false if already closed.
    pub fn close(&mut self) -> bool {
        self.closing.store(true, Ordering::Release);
        if self.closed {
            return false;
        }
        self.closed = true;
        self.generation += 1;
        self.transport.close();
        self.state = ConnectionState::Closed;
        info!("Chat closed");
        true
    }
}

#[derive(Debug)]
enum ChatCommand {
    Send {
        text: String,
        reply: oneshot::Sender<Result<()>>,
    },
    SetUser(Option<ChatUser>),
    Close,
}

pub struct LiveChat;

impl LiveChat {
    /// Open the chat channel for `identity` and start connecting.
    pub fn open<T: DuplexChannelPort>(
        identity: &StreamIdentity,
        origin: &PageOrigin,
        transport: T,
        policy: ReconnectPolicy,
        user: Option<ChatUser>,
    ) -> Result<ChatHandle> {
        let address = origin.chat_url(identity)?;
        Ok(Self::open_with_address(
            identity, address, transport, policy, user,
        ))
    }

    pub fn open_with_address<T: DuplexChannelPort>(
        identity: &StreamIdentity,
        address: Url,
        transport: T,
        policy: ReconnectPolicy,
        user: Option<ChatUser>,
    ) -> ChatHandle {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let closing = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let runner = ChatRunner {
            channel: ChatChannel::new(
                transport,
                address,
                policy,
                user,
                event_tx,
                Arc::clone(&closing),
            ),
            state_tx,
            message_tx,
            error_tx,
        };
        let span = info_span!("live_chat", stream_key = %identity);
        let task = tokio::spawn(
            runner
                .run(event_rx, command_rx, cancel.clone())
                .instrument(span),
        );

        ChatHandle {
            commands: command_tx,
            state: state_rx,
            messages: Some(message_rx),
            errors: Some(error_rx),
            closing,
            cancel,
            task: Some(task),
        }
    }
}

struct ChatRunner<T> {
    channel: ChatChannel<T>,
    state_tx: watch::Sender<ConnectionState>,
    message_tx: mpsc::UnboundedSender<ChatMessage>,
    error_tx: mpsc::UnboundedSender<ChatError>,
}

impl<T: DuplexChannelPort> ChatRunner<T> {
    async fn run(
        mut self,
        mut event_rx: mpsc::UnboundedReceiver<GenerationEvent>,
        mut command_rx: mpsc::UnboundedReceiver<ChatCommand>,
        cancel_token: CancellationToken,
    ) {
        let mut reconnect: Timer = None;
        let step = self.channel.connect();
        self.apply(step, &mut reconnect);
        self.publish();

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    debug!("Chat cancelled");
                    break;
                }

                command = command_rx.recv() => match command {
                    Some(ChatCommand::Send { text, reply }) => {
                        let _ = reply.send(self.channel.send(&text));
                    }
                    Some(ChatCommand::SetUser(user)) => self.channel.set_user(user),
                    Some(ChatCommand::Close) => {
                        self.channel.close();
                        reconnect = None;
                    }
                    None => break,
                },

                Some((generation, event)) = event_rx.recv() => {
                    let step = self.channel.handle_event(generation, event, Utc::now());
                    self.apply(step, &mut reconnect);
                }

                _ = fire(&mut reconnect) => {
                    reconnect = None;
                    let step = self.channel.reconnect_due();
                    self.apply(step, &mut reconnect);
                }
            }
            self.publish();
        }

        self.channel.close();
        self.publish();
        debug!(
            dropped_frames = self.channel.dropped_frames(),
            "Chat task finished"
        );
    }

    fn apply(&self, step: ChannelStep, reconnect: &mut Timer) {
        match step {
            ChannelStep::Idle => {}
            ChannelStep::Message(message) => {
                let _ = self.message_tx.send(message);
            }
            ChannelStep::Reconnect { delay, .. } => {
                *reconnect = arm(delay);
            }
            ChannelStep::Exhausted { attempts } => {
                *reconnect = None;
                let _ = self
                    .error_tx
                    .send(ChatError::ReconnectExhausted { attempts });
            }
        }
    }

    fn publish(&self) {
        let state = self.channel.state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

/// Control surface of a running chat channel.
///
/// Dropping the handle closes the channel without waiting for it.
pub struct ChatHandle {
    commands: mpsc::UnboundedSender<ChatCommand>,
    state: watch::Receiver<ConnectionState>,
    messages: Option<mpsc::UnboundedReceiver<ChatMessage>>,
    errors: Option<mpsc::UnboundedReceiver<ChatError>>,
    closing: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ChatHandle {
    /// Send a message as the current user.
    pub async fn send(&self, text: impl Into<String>) -> Result<()> {
        if self.closing.load(Ordering::Acquire) {
            return Err(SendRejected::ShutDown.into());
        }
        let (reply, response) = oneshot::channel();
        self.commands
            .send(ChatCommand::Send {
                text: text.into(),
                reply,
            })
            .map_err(|_| SendRejected::ShutDown)?;
        response.await.map_err(|_| SendRejected::ShutDown)?
    }

    pub fn set_user(&self, user: Option<ChatUser>) -> bool {
        self.commands.send(ChatCommand::SetUser(user)).is_ok()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Take the inbound message stream. Only the first call returns it.
    pub fn take_messages(&mut self) -> Option<mpsc::UnboundedReceiver<ChatMessage>> {
        self.messages.take()
    }

    /// Take the error channel. Only the first call returns it.
    pub fn take_errors(&mut self) -> Option<mpsc::UnboundedReceiver<ChatError>> {
        self.errors.take()
    }

    /// Mark the channel as intentionally closing. From here on no reconnect
    /// is scheduled or started, even for a close that is already queued.
    pub fn begin_close(&self) {
        self.closing.store(true, Ordering::Release);
        let _ = self.commands.send(ChatCommand::Close);
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the task without waiting for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Close the channel and wait until the socket has been released.
    pub async fn close(&mut self) {
        self.begin_close();
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            debug!(error = %e, "Chat task ended abnormally");
        }
    }
}

impl Drop for ChatHandle {
    fn drop(&mut self) {
        self.closing.store(true, Ordering::Release);
        self.cancel.cancel();
    }
}
