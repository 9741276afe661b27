//! One mounted stream view: a playback task next to a chat task.
//!
//! The two subsystems share nothing but the stream identity and the page
//! origin. A playback failure leaves chat running and a dead chat leaves
//! playback running.

use live_chat::{
    ChatError, ChatHandle, ChatMessage, ChatUser, ConnectionState, DuplexChannelPort, LiveChat,
    WebSocketTransport,
};
use live_playback::{
    HeadlessHlsDecoder, LivePlayer, MediaDecoderPort, PlaybackError, PlaybackSnapshot,
    PlayerHandle,
};
use stream_types::StreamIdentity;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::config::ViewConfig;
use crate::error::Result;

pub struct StreamView {
    identity: StreamIdentity,
    player: PlayerHandle,
    chat: ChatHandle,
    torn_down: bool,
}

impl StreamView {
    /// Start playback and chat for `identity`.
    ///
    /// Both addresses are derived before anything is spawned, so an invalid
    /// origin starts neither task.
    pub fn mount<D, T>(
        identity: StreamIdentity,
        config: &ViewConfig,
        decoder: D,
        transport: T,
        user: Option<ChatUser>,
    ) -> Result<Self>
    where
        D: MediaDecoderPort,
        T: DuplexChannelPort,
    {
        let source = config.origin.media_url(&identity)?;
        let chat_address = config.origin.chat_url(&identity)?;
        info!(stream_key = %identity, origin = %config.origin, "Mounting stream view");

        let player =
            LivePlayer::start_with_source(&identity, source, decoder, config.playback.clone());
        let chat = LiveChat::open_with_address(
            &identity,
            chat_address,
            transport,
            config.chat.reconnect.clone(),
            user,
        );

        Ok(Self {
            identity,
            player,
            chat,
            torn_down: false,
        })
    }

    /// Mount with the built-in headless decoder and WebSocket transport.
    pub fn mount_headless(
        identity: StreamIdentity,
        config: &ViewConfig,
        user: Option<ChatUser>,
    ) -> Result<Self> {
        let decoder = HeadlessHlsDecoder::new(config.headless.clone())?;
        let transport = WebSocketTransport::new(config.chat.websocket.clone());
        Self::mount(identity, config, decoder, transport, user)
    }

    pub fn identity(&self) -> &StreamIdentity {
        &self.identity
    }

    pub fn player(&self) -> &PlayerHandle {
        &self.player
    }

    pub fn chat(&self) -> &ChatHandle {
        &self.chat
    }

    pub fn playback(&self) -> PlaybackSnapshot {
        self.player.snapshot()
    }

    /// "LIVE" badge state under the configured lag threshold.
    pub fn is_live(&self) -> bool {
        self.player.is_live()
    }

    pub fn subscribe_playback(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.player.subscribe()
    }

    pub fn chat_state(&self) -> ConnectionState {
        self.chat.state()
    }

    /// Take the inbound chat messages. Only the first call returns them.
    pub fn take_messages(&mut self) -> Option<mpsc::UnboundedReceiver<ChatMessage>> {
        self.chat.take_messages()
    }

    pub fn take_playback_errors(&mut self) -> Option<mpsc::UnboundedReceiver<PlaybackError>> {
        self.player.take_errors()
    }

    pub fn take_chat_errors(&mut self) -> Option<mpsc::UnboundedReceiver<ChatError>> {
        self.chat.take_errors()
    }

    pub async fn send_message(&self, text: impl Into<String>) -> Result<()> {
        Ok(self.chat.send(text).await?)
    }

    pub fn set_user(&self, user: Option<ChatUser>) -> bool {
        self.chat.set_user(user)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Stop both subsystems and wait for them to release their resources.
    ///
    /// Chat is marked as closing before anything is cancelled, so a socket
    /// close caused by the teardown itself never schedules a reconnect.
    /// Calling this again does nothing.
    pub async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        info!(stream_key = %self.identity, "Tearing down stream view");

        self.signal_teardown();
        self.player.stop().await;
        self.chat.close().await;
        debug!(stream_key = %self.identity, "Stream view released");
    }

    fn signal_teardown(&self) {
        self.chat.begin_close();
        self.player.cancel();
        self.chat.cancel();
    }
}

impl Drop for StreamView {
    fn drop(&mut self) {
        if !self.torn_down {
            self.torn_down = true;
            self.signal_teardown();
        }
    }
}
