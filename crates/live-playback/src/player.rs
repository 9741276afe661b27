//! Task driving a [`LiveSynchronizer`].
//!
//! One tokio task per playback session owns the decoder along with its
//! timers. The UI talks to it through a
//! [`PlayerHandle`]: commands in, snapshots and errors out.

use stream_types::timer::{Timer, arm, fire};
use stream_types::{PageOrigin, StreamIdentity};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span};
use url::Url;

use crate::config::PlaybackConfig;
use crate::decoder::MediaDecoderPort;
use crate::error::{PlaybackError, Result};
use crate::state::PlaybackSnapshot;
use crate::synchronizer::{LiveSynchronizer, SyncAction};

/// User controls forwarded to the playback task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerCommand {
    Seek(f64),
    TogglePause,
    SetVolume(f64),
    ToggleMute,
    JumpToLive,
}

pub struct LivePlayer;

impl LivePlayer {
    /// Spawn the playback task for `identity`.
    ///
    /// Only an invalid source address is reported here. Decoder failures,
    /// including an unsupported runtime, end up in the snapshot and on the
    /// error channel.
    pub fn start<D: MediaDecoderPort>(
        identity: &StreamIdentity,
        origin: &PageOrigin,
        decoder: D,
        config: PlaybackConfig,
    ) -> Result<PlayerHandle> {
        let source = origin.media_url(identity)?;
        Ok(Self::start_with_source(identity, source, decoder, config))
    }

    /// Spawn the playback task for an already resolved manifest URL.
    pub fn start_with_source<D: MediaDecoderPort>(
        identity: &StreamIdentity,
        source: Url,
        decoder: D,
        config: PlaybackConfig,
    ) -> PlayerHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(PlaybackSnapshot::default());
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let live_threshold_secs = config.sync.live_threshold_secs;

        let runner = PlayerRunner {
            sync: LiveSynchronizer::new(decoder, config.sync, config.buffer),
            source,
            snapshot_tx,
            error_tx,
        };
        let span = info_span!("live_player", stream_key = %identity);
        let task = tokio::spawn(runner.run(command_rx, cancel.clone()).instrument(span));

        PlayerHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
            errors: Some(error_rx),
            live_threshold_secs,
            cancel,
            task: Some(task),
        }
    }
}

struct PlayerRunner<D> {
    sync: LiveSynchronizer<D>,
    source: Url,
    snapshot_tx: watch::Sender<PlaybackSnapshot>,
    error_tx: mpsc::UnboundedSender<PlaybackError>,
}

impl<D: MediaDecoderPort> PlayerRunner<D> {
    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<PlayerCommand>,
        cancel_token: CancellationToken,
    ) {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        if let Err(e) = self.sync.start(&self.source, event_tx) {
            self.report(e);
            self.publish();
            return;
        }
        self.publish();

        let period = self.sync.config().poll_interval();
        let mut poll = time::interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut live_seek: Timer = None;

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    debug!("Playback cancelled");
                    break;
                }

                Some(event) = event_rx.recv() => {
                    match self.sync.handle_event(event) {
                        Ok(SyncAction::None) => {}
                        Ok(SyncAction::ScheduleLiveSeek(delay)) => {
                            live_seek = arm(delay);
                        }
                        Err(e) => {
                            let fatal = e.is_fatal();
                            self.report(e);
                            if fatal {
                                break;
                            }
                        }
                    }
                }

                command = command_rx.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },

                _ = fire(&mut live_seek) => {
                    live_seek = None;
                    self.sync.jump_to_live();
                }

                _ = poll.tick() => {
                    self.sync.poll_lag();
                }
            }
            self.publish();
        }

        self.sync.stop();
        self.publish();
        info!(phase = ?self.sync.snapshot().phase, "Playback task finished");
    }

    fn apply(&mut self, command: PlayerCommand) {
        match command {
            PlayerCommand::Seek(target) => {
                self.sync.seek(target);
            }
            PlayerCommand::TogglePause => self.sync.toggle_pause(),
            PlayerCommand::SetVolume(volume) => {
                self.sync.set_volume(volume);
            }
            PlayerCommand::ToggleMute => {
                self.sync.toggle_mute();
            }
            PlayerCommand::JumpToLive => {
                self.sync.jump_to_live();
            }
        }
    }

    fn publish(&self) {
        let snapshot = self.sync.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if current == snapshot {
                false
            } else {
                *current = snapshot.clone();
                true
            }
        });
    }

    fn report(&self, error: PlaybackError) {
        // The receiver may have been dropped by a view that ignores errors.
        let _ = self.error_tx.send(error);
    }
}

/// Control surface of a running playback session.
///
/// Dropping the handle cancels the session without waiting for it.
pub struct PlayerHandle {
    commands: mpsc::UnboundedSender<PlayerCommand>,
    snapshot: watch::Receiver<PlaybackSnapshot>,
    errors: Option<mpsc::UnboundedReceiver<PlaybackError>>,
    live_threshold_secs: f64,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PlayerHandle {
    /// Queue a command. Returns false once the session has ended.
    pub fn send(&self, command: PlayerCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn seek(&self, target: f64) -> bool {
        self.send(PlayerCommand::Seek(target))
    }

    pub fn toggle_pause(&self) -> bool {
        self.send(PlayerCommand::TogglePause)
    }

    pub fn set_volume(&self, volume: f64) -> bool {
        self.send(PlayerCommand::SetVolume(volume))
    }

    pub fn toggle_mute(&self) -> bool {
        self.send(PlayerCommand::ToggleMute)
    }

    pub fn jump_to_live(&self) -> bool {
        self.send(PlayerCommand::JumpToLive)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Whether the stream should be presented as "LIVE", using the
    /// configured lag threshold.
    pub fn is_live(&self) -> bool {
        self.snapshot.borrow().is_live(self.live_threshold_secs)
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshot.clone()
    }

    /// Take the error channel. Only the first call returns it.
    pub fn take_errors(&mut self) -> Option<mpsc::UnboundedReceiver<PlaybackError>> {
        self.errors.take()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signal the task to stop without waiting for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancel the session and wait until the decoder has been released.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!(error = %e, "Playback task ended abnormally");
            }
        }
    }
}

impl Drop for PlayerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
