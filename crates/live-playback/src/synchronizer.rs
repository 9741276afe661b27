//! Live-edge synchronizer state machine.
//!
//! [`LiveSynchronizer`] holds the decoder and the [`PlaybackSnapshot`] and
//! reacts to one input at a time: a decoder event, a lag poll, the expiry of
//! the live-seek grace delay, or a user control. It never sleeps or spawns;
//! timers are owned by the task in [`crate::player`].

use std::time::Duration;

use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::config::{BufferConfig, SyncConfig};
use crate::decoder::{
    AttachMode, DecoderError, DecoderEvent, DecoderEventSender, MediaDecoderPort, PlaybackSupport,
};
use crate::error::{PlaybackError, Result};
use crate::state::{BufferState, PlaybackPhase, PlaybackSnapshot};

/// Follow-up work requested by an event handler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncAction {
    None,
    /// Seek to the live edge once the delay elapses.
    ScheduleLiveSeek(Duration),
}

pub struct LiveSynchronizer<D> {
    decoder: D,
    config: SyncConfig,
    buffer_config: BufferConfig,
    snapshot: PlaybackSnapshot,
    attached: bool,
    /// Non-fatal errors seen since start; tracked, never escalated on count alone
    non_fatal_errors: u64,
}

impl<D: MediaDecoderPort> LiveSynchronizer<D> {
    pub fn new(decoder: D, config: SyncConfig, buffer_config: BufferConfig) -> Self {
        Self {
            decoder,
            config,
            buffer_config,
            snapshot: PlaybackSnapshot::default(),
            attached: false,
            non_fatal_errors: 0,
        }
    }

    pub fn snapshot(&self) -> &PlaybackSnapshot {
        &self.snapshot
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn non_fatal_errors(&self) -> u64 {
        self.non_fatal_errors
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Attach `source` and request playback.
    ///
    /// Falls back to native playback when the enhanced decoder is missing and
    /// fails with [`PlaybackError::Unsupported`] when neither is available.
    pub fn start(&mut self, source: &Url, events: DecoderEventSender) -> Result<()> {
        if self.attached {
            return Ok(());
        }

        let support = self.decoder.support();
        let attached = match support {
            PlaybackSupport::Enhanced => {
                self.decoder
                    .attach(source, AttachMode::Enhanced(&self.buffer_config), events)
            }
            PlaybackSupport::Native => {
                info!(url = %source, "Enhanced decoder unavailable, using native playback");
                self.decoder.attach(source, AttachMode::Native, events)
            }
            PlaybackSupport::Unsupported => Err(PlaybackError::Unsupported),
        };

        if let Err(e) = attached {
            self.fail(&e);
            return Err(e);
        }

        self.attached = true;
        self.snapshot.phase = PlaybackPhase::Loading;
        self.snapshot.support = Some(support);
        self.snapshot.error = None;
        self.decoder.set_volume(self.snapshot.volume);
        info!(url = %source, ?support, "Live source attached");

        if let Err(e) = self.decoder.play() {
            warn!(error = %e, "Autoplay was refused");
            self.snapshot.paused = true;
        }
        Ok(())
    }

    /// Apply one decoder event.
    ///
    /// Returns an error only for conditions that stop playback; the session is
    /// already released when that happens.
    pub fn handle_event(&mut self, event: DecoderEvent) -> Result<SyncAction> {
        if !self.attached {
            trace!(?event, "Ignoring decoder event while detached");
            return Ok(SyncAction::None);
        }

        match event {
            DecoderEvent::ManifestParsed => {
                info!("Stream manifest ready");
                self.snapshot.error = None;
                self.snapshot.phase = PlaybackPhase::Playing;
                return Ok(SyncAction::ScheduleLiveSeek(self.config.live_seek_grace()));
            }
            DecoderEvent::Error(err) => self.handle_decoder_error(err)?,
            DecoderEvent::Waiting => self.snapshot.buffer.buffering = true,
            DecoderEvent::CanPlay => self.snapshot.buffer.buffering = false,
            DecoderEvent::Playing => {
                self.snapshot.buffer.buffering = false;
                self.snapshot.paused = false;
                if self.snapshot.phase == PlaybackPhase::Loading {
                    self.snapshot.phase = PlaybackPhase::Playing;
                }
            }
            DecoderEvent::Play => self.snapshot.paused = false,
            DecoderEvent::Pause => self.snapshot.paused = true,
            DecoderEvent::TimeUpdate(position) => {
                let buffer = self.snapshot.buffer;
                let edge = self
                    .decoder
                    .buffered_end()
                    .unwrap_or(buffer.live_edge_seconds);
                self.snapshot.buffer = BufferState::observe(
                    edge,
                    position,
                    self.config.position_epsilon_secs,
                    buffer.buffering,
                );
            }
        }
        Ok(SyncAction::None)
    }

    fn handle_decoder_error(&mut self, err: DecoderError) -> Result<()> {
        if !err.fatal {
            if err.is_buffer_stall() {
                trace!("Buffer stall on live stream");
                return Ok(());
            }

            self.non_fatal_errors += 1;
            warn!(
                details = %err.details,
                message = %err.message,
                count = self.non_fatal_errors,
                "Non-fatal decoder error, attempting recovery"
            );
            return match self.decoder.recover_media_error() {
                Ok(()) => Ok(()),
                Err(e) => {
                    let escalated = PlaybackError::RecoveryFailed {
                        details: err.details,
                        reason: e.to_string(),
                    };
                    error!(error = %escalated, "Decoder recovery failed");
                    self.fail(&escalated);
                    Err(escalated)
                }
            };
        }

        let fatal = PlaybackError::Fatal {
            details: err.details,
            message: err.message,
        };
        error!(error = %fatal, "Fatal decoder error");
        self.fail(&fatal);
        Err(fatal)
    }

    /// Seek to `live_edge - margin` once the grace delay has elapsed.
    ///
    /// Returns the target, or `None` when nothing is buffered yet.
    pub fn jump_to_live(&mut self) -> Option<f64> {
        if !self.attached {
            return None;
        }
        let edge = self.decoder.buffered_end()?;
        let target = (edge - self.config.live_edge_margin_secs).max(0.0);
        self.decoder.seek(target);
        self.snapshot.buffer = BufferState::observe(
            edge,
            target,
            self.config.position_epsilon_secs,
            self.snapshot.buffer.buffering,
        );
        info!(live_edge = edge, position = target, "Jumped to live edge");
        Some(target)
    }

    /// Read the buffered end and position from the decoder.
    ///
    /// Stale readings are overwritten. Returns `None` while nothing is buffered.
    pub fn poll_lag(&mut self) -> Option<BufferState> {
        if !self.attached {
            return None;
        }
        let edge = self.decoder.buffered_end()?;
        let position = self.decoder.current_time();
        let epsilon = self.config.position_epsilon_secs;
        if position > edge + epsilon {
            debug!(live_edge = edge, position, "Decoder reported position past live edge");
        }
        let state = BufferState::observe(edge, position, epsilon, self.snapshot.buffer.buffering);
        self.snapshot.buffer = state;
        Some(state)
    }

    /// User scrub, clamped into `[0, live_edge]`.
    pub fn seek(&mut self, target: f64) -> Option<f64> {
        if !self.attached {
            return None;
        }
        let edge = self
            .decoder
            .buffered_end()
            .unwrap_or(self.snapshot.buffer.live_edge_seconds)
            .max(0.0);
        let clamped = if target.is_finite() {
            target.clamp(0.0, edge)
        } else {
            0.0
        };
        self.decoder.seek(clamped);
        self.snapshot.buffer = BufferState::observe(
            edge,
            clamped,
            self.config.position_epsilon_secs,
            self.snapshot.buffer.buffering,
        );
        debug!(target, position = clamped, "Seek");
        Some(clamped)
    }

    pub fn toggle_pause(&mut self) {
        if !self.attached {
            return;
        }
        if self.snapshot.paused {
            match self.decoder.play() {
                Ok(()) => self.snapshot.paused = false,
                Err(e) => warn!(error = %e, "Resume was refused"),
            }
        } else {
            self.decoder.pause();
            self.snapshot.paused = true;
        }
    }

    /// Set the volume, clamped into `[0, 1]`. Non-finite values are ignored.
    pub fn set_volume(&mut self, volume: f64) -> f64 {
        if !volume.is_finite() {
            return self.snapshot.volume;
        }
        let volume = volume.clamp(0.0, 1.0);
        if self.attached {
            self.decoder.set_volume(volume);
        }
        self.snapshot.volume = volume;
        volume
    }

    /// Mute when audible, otherwise restore half volume.
    pub fn toggle_mute(&mut self) -> f64 {
        let next = if self.snapshot.volume > 0.0 { 0.0 } else { 0.5 };
        self.set_volume(next)
    }

    /// Detach the source. Safe to call repeatedly and after a failure.
    pub fn stop(&mut self) {
        let released = self.release();
        if self.snapshot.phase != PlaybackPhase::Failed {
            self.snapshot.phase = PlaybackPhase::Stopped;
        }
        self.snapshot.buffer.buffering = false;
        if released {
            info!("Playback stopped");
        }
    }

    fn fail(&mut self, err: &PlaybackError) {
        self.release();
        self.snapshot.phase = PlaybackPhase::Failed;
        self.snapshot.buffer.buffering = false;
        self.snapshot.error = Some(err.user_message().to_string());
    }

    fn release(&mut self) -> bool {
        if !self.attached {
            return false;
        }
        self.decoder.detach();
        self.attached = false;
        true
    }
}
