//! The media decoder port.
//!
//! A decoder owns the actual media pipeline (a browser media element, a native
//! player, or the headless playlist clock in [`crate::headless`]). The
//! synchronizer drives it through [`MediaDecoderPort`] and receives its
//! lifecycle and error events through the sender handed over on attach.

use serde::Serialize;
use tokio::sync::mpsc;
use url::Url;

use crate::config::BufferConfig;
use crate::error::Result;

/// What kind of playback a decoder can offer in the current runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackSupport {
    /// Segment-level control with tunable buffering.
    Enhanced,
    /// The runtime plays the manifest itself; buffering is not tunable.
    Native,
    Unsupported,
}

/// How a source is attached.
#[derive(Debug, Clone, Copy)]
pub enum AttachMode<'a> {
    Enhanced(&'a BufferConfig),
    Native,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderErrorKind {
    Network,
    Media,
    Other,
}

/// An error reported by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderError {
    pub kind: DecoderErrorKind,
    pub fatal: bool,
    /// Decoder-specific error code, e.g. `bufferStalledError`
    pub details: String,
    pub message: String,
}

impl DecoderError {
    pub const BUFFER_STALLED: &'static str = "bufferStalledError";
    pub const MANIFEST_LOAD: &'static str = "manifestLoadError";
    pub const MANIFEST_PARSING: &'static str = "manifestParsingError";
    pub const LEVEL_LOAD: &'static str = "levelLoadError";

    pub fn fatal(
        kind: DecoderErrorKind,
        details: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            fatal: true,
            details: details.into(),
            message: message.into(),
        }
    }

    pub fn non_fatal(
        kind: DecoderErrorKind,
        details: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            fatal: false,
            details: details.into(),
            message: message.into(),
        }
    }

    pub fn buffer_stalled() -> Self {
        Self::non_fatal(
            DecoderErrorKind::Media,
            Self::BUFFER_STALLED,
            "playback stalled waiting for data",
        )
    }

    pub fn is_buffer_stall(&self) -> bool {
        self.details == Self::BUFFER_STALLED
    }
}

/// Lifecycle, media and error events emitted by a decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderEvent {
    /// The manifest was parsed and the live edge is known.
    ManifestParsed,
    Error(DecoderError),
    /// Playback is starved and waiting for data.
    Waiting,
    CanPlay,
    Playing,
    Play,
    Pause,
    /// Position update in seconds.
    TimeUpdate(f64),
}

pub type DecoderEventSender = mpsc::UnboundedSender<DecoderEvent>;
pub type DecoderEventReceiver = mpsc::UnboundedReceiver<DecoderEvent>;

/// Narrow control surface over a media decoder.
///
/// Calls are synchronous and must not block; anything asynchronous is
/// reported back through the event sender given to [`attach`](Self::attach).
pub trait MediaDecoderPort: Send + 'static {
    fn support(&self) -> PlaybackSupport;

    /// Attach `source` and start loading it.
    fn attach(
        &mut self,
        source: &Url,
        mode: AttachMode<'_>,
        events: DecoderEventSender,
    ) -> Result<()>;

    /// Detach the source and release decoder resources.
    fn detach(&mut self);

    /// End of the last buffered range in seconds, `None` when nothing is buffered.
    fn buffered_end(&self) -> Option<f64>;

    fn current_time(&self) -> f64;

    fn seek(&mut self, seconds: f64);

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    fn set_volume(&mut self, volume: f64);

    /// Try to recover from a non-fatal media error.
    fn recover_media_error(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<D: MediaDecoderPort + ?Sized> MediaDecoderPort for Box<D> {
    fn support(&self) -> PlaybackSupport {
        (**self).support()
    }

    fn attach(
        &mut self,
        source: &Url,
        mode: AttachMode<'_>,
        events: DecoderEventSender,
    ) -> Result<()> {
        (**self).attach(source, mode, events)
    }

    fn detach(&mut self) {
        (**self).detach()
    }

    fn buffered_end(&self) -> Option<f64> {
        (**self).buffered_end()
    }

    fn current_time(&self) -> f64 {
        (**self).current_time()
    }

    fn seek(&mut self, seconds: f64) {
        (**self).seek(seconds)
    }

    fn play(&mut self) -> Result<()> {
        (**self).play()
    }

    fn pause(&mut self) {
        (**self).pause()
    }

    fn set_volume(&mut self, volume: f64) {
        (**self).set_volume(volume)
    }

    fn recover_media_error(&mut self) -> Result<()> {
        (**self).recover_media_error()
    }
}
