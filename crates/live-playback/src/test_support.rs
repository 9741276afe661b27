//! Scriptable decoder for tests.
//!
//! Available under `cfg(test)` and the `test-utils` feature so dependent
//! crates can drive a player without a media pipeline.

use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

use crate::config::BufferConfig;
use crate::decoder::{
    AttachMode, DecoderEvent, DecoderEventSender, MediaDecoderPort, PlaybackSupport,
};
use crate::error::{PlaybackError, Result};

#[derive(Debug, Default)]
struct MockState {
    attached_url: Option<Url>,
    attached_support: Option<PlaybackSupport>,
    attached_buffer: Option<BufferConfig>,
    events: Option<DecoderEventSender>,
    buffered_end: Option<f64>,
    position: f64,
    seeks: Vec<f64>,
    paused: bool,
    volume: f64,
    attach_count: usize,
    detach_count: usize,
    recover_calls: usize,
    fail_recovery: bool,
    block_autoplay: bool,
    fail_attach: bool,
}

/// A [`MediaDecoderPort`] whose readings are set by the test.
///
/// Clones share state, so the test keeps one clone while the player owns the
/// other.
#[derive(Debug, Clone)]
pub struct MockDecoder {
    support: PlaybackSupport,
    state: Arc<Mutex<MockState>>,
}

impl MockDecoder {
    pub fn new(support: PlaybackSupport) -> Self {
        Self {
            support,
            state: Arc::new(Mutex::new(MockState {
                volume: 1.0,
                paused: true,
                ..MockState::default()
            })),
        }
    }

    pub fn enhanced() -> Self {
        Self::new(PlaybackSupport::Enhanced)
    }

    pub fn native() -> Self {
        Self::new(PlaybackSupport::Native)
    }

    pub fn unsupported() -> Self {
        Self::new(PlaybackSupport::Unsupported)
    }

    pub fn set_buffered_end(&self, end: Option<f64>) {
        self.state.lock().buffered_end = end;
    }

    pub fn set_position(&self, seconds: f64) {
        self.state.lock().position = seconds;
    }

    /// Emit an event as the attached decoder would. Returns false when nothing
    /// is attached.
    pub fn emit(&self, event: DecoderEvent) -> bool {
        let state = self.state.lock();
        match &state.events {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn fail_recovery(&self, fail: bool) {
        self.state.lock().fail_recovery = fail;
    }

    pub fn block_autoplay(&self, block: bool) {
        self.state.lock().block_autoplay = block;
    }

    pub fn fail_attach(&self, fail: bool) {
        self.state.lock().fail_attach = fail;
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.state.lock().seeks.clone()
    }

    pub fn attached_url(&self) -> Option<Url> {
        self.state.lock().attached_url.clone()
    }

    pub fn attached_support(&self) -> Option<PlaybackSupport> {
        self.state.lock().attached_support
    }

    pub fn attached_buffer_config(&self) -> Option<BufferConfig> {
        self.state.lock().attached_buffer.clone()
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().events.is_some()
    }

    pub fn attach_count(&self) -> usize {
        self.state.lock().attach_count
    }

    pub fn detach_count(&self) -> usize {
        self.state.lock().detach_count
    }

    pub fn recover_calls(&self) -> usize {
        self.state.lock().recover_calls
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn volume(&self) -> f64 {
        self.state.lock().volume
    }
}

impl MediaDecoderPort for MockDecoder {
    fn support(&self) -> PlaybackSupport {
        self.support
    }

    fn attach(
        &mut self,
        source: &Url,
        mode: AttachMode<'_>,
        events: DecoderEventSender,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_attach {
            return Err(PlaybackError::attach(source.as_str(), "mock attach failure"));
        }
        state.attach_count += 1;
        state.attached_url = Some(source.clone());
        match mode {
            AttachMode::Enhanced(config) => {
                state.attached_support = Some(PlaybackSupport::Enhanced);
                state.attached_buffer = Some(config.clone());
            }
            AttachMode::Native => {
                state.attached_support = Some(PlaybackSupport::Native);
                state.attached_buffer = None;
            }
        }
        state.events = Some(events);
        Ok(())
    }

    fn detach(&mut self) {
        let mut state = self.state.lock();
        state.detach_count += 1;
        state.events = None;
    }

    fn buffered_end(&self) -> Option<f64> {
        self.state.lock().buffered_end
    }

    fn current_time(&self) -> f64 {
        self.state.lock().position
    }

    fn seek(&mut self, seconds: f64) {
        let mut state = self.state.lock();
        state.seeks.push(seconds);
        state.position = seconds;
    }

    fn play(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.block_autoplay {
            return Err(PlaybackError::decoder("play() request was blocked"));
        }
        state.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.state.lock().paused = true;
    }

    fn set_volume(&mut self, volume: f64) {
        self.state.lock().volume = volume;
    }

    fn recover_media_error(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.recover_calls += 1;
        if state.fail_recovery {
            return Err(PlaybackError::decoder("media recovery failed"));
        }
        Ok(())
    }
}
