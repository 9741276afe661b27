//! Live HLS playback synchronizer.
//!
//! Keeps a live media buffer close to the broadcast live edge and reports
//! the current lag to the view.
//!
//! - [`LiveSynchronizer`] - sans-IO state machine over a [`MediaDecoderPort`]
//! - [`LivePlayer`] / [`PlayerHandle`] - the tokio task that owns the decoder
//!   and polls lag every 500 ms
//! - [`HeadlessHlsDecoder`] - playlist-following decoder for hosts without a
//!   media element

pub mod config;
pub mod decoder;
pub mod error;
pub mod headless;
pub mod player;
pub mod state;
pub mod synchronizer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use config::{BufferConfig, PlaybackConfig, SyncConfig};
pub use decoder::{
    AttachMode, DecoderError, DecoderErrorKind, DecoderEvent, DecoderEventReceiver,
    DecoderEventSender, MediaDecoderPort, PlaybackSupport,
};
pub use error::{PlaybackError, Result};
pub use headless::{HeadlessDecoderConfig, HeadlessHlsDecoder};
pub use player::{LivePlayer, PlayerCommand, PlayerHandle};
pub use state::{BufferState, PlaybackPhase, PlaybackSnapshot};
pub use synchronizer::{LiveSynchronizer, SyncAction};
