use stream_types::OriginError;
use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, PlaybackError>;

/// Errors surfaced by the playback synchronizer and its decoders.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Neither the enhanced decoder nor native playback is available.
    #[error("live playback is not supported by this runtime")]
    Unsupported,

    #[error("invalid stream source: {0}")]
    Source(#[from] OriginError),

    #[error("failed to attach source {url}: {reason}")]
    Attach { url: String, reason: String },

    /// The decoder reported an unrecoverable error.
    #[error("fatal stream error ({details}): {message}")]
    Fatal { details: String, message: String },

    /// A non-fatal media error whose recovery attempt failed.
    #[error("media recovery after {details} failed: {reason}")]
    RecoveryFailed { details: String, reason: String },

    #[error("manifest error: {reason}")]
    Manifest { reason: String },

    #[error("playlist request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    /// A decoder control call was refused (e.g. autoplay blocked).
    #[error("decoder error: {reason}")]
    Decoder { reason: String },
}

impl PlaybackError {
    pub fn attach(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Attach {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn manifest(reason: impl Into<String>) -> Self {
        Self::Manifest {
            reason: reason.into(),
        }
    }

    pub fn decoder(reason: impl Into<String>) -> Self {
        Self::Decoder {
            reason: reason.into(),
        }
    }

    /// Whether this error ends the playback session.
    ///
    /// Refused control calls and single failed playlist requests are retried
    /// or ignored by the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Decoder { .. } | Self::Network { .. })
    }

    /// Short human-readable message for the view.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unsupported => "Live playback is not supported on this device",
            Self::Source(_) | Self::Attach { .. } => "Player initialization failed",
            Self::Fatal { .. }
            | Self::RecoveryFailed { .. }
            | Self::Manifest { .. }
            | Self::Network { .. }
            | Self::Decoder { .. } => "Stream error",
        }
    }
}
