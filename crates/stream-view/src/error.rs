use std::path::PathBuf;

use live_chat::ChatError;
use live_playback::PlaybackError;
use stream_types::OriginError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ViewError>;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error(transparent)]
    Origin(#[from] OriginError),

    #[error("playback: {0}")]
    Playback(#[from] PlaybackError),

    #[error("chat: {0}")]
    Chat(#[from] ChatError),

    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("backend request failed: {0}")]
    Backend(#[from] reqwest::Error),

    #[error("invalid backend path {path}: {reason}")]
    BackendPath { path: String, reason: String },
}

impl ViewError {
    pub fn config_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ConfigIo {
            path: path.into(),
            source,
        }
    }

    pub fn backend_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BackendPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
