//! Chat error types.

use stream_types::OriginError;
use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Why an outgoing message was refused before reaching the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendRejected {
    #[error("chat is not connected")]
    NotOpen,

    #[error("message is empty")]
    Empty,

    #[error("message is {length} characters long, the limit is {limit}")]
    TooLong { length: usize, limit: usize },

    #[error("sign in to chat")]
    Unauthenticated,

    /// The channel task is gone.
    #[error("chat channel has shut down")]
    ShutDown,
}

/// Errors that can occur on a chat channel.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Connection-related errors (connect, read, write)
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid chat address: {0}")]
    Address(#[from] OriginError),

    /// Terminal: the reconnect budget is spent.
    #[error("Chat disconnected after {attempts} reconnect attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Message rejected: {0}")]
    Rejected(#[from] SendRejected),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChatError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }
}
