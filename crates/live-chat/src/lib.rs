//! Resilient live chat channel.
//!
//! One [`LiveChat`] task per stream view keeps a chat socket open. After an
//! unexpected close it reconnects with bounded exponential backoff.
//!
//! The socket itself sits behind [`DuplexChannelPort`];
//! [`WebSocketTransport`] is the `tokio-tungstenite` implementation.

pub mod backoff;
mod channel;
pub mod error;
pub mod message;
pub mod state;
pub mod transport;
pub mod websocket;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use backoff::ReconnectPolicy;
pub use channel::{ChatHandle, LiveChat};
pub use error::{ChatError, Result, SendRejected};
pub use message::{ChatMessage, ChatUser, MAX_MESSAGE_CHARS, MessageId};
pub use state::ConnectionState;
pub use transport::{DuplexChannelPort, TransportEvent, TransportSink};
pub use websocket::{WebSocketConfig, WebSocketTransport};
