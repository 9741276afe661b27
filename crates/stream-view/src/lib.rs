//! A live stream view.
//!
//! [`StreamView`] mounts the playback synchronizer from `live-playback` and
//! the chat channel from `live-chat` for one stream and tears both down
//! together. The crate also carries the ambient pieces a host needs:
//! [`ViewConfig`] loading, [`logging::init_tracing`] and the REST
//! [`BackendClient`].

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod view;

pub use backend::{BackendClient, Credentials};
pub use config::{ChatConfig, ViewConfig};
pub use error::{Result, ViewError};
pub use logging::{DEFAULT_LOG_FILTER, init_from_config, init_tracing};
pub use view::StreamView;

pub use live_chat::{ChatMessage, ChatUser, ConnectionState};
pub use live_playback::{PlaybackPhase, PlaybackSnapshot};
pub use stream_types::{PageOrigin, StreamIdentity, TransportSecurity};
