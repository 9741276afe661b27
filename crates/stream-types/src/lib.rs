//! Shared types for a single live stream view.
//!
//! - [`StreamIdentity`] - the stable stream key a view is bound to
//! - [`PageOrigin`] - the hosting page's scheme and host, used to derive the
//!   media manifest URL and the chat socket address
//! - [`timer`] - cancellable one-shot timers for task loops
//! - [`install_rustls_provider`] - process-wide TLS provider setup shared by
//!   the HTTP and WebSocket clients

mod error;
mod identity;
mod origin;
mod tls;
pub mod timer;

pub use error::OriginError;
pub use identity::StreamIdentity;
pub use origin::{PageOrigin, TransportSecurity};
pub use tls::install_rustls_provider;
