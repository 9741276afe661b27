//! The duplex channel port.
//!
//! A transport owns one socket at a time. Every `open` receives a fresh
//! [`TransportSink`] tagged with a connection generation; the channel drops
//! events whose generation is no longer current, so a late close from a
//! superseded socket cannot trigger a reconnect.

use tokio::sync::mpsc;
use url::Url;

use crate::error::Result;

/// What happened on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    /// One inbound text frame.
    Frame(String),
    Error(String),
    Closed { reason: Option<String> },
}

pub(crate) type GenerationEvent = (u64, TransportEvent);

/// Event sink handed to [`DuplexChannelPort::open`].
#[derive(Debug, Clone)]
pub struct TransportSink {
    generation: u64,
    tx: mpsc::UnboundedSender<GenerationEvent>,
}

impl TransportSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<GenerationEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report an event. Returns false once the channel is gone.
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx.send((self.generation, event)).is_ok()
    }

    pub fn opened(&self) -> bool {
        self.send(TransportEvent::Opened)
    }

    pub fn frame(&self, text: impl Into<String>) -> bool {
        self.send(TransportEvent::Frame(text.into()))
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.send(TransportEvent::Error(message.into()))
    }

    pub fn closed(&self, reason: Option<String>) -> bool {
        self.send(TransportEvent::Closed { reason })
    }
}

/// Narrow control surface over a bidirectional text socket.
///
/// Calls must not block. `open` only begins connecting; the outcome arrives
/// through the sink. An `Err` from `open` means the attempt could not even
/// start and is treated like an unexpected close.
pub trait DuplexChannelPort: Send + 'static {
    fn open(&mut self, address: &Url, sink: TransportSink) -> Result<()>;

    /// Queue one text frame on the open socket.
    fn send(&mut self, frame: String) -> Result<()>;

    /// Close the current socket, if any. Must be idempotent.
    fn close(&mut self);
}

impl<T: DuplexChannelPort + ?Sized> DuplexChannelPort for Box<T> {
    fn open(&mut self, address: &Url, sink: TransportSink) -> Result<()> {
        (**self).open(address, sink)
    }

    fn send(&mut self, frame: String) -> Result<()> {
        (**self).send(frame)
    }

    fn close(&mut self) {
        (**self).close()
    }
}
