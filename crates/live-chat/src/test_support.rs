//! Scriptable transport for tests.
//!
//! Available under `cfg(test)` and the `test-utils` feature.

use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

use crate::error::{ChatError, Result};
use crate::transport::{DuplexChannelPort, TransportEvent, TransportSink};

#[derive(Debug, Default)]
struct MockState {
    opens: Vec<(Url, TransportSink)>,
    sent: Vec<String>,
    close_count: usize,
    fail_open: bool,
    fail_send: bool,
}

/// A [`DuplexChannelPort`] that records calls and lets the test play the
/// server side. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `open` fail synchronously.
    pub fn fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    pub fn fail_send(&self, fail: bool) {
        self.state.lock().fail_send = fail;
    }

    /// Number of connection attempts that reached the transport, including
    /// ones that failed synchronously.
    pub fn open_count(&self) -> usize {
        self.state.lock().opens.len()
    }

    pub fn last_address(&self) -> Option<Url> {
        self.state.lock().opens.last().map(|(url, _)| url.clone())
    }

    /// Sink of connection attempt `index` (0-based).
    pub fn sink(&self, index: usize) -> Option<TransportSink> {
        self.state.lock().opens.get(index).map(|(_, sink)| sink.clone())
    }

    /// Emit an event on the most recent connection.
    pub fn emit(&self, event: TransportEvent) -> bool {
        let sink = self.state.lock().opens.last().map(|(_, sink)| sink.clone());
        sink.is_some_and(|sink| sink.send(event))
    }

    pub fn accept(&self) -> bool {
        self.emit(TransportEvent::Opened)
    }

    pub fn push_frame(&self, text: impl Into<String>) -> bool {
        self.emit(TransportEvent::Frame(text.into()))
    }

    pub fn drop_connection(&self) -> bool {
        self.emit(TransportEvent::Closed {
            reason: Some("connection reset".to_string()),
        })
    }

    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().close_count
    }
}

impl DuplexChannelPort for MockTransport {
    fn open(&mut self, address: &Url, sink: TransportSink) -> Result<()> {
        let mut state = self.state.lock();
        state.opens.push((address.clone(), sink));
        if state.fail_open {
            return Err(ChatError::connection("mock open failure"));
        }
        Ok(())
    }

    fn send(&mut self, frame: String) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_send {
            return Err(ChatError::connection("mock send failure"));
        }
        state.sent.push(frame);
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().close_count += 1;
    }
}
