//! WebSocket transport over `tokio-tungstenite`.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, trace};
use stream_types::timer::millis;
use url::Url;

use crate::error::{ChatError, Result};
use crate::transport::{DuplexChannelPort, TransportSink};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Time allowed for TCP connect, TLS and the upgrade handshake
    pub connect_timeout_ms: u64,
    /// `Cookie` header sent with the upgrade request
    pub cookie: Option<String>,
    pub user_agent: Option<String>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            cookie: None,
            user_agent: None,
        }
    }
}

impl WebSocketConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

struct Connection {
    outbound: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
}

/// [`DuplexChannelPort`] backed by one WebSocket at a time.
pub struct WebSocketTransport {
    config: WebSocketConfig,
    connection: Option<Connection>,
}

impl WebSocketTransport {
    pub fn new(config: WebSocketConfig) -> Self {
        Self {
            config,
            connection: None,
        }
    }

    fn build_request(&self, address: &Url) -> Result<Request> {
        let mut request = address
            .as_str()
            .into_client_request()
            .map_err(|e| ChatError::connection(format!("invalid chat address {address}: {e}")))?;

        let headers = request.headers_mut();
        if let Some(cookie) = self.config.cookie.as_deref() {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| ChatError::connection(format!("invalid cookie header: {e}")))?;
            headers.insert(header::COOKIE, value);
        }
        if let Some(agent) = self.config.user_agent.as_deref() {
            let value = HeaderValue::from_str(agent)
                .map_err(|e| ChatError::connection(format!("invalid user agent: {e}")))?;
            headers.insert(header::USER_AGENT, value);
        }
        Ok(request)
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(WebSocketConfig::default())
    }
}

impl DuplexChannelPort for WebSocketTransport {
    fn open(&mut self, address: &Url, sink: TransportSink) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ChatError::connection(format!("no async runtime: {e}")))?;
        self.close();
        stream_types::install_rustls_provider();

        let request = self.build_request(address)?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let span = info_span!("chat_socket", generation = sink.generation());
        runtime.spawn(
            run_socket(
                request,
                self.config.connect_timeout(),
                outbound_rx,
                sink,
                cancel.clone(),
            )
            .instrument(span),
        );

        self.connection = Some(Connection {
            outbound: outbound_tx,
            cancel,
        });
        Ok(())
    }

    fn send(&mut self, frame: String) -> Result<()> {
        let connection = self
            .connection
            .as_ref()
            .ok_or_else(|| ChatError::connection("socket is not connected"))?;
        connection
            .outbound
            .send(Message::text(frame))
            .map_err(|_| ChatError::connection("socket is closed"))
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            // The socket task sends a close frame on cancellation and exits.
            connection.cancel.cancel();
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_socket(
    request: Request,
    connect_timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    sink: TransportSink,
    cancel: CancellationToken,
) {
    let connect = tokio::time::timeout(connect_timeout, connect_async(request));
    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        connected = connect => connected,
    };
    let stream = match connected {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            debug!(error = %e, "WebSocket connect failed");
            sink.closed(Some(e.to_string()));
            return;
        }
        Err(_) => {
            debug!(timeout_ms = millis(connect_timeout), "WebSocket connect timed out");
            sink.closed(Some(format!(
                "connect timed out after {}ms",
                connect_timeout.as_millis()
            )));
            return;
        }
    };

    sink.opened();
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }

            Some(message) = outbound.recv() => {
                if let Err(e) = write.send(message).await {
                    sink.error(e.to_string());
                    break;
                }
            }

            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if !sink.frame(text.as_str()) {
                        debug!("Chat channel is gone, closing socket");
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => {
                        if !sink.frame(text) {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Err(_) => trace!(len = data.len(), "Dropping non UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    sink.closed(frame.map(|f| f.reason.as_str().to_string()));
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    sink.error(e.to_string());
                    break;
                }
                None => {
                    sink.closed(None);
                    break;
                }
            },
        }
    }
    debug!("WebSocket task stopped");
}
