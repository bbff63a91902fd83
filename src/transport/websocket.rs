use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::debug;
use url::Url;

use super::{Transport, TransportError};

/// Connection parameters for the legacy realtime channel.
///
/// The server hands out a channel key over HTTP before the websocket opens;
/// that bootstrap is outside this crate, so the config just assembles the
/// channel URL `socket.io/1/websocket/<key>?projectId=<id>` from its parts.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Base URL of the service, e.g. `https://example.com/`.
    pub base_url: String,
    /// Channel key issued during the handshake.
    pub channel_key: String,
    /// Hex project identifier the session will join.
    pub project_id: String,
}

impl WebSocketConfig {
    pub fn new(base_url: impl Into<String>, channel_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            channel_key: channel_key.into(),
            project_id: project_id.into(),
        }
    }

    /// Builds the full websocket URL, mapping http(s) to ws(s).
    pub fn build_url(&self) -> Result<Url, TransportError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|err| TransportError::WebSocket(format!("invalid base url: {err}")))?;
        match url.scheme() {
            "https" | "wss" => url.set_scheme("wss").ok(),
            "http" | "ws" => url.set_scheme("ws").ok(),
            other => {
                return Err(TransportError::WebSocket(format!(
                    "unsupported scheme: {other}"
                )));
            }
        };
        url = url
            .join(&format!("socket.io/1/websocket/{}", self.channel_key))
            .map_err(|err| TransportError::WebSocket(format!("invalid channel key: {err}")))?;
        url.set_query(Some(&format!("projectId={}", self.project_id)));
        Ok(url)
    }
}

/// Websocket implementation of [`Transport`], with a pump task owning the
/// socket and mpsc channels on either side.
pub struct WebSocketTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    pump: tokio::task::JoinHandle<()>,
}

impl WebSocketTransport {
    pub async fn connect(config: &WebSocketConfig) -> Result<Self, TransportError> {
        let url = config.build_url()?;
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| TransportError::WebSocket(err.to_string()))?;

        let (tx_out, rx_out) = mpsc::unbounded_channel::<Vec<u8>>();
        let (tx_in, rx_in) = mpsc::unbounded_channel::<Vec<u8>>();
        let pump = tokio::spawn(pump_socket(stream, rx_out, tx_in));

        Ok(Self {
            tx: tx_out,
            rx: rx_in,
            pump,
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Moves frames between the socket and the channel pair until either side
/// closes.
async fn pump_socket(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut rx_out: mpsc::UnboundedReceiver<Vec<u8>>,
    tx_in: mpsc::UnboundedSender<Vec<u8>>,
) {
    let (mut sink, mut source) = stream.split();
    let writer_gone = Arc::new(AtomicBool::new(false));

    let writer_flag = writer_gone.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx_out.recv().await {
            // The protocol is textual; fall back to a binary frame for
            // anything that is not UTF-8.
            let message = match String::from_utf8(frame) {
                Ok(text) => Message::Text(text),
                Err(err) => Message::Binary(err.into_bytes()),
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
        writer_flag.store(true, Ordering::SeqCst);
        let _ = sink.close().await;
    });

    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if tx_in.send(text.into_bytes()).is_err() {
                    break;
                }
            }
            Ok(Message::Binary(data)) => {
                if tx_in.send(data).is_err() {
                    break;
                }
            }
            Ok(Message::Close(frame)) => {
                debug!(?frame, "websocket closed by peer");
                break;
            }
            Err(err) => {
                debug!(%err, "websocket receive failed");
                break;
            }
            // Ping/pong handled by tungstenite.
            Ok(_) => {}
        }
        if writer_gone.load(Ordering::SeqCst) {
            break;
        }
    }

    writer.abort();
    let _ = writer.await;
}
