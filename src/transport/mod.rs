use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod queue;
pub mod websocket;

pub use queue::{QueueClosed, QueueStats, SendQueue};
pub use websocket::{WebSocketConfig, WebSocketTransport};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("websocket failure: {0}")]
    WebSocket(String),
}

/// Duplex frame channel the session engine runs over.
///
/// Implementations hand over raw frame bytes and assume authentication
/// already happened upstream; the session never logs in by itself.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Ships one frame to the peer.
    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Next inbound frame, or `None` once the peer is gone.
    async fn recv(&mut self) -> Option<Vec<u8>>;
}

/// In-memory cross-wired transport pair for tests and local loopback.
pub fn pair() -> (PairTransport, PairTransport) {
    let (left_tx, left_rx) = mpsc::unbounded_channel();
    let (right_tx, right_rx) = mpsc::unbounded_channel();
    (
        PairTransport {
            tx: left_tx,
            rx: right_rx,
        },
        PairTransport {
            tx: right_tx,
            rx: left_rx,
        },
    )
}

pub struct PairTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

#[async_trait]
impl Transport for PairTransport {
    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}
