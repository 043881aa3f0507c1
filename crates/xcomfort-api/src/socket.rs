//! Text-frame socket abstraction.
//!
//! The handshake and the pump only need "send a text frame", "receive the
//! next text frame" and "close". [`Socket`] pairs a [`FrameSink`] with a
//! [`FrameSource`] so the same code drives a real bridge WebSocket and the
//! in-memory pair used by tests and embedders.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;

const IN_MEMORY_CAPACITY: usize = 256;

// ── Traits ───────────────────────────────────────────────────────────

/// Outbound half of a frame socket.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_frame(&mut self, frame: String) -> Result<(), Error>;

    /// Close the socket. Idempotent.
    async fn close(&mut self) -> Result<(), Error>;
}

/// Inbound half of a frame socket.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Next text frame. `None` means the peer closed cleanly.
    async fn next_frame(&mut self) -> Option<Result<String, Error>>;
}

/// A connected frame socket, split into its two halves.
pub struct Socket {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

impl Socket {
    pub fn new(sink: Box<dyn FrameSink>, source: Box<dyn FrameSource>) -> Self {
        Self { sink, source }
    }

    /// Open a WebSocket to the bridge.
    pub async fn connect(url: &Url) -> Result<Self, Error> {
        tracing::info!(url = %url, "Connecting to bridge WebSocket");

        let uri: tungstenite::http::Uri = url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(ClientRequestBuilder::new(uri))
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        tracing::info!("WebSocket connected");

        let (write, read) = ws_stream.split();
        Ok(Self::new(
            Box::new(WsSink { inner: write }),
            Box::new(WsSource { inner: read }),
        ))
    }
}

// ── WebSocket ────────────────────────────────────────────────────────

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WsSink {
    inner: SplitSink<WsStream, tungstenite::Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_frame(&mut self, frame: String) -> Result<(), Error> {
        self.inner
            .send(tungstenite::Message::Text(frame.into()))
            .await
            .map_err(|e| match e {
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                    Error::ConnectionClosed
                }
                other => Error::WebSocketConnect(other.to_string()),
            })
    }

    async fn close(&mut self) -> Result<(), Error> {
        match self.inner.close().await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(Error::WebSocketConnect(e.to_string())),
        }
    }
}

struct WsSource {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next_frame(&mut self) -> Option<Result<String, Error>> {
        loop {
            match self.inner.next().await? {
                Ok(tungstenite::Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(tungstenite::Message::Binary(bytes)) => {
                    return Some(
                        String::from_utf8(bytes.to_vec())
                            .map_err(|e| Error::transport(format!("binary frame is not UTF-8: {e}"))),
                    );
                }
                Ok(tungstenite::Message::Close(frame)) => {
                    if let Some(ref cf) = frame {
                        tracing::info!(
                            code = %cf.code,
                            reason = %cf.reason,
                            "WebSocket close frame received"
                        );
                    } else {
                        tracing::info!("WebSocket close frame received (no payload)");
                    }
                    return None;
                }
                Ok(_) => {
                    // Ping, Pong, raw Frame -- tungstenite answers pings itself
                    tracing::trace!("WebSocket control frame");
                }
                Err(tungstenite::Error::ConnectionClosed) => return None,
                Err(e) => return Some(Err(Error::WebSocketConnect(e.to_string()))),
            }
        }
    }
}

// ── In-memory ────────────────────────────────────────────────────────

/// The far end of an in-memory socket.
///
/// Frames the client sends arrive on `rx`; frames pushed into `tx` are
/// what the client receives. Dropping `tx` looks like a clean close.
pub struct RemoteEnd {
    pub tx: mpsc::Sender<Result<String, Error>>,
    pub rx: mpsc::Receiver<String>,
}

/// Create a connected in-memory socket and its remote end.
pub fn in_memory() -> (Socket, RemoteEnd) {
    let (to_remote, from_client) = mpsc::channel(IN_MEMORY_CAPACITY);
    let (to_client, from_remote) = mpsc::channel(IN_MEMORY_CAPACITY);

    let socket = Socket::new(
        Box::new(ChannelSink {
            tx: Some(to_remote),
        }),
        Box::new(ChannelSource { rx: from_remote }),
    );
    let remote = RemoteEnd {
        tx: to_client,
        rx: from_client,
    };
    (socket, remote)
}

struct ChannelSink {
    tx: Option<mpsc::Sender<String>>,
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send_frame(&mut self, frame: String) -> Result<(), Error> {
        let tx = self.tx.as_ref().ok_or(Error::ConnectionClosed)?;
        tx.send(frame).await.map_err(|_| Error::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.tx = None;
        Ok(())
    }
}

struct ChannelSource {
    rx: mpsc::Receiver<Result<String, Error>>,
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn next_frame(&mut self) -> Option<Result<String, Error>> {
        self.rx.recv().await
    }
}
