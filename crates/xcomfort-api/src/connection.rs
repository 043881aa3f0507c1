//! Established secure connection and its receive pump.
//!
//! A [`Connection`] owns one authenticated socket. All writes (acks,
//! commands, bootstrap requests) go through a single [`ConnectionSender`],
//! which also owns the outbound sequence counter, so `mc` values strictly
//! increase no matter how many tasks send concurrently.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;

use crate::codec::{SessionCipher, SessionKeys};
use crate::error::Error;
use crate::message::{Message, MessageType};
use crate::socket::{FrameSink, FrameSource, Socket};

// ── SessionState ─────────────────────────────────────────────────────

/// Lifecycle of one session's data load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SessionState {
    /// Handshake done, pump not started.
    Initial,
    /// Bootstrap requests sent, bridge is streaming state.
    Loading,
    /// The bulk snapshot's final item has been seen.
    Loaded,
}

// ── InboundMessage ───────────────────────────────────────────────────

/// A decoded inbound message that carried a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub type_int: Option<i32>,
    pub payload: Value,
}

impl InboundMessage {
    pub fn message_type(&self) -> Option<MessageType> {
        self.type_int.and_then(MessageType::from_code)
    }
}

// ── ConnectionSender ─────────────────────────────────────────────────

struct Outbound {
    sink: Box<dyn FrameSink>,
    mc: i64,
}

/// Cloneable write handle for one connection.
#[derive(Clone)]
pub struct ConnectionSender {
    outbound: Arc<Mutex<Outbound>>,
    cipher: Arc<SessionCipher>,
}

impl ConnectionSender {
    /// Send a message with a freshly allocated sequence number.
    ///
    /// Returns the `mc` the message went out with.
    pub async fn send_message(&self, message_type: MessageType, payload: Value) -> Result<i64, Error> {
        let mut out = self.outbound.lock().await;
        out.mc += 1;
        let mc = out.mc;

        let frame = self.cipher.encode(&Message::new(message_type, mc, payload))?;
        tracing::trace!(mc, message_type = %message_type, "Sending message");
        out.sink.send_frame(frame).await?;
        Ok(mc)
    }

    /// Send a message as-is (no sequence allocation).
    pub async fn send(&self, message: &Message) -> Result<(), Error> {
        let frame = self.cipher.encode(message)?;
        self.outbound.lock().await.sink.send_frame(frame).await
    }

    /// Acknowledge an inbound sequence number.
    pub async fn ack(&self, reference: i64) -> Result<(), Error> {
        self.send(&Message::ack(reference)).await
    }

    /// The last sequence number handed out.
    pub async fn last_mc(&self) -> i64 {
        self.outbound.lock().await.mc
    }

    pub async fn close(&self) -> Result<(), Error> {
        self.outbound.lock().await.sink.close().await
    }
}

impl std::fmt::Debug for ConnectionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSender").finish_non_exhaustive()
    }
}

// ── Connection ───────────────────────────────────────────────────────

/// An encrypted, authenticated connection to a bridge.
pub struct Connection {
    sender: ConnectionSender,
    source: Box<dyn FrameSource>,
    cipher: Arc<SessionCipher>,
    device_id: String,
    state: watch::Sender<SessionState>,
}

impl Connection {
    /// Wrap a socket whose peer already agreed on `keys`.
    ///
    /// Normally called by the handshake; exposed so embedders and tests
    /// can drive a connection over a pre-keyed transport.
    pub fn from_parts(socket: Socket, keys: SessionKeys, device_id: impl Into<String>) -> Self {
        let cipher = Arc::new(SessionCipher::new(keys));
        let (state, _) = watch::channel(SessionState::Initial);

        Self {
            sender: ConnectionSender {
                outbound: Arc::new(Mutex::new(Outbound {
                    sink: socket.sink,
                    mc: 0,
                })),
                cipher: Arc::clone(&cipher),
            },
            source: socket.source,
            cipher,
            device_id: device_id.into(),
            state,
        }
    }

    pub fn sender(&self) -> ConnectionSender {
        self.sender.clone()
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn session_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Receive and decode one frame. Used by the handshake.
    pub async fn receive(&mut self) -> Result<Message, Error> {
        match self.source.next_frame().await {
            Some(Ok(frame)) => self.cipher.decode(&frame),
            Some(Err(e)) => Err(e),
            None => Err(Error::ConnectionClosed),
        }
    }

    pub async fn send_message(&self, message_type: MessageType, payload: Value) -> Result<i64, Error> {
        self.sender.send_message(message_type, payload).await
    }

    pub async fn close(&self) -> Result<(), Error> {
        self.sender.close().await
    }

    /// Drive the connection until it ends.
    ///
    /// Sends the bootstrap requests, then decodes frames, acks every frame
    /// that carries `mc`, and hands every payload to `on_message` before
    /// reading the next frame. Returns `Ok(())` on a clean close or when
    /// `cancel` fires; socket errors and undecodable frames are returned.
    pub async fn pump<F>(mut self, mut on_message: F, cancel: &CancellationToken) -> Result<(), Error>
    where
        F: FnMut(InboundMessage) + Send,
    {
        self.state.send_replace(SessionState::Loading);

        self.sender.send_message(MessageType::InitialData, Value::Object(Default::default())).await?;
        self.sender.send_message(MessageType::HomeData, Value::Object(Default::default())).await?;
        self.sender.send_message(MessageType::Heartbeat, Value::Object(Default::default())).await?;

        tracing::debug!(device_id = %self.device_id, "Pump started");

        let result = loop {
            let frame = tokio::select! {
                biased;
                () = cancel.cancelled() => break Ok(()),
                frame = self.source.next_frame() => frame,
            };

            let frame = match frame {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => break Err(e),
                None => {
                    tracing::info!("Bridge closed the connection");
                    break Ok(());
                }
            };

            if let Err(e) = self.handle_frame(&frame, &mut on_message).await {
                break Err(e);
            }
        };

        if let Err(e) = self.sender.close().await {
            tracing::debug!(error = %e, "Closing socket after pump failed");
        }
        result
    }

    async fn handle_frame<F>(&self, frame: &str, on_message: &mut F) -> Result<(), Error>
    where
        F: FnMut(InboundMessage) + Send,
    {
        let message = self.cipher.decode(frame)?;
        tracing::trace!(message_type = %message.type_name(), mc = ?message.mc, "Received message");

        if let Some(mc) = message.mc {
            self.sender.ack(mc).await?;
        }

        let Some(payload) = message.payload else {
            return Ok(());
        };

        if message.type_int == Some(MessageType::SetAllData.code()) && payload.get("lastItem").is_some() {
            self.state.send_replace(SessionState::Loaded);
        }

        on_message(InboundMessage {
            type_int: message.type_int,
            payload,
        });
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("device_id", &self.device_id)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}
