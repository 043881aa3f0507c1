// ── Command routing ──
//
// Entities never hold a connection. They hold a `CommandSink`, which the
// bridge points at whichever connection is currently live.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use serde_json::Value;
use xcomfort_api::{ConnectionSender, MessageType};

use crate::error::CoreError;

/// Where outbound commands go.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Send one command. Returns once the frame is handed to the socket.
    async fn send_message(&self, message_type: MessageType, payload: Value) -> Result<(), CoreError>;
}

/// The active connection's sender, swapped on every reconnect.
#[derive(Default)]
pub(crate) struct CommandRoute {
    active: ArcSwapOption<ConnectionSender>,
}

impl CommandRoute {
    pub(crate) fn install(&self, sender: ConnectionSender) {
        self.active.store(Some(Arc::new(sender)));
    }

    pub(crate) fn clear(&self) {
        self.active.store(None);
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.active.load().is_some()
    }
}

#[async_trait]
impl CommandSink for CommandRoute {
    async fn send_message(&self, message_type: MessageType, payload: Value) -> Result<(), CoreError> {
        let sender = self.active.load_full().ok_or(CoreError::NotConnected)?;
        let mc = sender.send_message(message_type, payload).await?;
        tracing::debug!(mc, message_type = %message_type, "Command sent");
        Ok(())
    }
}
