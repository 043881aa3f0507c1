// ── Bridge facade ──
//
// Full lifecycle management for one bridge: connect + handshake, pump
// with registry dispatch, reconnect on failure, and the command surface.
// The registry outlives every connection; only the command route and the
// session are replaced on reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use xcomfort_api::{Connection, InboundMessage, MessageType, Socket};

use crate::command::{CommandRoute, CommandSink};
use crate::config::BridgeConfig;
use crate::error::CoreError;
use crate::model::{Component, Device, DeviceId, Room};
use crate::store::{DispatchOutcome, Registry};

const MESSAGE_CHANNEL_SIZE: usize = 256;

// ── BridgeState ──────────────────────────────────────────────────────

/// Run-loop state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum BridgeState {
    Uninitialized,
    Initializing,
    /// The current connection's bulk snapshot has been applied.
    Ready,
    Closing,
}

// ── Connect ──────────────────────────────────────────────────────────

/// Opens an authenticated connection for one run-loop cycle.
#[async_trait]
pub trait Connect: Send + Sync {
    async fn connect(&self, config: &BridgeConfig) -> Result<Connection, xcomfort_api::Error>;
}

/// WebSocket + handshake against a real bridge.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

#[async_trait]
impl Connect for WebSocketConnector {
    async fn connect(&self, config: &BridgeConfig) -> Result<Connection, xcomfort_api::Error> {
        let socket = Socket::connect(&config.url).await?;
        xcomfort_api::establish(socket, &config.auth_key, &config.client).await
    }
}

// ── Bridge ───────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<BridgeInner>`. Call [`run()`](Self::run)
/// (usually in a spawned task) to connect and keep the connection alive;
/// everything else can be used from any other task.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    config: BridgeConfig,
    connector: Box<dyn Connect>,
    registry: Registry,
    route: Arc<CommandRoute>,
    state: watch::Sender<BridgeState>,
    messages: broadcast::Sender<InboundMessage>,
    last_message_at: watch::Sender<Option<DateTime<Utc>>>,
    running: AtomicBool,
    cancel: CancellationToken,
}

impl Bridge {
    /// Create a bridge that connects over WebSocket. Does NOT connect.
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_connector(config, WebSocketConnector)
    }

    /// Create a bridge with a custom connection factory.
    pub fn with_connector(config: BridgeConfig, connector: impl Connect + 'static) -> Self {
        let route = Arc::new(CommandRoute::default());
        let sink: Arc<dyn CommandSink> = route.clone();
        let registry = Registry::new(sink, config.setpoint_ranges);
        let (state, _) = watch::channel(BridgeState::Uninitialized);
        let (messages, _) = broadcast::channel(MESSAGE_CHANNEL_SIZE);
        let (last_message_at, _) = watch::channel(None);

        Self {
            inner: Arc::new(BridgeInner {
                config,
                connector: Box::new(connector),
                registry,
                route,
                state,
                messages,
                last_message_at,
                running: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    // ── Run loop ─────────────────────────────────────────────────────

    /// Connect and keep reconnecting until [`close()`](Self::close).
    ///
    /// Failed attempts are logged and retried after the configured delay;
    /// a connection the bridge ends cleanly is retried immediately.
    /// Returns `Ok(())` once closed.
    pub async fn run(&self) -> Result<(), CoreError> {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return Err(CoreError::AlreadyRunning);
        }
        let _running = RunningGuard(&self.inner.running);

        let cancel = &self.inner.cancel;
        let mut attempt: u32 = 0;

        while !self.is_closing() {
            attempt = attempt.saturating_add(1);
            self.set_state(BridgeState::Initializing);

            let result = self.run_cycle(attempt).await;
            self.inner.route.clear();
            self.set_state(BridgeState::Initializing);

            match result {
                Ok(()) => {
                    debug!(attempt, "Connection ended");
                }
                Err(CycleError { error, transient }) => {
                    if transient {
                        warn!(error = %error, attempt, "Bridge connection failed");
                    } else {
                        error!(error = %error, attempt, "Bridge connection failed; retrying is unlikely to help");
                    }
                    let delay = self.inner.config.reconnect_delay;
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!("Bridge run loop stopped");
        Ok(())
    }

    async fn run_cycle(&self, attempt: u32) -> Result<(), CycleError> {
        let inner = &self.inner;
        debug!(attempt, url = %inner.config.url, "Connecting to bridge");

        let connection = tokio::select! {
            biased;
            () = inner.cancel.cancelled() => return Ok(()),
            result = inner.connector.connect(&inner.config) => result?,
        };
        info!(attempt, device_id = %connection.device_id(), "Bridge connected");

        inner.route.install(connection.sender());
        connection
            .pump(|message| inner.handle_message(message), &inner.cancel)
            .await?;
        Ok(())
    }

    /// Stop the run loop and close the active connection.
    pub fn close(&self) {
        self.inner.state.send_replace(BridgeState::Closing);
        self.inner.cancel.cancel();
        self.inner.route.clear();
        debug!("Bridge closing");
    }

    // ── State ────────────────────────────────────────────────────────

    pub fn state(&self) -> BridgeState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<BridgeState> {
        self.inner.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.route.is_connected()
    }

    /// When the last inbound message was dispatched.
    pub fn last_message_at(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_message_at.borrow()
    }

    /// Every inbound message with a payload, after the registry applied it.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<InboundMessage> {
        self.inner.messages.subscribe()
    }

    fn is_closing(&self) -> bool {
        self.state() == BridgeState::Closing || self.inner.cancel.is_cancelled()
    }

    fn set_state(&self, next: BridgeState) {
        self.inner.set_state(next);
    }

    // ── Entities ─────────────────────────────────────────────────────

    /// Wait for the bulk snapshot, then return every device by id.
    pub async fn get_devices(&self) -> Result<Vec<Arc<Device>>, CoreError> {
        self.wait_ready().await?;
        Ok(self.inner.registry.devices())
    }

    pub async fn get_rooms(&self) -> Result<Vec<Arc<Room>>, CoreError> {
        self.wait_ready().await?;
        Ok(self.inner.registry.rooms())
    }

    pub async fn get_comps(&self) -> Result<Vec<Arc<Component>>, CoreError> {
        self.wait_ready().await?;
        Ok(self.inner.registry.comps())
    }

    async fn wait_ready(&self) -> Result<(), CoreError> {
        let mut rx = self.inner.state.subscribe();
        let state = *rx
            .wait_for(|s| matches!(s, BridgeState::Ready | BridgeState::Closing))
            .await
            .map_err(|_| CoreError::Closed)?;

        match state {
            BridgeState::Ready => Ok(()),
            _ => Err(CoreError::Closed),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub async fn switch_device(&self, device_id: DeviceId, on: bool) -> Result<(), CoreError> {
        self.send_message(
            MessageType::ActionSwitchDevice,
            json!({ "deviceId": device_id, "switch": on }),
        )
        .await
    }

    /// Set a dimmer, clamped to 0–99.
    pub async fn slide_device(&self, device_id: DeviceId, value: i32) -> Result<(), CoreError> {
        self.send_message(
            MessageType::ActionSlideDevice,
            json!({ "deviceId": device_id, "dimmvalue": value.clamp(0, 99) }),
        )
        .await
    }

    /// Send any message through the active connection.
    pub async fn send_message(&self, message_type: MessageType, payload: Value) -> Result<(), CoreError> {
        self.inner.route.send_message(message_type, payload).await
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("url", &self.inner.config.url.as_str())
            .field("state", &self.state())
            .field("registry", &self.inner.registry)
            .finish_non_exhaustive()
    }
}

impl BridgeInner {
    /// Dispatch step, called synchronously by the pump for every payload.
    fn handle_message(&self, message: InboundMessage) {
        self.last_message_at.send_replace(Some(Utc::now()));

        if self.registry.dispatch(&message) == DispatchOutcome::SnapshotComplete {
            self.set_state(BridgeState::Ready);
        }

        // No subscribers is fine.
        let _ = self.messages.send(message);
    }

    /// Move to `next` unless the bridge is closing.
    fn set_state(&self, next: BridgeState) {
        self.state.send_if_modified(|state| {
            if *state == BridgeState::Closing || *state == next {
                return false;
            }
            debug!(from = %state, to = %next, "Bridge state");
            *state = next;
            true
        });
    }
}

/// Why one run-loop cycle ended early.
struct CycleError {
    error: CoreError,
    /// A fresh attempt might succeed without any configuration change.
    transient: bool,
}

impl From<xcomfort_api::Error> for CycleError {
    fn from(err: xcomfort_api::Error) -> Self {
        Self {
            transient: err.is_transient(),
            error: err.into(),
        }
    }
}

/// Clears the running flag when `run()` returns or is dropped.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
