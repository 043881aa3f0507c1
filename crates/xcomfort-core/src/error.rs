// ── Core error types ──
//
// User-facing errors from xcomfort-core. Consumers never see frame codec
// or socket internals directly; the `From<xcomfort_api::Error>` impl
// translates wire-layer failures into domain-appropriate variants.

use thiserror::Error;
use xcomfort_api::HandshakeReason;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to bridge at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Handshake failed ({reason}): {detail}")]
    HandshakeFailed {
        reason: HandshakeReason,
        detail: String,
    },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("No active bridge connection")]
    NotConnected,

    // ── Dispatch errors ──────────────────────────────────────────────
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Bridge run loop is already running")]
    AlreadyRunning,

    #[error("Bridge closed")]
    Closed,

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Operation not supported: {operation} (requires {required})")]
    Unsupported { operation: String, required: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn unsupported(operation: &str, required: &str) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            required: required.into(),
        }
    }
}

/// Failure applying one inbound item to the registry.
///
/// Logged and skipped by the dispatcher; never ends the pump.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("{kind} item is not a JSON object")]
    NotAnObject { kind: &'static str },

    #[error("{kind} item is missing `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("{kind} item has invalid `{field}`: {value}")]
    InvalidField {
        kind: &'static str,
        field: &'static str,
        value: String,
    },
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<xcomfort_api::Error> for CoreError {
    fn from(err: xcomfort_api::Error) -> Self {
        match err {
            xcomfort_api::Error::Handshake(e) => CoreError::HandshakeFailed {
                reason: e.reason,
                detail: e.detail,
            },
            xcomfort_api::Error::Transport { message } => CoreError::Transport { message },
            xcomfort_api::Error::Serialization(e) => {
                CoreError::Internal(format!("Serialization error: {e}"))
            }
            xcomfort_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            xcomfort_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            xcomfort_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            xcomfort_api::Error::ConnectionClosed => CoreError::NotConnected,
        }
    }
}
