use thiserror::Error;

use crate::handshake::HandshakeState;

/// Top-level error type for the `xcomfort-api` crate.
///
/// Covers every failure mode of the wire layer: socket I/O, the
/// secure-channel codec, and the multi-step handshake.
/// `xcomfort-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Handshake ───────────────────────────────────────────────────
    /// The bridge rejected or broke off the session setup.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    // ── Secure transport ────────────────────────────────────────────
    /// A frame could not be decoded (bad base64, misaligned ciphertext,
    /// garbage plaintext after decryption).
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Outbound message could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── Socket ──────────────────────────────────────────────────────
    /// Bridge address could not be turned into a WebSocket URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// WebSocket connection failed or errored mid-stream.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed by the bridge with a close frame.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// The socket is gone; nothing more can be sent or received.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl Error {
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Returns `true` if this error came from the handshake.
    pub fn is_handshake(&self) -> bool {
        matches!(self, Self::Handshake(_))
    }

    /// Returns `true` if a fresh connection attempt might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::WebSocketConnect(_) | Self::WebSocketClosed { .. } | Self::ConnectionClosed => {
                true
            }
            Self::Handshake(e) => !matches!(e.reason, HandshakeReason::LoginFailed),
            _ => false,
        }
    }
}

// ── HandshakeError ──────────────────────────────────────────────────

/// Why a handshake attempt was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum HandshakeReason {
    /// The bridge's first message was a NACK.
    ConnectionRefused,
    /// The bridge declined the client hello.
    Declined,
    /// The bridge did not confirm the encrypted channel.
    SecureChannelFailed,
    /// Login or token renewal was rejected.
    LoginFailed,
    /// The bridge's public key could not be parsed or used.
    InvalidPublicKey,
    /// A reply had the wrong type or lacked a required field.
    UnexpectedMessage,
    /// The socket closed before the handshake finished.
    ConnectionClosed,
}

/// A failed handshake, with the state it failed in.
#[derive(Debug, Clone, Error)]
#[error("Handshake failed ({reason}) while {state}: {detail}")]
pub struct HandshakeError {
    pub reason: HandshakeReason,
    pub state: HandshakeState,
    pub detail: String,
}

impl HandshakeError {
    pub fn new(reason: HandshakeReason, state: HandshakeState, detail: impl Into<String>) -> Self {
        Self {
            reason,
            state,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_error_display_names_reason_and_state() {
        let err = HandshakeError::new(
            HandshakeReason::SecureChannelFailed,
            HandshakeState::AwaitingSecureAck,
            "got type 18",
        );
        assert_eq!(
            err.to_string(),
            "Handshake failed (secure-channel-failed) while awaiting-secure-ack: got type 18"
        );
    }

    #[test]
    fn login_failure_is_not_transient() {
        let err: Error = HandshakeError::new(
            HandshakeReason::LoginFailed,
            HandshakeState::AwaitingLoginResult,
            "denied",
        )
        .into();
        assert!(err.is_handshake());
        assert!(!err.is_transient());
        assert!(Error::ConnectionClosed.is_transient());
    }
}
