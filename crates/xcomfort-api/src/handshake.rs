//! Secure-session handshake and login.
//!
//! The bridge greets in plaintext, hands out an RSA public key, receives
//! the client's AES key wrapped under it, and from then on only speaks
//! encrypted frames. Login binds the bridge's device id and the user's
//! auth key through a salted double SHA-256, after which the issued token
//! is applied, renewed once, and applied again.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use rand::distributions::Alphanumeric;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::codec::{SessionKeys, decode_plain, encode_plain};
use crate::connection::Connection;
use crate::error::{Error, HandshakeError, HandshakeReason};
use crate::message::{Message, MessageType};
use crate::socket::Socket;

const SALT_LEN: usize = 12;
const LOGIN_USERNAME: &str = "default";

// ── HandshakeState ───────────────────────────────────────────────────

/// Where a handshake currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum HandshakeState {
    AwaitingHello,
    AwaitingPublicKey,
    SecretSent,
    AwaitingSecureAck,
    AwaitingLoginResult,
    TokenApplied,
    TokenRenewed,
    Established,
    Declined,
}

// ── ClientIdentity ───────────────────────────────────────────────────

/// How this client introduces itself in the client hello.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub client_type: String,
    pub client_id: String,
    pub client_version: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            client_type: "shl-app".into(),
            client_id: "c956e43f999f8004".into(),
            client_version: "2.0.0".into(),
        }
    }
}

// ── Handshake ────────────────────────────────────────────────────────

/// Run the full handshake over `socket`.
///
/// On any failure the socket is closed before the error is returned.
pub async fn establish(
    socket: Socket,
    auth_key: &SecretString,
    identity: &ClientIdentity,
) -> Result<Connection, Error> {
    let mut handshake = Handshake {
        state: HandshakeState::AwaitingHello,
    };
    handshake.run(socket, auth_key, identity).await
}

struct Handshake {
    state: HandshakeState,
}

impl Handshake {
    fn advance(&mut self, next: HandshakeState) {
        tracing::debug!(from = %self.state, to = %next, "Handshake transition");
        self.state = next;
    }

    fn fail(&self, reason: HandshakeReason, detail: impl Into<String>) -> Error {
        HandshakeError::new(reason, self.state, detail).into()
    }

    async fn run(
        &mut self,
        mut socket: Socket,
        auth_key: &SecretString,
        identity: &ClientIdentity,
    ) -> Result<Connection, Error> {
        let (device_id, keys) = match self.plaintext_phase(&mut socket, identity).await {
            Ok(v) => v,
            Err(e) => {
                if let Err(close_err) = socket.sink.close().await {
                    tracing::debug!(error = %close_err, "Closing socket after failed handshake");
                }
                return Err(e);
            }
        };

        let mut connection = Connection::from_parts(socket, keys, device_id);
        match self.secure_phase(&mut connection, auth_key).await {
            Ok(()) => {
                self.advance(HandshakeState::Established);
                tracing::info!(device_id = %connection.device_id(), "Secure session established");
                Ok(connection)
            }
            Err(e) => {
                if let Err(close_err) = connection.close().await {
                    tracing::debug!(error = %close_err, "Closing socket after failed handshake");
                }
                Err(e)
            }
        }
    }

    /// Steps 1–4: greeting, client hello, public key, secret.
    async fn plaintext_phase(
        &mut self,
        socket: &mut Socket,
        identity: &ClientIdentity,
    ) -> Result<(String, SessionKeys), Error> {
        let hello = self.receive_plain(socket).await?;
        if hello.is_type(MessageType::Nack) {
            self.advance(HandshakeState::Declined);
            return Err(self.fail(HandshakeReason::ConnectionRefused, bridge_reason(&hello)));
        }

        let device_id = self.required_str(&hello, "device_id")?.to_owned();
        let connection_id = hello.field("connection_id").cloned().ok_or_else(|| {
            self.fail(
                HandshakeReason::UnexpectedMessage,
                format!("{} is missing `connection_id`", hello.type_name()),
            )
        })?;
        tracing::debug!(%device_id, %connection_id, "Bridge greeting received");

        self.send_plain(
            socket,
            &Message::handshake(
                MessageType::ConnectionConfirm,
                Some(json!({
                    "client_type": identity.client_type,
                    "client_id": identity.client_id,
                    "client_version": identity.client_version,
                    "connection_id": connection_id,
                })),
            ),
        )
        .await?;

        let reply = self.receive_plain(socket).await?;
        if reply.is_type(MessageType::ConnectionDeclined) {
            self.advance(HandshakeState::Declined);
            return Err(self.fail(HandshakeReason::Declined, bridge_reason(&reply)));
        }

        self.advance(HandshakeState::AwaitingPublicKey);
        self.send_plain(socket, &Message::handshake(MessageType::ScInit, None))
            .await?;

        let reply = self.receive_plain(socket).await?;
        let pem = self.required_str(&reply, "public_key")?;
        let public_key = parse_public_key(pem).map_err(|e| self.fail(HandshakeReason::InvalidPublicKey, e))?;

        let keys = SessionKeys::generate();
        let secret = encrypt_secret(&public_key, &keys)
            .map_err(|e| self.fail(HandshakeReason::InvalidPublicKey, e))?;

        self.send_plain(
            socket,
            &Message::handshake(MessageType::ScSecret, Some(json!({ "secret": secret }))),
        )
        .await?;
        self.advance(HandshakeState::SecretSent);

        Ok((device_id, keys))
    }

    /// Steps 5–9: secure ack, login, token apply / renew / apply.
    async fn secure_phase(&mut self, conn: &mut Connection, auth_key: &SecretString) -> Result<(), Error> {
        self.advance(HandshakeState::AwaitingSecureAck);
        let ack = self.receive_secure(conn).await?;
        if !ack.is_type(MessageType::ScEstablished) {
            return Err(self.fail(
                HandshakeReason::SecureChannelFailed,
                format!("expected SC_ESTABLISHED, got {}", ack.type_name()),
            ));
        }

        let salt = generate_salt();
        let password = login_password(conn.device_id(), auth_key.expose_secret(), &salt);
        conn.send_message(
            MessageType::AuthLogin,
            json!({
                "username": LOGIN_USERNAME,
                "password": password,
                "salt": salt,
            }),
        )
        .await?;

        self.advance(HandshakeState::AwaitingLoginResult);
        let reply = self.receive_secure(conn).await?;
        if !reply.is_type(MessageType::AuthLoginSuccess) {
            return Err(self.fail(
                HandshakeReason::LoginFailed,
                format!("login rejected with {}", reply.type_name()),
            ));
        }
        let token = self.token(&reply)?;

        self.apply_token(conn, &token).await?;
        self.advance(HandshakeState::TokenApplied);

        conn.send_message(MessageType::AuthRenewToken, json!({ "token": token }))
            .await?;
        let reply = self.receive_secure(conn).await?;
        if !reply.is_type(MessageType::AuthRenewTokenResponse) {
            return Err(self.fail(
                HandshakeReason::LoginFailed,
                format!("token renewal rejected with {}", reply.type_name()),
            ));
        }
        let renewed = self.token(&reply)?;

        self.apply_token(conn, &renewed).await?;
        self.advance(HandshakeState::TokenRenewed);
        Ok(())
    }

    async fn apply_token(&self, conn: &mut Connection, token: &str) -> Result<(), Error> {
        conn.send_message(MessageType::AuthApplyToken, json!({ "token": token }))
            .await?;
        let reply = self.receive_secure(conn).await?;
        tracing::debug!(
            valid = ?reply.field("valid"),
            remaining = ?reply.field("remaining"),
            "Token applied"
        );
        Ok(())
    }

    // ── Helpers ──────────────────────────────────────────────────────

    async fn send_plain(&self, socket: &mut Socket, message: &Message) -> Result<(), Error> {
        socket.sink.send_frame(encode_plain(message)?).await
    }

    async fn receive_plain(&self, socket: &mut Socket) -> Result<Message, Error> {
        match socket.source.next_frame().await {
            Some(Ok(frame)) => decode_plain(&frame),
            Some(Err(e)) => Err(e),
            None => Err(self.fail(HandshakeReason::ConnectionClosed, "socket closed by bridge")),
        }
    }

    async fn receive_secure(&self, conn: &mut Connection) -> Result<Message, Error> {
        match conn.receive().await {
            Err(Error::ConnectionClosed) => {
                Err(self.fail(HandshakeReason::ConnectionClosed, "socket closed by bridge"))
            }
            other => other,
        }
    }

    fn required_str<'m>(&self, message: &'m Message, field: &str) -> Result<&'m str, Error> {
        message.str_field(field).ok_or_else(|| {
            self.fail(
                HandshakeReason::UnexpectedMessage,
                format!("{} is missing `{field}`", message.type_name()),
            )
        })
    }

    fn token(&self, message: &Message) -> Result<String, Error> {
        self.required_str(message, "token").map(str::to_owned)
    }
}

/// The bridge's human-readable reason, wherever it put it.
fn bridge_reason(message: &Message) -> String {
    ["error_message", "info", "message"]
        .iter()
        .find_map(|k| message.str_field(k))
        .map_or_else(|| message.type_name(), str::to_owned)
}

// ── Crypto primitives ────────────────────────────────────────────────

fn parse_public_key(pem: &str) -> Result<RsaPublicKey, String> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| format!("cannot parse bridge public key: {e}"))
}

fn encrypt_secret(public_key: &RsaPublicKey, keys: &SessionKeys) -> Result<String, String> {
    let wrapped = public_key
        .encrypt(
            &mut rand::rngs::OsRng,
            Pkcs1v15Encrypt,
            keys.to_secret_string().as_bytes(),
        )
        .map_err(|e| format!("cannot encrypt session secret: {e}"))?;
    Ok(STANDARD.encode(wrapped))
}

/// Random alphanumeric login salt.
pub fn generate_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LEN)
        .map(char::from)
        .collect()
}

/// `hex(SHA256(salt || hex(SHA256(device_id || auth_key))))`
pub fn login_password(device_id: &str, auth_key: &str, salt: &str) -> String {
    let inner = hex::encode(
        Sha256::new()
            .chain_update(device_id.as_bytes())
            .chain_update(auth_key.as_bytes())
            .finalize(),
    );
    hex::encode(
        Sha256::new()
            .chain_update(salt.as_bytes())
            .chain_update(inner.as_bytes())
            .finalize(),
    )
}

/// Split a `hex(key):::hex(iv)` secret back into key material. This is
/// the bridge's side of the exchange.
pub fn parse_secret_string(secret: &str) -> Option<SessionKeys> {
    let (key_hex, iv_hex) = secret.split_once(":::")?;
    let key = hex::decode(key_hex).ok()?.try_into().ok()?;
    let iv = hex::decode(iv_hex).ok()?.try_into().ok()?;
    Some(SessionKeys { key, iv })
}
