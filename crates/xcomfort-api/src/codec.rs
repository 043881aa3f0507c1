//! Secure-channel frame codec.
//!
//! Once key material is exchanged, every frame is
//! `base64(AES-256-CBC(json || zero padding)) || 0x04`. The IV is fixed for
//! the lifetime of the session and there is no length prefix: the
//! terminator byte is the only framing signal.

use aes::Aes256;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::Error;
use crate::message::Message;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Frame terminator appended to every frame the client sends.
pub const FRAME_TERMINATOR: char = '\u{4}';

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

// ── SessionKeys ─────────────────────────────────────────────────────

/// Symmetric key material for one session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKeys {
    pub key: [u8; KEY_LEN],
    pub iv: [u8; IV_LEN],
}

impl SessionKeys {
    /// Fresh random key and IV from the OS RNG.
    pub fn generate() -> Self {
        use rand::RngCore;

        let mut key = [0u8; KEY_LEN];
        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        rand::rngs::OsRng.fill_bytes(&mut iv);
        Self { key, iv }
    }

    /// The `hex(key):::hex(iv)` string the bridge expects inside the
    /// RSA-wrapped secret.
    pub fn to_secret_string(&self) -> String {
        format!("{}:::{}", hex::encode(self.key), hex::encode(self.iv))
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

// ── SessionCipher ───────────────────────────────────────────────────

/// Encodes and decodes secure-channel frames for one session.
///
/// Pure transformation; all I/O stays with the caller.
#[derive(Debug, Clone)]
pub struct SessionCipher {
    keys: SessionKeys,
}

impl SessionCipher {
    pub fn new(keys: SessionKeys) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    /// Serialize, pad, encrypt, base64 and terminate one message.
    pub fn encode(&self, message: &Message) -> Result<String, Error> {
        let json = serde_json::to_vec(message)?;
        Ok(self.encode_bytes(&json))
    }

    /// Decode one frame into a message.
    ///
    /// An all-zero plaintext is the bridge's empty frame and yields
    /// [`Message::default()`].
    pub fn decode(&self, frame: &str) -> Result<Message, Error> {
        let plaintext = self.decode_bytes(frame)?;
        if plaintext.is_empty() {
            return Ok(Message::default());
        }

        let text = std::str::from_utf8(&plaintext)
            .map_err(|e| Error::transport(format!("decrypted frame is not UTF-8: {e}")))?;
        serde_json::from_str(text)
            .map_err(|e| Error::transport(format!("decrypted frame is not valid JSON: {e}")))
    }

    pub(crate) fn encode_bytes(&self, plaintext: &[u8]) -> String {
        let padded = zero_pad(plaintext);
        let ciphertext = Aes256CbcEnc::new((&self.keys.key).into(), (&self.keys.iv).into())
            .encrypt_padded_vec_mut::<NoPadding>(&padded);

        let mut frame = STANDARD.encode(ciphertext);
        frame.push(FRAME_TERMINATOR);
        frame
    }

    /// Returns the plaintext with trailing zero padding removed.
    pub(crate) fn decode_bytes(&self, frame: &str) -> Result<Vec<u8>, Error> {
        let body = strip_terminator(frame).trim_end();
        let ciphertext = STANDARD
            .decode(body)
            .map_err(|e| Error::transport(format!("invalid base64 frame: {e}")))?;

        if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
            return Err(Error::transport(format!(
                "ciphertext length {} is not a multiple of the block size",
                ciphertext.len()
            )));
        }

        let mut plaintext = Aes256CbcDec::new((&self.keys.key).into(), (&self.keys.iv).into())
            .decrypt_padded_vec_mut::<NoPadding>(&ciphertext)
            .map_err(|e| Error::transport(format!("decryption failed: {e}")))?;

        let end = plaintext
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |last| last + 1);
        plaintext.truncate(end);
        Ok(plaintext)
    }
}

// ── Plaintext phase ─────────────────────────────────────────────────

/// Serialize a handshake-phase message (sent without terminator).
pub fn encode_plain(message: &Message) -> Result<String, Error> {
    Ok(serde_json::to_string(message)?)
}

/// Parse a handshake-phase frame; the bridge terminates these with `0x04`.
pub fn decode_plain(frame: &str) -> Result<Message, Error> {
    serde_json::from_str(strip_terminator(frame))
        .map_err(|e| Error::transport(format!("invalid plaintext frame: {e}")))
}

fn strip_terminator(frame: &str) -> &str {
    frame.strip_suffix(FRAME_TERMINATOR).unwrap_or(frame)
}

/// Right-pad with zero bytes to the next block boundary. An already
/// aligned input still gains a full zero block, matching the bridge.
fn zero_pad(data: &[u8]) -> Vec<u8> {
    let pad = BLOCK_LEN - (data.len() % BLOCK_LEN);
    let mut padded = Vec::with_capacity(data.len() + pad);
    padded.extend_from_slice(data);
    padded.resize(data.len() + pad, 0);
    padded
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn cipher() -> SessionCipher {
        SessionCipher::new(SessionKeys {
            key: [7u8; KEY_LEN],
            iv: [3u8; IV_LEN],
        })
    }

    #[test]
    fn frame_round_trip() {
        let c = cipher();
        let msg = Message::new(
            MessageType::ActionSwitchDevice,
            5,
            json!({ "deviceId": 12, "switch": true }),
        );

        let frame = c.encode(&msg).unwrap();
        assert!(frame.ends_with(FRAME_TERMINATOR));
        assert_eq!(c.decode(&frame).unwrap(), msg);
    }

    #[test]
    fn decode_accepts_frame_without_terminator() {
        let c = cipher();
        let msg = Message::ack(9);
        let frame = c.encode(&msg).unwrap();
        let bare = frame.trim_end_matches(FRAME_TERMINATOR);
        assert_eq!(c.decode(bare).unwrap(), msg);
    }

    #[test]
    fn all_zero_plaintext_is_empty_message() {
        let c = cipher();
        let ciphertext = Aes256CbcEnc::new((&[7u8; KEY_LEN]).into(), (&[3u8; IV_LEN]).into())
            .encrypt_padded_vec_mut::<NoPadding>(&[0u8; 32]);
        let frame = STANDARD.encode(ciphertext);

        assert_eq!(c.decode(&frame).unwrap(), Message::default());
    }

    #[test]
    fn aligned_input_gains_full_padding_block() {
        assert_eq!(zero_pad(&[1u8; 16]).len(), 32);
        assert_eq!(zero_pad(&[1u8; 15]).len(), 16);
        assert_eq!(zero_pad(&[]).len(), 16);
    }

    #[test]
    fn misaligned_ciphertext_is_transport_error() {
        let frame = STANDARD.encode([1u8; 20]);
        let err = cipher().decode(&frame).unwrap_err();
        assert!(matches!(err, Error::Transport { .. }), "got {err:?}");
    }

    #[test]
    fn invalid_base64_is_transport_error() {
        let err = cipher().decode("***not base64***").unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }

    #[test]
    fn wrong_key_fails_instead_of_returning_empty() {
        let frame = cipher()
            .encode(&Message::new(MessageType::Heartbeat, 1, json!({})))
            .unwrap();
        let other = SessionCipher::new(SessionKeys {
            key: [8u8; KEY_LEN],
            iv: [3u8; IV_LEN],
        });
        assert!(other.decode(&frame).is_err());
    }

    #[test]
    fn secret_string_is_lowercase_hex() {
        let keys = SessionKeys {
            key: [0xAB; KEY_LEN],
            iv: [0x01; IV_LEN],
        };
        let secret = keys.to_secret_string();
        let (key, iv) = secret.split_once(":::").unwrap();
        assert_eq!(key, "ab".repeat(KEY_LEN));
        assert_eq!(iv, "01".repeat(IV_LEN));
    }

    #[test]
    fn plaintext_frames_strip_terminator() {
        let msg = decode_plain("{\"type_int\":12,\"mc\":-1}\u{4}").unwrap();
        assert!(msg.is_type(MessageType::ConnectionEstablished));
        assert!(decode_plain("nope").is_err());
    }
}
