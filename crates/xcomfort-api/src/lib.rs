// xcomfort-api: wire layer for the xComfort bridge protocol
// (secure channel codec, handshake, connection pump).

pub mod codec;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod message;
pub mod socket;

pub use codec::{SessionCipher, SessionKeys};
pub use connection::{Connection, ConnectionSender, InboundMessage, SessionState};
pub use error::{Error, HandshakeError, HandshakeReason};
pub use handshake::{ClientIdentity, HandshakeState, establish};
pub use message::{Message, MessageType};
pub use socket::{FrameSink, FrameSource, RemoteEnd, Socket, in_memory};
