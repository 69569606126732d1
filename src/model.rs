//! # Data Model
//!
//! Entities shared by the codec, the services and the store.
//!
//! Identifiers and the public key are fixed-width byte arrays so that their wire
//! widths are enforced by the type system rather than checked at every use.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ProtocolError;

/// Width of a client identifier on the wire
pub const CLIENT_ID_SIZE: usize = 16;

/// Width of the NUL-padded username field
pub const USERNAME_SIZE: usize = 255;

/// Width of the NUL-padded public key field
pub const PUBLIC_KEY_SIZE: usize = 160;

/// Opaque 16-byte client identifier, assigned by the server at registration.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ClientId([u8; CLIENT_ID_SIZE]);

impl ClientId {
    /// Generate a fresh random identifier (UUID v4 bytes).
    pub fn random() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    pub const fn from_bytes(bytes: [u8; CLIENT_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build an identifier from a slice that must be exactly 16 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; CLIENT_ID_SIZE]>::try_from(bytes).ok().map(Self)
    }

    pub const fn as_bytes(&self) -> &[u8; CLIENT_ID_SIZE] {
        &self.0
    }
}

impl From<[u8; CLIENT_ID_SIZE]> for ClientId {
    fn from(bytes: [u8; CLIENT_ID_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0).simple())
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({self})")
    }
}

/// 160-byte public key blob, stored exactly as it travels on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    pub const fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a key from at most 160 bytes, NUL-padding the remainder.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() > PUBLIC_KEY_SIZE {
            return Err(ProtocolError::InvalidPayload(format!(
                "public key is {} bytes (maximum {PUBLIC_KEY_SIZE})",
                bytes.len()
            )));
        }
        let mut key = [0u8; PUBLIC_KEY_SIZE];
        key[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub const fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PublicKey({:02x}{:02x}{:02x}{:02x}..)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// Server-assigned message identifier (4 bytes on the wire).
pub type MessageId = u32;

/// Closed set of message kinds carried in SEND_MSG and POLL_MSGS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Ask the recipient for a symmetric key
    SymmetricKeyRequest = 1,
    /// Deliver a symmetric key to the recipient
    SymmetricKeyDelivery = 2,
    /// Text message
    Text = 3,
    /// File transfer
    File = 4,
}

impl MessageType {
    pub const ALL: [MessageType; 4] = [
        MessageType::SymmetricKeyRequest,
        MessageType::SymmetricKeyDelivery,
        MessageType::Text,
        MessageType::File,
    ];

    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::SymmetricKeyRequest),
            2 => Ok(MessageType::SymmetricKeyDelivery),
            3 => Ok(MessageType::Text),
            4 => Ok(MessageType::File),
            other => Err(ProtocolError::InvalidMessageType(other)),
        }
    }
}

/// A registered client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: ClientId,
    pub username: String,
    pub public_key: PublicKey,
    pub last_seen: DateTime<Utc>,
}

impl Client {
    pub fn new(id: ClientId, username: impl Into<String>, public_key: PublicKey) -> Self {
        Self {
            id,
            username: username.into(),
            public_key,
            last_seen: Utc::now(),
        }
    }
}

/// A queued message waiting for its recipient to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub from_client: ClientId,
    pub to_client: ClientId,
    pub kind: MessageType,
    pub content: Vec<u8>,
}

/// A message before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub from_client: ClientId,
    pub to_client: ClientId,
    pub kind: MessageType,
    pub content: Vec<u8>,
}

impl NewMessage {
    pub fn with_id(self, id: MessageId) -> Message {
        Message {
            id,
            from_client: self.from_client,
            to_client: self.to_client,
            kind: self.kind,
            content: self.content,
        }
    }
}
